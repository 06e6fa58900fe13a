//! Configuration for the orchestrator and its storage collaborator.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for [`crate::storage::HttpStorageClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base URL of the storage service, without a trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl StorageConfig {
    /// Creates a config for the given base URL with default timeout.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            request_timeout: Duration::from_secs(60),
        }
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Configuration for [`crate::pipeline::PipelineOrchestrator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Upper bound on simultaneously running fold jobs; `None` runs all
    /// folds at once.
    pub max_concurrent_folds: Option<usize>,
    /// Per-fold wall-clock timeout; `None` waits indefinitely.
    pub fold_timeout: Option<Duration>,
    /// File name the dataset is materialized under inside a workspace.
    pub dataset_file_name: String,
    /// Content type the model artifact is uploaded with.
    pub artifact_content_type: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_folds: None,
            fold_timeout: None,
            dataset_file_name: "features.csv".to_string(),
            artifact_content_type: "application/octet-stream".to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of simultaneously running fold jobs.
    #[must_use]
    pub fn with_max_concurrent_folds(mut self, max: usize) -> Self {
        self.max_concurrent_folds = Some(max);
        self
    }

    /// Sets a per-fold timeout.
    #[must_use]
    pub fn with_fold_timeout(mut self, timeout: Duration) -> Self {
        self.fold_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_strips_trailing_slash() {
        let config = StorageConfig::new("http://storage.local/");
        assert_eq!(config.base_url, "http://storage.local");
    }

    #[test]
    fn test_orchestrator_config_defaults() {
        let config = OrchestratorConfig::default();
        assert!(config.max_concurrent_folds.is_none());
        assert!(config.fold_timeout.is_none());
        assert_eq!(config.dataset_file_name, "features.csv");
    }

    #[test]
    fn test_orchestrator_config_builders() {
        let config = OrchestratorConfig::new()
            .with_max_concurrent_folds(4)
            .with_fold_timeout(Duration::from_secs(300));

        assert_eq!(config.max_concurrent_folds, Some(4));
        assert_eq!(config.fold_timeout, Some(Duration::from_secs(300)));
    }
}
