//! Error types for the trainflow orchestrator.
//!
//! The taxonomy separates request validation, workspace resource handling,
//! dataset access, training, aggregation, and artifact publishing so the
//! orchestrator can decide fatality per class: a fold-scoped error is
//! recorded and tolerated, a pipeline-scoped error terminates the run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::features::FeatureError;

/// The main error type for trainflow operations.
#[derive(Debug, Error)]
pub enum TrainflowError {
    /// A request validation error occurred.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A workspace allocation or cleanup error.
    #[error("{0}")]
    Workspace(#[from] WorkspaceError),

    /// A dataset fetch error.
    #[error("{0}")]
    Fetch(#[from] FetchError),

    /// A training error.
    #[error("{0}")]
    Training(#[from] TrainingError),

    /// An aggregation error.
    #[error("{0}")]
    Aggregation(#[from] AggregationError),

    /// An artifact publish error.
    #[error("{0}")]
    Publish(#[from] PublishError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable discriminant for error classes, carried by terminal outcomes
/// and per-fold failure records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed request, caught before dispatch, never retried.
    Validation,
    /// Workspace allocation or cleanup failure.
    Resource,
    /// Dataset fetch or decode failure.
    DataAccess,
    /// Black-box trainer failure or invalid fold partition.
    Training,
    /// No fold produced a usable result.
    NoSuccessfulFolds,
    /// Artifact upload failure.
    Publish,
    /// The pipeline was cancelled before completion.
    Cancelled,
    /// Execution substrate failure (panicked or lost job).
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Resource => "resource",
            Self::DataAccess => "data-access",
            Self::Training => "training",
            Self::NoSuccessfulFolds => "no-successful-folds",
            Self::Publish => "publish",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Error raised when a pipeline request fails validation.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ValidationError {
    /// The error message.
    pub message: String,
    /// The request field the error refers to, if any.
    pub field: Option<String>,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    /// Sets the offending field name.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// Errors from workspace allocation and cleanup.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// The workspace directory could not be created.
    #[error("failed to allocate workspace under {root}: {source}")]
    Allocation {
        /// The root directory workspaces are created under.
        root: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The workspace directory could not be removed.
    #[error("failed to remove workspace {path}: {source}")]
    Cleanup {
        /// The workspace directory path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors from fetching a dataset out of the storage collaborator.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The storage reference does not resolve to a file.
    #[error("dataset '{storage_ref}' is unavailable")]
    DatasetUnavailable {
        /// The storage reference that failed to resolve.
        storage_ref: String,
    },

    /// The access token was rejected.
    #[error("authorization failed fetching dataset '{storage_ref}'")]
    AuthorizationFailed {
        /// The storage reference being fetched.
        storage_ref: String,
    },

    /// The download terminated without delivering the full payload.
    #[error("transfer of dataset '{storage_ref}' incomplete: {detail}")]
    TransferIncomplete {
        /// The storage reference being fetched.
        storage_ref: String,
        /// What was inconsistent about the transfer.
        detail: String,
    },

    /// The transport layer failed before a response was obtained.
    #[error("transport error fetching dataset '{storage_ref}': {detail}")]
    Transport {
        /// The storage reference being fetched.
        storage_ref: String,
        /// The transport failure description.
        detail: String,
    },

    /// The fetched bytes could not be written into the workspace.
    #[error("failed to write dataset '{storage_ref}' into workspace: {source}")]
    Write {
        /// The storage reference being fetched.
        storage_ref: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the black-box training procedure.
#[derive(Debug, Error)]
pub enum TrainingError {
    /// The trainer failed to fit or serialize a model.
    #[error("training failed: {cause}")]
    TrainingFailed {
        /// The underlying trainer failure.
        cause: anyhow::Error,
    },

    /// The fold partition leaves nothing to train or score on.
    #[error("invalid partition: {0}")]
    InvalidPartition(String),

    /// The caller supplied an empty hyper-parameter grid.
    #[error("hyper-parameter grid is empty")]
    EmptyGrid,
}

impl TrainingError {
    /// Wraps an arbitrary trainer failure.
    #[must_use]
    pub fn failed(cause: impl Into<anyhow::Error>) -> Self {
        Self::TrainingFailed {
            cause: cause.into(),
        }
    }
}

/// Errors from aggregating fold results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AggregationError {
    /// Zero folds produced a result; nothing can be selected.
    #[error("no successful folds to aggregate")]
    NoSuccessfulFolds,
}

/// Errors from publishing a model artifact.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The upload did not complete or the repository is unknown.
    #[error("artifact upload to repository '{repository_id}' failed: {detail}")]
    UploadFailed {
        /// The destination repository.
        repository_id: String,
        /// The failure description.
        detail: String,
    },

    /// The access token was rejected.
    #[error("authorization failed publishing to repository '{repository_id}'")]
    AuthorizationFailed {
        /// The destination repository.
        repository_id: String,
    },
}

/// Error of a single unit of work (a fold job or the final retrain job).
///
/// Everything a job can fail with collapses into this union so the
/// orchestrator can classify it with [`JobError::kind`] without matching
/// each component error separately.
#[derive(Debug, Error)]
pub enum JobError {
    /// Workspace allocation failed before the job could run.
    #[error("{0}")]
    Workspace(#[from] WorkspaceError),

    /// The dataset could not be materialized.
    #[error("{0}")]
    Fetch(#[from] FetchError),

    /// The feature table could not be loaded or partitioned.
    #[error("{0}")]
    Feature(#[from] FeatureError),

    /// The training procedure failed.
    #[error("{0}")]
    Training(#[from] TrainingError),

    /// The job observed a cancellation request before doing work.
    #[error("job cancelled: {0}")]
    Cancelled(String),

    /// The execution substrate lost the job (panic, abort, timeout).
    #[error("job aborted: {0}")]
    Aborted(String),
}

impl JobError {
    /// Returns the error class this job failure belongs to.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Workspace(_) => ErrorKind::Resource,
            Self::Fetch(_) | Self::Feature(_) => ErrorKind::DataAccess,
            Self::Training(_) => ErrorKind::Training,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Aborted(_) => ErrorKind::Internal,
        }
    }
}

/// Pipeline-fatal errors carried by `Failed` outcomes.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The request failed validation before dispatch.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Every fold failed; there is nothing to aggregate.
    #[error("{0}")]
    Aggregation(#[from] AggregationError),

    /// The final retrain job failed.
    #[error("retraining failed: {0}")]
    Retraining(#[source] JobError),

    /// The artifact could not be published.
    #[error("{0}")]
    Publish(#[from] PublishError),

    /// The pipeline was cancelled.
    #[error("pipeline cancelled: {0}")]
    Cancelled(String),
}

impl PipelineError {
    /// Returns the error class for outcome reporting.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Aggregation(AggregationError::NoSuccessfulFolds) => {
                ErrorKind::NoSuccessfulFolds
            }
            Self::Retraining(job) => job.kind(),
            Self::Publish(_) => ErrorKind::Publish,
            Self::Cancelled(_) => ErrorKind::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_with_field() {
        let err = ValidationError::new("fold count must be at least 2").with_field("nr_folds");

        assert_eq!(err.message, "fold count must be at least 2");
        assert_eq!(err.field.as_deref(), Some("nr_folds"));
        assert_eq!(err.to_string(), "fold count must be at least 2");
    }

    #[test]
    fn test_job_error_kinds() {
        let fetch: JobError = FetchError::DatasetUnavailable {
            storage_ref: "ds-1".to_string(),
        }
        .into();
        assert_eq!(fetch.kind(), ErrorKind::DataAccess);

        let training: JobError = TrainingError::InvalidPartition("empty test set".to_string()).into();
        assert_eq!(training.kind(), ErrorKind::Training);

        let cancelled = JobError::Cancelled("shutdown".to_string());
        assert_eq!(cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_pipeline_error_kinds() {
        let err: PipelineError = AggregationError::NoSuccessfulFolds.into();
        assert_eq!(err.kind(), ErrorKind::NoSuccessfulFolds);

        let err = PipelineError::Retraining(JobError::Training(TrainingError::failed(
            anyhow::anyhow!("solver diverged"),
        )));
        assert_eq!(err.kind(), ErrorKind::Training);

        let err = PipelineError::Retraining(JobError::Fetch(FetchError::AuthorizationFailed {
            storage_ref: "ds-1".to_string(),
        }));
        assert_eq!(err.kind(), ErrorKind::DataAccess);
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::NoSuccessfulFolds.to_string(), "no-successful-folds");
        assert_eq!(ErrorKind::DataAccess.to_string(), "data-access");
    }

    #[test]
    fn test_training_error_failed_preserves_cause() {
        let err = TrainingError::failed(anyhow::anyhow!("singular matrix"));
        assert!(err.to_string().contains("singular matrix"));
    }

    #[test]
    fn test_component_errors_lift_into_umbrella() {
        let err: TrainflowError = FetchError::TransferIncomplete {
            storage_ref: "ds-1".to_string(),
            detail: "payload is empty".to_string(),
        }
        .into();
        assert!(err.to_string().contains("ds-1"));

        let err: TrainflowError = AggregationError::NoSuccessfulFolds.into();
        assert!(err.to_string().contains("no successful folds"));
    }
}
