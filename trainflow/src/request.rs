//! Pipeline request types and validation.
//!
//! A [`PipelineRequest`] is immutable once submitted: the orchestrator
//! shares it across fold jobs behind an `Arc` and nothing mutates it
//! after validation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::errors::ValidationError;

/// Identifier of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(Uuid);

impl PipelineId {
    /// Mints a fresh pipeline identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PipelineId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// An opaque bearer credential forwarded to the storage collaborator.
///
/// The token value never appears in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a raw token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token for the `Authorization` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

impl From<&str> for AccessToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

/// Row-index partition of one cross-validation fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldSpec {
    /// Row indices used to fit the model.
    pub train: Vec<usize>,
    /// Row indices held out for scoring.
    pub test: Vec<usize>,
}

impl FoldSpec {
    /// Creates a new fold partition.
    #[must_use]
    pub fn new(train: Vec<usize>, test: Vec<usize>) -> Self {
        Self { train, test }
    }
}

/// A submitted training-pipeline request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRequest {
    /// Storage reference of the feature dataset.
    pub dataset_ref: String,
    /// Repository the final model artifact is published into.
    pub repository_id: String,
    /// Number of cross-validation folds; must match `folds.len()`.
    pub nr_folds: usize,
    /// Ordered fold partition; order defines submission order for
    /// aggregation tie-breaking.
    pub folds: Vec<FoldSpec>,
    /// Name of the row-identity column in the dataset.
    pub index_column: String,
    /// Name of the label column.
    pub target_column: String,
    /// Columns dropped from the feature matrix before training.
    pub exclude_columns: BTreeSet<String>,
    /// Bearer credential for the storage collaborator.
    pub token: AccessToken,
}

impl PipelineRequest {
    /// Creates a request with empty folds and no exclusions.
    #[must_use]
    pub fn new(
        dataset_ref: impl Into<String>,
        repository_id: impl Into<String>,
        token: AccessToken,
    ) -> Self {
        Self {
            dataset_ref: dataset_ref.into(),
            repository_id: repository_id.into(),
            nr_folds: 0,
            folds: Vec::new(),
            index_column: String::new(),
            target_column: String::new(),
            exclude_columns: BTreeSet::new(),
            token,
        }
    }

    /// Sets the fold partition and fold count.
    #[must_use]
    pub fn with_folds(mut self, folds: Vec<FoldSpec>) -> Self {
        self.nr_folds = folds.len();
        self.folds = folds;
        self
    }

    /// Sets the index and target column names.
    #[must_use]
    pub fn with_columns(
        mut self,
        index_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        self.index_column = index_column.into();
        self.target_column = target_column.into();
        self
    }

    /// Adds a column to the exclusion set.
    #[must_use]
    pub fn with_excluded_column(mut self, column: impl Into<String>) -> Self {
        self.exclude_columns.insert(column.into());
        self
    }

    /// Validates the request before dispatch.
    ///
    /// Rejected requests are never retried; the caller must correct and
    /// re-submit.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.dataset_ref.is_empty() {
            return Err(ValidationError::new("dataset reference is empty").with_field("dataset_ref"));
        }
        if self.repository_id.is_empty() {
            return Err(
                ValidationError::new("repository identifier is empty").with_field("repository_id")
            );
        }
        if self.nr_folds < 2 {
            return Err(ValidationError::new(format!(
                "fold count must be at least 2, got {}",
                self.nr_folds
            ))
            .with_field("nr_folds"));
        }
        if self.folds.len() != self.nr_folds {
            return Err(ValidationError::new(format!(
                "fold partition has {} entries but nr_folds is {}",
                self.folds.len(),
                self.nr_folds
            ))
            .with_field("folds"));
        }
        if self.index_column.is_empty() {
            return Err(ValidationError::new("index column is empty").with_field("index_column"));
        }
        if self.target_column.is_empty() {
            return Err(ValidationError::new("target column is empty").with_field("target_column"));
        }
        if self.index_column == self.target_column {
            return Err(ValidationError::new(format!(
                "index column '{}' and target column equal",
                self.index_column
            ))
            .with_field("target_column"));
        }
        for column in [&self.index_column, &self.target_column] {
            if self.exclude_columns.contains(column) {
                return Err(ValidationError::new(format!(
                    "column '{column}' cannot be both selected and excluded"
                ))
                .with_field("exclude_columns"));
            }
        }
        for (fold_index, fold) in self.folds.iter().enumerate() {
            if fold.test.is_empty() {
                return Err(ValidationError::new(format!(
                    "fold {fold_index} has an empty test partition"
                ))
                .with_field("folds"));
            }
        }
        Ok(())
    }
}
