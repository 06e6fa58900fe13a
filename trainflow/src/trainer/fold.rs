//! Per-fold training job execution.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use super::{grid_search, ModelTrainer, ParamAssignment, ParamGrid};
use crate::errors::{JobError, TrainingError};
use crate::features::FeatureTable;
use crate::request::{FoldSpec, PipelineId, PipelineRequest};
use crate::storage::{DatasetFetcher, StorageClient};
use crate::workspace::{WorkspaceGuard, WorkspaceManager};

/// One fold's unit of work.
///
/// Owns the shared request by `Arc` plus its fold-specific partition;
/// created at dispatch and consumed when its result is collected.
#[derive(Debug, Clone)]
pub struct FoldJob {
    /// The pipeline this fold belongs to.
    pub pipeline_id: PipelineId,
    /// Position in the submission order; identity for aggregation.
    pub fold_index: usize,
    /// The originating request, read-only after creation.
    pub request: Arc<PipelineRequest>,
    /// This fold's train/test row indices.
    pub fold: FoldSpec,
    /// The hyper-parameter search space.
    pub grid: Arc<ParamGrid>,
}

/// Result of one successful fold execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldResult {
    /// The fold this result belongs to.
    pub fold_index: usize,
    /// Held-out accuracy in `[0, 1]`.
    pub accuracy: f64,
    /// The winning hyper-parameter assignment.
    pub params: ParamAssignment,
    /// Wall-clock time spent in the training sweep.
    pub elapsed: Duration,
}

/// The unit of work the orchestrator dispatches per fold.
#[async_trait]
pub trait FoldRunner: Send + Sync {
    /// Executes one fold job to completion.
    async fn run(&self, job: &FoldJob) -> Result<FoldResult, JobError>;
}

/// Production fold runner: workspace, fetch, partition, grid sweep.
#[derive(Clone)]
pub struct FoldTrainer {
    workspaces: Arc<dyn WorkspaceManager>,
    fetcher: DatasetFetcher,
    trainer: Arc<dyn ModelTrainer>,
    dataset_file_name: String,
}

impl FoldTrainer {
    /// Creates a fold trainer over the given collaborators.
    #[must_use]
    pub fn new(
        workspaces: Arc<dyn WorkspaceManager>,
        storage: Arc<dyn StorageClient>,
        trainer: Arc<dyn ModelTrainer>,
    ) -> Self {
        Self {
            workspaces,
            fetcher: DatasetFetcher::new(storage),
            trainer,
            dataset_file_name: "features.csv".to_string(),
        }
    }

    /// Sets the file name the dataset is materialized under.
    #[must_use]
    pub fn with_dataset_file_name(mut self, name: impl Into<String>) -> Self {
        self.dataset_file_name = name.into();
        self
    }
}

#[async_trait]
impl FoldRunner for FoldTrainer {
    async fn run(&self, job: &FoldJob) -> Result<FoldResult, JobError> {
        if job.fold.test.is_empty() {
            return Err(TrainingError::InvalidPartition(format!(
                "fold {} has no test rows",
                job.fold_index
            ))
            .into());
        }
        if job.fold.train.is_empty() {
            return Err(TrainingError::InvalidPartition(format!(
                "fold {} has no train rows",
                job.fold_index
            ))
            .into());
        }

        // The guard releases the workspace on every exit path below,
        // including error returns and cancellation of this future.
        let guard = WorkspaceGuard::acquire(self.workspaces.clone())?;

        let request = &job.request;
        let dataset_path = self
            .fetcher
            .fetch(
                &request.dataset_ref,
                &request.token,
                guard.path(),
                &self.dataset_file_name,
            )
            .await?;

        let table = FeatureTable::from_csv_path(
            &dataset_path,
            &request.index_column,
            &request.target_column,
            &request.exclude_columns,
        )?;

        let (train_features, train_targets) = table.select(&job.fold.train)?;
        let (test_features, test_targets) = table.select(&job.fold.test)?;

        let started = Instant::now();
        let outcome = grid_search(
            self.trainer.as_ref(),
            &job.grid,
            &train_features,
            &train_targets,
            &test_features,
            &test_targets,
        )?;
        let elapsed = started.elapsed();

        info!(
            pipeline_id = %job.pipeline_id,
            fold = job.fold_index,
            accuracy = outcome.accuracy,
            elapsed_ms = elapsed.as_millis() as u64,
            "fold training finished"
        );

        Ok(FoldResult {
            fold_index: job.fold_index,
            accuracy: outcome.accuracy,
            params: outcome.params,
            elapsed,
        })
    }
}

impl std::fmt::Debug for FoldTrainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FoldTrainer")
            .field("dataset_file_name", &self.dataset_file_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::AccessToken;
    use crate::testing::{linearly_separable_csv, InMemoryStorageClient};
    use crate::trainer::NearestCentroidTrainer;
    use crate::workspace::TempWorkspaceManager;

    fn fold_trainer(storage: Arc<InMemoryStorageClient>) -> FoldTrainer {
        FoldTrainer::new(
            Arc::new(TempWorkspaceManager::new()),
            storage,
            Arc::new(NearestCentroidTrainer::new()),
        )
    }

    fn job(fold: FoldSpec) -> FoldJob {
        let request = PipelineRequest::new("ds-1", "repo-1", AccessToken::new("t"))
            .with_folds(vec![fold.clone(), FoldSpec::new(vec![0], vec![1])])
            .with_columns("id", "label");
        FoldJob {
            pipeline_id: PipelineId::new(),
            fold_index: 0,
            request: Arc::new(request),
            fold,
            grid: Arc::new(ParamGrid::new().axis("shrinkage", vec![0.0, 0.2])),
        }
    }

    #[tokio::test]
    async fn test_run_produces_fold_result() {
        let storage = Arc::new(InMemoryStorageClient::new());
        storage.put_file("ds-1", linearly_separable_csv().into_bytes());

        let trainer = fold_trainer(storage);
        let result = trainer
            .run(&job(FoldSpec::new(vec![0, 1, 2, 4, 5, 6], vec![3, 7])))
            .await
            .unwrap();

        assert_eq!(result.fold_index, 0);
        assert!((result.accuracy - 1.0).abs() < 1e-9);
        assert!(result.params.contains_key("shrinkage"));
    }

    #[tokio::test]
    async fn test_run_rejects_empty_test_partition() {
        let storage = Arc::new(InMemoryStorageClient::new());
        storage.put_file("ds-1", linearly_separable_csv().into_bytes());

        let trainer = fold_trainer(storage);
        let err = trainer
            .run(&job(FoldSpec::new(vec![0, 1], vec![])))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            JobError::Training(TrainingError::InvalidPartition(_))
        ));
    }

    #[tokio::test]
    async fn test_run_fails_on_missing_dataset() {
        let storage = Arc::new(InMemoryStorageClient::new());

        let trainer = fold_trainer(storage);
        let err = trainer
            .run(&job(FoldSpec::new(vec![0, 1], vec![2, 3])))
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::Fetch(_)));
    }
}
