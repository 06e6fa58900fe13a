//! Final retraining on the complete dataset.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::ModelTrainer;
use crate::aggregate::SelectedConfiguration;
use crate::errors::JobError;
use crate::features::FeatureTable;
use crate::request::{PipelineId, PipelineRequest};
use crate::storage::{Artifact, DatasetFetcher, StorageClient};
use crate::workspace::{WorkspaceGuard, WorkspaceManager};

/// The single post-aggregation retrain step.
#[async_trait]
pub trait Retrainer: Send + Sync {
    /// Trains on the full dataset with the selected hyper-parameters and
    /// serializes the fitted model.
    async fn retrain(
        &self,
        pipeline_id: PipelineId,
        request: &PipelineRequest,
        selected: &SelectedConfiguration,
    ) -> Result<Artifact, JobError>;
}

/// Production retrainer: same workspace/fetch lifecycle as a fold, but no
/// train/test split and no hyper-parameter sweep.
#[derive(Clone)]
pub struct FinalRetrainer {
    workspaces: Arc<dyn WorkspaceManager>,
    fetcher: DatasetFetcher,
    trainer: Arc<dyn ModelTrainer>,
    dataset_file_name: String,
    artifact_content_type: String,
}

impl FinalRetrainer {
    /// Creates a retrainer over the given collaborators.
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
            artifact_content_type: "application/octet-stream".to_string(),
        }
    }

    /// Sets the file name the dataset is materialized under.
    #[must_use]
    pub fn with_dataset_file_name(mut self, name: impl Into<String>) -> Self {
        self.dataset_file_name = name.into();
        self
    }

    /// Sets the content type of the produced artifact.
    #[must_use]
    pub fn with_artifact_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.artifact_content_type = content_type.into();
        self
    }
}

#[async_trait]
impl Retrainer for FinalRetrainer {
    async fn retrain(
        &self,
        pipeline_id: PipelineId,
        request: &PipelineRequest,
        selected: &SelectedConfiguration,
    ) -> Result<Artifact, JobError> {
        let guard = WorkspaceGuard::acquire(self.workspaces.clone())?;

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

        let model = self
            .trainer
            .fit(table.features(), table.targets(), &selected.params)?;
        let payload = model.to_bytes().map_err(JobError::Training)?;

        info!(
            %pipeline_id,
            rows = table.len(),
            bytes = payload.len(),
            "final model retrained on full dataset"
        );

        let file_name = format!("model-{pipeline_id}.bin");
        Ok(Artifact::new(payload, file_name).with_content_type(self.artifact_content_type.clone()))
    }
}

impl std::fmt::Debug for FinalRetrainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinalRetrainer")
            .field("dataset_file_name", &self.dataset_file_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{AccessToken, FoldSpec};
    use crate::testing::{linearly_separable_csv, InMemoryStorageClient};
    use crate::trainer::{CentroidModel, NearestCentroidTrainer, ParamAssignment};
    use crate::workspace::TempWorkspaceManager;

    fn request() -> PipelineRequest {
        PipelineRequest::new("ds-1", "repo-1", AccessToken::new("t"))
            .with_folds(vec![
                FoldSpec::new(vec![0, 1], vec![2, 3]),
                FoldSpec::new(vec![2, 3], vec![0, 1]),
            ])
            .with_columns("id", "label")
    }

    fn selected() -> SelectedConfiguration {
        SelectedConfiguration {
            params: ParamAssignment::from([("shrinkage".to_string(), 0.0)]),
            mean_accuracy: 0.9,
            best_accuracy: 0.95,
            best_fold: 0,
        }
    }

    #[tokio::test]
    async fn test_retrain_serializes_model_over_full_dataset() {
        let storage = Arc::new(InMemoryStorageClient::new());
        storage.put_file("ds-1", linearly_separable_csv().into_bytes());

        let retrainer = FinalRetrainer::new(
            Arc::new(TempWorkspaceManager::new()),
            storage,
            Arc::new(NearestCentroidTrainer::new()),
        );

        let pipeline_id = PipelineId::new();
        let artifact = retrainer
            .retrain(pipeline_id, &request(), &selected())
            .await
            .unwrap();

        assert!(artifact.file_name.contains(&pipeline_id.to_string()));
        let model = CentroidModel::from_bytes(&artifact.payload).unwrap();
        assert_eq!(model.classes().len(), 2);
    }

    #[tokio::test]
    async fn test_retrain_fails_on_unavailable_dataset() {
        let storage = Arc::new(InMemoryStorageClient::new());

        let retrainer = FinalRetrainer::new(
            Arc::new(TempWorkspaceManager::new()),
            storage,
            Arc::new(NearestCentroidTrainer::new()),
        );

        let err = retrainer
            .retrain(PipelineId::new(), &request(), &selected())
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::Fetch(_)));
    }
}
