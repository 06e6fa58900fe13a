//! Pipeline orchestration.
//!
//! The top-level state machine: validate the request, fan fold jobs out
//! through the executor, join them all, aggregate the successful subset,
//! retrain on the full dataset, publish the artifact, and report one
//! immutable terminal outcome. Per-fold failures are recorded and
//! tolerated; retrain and publish failures are fatal.


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn, Instrument};

use crate::aggregate::{aggregate, SelectedConfiguration};
use crate::config::OrchestratorConfig;
use crate::errors::{ErrorKind, JobError, PipelineError, ValidationError};
use crate::executor::{await_all, CancellationToken, JobExecutor, JobHandle};
use crate::observability::pipeline_span;
use crate::registry::PipelineRegistry;
use crate::request::{PipelineId, PipelineRequest};
use crate::storage::{ArtifactId, ArtifactPublisher, StorageClient};
use crate::trainer::{FoldJob, FoldResult, FoldRunner, ParamAssignment, ParamGrid, Retrainer};

/// States of the pipeline state machine.
///
/// `Completed` and `Failed` are terminal; a failed pipeline is retried
/// only by re-submitting a new request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    /// Request received, not yet validated.
    Created,
    /// Fold jobs created and handed to the executor.
    FoldsDispatched,
    /// Suspended at the full join over all fold jobs.
    FoldsCollecting,
    /// Combining successful fold results.
    Aggregating,
    /// Retraining on the complete dataset.
    Retraining,
    /// Uploading the model artifact.
    Publishing,
    /// Terminal success.
    Completed,
    /// Terminal failure.
    Failed,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::FoldsDispatched => "folds-dispatched",
            Self::FoldsCollecting => "folds-collecting",
            Self::Aggregating => "aggregating",
            Self::Retraining => "retraining",
            Self::Publishing => "publishing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Failure record of a single fold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldFailure {
    /// Submission-order index of the failed fold.
    pub fold_index: usize,
    /// Error class of the failure.
    pub kind: ErrorKind,
    /// Human-readable failure description.
    pub message: String,
}

/// Terminal result of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineResult {
    /// The pipeline produced and published a model.
    Completed {
        /// Mean accuracy over the successful folds.
        mean_accuracy: f64,
        /// The selected hyper-parameters.
        params: ParamAssignment,
        /// Identifier of the published artifact.
        artifact_id: ArtifactId,
    },
    /// The pipeline terminated without a model.
    Failed {
        /// Error class of the terminating failure.
        kind: ErrorKind,
        /// Human-readable failure description.
        message: String,
    },
}

impl PipelineResult {
    /// Returns true for a completed result.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// The immutable terminal record of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    /// The run identifier.
    pub pipeline_id: PipelineId,
    /// Success or failure payload.
    pub result: PipelineResult,
    /// Failures of individual folds, in submission order.
    pub fold_failures: Vec<FoldFailure>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal state.
    pub finished_at: DateTime<Utc>,
}

/// The top-level training pipeline orchestrator.
///
/// All collaborators are explicit constructor dependencies; the
/// orchestrator holds no ambient global state and can be instantiated
/// against mocks wholesale.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    fold_runner: Arc<dyn FoldRunner>,
    retrainer: Arc<dyn Retrainer>,
    publisher: ArtifactPublisher,
    executor: Arc<dyn JobExecutor>,
    registry: Arc<PipelineRegistry>,
    config: OrchestratorConfig,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator from explicit collaborators.
    #[must_use]
    pub fn new(
        fold_runner: Arc<dyn FoldRunner>,
        retrainer: Arc<dyn Retrainer>,
        publisher: ArtifactPublisher,
        executor: Arc<dyn JobExecutor>,
        registry: Arc<PipelineRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            fold_runner,
            retrainer,
            publisher,
            executor,
            registry,
            config,
        }
    }

    /// Wires the production components over a storage client, a
    /// workspace manager, and a model trainer.
    #[must_use]
    pub fn with_defaults(
        storage: Arc<dyn StorageClient>,
        workspaces: Arc<dyn crate::workspace::WorkspaceManager>,
        trainer: Arc<dyn crate::trainer::ModelTrainer>,
        registry: Arc<PipelineRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        let fold_runner = crate::trainer::FoldTrainer::new(
            workspaces.clone(),
            storage.clone(),
            trainer.clone(),
        )
        .with_dataset_file_name(config.dataset_file_name.clone());

        let retrainer = crate::trainer::FinalRetrainer::new(workspaces, storage.clone(), trainer)
            .with_dataset_file_name(config.dataset_file_name.clone())
            .with_artifact_content_type(config.artifact_content_type.clone());

        let executor: Arc<dyn JobExecutor> = match config.max_concurrent_folds {
            Some(max) => Arc::new(crate::executor::TokioJobExecutor::with_max_concurrent(max)),
            None => Arc::new(crate::executor::TokioJobExecutor::new()),
        };

        Self::new(
            Arc::new(fold_runner),
            Arc::new(retrainer),
            ArtifactPublisher::new(storage),
            executor,
            registry,
            config,
        )
    }

    /// Returns the registry runs are recorded in.
    #[must_use]
    pub fn registry(&self) -> &Arc<PipelineRegistry> {
        &self.registry
    }

    /// Runs a pipeline to its terminal outcome.
    pub async fn run(&self, request: PipelineRequest, grid: ParamGrid) -> PipelineOutcome {
        self.run_with_token(request, grid, Arc::new(CancellationToken::new()))
            .await
    }

    /// Runs a pipeline with an externally controlled cancellation token.
    pub async fn run_with_token(
        &self,
        request: PipelineRequest,
        grid: ParamGrid,
        token: Arc<CancellationToken>,
    ) -> PipelineOutcome {
        let pipeline_id = PipelineId::new();
        self.registry.register(pipeline_id);
        self.execute_registered(pipeline_id, request, grid, token)
            .instrument(pipeline_span(pipeline_id))
            .await
    }

    /// Validates and accepts a request, then runs it in the background.
    ///
    /// Returns the pipeline id immediately; the outcome lands in the
    /// registry when the run terminates.
    pub fn submit(
        &self,
        request: PipelineRequest,
        grid: ParamGrid,
    ) -> Result<PipelineId, ValidationError> {
        request.validate()?;
        validate_grid(&grid)?;

        let pipeline_id = PipelineId::new();
        self.registry.register(pipeline_id);

        let orchestrator = self.clone();
        let token = Arc::new(CancellationToken::new());
        tokio::spawn(async move {
            orchestrator
                .execute_registered(pipeline_id, request, grid, token)
                .instrument(pipeline_span(pipeline_id))
                .await;
        });

        Ok(pipeline_id)
    }

    async fn execute_registered(
        &self,
        pipeline_id: PipelineId,
        request: PipelineRequest,
        grid: ParamGrid,
        token: Arc<CancellationToken>,
    ) -> PipelineOutcome {
        let started_at = Utc::now();
        let mut fold_failures = Vec::new();

        let result = self
            .execute(pipeline_id, request, grid, token, &mut fold_failures)
            .await;

        let result = match result {
            Ok((selected, artifact_id)) => {
                info!(state = %PipelineState::Completed, "pipeline completed");
                PipelineResult::Completed {
                    mean_accuracy: selected.mean_accuracy,
                    params: selected.params,
                    artifact_id,
                }
            }
            Err(error) => {
                warn!(kind = %error.kind(), %error, "pipeline failed");
                PipelineResult::Failed {
                    kind: error.kind(),
                    message: error.to_string(),
                }
            }
        };

        let outcome = PipelineOutcome {
            pipeline_id,
            result,
            fold_failures,
            started_at,
            finished_at: Utc::now(),
        };
        self.registry.complete(outcome.clone());
        outcome
    }

    async fn execute(
        &self,
        pipeline_id: PipelineId,
        request: PipelineRequest,
        grid: ParamGrid,
        token: Arc<CancellationToken>,
        fold_failures: &mut Vec<FoldFailure>,
    ) -> Result<(SelectedConfiguration, ArtifactId), PipelineError> {
        // Created -> FoldsDispatched
        request.validate()?;
        validate_grid(&grid)?;

        let request = Arc::new(request);
        let grid = Arc::new(grid);

        self.transition(pipeline_id, PipelineState::FoldsDispatched);
        let handles = self.dispatch_folds(pipeline_id, &request, &grid, &token);

        // FoldsDispatched -> FoldsCollecting: full join, wait for all N.
        self.transition(pipeline_id, PipelineState::FoldsCollecting);
        let outputs = await_all(handles).await;

        if token.is_cancelled() {
            return Err(PipelineError::Cancelled(
                token.reason().unwrap_or_else(|| "cancelled".to_string()),
            ));
        }

        let mut results: Vec<FoldResult> = Vec::new();
        for (fold_index, output) in outputs {
            match output {
                Ok(result) => results.push(result),
                Err(error) => {
                    warn!(fold = fold_index, kind = %error.kind(), %error, "fold failed");
                    fold_failures.push(FoldFailure {
                        fold_index,
                        kind: error.kind(),
                        message: error.to_string(),
                    });
                }
            }
        }
        // Submission order, independent of completion order.
        results.sort_by_key(|r| r.fold_index);
        fold_failures.sort_by_key(|f| f.fold_index);

        // FoldsCollecting -> Aggregating
        self.transition(pipeline_id, PipelineState::Aggregating);
        let selected = aggregate(&results)?;

        // Aggregating -> Retraining
        self.transition(pipeline_id, PipelineState::Retraining);
        let artifact = self
            .retrainer
            .retrain(pipeline_id, &request, &selected)
            .await
            .map_err(PipelineError::Retraining)?;

        // Retraining -> Publishing. Publish is invoked exactly once; a
        // successful return transfers artifact ownership to the store.
        self.transition(pipeline_id, PipelineState::Publishing);
        let artifact_id = self
            .publisher
            .publish(artifact, &request.repository_id, &request.token)
            .await?;

        Ok((selected, artifact_id))
    }

    fn dispatch_folds(
        &self,
        pipeline_id: PipelineId,
        request: &Arc<PipelineRequest>,
        grid: &Arc<ParamGrid>,
        token: &Arc<CancellationToken>,
    ) -> Vec<JobHandle> {
        let fold_timeout = self.config.fold_timeout;

        request
            .folds
            .iter()
            .cloned()
            .enumerate()
            .map(|(fold_index, fold)| {
                let job = FoldJob {
                    pipeline_id,
                    fold_index,
                    request: request.clone(),
                    fold,
                    grid: grid.clone(),
                };
                let runner = self.fold_runner.clone();
                let token = token.clone();

                self.executor.submit(
                    fold_index,
                    Box::pin(async move {
                        if token.is_cancelled() {
                            let reason =
                                token.reason().unwrap_or_else(|| "cancelled".to_string());
                            return (fold_index, Err(JobError::Cancelled(reason)));
                        }

                        let result = match fold_timeout {
                            Some(timeout) => {
                                match tokio::time::timeout(timeout, runner.run(&job)).await {
                                    Ok(result) => result,
                                    Err(_) => Err(JobError::Aborted(format!(
                                        "fold timed out after {}s",
                                        timeout.as_secs()
                                    ))),
                                }
                            }
                            None => runner.run(&job).await,
                        };
                        (fold_index, result)
                    }),
                )
            })
            .collect()
    }

    fn transition(&self, pipeline_id: PipelineId, state: PipelineState) {
        info!(%state, "pipeline state transition");
        self.registry.transition(pipeline_id, state);
    }
}

fn validate_grid(grid: &ParamGrid) -> Result<(), ValidationError> {
    if grid.is_empty() {
        return Err(
            ValidationError::new("hyper-parameter grid enumerates no combinations")
                .with_field("grid"),
        );
    }
    Ok(())
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("config", &self.config)
            .field("registered_runs", &self.registry.len())
            .finish()
    }
}
