//! # Trainflow
//!
//! A distributed cross-validation training-pipeline orchestrator.
//!
//! A client submits a dataset reference plus pipeline parameters; the
//! orchestrator fans out independent cross-validation fold jobs,
//! aggregates their results to select the optimal hyper-parameters,
//! retrains a final model on the full dataset, and publishes the
//! resulting artifact to a repository store. Trainflow provides:
//!
//! - **Fan-out/fan-in scheduling**: fold jobs run concurrently and the
//!   orchestrator suspends at a full join over all of them
//! - **Partial-failure tolerance**: individual fold failures are
//!   recorded, not fatal, as long as one fold succeeds
//! - **Scoped workspaces**: every job gets an isolated directory that is
//!   released on every exit path, including cancellation
//! - **Explicit collaborator seams**: storage, trainer, executor, and
//!   registry are constructor dependencies, never ambient globals
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trainflow::prelude::*;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(PipelineRegistry::new());
//! let orchestrator = PipelineOrchestrator::with_defaults(
//!     Arc::new(HttpStorageClient::new(StorageConfig::new("http://storage.local"))?),
//!     Arc::new(TempWorkspaceManager::new()),
//!     Arc::new(NearestCentroidTrainer::new()),
//!     registry,
//!     OrchestratorConfig::default(),
//! );
//!
//! let outcome = orchestrator.run(request, grid).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::cast_precision_loss
)]

pub mod aggregate;
pub mod config;
pub mod errors;
pub mod executor;
pub mod features;
pub mod observability;
pub mod pipeline;
pub mod registry;
pub mod request;
pub mod storage;
pub mod testing;
pub mod trainer;
pub mod workspace;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::aggregate::{aggregate, SelectedConfiguration};
    pub use crate::config::{OrchestratorConfig, StorageConfig};
    pub use crate::errors::{
        AggregationError, ErrorKind, FetchError, JobError, PipelineError, PublishError,
        TrainflowError, TrainingError, ValidationError, WorkspaceError,
    };
    pub use crate::executor::{
        await_all, CancellationToken, JobExecutor, JobHandle, TokioJobExecutor,
    };
    pub use crate::features::FeatureTable;
    pub use crate::pipeline::{
        FoldFailure, PipelineOrchestrator, PipelineOutcome, PipelineResult, PipelineState,
    };
    pub use crate::registry::{PipelineRegistry, PipelineRun};
    pub use crate::request::{AccessToken, FoldSpec, PipelineId, PipelineRequest};
    pub use crate::storage::{
        Artifact, ArtifactId, ArtifactPublisher, DatasetFetcher, HttpStorageClient, StorageClient,
    };
    pub use crate::trainer::{
        grid_search, FittedModel, FoldJob, FoldResult, FoldRunner, FoldTrainer, FinalRetrainer,
        GridSearchOutcome, ModelTrainer, NearestCentroidTrainer, ParamAssignment, ParamGrid,
        Retrainer,
    };
    pub use crate::workspace::{TempWorkspaceManager, WorkspaceGuard, WorkspaceManager};
}
