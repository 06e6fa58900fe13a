//! Test support: fixtures and in-memory collaborator doubles.
//!
//! Shipped as a normal module so downstream crates can drive the
//! orchestrator against deterministic collaborators in their own tests.

mod mocks;

pub use mocks::{
    CountingWorkspaceManager, FoldScript, InMemoryStorageClient, StorageFailure, StubFoldRunner,
    StubRetrainer,
};

use crate::request::{AccessToken, FoldSpec, PipelineRequest};
use crate::trainer::ParamGrid;

/// A small linearly separable dataset: two well-separated clusters,
/// labels 0 and 1, one ignorable metadata column.
#[must_use]
pub fn linearly_separable_csv() -> String {
    "\
id,x,y,label
r0,0.0,0.1,0
r1,0.2,0.0,0
r2,0.1,0.2,0
r3,0.0,0.3,0
r4,5.0,5.1,1
r5,5.2,5.0,1
r6,5.1,5.2,1
r7,5.0,5.3,1
"
    .to_string()
}

/// A two-fold request over [`linearly_separable_csv`], both folds
/// containing both classes on each side of the split.
#[must_use]
pub fn two_fold_request() -> PipelineRequest {
    PipelineRequest::new("ds-1", "repo-1", AccessToken::new("test-token"))
        .with_folds(vec![
            FoldSpec::new(vec![0, 1, 4, 5], vec![2, 3, 6, 7]),
            FoldSpec::new(vec![2, 3, 6, 7], vec![0, 1, 4, 5]),
        ])
        .with_columns("id", "label")
}

/// A request with `nr_folds` synthetic folds; the indices only matter to
/// stubbed fold runners.
#[must_use]
pub fn stub_request(nr_folds: usize) -> PipelineRequest {
    let folds = (0..nr_folds)
        .map(|i| FoldSpec::new(vec![2 * i], vec![2 * i + 1]))
        .collect();
    PipelineRequest::new("ds-1", "repo-1", AccessToken::new("test-token"))
        .with_folds(folds)
        .with_columns("id", "label")
}

/// A one-axis shrinkage grid for the built-in centroid trainer.
#[must_use]
pub fn shrinkage_grid() -> ParamGrid {
    ParamGrid::new().axis("shrinkage", vec![0.0, 0.25])
}
