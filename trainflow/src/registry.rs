//! Shared pipeline run registry.
//!
//! An explicit dependency handed to the orchestrator instead of a
//! process-global cache: callers construct one, share it, and query run
//! state through it while pipelines execute.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::pipeline::{PipelineOutcome, PipelineState};
use crate::request::PipelineId;

/// Bookkeeping record of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// The run identifier.
    pub pipeline_id: PipelineId,
    /// Current state machine state.
    pub state: PipelineState,
    /// Terminal outcome, present once the run finished.
    pub outcome: Option<PipelineOutcome>,
    /// When the run was registered.
    pub submitted_at: DateTime<Utc>,
}

/// Concurrent registry of pipeline runs.
#[derive(Debug, Default)]
pub struct PipelineRegistry {
    runs: DashMap<PipelineId, PipelineRun>,
}

impl PipelineRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly created run.
    pub fn register(&self, pipeline_id: PipelineId) {
        self.runs.insert(
            pipeline_id,
            PipelineRun {
                pipeline_id,
                state: PipelineState::Created,
                outcome: None,
                submitted_at: Utc::now(),
            },
        );
    }

    /// Records a state transition for the run.
    pub fn transition(&self, pipeline_id: PipelineId, state: PipelineState) {
        if let Some(mut run) = self.runs.get_mut(&pipeline_id) {
            run.state = state;
        }
    }

    /// Records the terminal outcome for the run.
    pub fn complete(&self, outcome: PipelineOutcome) {
        if let Some(mut run) = self.runs.get_mut(&outcome.pipeline_id) {
            run.state = if outcome.result.is_completed() {
                PipelineState::Completed
            } else {
                PipelineState::Failed
            };
            run.outcome = Some(outcome);
        }
    }

    /// Looks up a run by id.
    #[must_use]
    pub fn get(&self, pipeline_id: PipelineId) -> Option<PipelineRun> {
        self.runs.get(&pipeline_id).map(|run| run.clone())
    }

    /// Returns the number of registered runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Returns true if no runs are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Returns the ids of every registered run.
    #[must_use]
    pub fn ids(&self) -> Vec<PipelineId> {
        self.runs.iter().map(|entry| *entry.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::pipeline::PipelineResult;

    #[test]
    fn test_register_and_lookup() {
        let registry = PipelineRegistry::new();
        let id = PipelineId::new();

        registry.register(id);

        let run = registry.get(id).unwrap();
        assert_eq!(run.pipeline_id, id);
        assert_eq!(run.state, PipelineState::Created);
        assert!(run.outcome.is_none());
    }

    #[test]
    fn test_transition_updates_state() {
        let registry = PipelineRegistry::new();
        let id = PipelineId::new();
        registry.register(id);

        registry.transition(id, PipelineState::FoldsCollecting);

        assert_eq!(registry.get(id).unwrap().state, PipelineState::FoldsCollecting);
    }

    #[test]
    fn test_complete_stores_failed_outcome() {
        let registry = PipelineRegistry::new();
        let id = PipelineId::new();
        registry.register(id);

        let outcome = PipelineOutcome {
            pipeline_id: id,
            result: PipelineResult::Failed {
                kind: ErrorKind::NoSuccessfulFolds,
                message: "no successful folds to aggregate".to_string(),
            },
            fold_failures: Vec::new(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        registry.complete(outcome);

        let run = registry.get(id).unwrap();
        assert_eq!(run.state, PipelineState::Failed);
        assert!(run.outcome.is_some());
    }

    #[test]
    fn test_unknown_id() {
        let registry = PipelineRegistry::new();
        assert!(registry.get(PipelineId::new()).is_none());
        assert!(registry.is_empty());
    }
}
