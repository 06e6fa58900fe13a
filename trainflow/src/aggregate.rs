//! Fold result aggregation.
//!
//! Combines N fold results into a single selection decision. Selection
//! policy: the hyper-parameters of the single best-scoring fold win
//! (not a vote or an average across folds), matching the behavior the
//! training pipeline has always had.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AggregationError;
use crate::trainer::{FoldResult, ParamAssignment};

/// The configuration selected from a set of fold results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedConfiguration {
    /// Hyper-parameters of the best-scoring fold.
    pub params: ParamAssignment,
    /// Arithmetic mean accuracy over all successful folds.
    pub mean_accuracy: f64,
    /// The best fold's accuracy.
    pub best_accuracy: f64,
    /// Submission-order index of the winning fold.
    pub best_fold: usize,
}

/// Selects the best configuration from the successful fold results.
///
/// Ties on the maximum accuracy are broken by submission order: the
/// earliest result in `results` wins. Callers must pass results in
/// submission order (by fold index), not completion order, for the
/// tie-break to be deterministic.
pub fn aggregate(results: &[FoldResult]) -> Result<SelectedConfiguration, AggregationError> {
    let first = results.first().ok_or(AggregationError::NoSuccessfulFolds)?;

    let mean_accuracy =
        results.iter().map(|r| r.accuracy).sum::<f64>() / results.len() as f64;

    let mut best = first;
    for result in &results[1..] {
        if result.accuracy > best.accuracy {
            best = result;
        }
    }

    info!(
        folds = results.len(),
        mean_accuracy,
        best_accuracy = best.accuracy,
        best_fold = best.fold_index,
        "fold results aggregated"
    );

    Ok(SelectedConfiguration {
        params: best.params.clone(),
        mean_accuracy,
        best_accuracy: best.accuracy,
        best_fold: best.fold_index,
    })
}
