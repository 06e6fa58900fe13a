//! Training abstractions.
//!
//! The numeric training algorithm is a black box behind [`ModelTrainer`]:
//! the orchestrator only knows how to fit a model with a fixed
//! hyper-parameter assignment, score predictions, and serialize the
//! result. Hyper-parameter selection is an exhaustive sweep over a
//! caller-supplied discrete grid; the orchestrator assumes no default
//! search space of its own.

mod centroid;
mod fold;
mod retrain;

pub use centroid::{CentroidModel, NearestCentroidTrainer};
pub use fold::{FoldJob, FoldResult, FoldRunner, FoldTrainer};
pub use retrain::{FinalRetrainer, Retrainer};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::errors::TrainingError;

/// A concrete hyper-parameter assignment, ordered by parameter name.
pub type ParamAssignment = BTreeMap<String, f64>;

/// A discrete hyper-parameter search space.
///
/// Axes keep their insertion order and combinations are enumerated
/// row-major (last axis varies fastest), so a sweep over the same grid is
/// deterministic across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    axes: Vec<(String, Vec<f64>)>,
}

impl ParamGrid {
    /// Creates an empty grid.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an axis with its candidate values.
    #[must_use]
    pub fn axis(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.axes.push((name.into(), values));
        self
    }

    /// Returns true if the grid enumerates no combinations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.axes.is_empty() || self.axes.iter().any(|(_, values)| values.is_empty())
    }

    /// Returns the number of combinations the grid enumerates.
    #[must_use]
    pub fn len(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes.iter().map(|(_, values)| values.len()).product()
    }

    /// Enumerates every combination in deterministic order.
    #[must_use]
    pub fn combinations(&self) -> Vec<ParamAssignment> {
        if self.is_empty() {
            return Vec::new();
        }

        let mut combos: Vec<ParamAssignment> = vec![ParamAssignment::new()];
        for (name, values) in &self.axes {
            let mut next = Vec::with_capacity(combos.len() * values.len());
            for combo in &combos {
                for &value in values {
                    let mut extended = combo.clone();
                    extended.insert(name.clone(), value);
                    next.push(extended);
                }
            }
            combos = next;
        }
        combos
    }
}

/// A fitted model produced by a [`ModelTrainer`].
pub trait FittedModel: std::fmt::Debug + Send + Sync {
    /// Predicts a label for each feature row.
    fn predict(&self, features: &[Vec<f64>]) -> Vec<f64>;

    /// Serializes the model to an opaque byte payload.
    fn to_bytes(&self) -> Result<Vec<u8>, TrainingError>;
}

/// The black-box training procedure.
pub trait ModelTrainer: Send + Sync {
    /// Fits a model on the given rows with a fixed hyper-parameter
    /// assignment.
    fn fit(
        &self,
        features: &[Vec<f64>],
        targets: &[f64],
        params: &ParamAssignment,
    ) -> Result<Box<dyn FittedModel>, TrainingError>;
}

/// Fraction of exactly-matched labels.
#[must_use]
pub fn accuracy(predicted: &[f64], actual: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let hits = predicted
        .iter()
        .zip(actual)
        .filter(|(p, a)| p == a)
        .count();
    hits as f64 / actual.len() as f64
}

/// The winning combination of a grid sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSearchOutcome {
    /// The best-scoring hyper-parameter assignment.
    pub params: ParamAssignment,
    /// Held-out accuracy of that assignment.
    pub accuracy: f64,
}

/// Exhaustively evaluates every grid combination.
///
/// Each combination is fitted on the train rows and scored on the test
/// rows; the strictly best accuracy wins and ties go to the earlier
/// combination in grid order.
pub fn grid_search(
    trainer: &dyn ModelTrainer,
    grid: &ParamGrid,
    train_features: &[Vec<f64>],
    train_targets: &[f64],
    test_features: &[Vec<f64>],
    test_targets: &[f64],
) -> Result<GridSearchOutcome, TrainingError> {
    if grid.is_empty() {
        return Err(TrainingError::EmptyGrid);
    }

    let mut best: Option<GridSearchOutcome> = None;
    for params in grid.combinations() {
        let model = trainer.fit(train_features, train_targets, &params)?;
        let predicted = model.predict(test_features);
        let score = accuracy(&predicted, test_targets);
        debug!(?params, accuracy = score, "grid combination evaluated");

        let better = best.as_ref().map_or(true, |b| score > b.accuracy);
        if better {
            best = Some(GridSearchOutcome {
                params,
                accuracy: score,
            });
        }
    }

    best.ok_or(TrainingError::EmptyGrid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Trainer whose held-out accuracy is a pure function of the params.
    struct ScoreByParams<F: Fn(&ParamAssignment) -> f64 + Send + Sync>(F);

    #[derive(Debug)]
    struct ConstModel {
        score: f64,
    }

    impl FittedModel for ConstModel {
        fn predict(&self, features: &[Vec<f64>]) -> Vec<f64> {
            // Predict the right label for the first `score` fraction of
            // rows and a sentinel for the rest.
            let hits = (self.score * features.len() as f64).round() as usize;
            (0..features.len())
                .map(|i| if i < hits { 1.0 } else { -1.0 })
                .collect()
        }

        fn to_bytes(&self) -> Result<Vec<u8>, TrainingError> {
            Ok(self.score.to_be_bytes().to_vec())
        }
    }

    impl<F: Fn(&ParamAssignment) -> f64 + Send + Sync> ModelTrainer for ScoreByParams<F> {
        fn fit(
            &self,
            _features: &[Vec<f64>],
            _targets: &[f64],
            params: &ParamAssignment,
        ) -> Result<Box<dyn FittedModel>, TrainingError> {
            Ok(Box::new(ConstModel {
                score: (self.0)(params),
            }))
        }
    }

    fn all_ones(n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
        ((0..n).map(|i| vec![i as f64]).collect(), vec![1.0; n])
    }

    #[test]
    fn test_grid_enumeration_order() {
        let grid = ParamGrid::new()
            .axis("c", vec![0.1, 1.0])
            .axis("gamma", vec![2.0, 4.0]);

        let combos = grid.combinations();
        assert_eq!(grid.len(), 4);
        assert_eq!(combos.len(), 4);
        // Last axis varies fastest.
        assert_eq!(combos[0]["c"], 0.1);
        assert_eq!(combos[0]["gamma"], 2.0);
        assert_eq!(combos[1]["c"], 0.1);
        assert_eq!(combos[1]["gamma"], 4.0);
        assert_eq!(combos[2]["c"], 1.0);
        assert_eq!(combos[3]["gamma"], 4.0);
    }

    #[test]
    fn test_empty_axis_makes_grid_empty() {
        let grid = ParamGrid::new().axis("c", vec![]);
        assert!(grid.is_empty());
        assert!(grid.combinations().is_empty());
    }

    #[test]
    fn test_accuracy_exact_match_fraction() {
        assert_eq!(accuracy(&[1.0, 0.0, 1.0, 1.0], &[1.0, 0.0, 0.0, 1.0]), 0.75);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn test_grid_search_selects_best_combination() {
        let trainer = ScoreByParams(|params: &ParamAssignment| match params["c"] {
            c if (c - 1.0).abs() < f64::EPSILON => 0.9,
            c if (c - 10.0).abs() < f64::EPSILON => 0.6,
            _ => 0.3,
        });
        let grid = ParamGrid::new().axis("c", vec![0.1, 1.0, 10.0]);
        let (x, y) = all_ones(10);

        let outcome = grid_search(&trainer, &grid, &x, &y, &x, &y).unwrap();

        assert_eq!(outcome.params["c"], 1.0);
        assert!((outcome.accuracy - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_grid_search_tie_goes_to_earlier_combination() {
        let trainer = ScoreByParams(|_: &ParamAssignment| 0.5);
        let grid = ParamGrid::new().axis("c", vec![0.1, 1.0, 10.0]);
        let (x, y) = all_ones(10);

        let outcome = grid_search(&trainer, &grid, &x, &y, &x, &y).unwrap();

        assert_eq!(outcome.params["c"], 0.1);
    }

    #[test]
    fn test_grid_search_rejects_empty_grid() {
        let trainer = ScoreByParams(|_: &ParamAssignment| 0.5);
        let (x, y) = all_ones(4);

        let err = grid_search(&trainer, &ParamGrid::new(), &x, &y, &x, &y).unwrap_err();
        assert!(matches!(err, TrainingError::EmptyGrid));
    }
}
