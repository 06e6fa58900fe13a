//! Built-in nearest-centroid reference classifier.
//!
//! Small, deterministic, and dependency-free; production deployments
//! plug their own [`ModelTrainer`] in. The single hyper-parameter
//! `shrinkage` in `[0, 1]` pulls class centroids toward the global mean.

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use super::{FittedModel, ModelTrainer, ParamAssignment};
use crate::errors::TrainingError;

/// Name of the shrinkage hyper-parameter.
pub const SHRINKAGE_PARAM: &str = "shrinkage";

/// Nearest-centroid classifier with optional centroid shrinkage.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestCentroidTrainer;

impl NearestCentroidTrainer {
    /// Creates the trainer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// A fitted nearest-centroid model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentroidModel {
    classes: Vec<f64>,
    centroids: Vec<Vec<f64>>,
}

impl CentroidModel {
    /// Deserializes a model previously produced by [`FittedModel::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TrainingError> {
        serde_json::from_slice(bytes).map_err(TrainingError::failed)
    }

    /// Returns the class labels in fit order.
    #[must_use]
    pub fn classes(&self) -> &[f64] {
        &self.classes
    }
}

impl ModelTrainer for NearestCentroidTrainer {
    fn fit(
        &self,
        features: &[Vec<f64>],
        targets: &[f64],
        params: &ParamAssignment,
    ) -> Result<Box<dyn FittedModel>, TrainingError> {
        if features.is_empty() || features.len() != targets.len() {
            return Err(TrainingError::failed(anyhow!(
                "cannot fit on {} rows with {} targets",
                features.len(),
                targets.len()
            )));
        }

        let shrinkage = params.get(SHRINKAGE_PARAM).copied().unwrap_or(0.0);
        if !(0.0..=1.0).contains(&shrinkage) {
            return Err(TrainingError::failed(anyhow!(
                "shrinkage must lie in [0, 1], got {shrinkage}"
            )));
        }

        let dims = features[0].len();
        let mut global = vec![0.0; dims];
        for row in features {
            for (sum, value) in global.iter_mut().zip(row) {
                *sum += value;
            }
        }
        for value in &mut global {
            *value /= features.len() as f64;
        }

        // Per-class mean, classes kept in first-seen order.
        let mut classes: Vec<f64> = Vec::new();
        let mut sums: Vec<Vec<f64>> = Vec::new();
        let mut counts: Vec<usize> = Vec::new();
        for (row, &label) in features.iter().zip(targets) {
            let slot = match classes.iter().position(|&c| c == label) {
                Some(slot) => slot,
                None => {
                    classes.push(label);
                    sums.push(vec![0.0; dims]);
                    counts.push(0);
                    classes.len() - 1
                }
            };
            counts[slot] += 1;
            for (sum, value) in sums[slot].iter_mut().zip(row) {
                *sum += value;
            }
        }

        let centroids = sums
            .into_iter()
            .zip(&counts)
            .map(|(sum, &count)| {
                sum.into_iter()
                    .zip(&global)
                    .map(|(total, &mean)| {
                        let centroid = total / count as f64;
                        centroid * (1.0 - shrinkage) + mean * shrinkage
                    })
                    .collect()
            })
            .collect();

        Ok(Box::new(CentroidModel { classes, centroids }))
    }
}

impl FittedModel for CentroidModel {
    fn predict(&self, features: &[Vec<f64>]) -> Vec<f64> {
        features
            .iter()
            .map(|row| {
                let mut best = 0;
                let mut best_distance = f64::INFINITY;
                for (slot, centroid) in self.centroids.iter().enumerate() {
                    let distance: f64 = centroid
                        .iter()
                        .zip(row)
                        .map(|(c, v)| (c - v) * (c - v))
                        .sum();
                    if distance < best_distance {
                        best_distance = distance;
                        best = slot;
                    }
                }
                self.classes[best]
            })
            .collect()
    }

    fn to_bytes(&self) -> Result<Vec<u8>, TrainingError> {
        serde_json::to_vec(self).map_err(TrainingError::failed)
    }
}
