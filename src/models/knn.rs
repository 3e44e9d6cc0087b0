//! k-nearest-neighbours classifier over stored standardized training points

use crate::error::{PipelineError, Result};
use crate::models::classifier::Classifier;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnnWeights {
    /// Every neighbour counts equally
    #[default]
    Uniform,
    /// Neighbours weighted by inverse Euclidean distance
    Distance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnClassifier {
    pub n_neighbors: usize,
    #[serde(default)]
    pub weights: KnnWeights,
    /// Training points, already clipped and standardized
    pub points: Vec<Vec<f64>>,
    /// Class of each training point (0 or 1)
    pub labels: Vec<u8>,
}

impl KnnClassifier {
    pub fn validate(&self) -> Result<()> {
        let dim = self
            .points
            .first()
            .map(Vec::len)
            .ok_or_else(|| PipelineError::load("knn has no training points"))?;
        if dim == 0 {
            return Err(PipelineError::load("knn training points are empty"));
        }
        if self.n_neighbors == 0 || self.n_neighbors > self.points.len() {
            return Err(PipelineError::load(format!(
                "knn n_neighbors must be in 1..={}, got {}",
                self.points.len(),
                self.n_neighbors
            )));
        }
        if self.labels.len() != self.points.len() {
            return Err(PipelineError::load(format!(
                "knn has {} labels for {} points",
                self.labels.len(),
                self.points.len()
            )));
        }
        if self.labels.iter().any(|&l| l > 1) {
            return Err(PipelineError::load("knn labels must be 0 or 1"));
        }
        for (i, point) in self.points.iter().enumerate() {
            if point.len() != dim {
                return Err(PipelineError::load(format!(
                    "knn point {} has {} features, expected {}",
                    i,
                    point.len(),
                    dim
                )));
            }
            if point.iter().any(|v| !v.is_finite()) {
                return Err(PipelineError::load(format!(
                    "knn point {} contains non-finite values",
                    i
                )));
            }
        }
        Ok(())
    }

    /// Indices and distances of the k nearest points.
    ///
    /// Equal distances resolve by training index, so the neighbour set is
    /// fully determined by the input.
    pub fn neighbors(&self, features: &[f64]) -> Vec<(f64, usize)> {
        let mut distances: Vec<(f64, usize)> = self
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| (squared_distance(p, features), i))
            .collect();

        let k = self.n_neighbors.min(distances.len());
        if k == 0 {
            return Vec::new();
        }

        let by_distance =
            |a: &(f64, usize), b: &(f64, usize)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));
        if k < distances.len() {
            distances.select_nth_unstable_by(k - 1, by_distance);
            distances.truncate(k);
        }
        distances.sort_unstable_by(by_distance);

        distances
            .into_iter()
            .map(|(sq, i)| (sq.sqrt(), i))
            .collect()
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

impl Classifier for KnnClassifier {
    fn family(&self) -> &'static str {
        "knn"
    }

    fn input_dim(&self) -> usize {
        self.points.first().map(Vec::len).unwrap_or(0)
    }

    fn probability(&self, features: &[f64]) -> f64 {
        let neighbors = self.neighbors(features);
        if neighbors.is_empty() {
            return f64::NAN;
        }

        let positive = |i: usize| f64::from(self.labels[i]);

        match self.weights {
            KnnWeights::Uniform => {
                neighbors.iter().map(|&(_, i)| positive(i)).sum::<f64>() / neighbors.len() as f64
            }
            KnnWeights::Distance => {
                // Exact matches take all the weight
                let exact: Vec<usize> = neighbors
                    .iter()
                    .filter(|(d, _)| *d == 0.0)
                    .map(|&(_, i)| i)
                    .collect();
                if !exact.is_empty() {
                    return exact.iter().map(|&i| positive(i)).sum::<f64>() / exact.len() as f64;
                }

                let (weighted, total) = neighbors
                    .iter()
                    .fold((0.0, 0.0), |(num, den), &(d, i)| {
                        let w = 1.0 / d;
                        (num + w * positive(i), den + w)
                    });
                weighted / total
            }
        }
    }
}
