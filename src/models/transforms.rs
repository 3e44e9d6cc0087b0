//! Fitted preprocessing transforms: winsorizing clip and standard scaling.
//!
//! Both hold per-column statistics learned by the offline training run and
//! are immutable once constructed. Construction validates the statistics so
//! that the per-request path never has to.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Per-column [lower, upper] clip bounds (training 1st/99th percentiles).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Winsorizer {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Winsorizer {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self> {
        let winsorizer = Self { lower, upper };
        winsorizer.validate()?;
        Ok(winsorizer)
    }

    /// Check the bounds; used after deserializing from an artifact.
    pub fn validate(&self) -> Result<()> {
        if self.lower.len() != self.upper.len() {
            return Err(PipelineError::load(format!(
                "winsorizer has {} lower bounds but {} upper bounds",
                self.lower.len(),
                self.upper.len()
            )));
        }

        for (i, (&lo, &hi)) in self.lower.iter().zip(&self.upper).enumerate() {
            if !lo.is_finite() || !hi.is_finite() {
                return Err(PipelineError::load(format!(
                    "winsorizer bounds for column {} are not finite",
                    i
                )));
            }
            if lo > hi {
                return Err(PipelineError::load(format!(
                    "winsorizer lower bound {} exceeds upper bound {} for column {}",
                    lo, hi, i
                )));
            }
        }

        Ok(())
    }

    /// Clamp every value into its column's bounds, in place.
    ///
    /// Callers must reject non-finite values first.
    pub fn transform(&self, values: &mut [f64]) {
        debug_assert_eq!(values.len(), self.lower.len());
        for ((v, &lo), &hi) in values.iter_mut().zip(&self.lower).zip(&self.upper) {
            *v = v.clamp(lo, hi);
        }
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }
}

/// Per-column mean / standard deviation for standardization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, std: Vec<f64>) -> Result<Self> {
        let scaler = Self { mean, std };
        scaler.validate()?;
        Ok(scaler)
    }

    /// Zero, subnormal or non-finite deviations are a training-time defect
    /// and fail here.
    pub fn validate(&self) -> Result<()> {
        if self.mean.len() != self.std.len() {
            return Err(PipelineError::load(format!(
                "scaler has {} means but {} standard deviations",
                self.mean.len(),
                self.std.len()
            )));
        }

        for (i, (&mean, &std)) in self.mean.iter().zip(&self.std).enumerate() {
            if !mean.is_finite() {
                return Err(PipelineError::load(format!(
                    "scaler mean for column {} is not finite",
                    i
                )));
            }
            if !std.is_finite() || std < f64::MIN_POSITIVE {
                return Err(PipelineError::load(format!(
                    "scaler standard deviation for column {} must be a positive normal number, got {}",
                    i, std
                )));
            }
        }

        Ok(())
    }

    /// `(x - mean) / std` per column, in place.
    pub fn transform(&self, values: &mut [f64]) {
        debug_assert_eq!(values.len(), self.mean.len());
        for ((v, &mean), &std) in values.iter_mut().zip(&self.mean).zip(&self.std) {
            *v = (*v - mean) / std;
        }
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn std(&self) -> &[f64] {
        &self.std
    }

    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_clip_inside_bounds_is_identity() {
        let w = Winsorizer::new(vec![0.0, -5.0], vec![10.0, 5.0]).unwrap();
        let mut values = [0.0, 5.0];
        w.transform(&mut values);
        assert_eq!(values, [0.0, 5.0]);

        let mut values = [7.25, -4.5];
        w.transform(&mut values);
        assert_eq!(values, [7.25, -4.5]);
    }

    #[test]
    fn test_clip_outside_bounds_clamps_to_nearest() {
        let w = Winsorizer::new(vec![0.0, -5.0], vec![10.0, 5.0]).unwrap();
        let mut values = [15.0, -10.0];
        w.transform(&mut values);
        assert_eq!(values, [10.0, -5.0]);

        let mut values = [-0.1, 5.5];
        w.transform(&mut values);
        assert_eq!(values, [0.0, 5.0]);
    }

    #[test]
    fn test_winsorizer_rejects_bad_bounds() {
        assert!(Winsorizer::new(vec![1.0], vec![0.0]).is_err());
        assert!(Winsorizer::new(vec![0.0, 1.0], vec![1.0]).is_err());
        assert!(Winsorizer::new(vec![f64::NEG_INFINITY], vec![1.0]).is_err());
        assert!(Winsorizer::new(vec![2.0], vec![2.0]).is_ok());
    }

    #[test]
    fn test_scaler_mean_maps_to_zero() {
        let s = StandardScaler::new(vec![0.3, -12.0, 1e6], vec![0.1, 4.0, 2.5e5]).unwrap();
        let mut values = [0.3, -12.0, 1e6];
        s.transform(&mut values);
        assert_eq!(values, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_scaler_formula() {
        let s = StandardScaler::new(vec![5.0, 0.0], vec![2.0, 2.5]).unwrap();
        let mut values = [10.0, -5.0];
        s.transform(&mut values);
        assert_relative_eq!(values[0], 2.5);
        assert_relative_eq!(values[1], -2.0);
    }

    #[test]
    fn test_scaler_rejects_zero_variance() {
        let err = StandardScaler::new(vec![1.0, 2.0], vec![1.0, 0.0]).unwrap_err();
        assert!(matches!(err, PipelineError::PipelineLoad(_)));
        assert!(StandardScaler::new(vec![1.0], vec![f64::NAN]).is_err());
        assert!(StandardScaler::new(vec![1.0], vec![-1.0]).is_err());
    }

    #[test]
    fn test_scaler_rejects_subnormal_deviation() {
        let subnormal = f64::MIN_POSITIVE / 2.0;
        let err = StandardScaler::new(vec![0.0], vec![subnormal]).unwrap_err();
        assert!(matches!(err, PipelineError::PipelineLoad(_)));
        assert!(StandardScaler::new(vec![0.0], vec![f64::MIN_POSITIVE]).is_ok());
    }
}
