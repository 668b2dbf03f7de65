// Descriptive statistics over one channel within one phase
//
// NaN readings are excluded per statistic (listwise deletion per channel), not
// propagated. Variance and standard deviation are population moments (divide
// by n), matching the numpy reducers the study tables were produced with.

use crate::error::{AnalysisError, Result};
use nalgebra::DVector;
use serde::Serialize;

/// Summary of one channel's samples within a phase
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    /// Number of valid (non-NaN) samples
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub variance: f64,
    /// Mean absolute deviation from the mean
    pub mad: f64,
}

/// Non-NaN values of a sample, in order
pub(crate) fn valid_values(samples: &[f64]) -> Vec<f64> {
    samples.iter().copied().filter(|v| !v.is_nan()).collect()
}

/// Describe a sample, skipping NaN readings
///
/// # Example
/// ```
/// use earstudy::statistics::describe;
///
/// let summary = describe(&[2.0, 4.0, f64::NAN, 6.0, 8.0]).unwrap();
/// assert_eq!(summary.count, 4);
/// assert_eq!(summary.mean, 5.0);
/// assert_eq!(summary.variance, 5.0);
/// assert_eq!(summary.mad, 2.0);
/// ```
pub fn describe(samples: &[f64]) -> Result<Summary> {
    let valid = valid_values(samples);
    if valid.is_empty() {
        return Err(AnalysisError::MissingData(format!(
            "no valid samples among {}",
            samples.len()
        )));
    }

    let vector = DVector::from_vec(valid);
    let n = vector.len() as f64;
    let mean = vector.mean();
    // Two-pass moments; E[x^2] - E[x]^2 cancels badly around 36 °C.
    let deviations = vector.add_scalar(-mean);
    let variance = deviations.dot(&deviations) / n;
    let mad = deviations.abs().sum() / n;

    Ok(Summary {
        count: vector.len(),
        mean,
        std_dev: variance.sqrt(),
        variance,
        mad,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_population_moments() {
        let summary = describe(&[36.0, 36.5, 37.0]).unwrap();
        assert_eq!(summary.count, 3);
        assert!((summary.mean - 36.5).abs() < 1e-12);
        // ((0.5)^2 + 0 + (0.5)^2) / 3
        assert!((summary.variance - 0.5 / 3.0).abs() < 1e-12);
        assert!((summary.std_dev - (0.5f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((summary.mad - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_sample_has_zero_spread() {
        let summary = describe(&[36.6]).unwrap();
        assert_eq!(summary.count, 1);
        assert_eq!(summary.variance, 0.0);
        assert_eq!(summary.mad, 0.0);
    }

    #[test]
    fn test_nan_readings_are_omitted() {
        let with_nan = describe(&[f64::NAN, 1.0, 3.0, f64::NAN]).unwrap();
        let without = describe(&[1.0, 3.0]).unwrap();
        assert_eq!(with_nan, without);
    }

    #[test]
    fn test_all_nan_is_missing_data() {
        assert!(matches!(
            describe(&[f64::NAN, f64::NAN]),
            Err(AnalysisError::MissingData(_))
        ));
        assert!(matches!(describe(&[]), Err(AnalysisError::MissingData(_))));
    }
}
