// Least-squares calibration fits
//
// A fit maps raw sensor readings onto a reference (cross-sensor mean or a
// ground-truth thermometer reading). Three families are supported:
// - Constant: shift by the difference of means
// - Linear: slope + intercept
// - Polynomial(d): d+1 coefficients, highest degree first
//
// Polynomial coefficients are solved by SVD of the column-scaled Vandermonde
// matrix in double precision, the same approach as numpy's `polyfit`.
// Evaluation uses Horner's scheme.

use crate::error::{AnalysisError, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Family of a calibration fit
///
/// Serialized as its display name: `"constant"`, `"linear"`, `"poly_8"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FitKind {
    Constant,
    Linear,
    Polynomial(usize),
}

impl FitKind {
    /// Polynomial degree of the fitted function (constant offsets count as 1)
    pub fn degree(&self) -> usize {
        match self {
            FitKind::Constant | FitKind::Linear => 1,
            FitKind::Polynomial(d) => *d,
        }
    }

    /// Minimum number of valid (raw, reference) pairs needed to fit
    pub fn min_samples(&self) -> usize {
        match self {
            FitKind::Constant => 1,
            FitKind::Linear => 2,
            FitKind::Polynomial(d) => d + 1,
        }
    }

    /// Candidate set explored by the calibration study
    pub fn study_candidates() -> Vec<FitKind> {
        vec![
            FitKind::Constant,
            FitKind::Linear,
            FitKind::Polynomial(2),
            FitKind::Polynomial(4),
            FitKind::Polynomial(8),
            FitKind::Polynomial(16),
            FitKind::Polynomial(32),
        ]
    }
}

impl FromStr for FitKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "constant" => Ok(FitKind::Constant),
            "linear" => Ok(FitKind::Linear),
            _ => lower
                .strip_prefix("poly_")
                .and_then(|d| d.parse::<usize>().ok())
                .filter(|d| *d >= 1)
                .map(FitKind::Polynomial)
                .ok_or_else(|| format!("unknown fit kind {:?} (expected constant, linear or poly_N)", s)),
        }
    }
}

impl TryFrom<String> for FitKind {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FitKind> for String {
    fn from(kind: FitKind) -> Self {
        kind.to_string().to_ascii_lowercase()
    }
}

impl fmt::Display for FitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitKind::Constant => write!(f, "Constant"),
            FitKind::Linear => write!(f, "Linear"),
            FitKind::Polynomial(d) => write!(f, "Poly_{}", d),
        }
    }
}

/// A fitted calibration for one channel
///
/// Parameters are fixed once fitted; the only way to obtain a fit is `fit`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationFit {
    kind: FitKind,
    /// Constant: `[offset]`; otherwise polynomial coefficients, highest first
    coefficients: Vec<f64>,
    /// Number of (raw, reference) pairs the fit was derived from
    samples: usize,
}

impl CalibrationFit {
    pub fn kind(&self) -> FitKind {
        self.kind
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Polynomial coefficients ordered highest to lowest degree
    ///
    /// For a constant fit this is the single offset.
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Offset of a constant fit
    pub fn offset(&self) -> Option<f64> {
        match self.kind {
            FitKind::Constant => self.coefficients.first().copied(),
            _ => None,
        }
    }

    /// `(slope, intercept)` of a linear fit
    pub fn slope_intercept(&self) -> Option<(f64, f64)> {
        match (self.kind, self.coefficients.as_slice()) {
            (FitKind::Linear, [slope, intercept]) => Some((*slope, *intercept)),
            _ => None,
        }
    }

    /// Evaluate the fit at a single raw reading
    pub fn eval(&self, x: f64) -> f64 {
        match self.kind {
            FitKind::Constant => x + self.coefficients[0],
            FitKind::Linear | FitKind::Polynomial(_) => horner(&self.coefficients, x),
        }
    }
}

fn horner(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().fold(0.0, |acc, c| acc * x + c)
}

/// Pairs where both raw and reference readings are present
fn valid_pairs(raw: &[f64], reference: &[f64]) -> (Vec<f64>, Vec<f64>) {
    raw.iter()
        .zip(reference)
        .filter(|(x, y)| !x.is_nan() && !y.is_nan())
        .map(|(x, y)| (*x, *y))
        .unzip()
}

fn nan_mean(values: &[f64]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Fit a calibration mapping `raw` readings onto `reference` values
///
/// `raw` and `reference` must have equal length. Positions where either is NaN
/// are dropped, except for the constant offset, which is the difference of the
/// two NaN-omitting means. Fails with `InsufficientSamples` when fewer than
/// `kind.min_samples()` valid pairs remain.
///
/// # Example
/// ```
/// use earstudy::calibration::{fit, FitKind};
///
/// let raw = vec![1.0, 2.0, 3.0, 4.0];
/// let reference: Vec<f64> = raw.iter().map(|x| 2.0 * x + 3.0).collect();
///
/// let linear = fit(&raw, &reference, FitKind::Linear).unwrap();
/// let (slope, intercept) = linear.slope_intercept().unwrap();
/// assert!((slope - 2.0).abs() < 1e-9);
/// assert!((intercept - 3.0).abs() < 1e-9);
/// ```
pub fn fit(raw: &[f64], reference: &[f64], kind: FitKind) -> Result<CalibrationFit> {
    if raw.len() != reference.len() {
        return Err(AnalysisError::LengthMismatch {
            left: raw.len(),
            right: reference.len(),
        });
    }
    if let FitKind::Polynomial(0) = kind {
        return Err(AnalysisError::InvalidParameter(
            "polynomial degree must be >= 1".to_string(),
        ));
    }

    let (xs, ys) = valid_pairs(raw, reference);
    if xs.len() < kind.min_samples() {
        return Err(AnalysisError::InsufficientSamples {
            required: kind.min_samples(),
            actual: xs.len(),
        });
    }

    let coefficients = match kind {
        FitKind::Constant => {
            // Means over each series' own valid readings: mean(raw + offset) == mean(reference)
            let raw_mean = nan_mean(raw).unwrap_or(0.0);
            let reference_mean = nan_mean(reference).unwrap_or(0.0);
            vec![reference_mean - raw_mean]
        }
        FitKind::Linear => polyfit(&xs, &ys, 1)?,
        FitKind::Polynomial(degree) => polyfit(&xs, &ys, degree)?,
    };

    if coefficients.iter().any(|c| !c.is_finite()) {
        return Err(AnalysisError::FitFailed(format!(
            "{} fit produced non-finite coefficients",
            kind
        )));
    }

    Ok(CalibrationFit {
        kind,
        coefficients,
        samples: xs.len(),
    })
}

/// Least-squares polynomial coefficients, highest degree first
fn polyfit(xs: &[f64], ys: &[f64], degree: usize) -> Result<Vec<f64>> {
    let n = xs.len();
    let cols = degree + 1;
    let power = |j: usize| (degree - j) as i32;

    // Column scaling keeps high-degree columns comparable to the constant one.
    let scales: Vec<f64> = (0..cols)
        .map(|j| {
            let norm = xs.iter().map(|x| x.powi(power(j)).powi(2)).sum::<f64>().sqrt();
            if norm > 0.0 && norm.is_finite() {
                norm
            } else {
                1.0
            }
        })
        .collect();

    let vandermonde = DMatrix::from_fn(n, cols, |i, j| xs[i].powi(power(j)) / scales[j]);
    let rhs = DVector::from_column_slice(ys);

    let svd = vandermonde.svd(true, true);
    let cutoff = svd.singular_values.max() * n as f64 * f64::EPSILON;
    let solution = svd
        .solve(&rhs, cutoff)
        .map_err(|e| AnalysisError::FitFailed(e.to_string()))?;

    Ok(solution
        .iter()
        .zip(&scales)
        .map(|(c, scale)| c / scale)
        .collect())
}

/// Evaluate a fit elementwise
///
/// NaN readings produce NaN at the same position; never fails.
pub fn apply(fit: &CalibrationFit, raw: &[f64]) -> Vec<f64> {
    raw.iter().map(|&x| fit.eval(x)).collect()
}
