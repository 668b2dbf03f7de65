// Goodness-of-fit driven choice of calibration degree
//
// Each candidate kind is fitted on the same (raw, reference) pairs, applied
// back onto the raw series and scored by mean absolute error against the
// reference. Low-degree fits underfit sensor drift, high-degree fits amplify
// noise; the MAE table makes that trade-off visible to the caller.
//
// `evaluate_methods` summarises each kind over a whole channel set: mean and
// population variance of the per-channel MAE, and the mean Pearson correlation
// of the calibrated channels with the reference.

use super::fit::{apply, fit, CalibrationFit, FitKind};
use crate::error::{AnalysisError, Result};
use crate::recording::Recording;
use crate::statistics::pearson;
use serde::Serialize;

/// One fitted candidate and its error against the reference
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitEvaluation {
    pub kind: FitKind,
    pub fit: CalibrationFit,
    /// Mean absolute error of `apply(fit, raw)` against the reference
    pub mae: f64,
}

/// Outcome of scoring every candidate kind
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateReport {
    pub evaluations: Vec<FitEvaluation>,
    /// Kinds that could not be fitted, with the reason
    pub rejected: Vec<(FitKind, AnalysisError)>,
}

/// Mean absolute error over positions where both series are present
///
/// # Example
/// ```
/// use earstudy::calibration::mean_absolute_error;
///
/// let mae = mean_absolute_error(&[1.0, 2.0, f64::NAN], &[2.0, 2.0, 5.0]).unwrap();
/// assert!((mae - 0.5).abs() < 1e-12);
/// ```
pub fn mean_absolute_error(calibrated: &[f64], reference: &[f64]) -> Result<f64> {
    if calibrated.len() != reference.len() {
        return Err(AnalysisError::LengthMismatch {
            left: calibrated.len(),
            right: reference.len(),
        });
    }

    let (sum, count) = calibrated
        .iter()
        .zip(reference)
        .filter(|(c, r)| !c.is_nan() && !r.is_nan())
        .fold((0.0, 0usize), |(sum, count), (c, r)| {
            (sum + (c - r).abs(), count + 1)
        });

    if count == 0 {
        return Err(AnalysisError::MissingData(
            "no overlapping samples between calibrated and reference series".to_string(),
        ));
    }
    Ok(sum / count as f64)
}

/// Fit and score every candidate kind, in the order given
pub fn evaluate_candidates(raw: &[f64], reference: &[f64], kinds: &[FitKind]) -> CandidateReport {
    let mut evaluations = Vec::with_capacity(kinds.len());
    let mut rejected = Vec::new();

    for &kind in kinds {
        let scored = fit(raw, reference, kind).and_then(|fitted| {
            let mae = mean_absolute_error(&apply(&fitted, raw), reference)?;
            Ok(FitEvaluation {
                kind,
                fit: fitted,
                mae,
            })
        });

        match scored {
            Ok(evaluation) if evaluation.mae.is_finite() => evaluations.push(evaluation),
            Ok(evaluation) => {
                tracing::warn!(%kind, mae = evaluation.mae, "skipping candidate with non-finite error");
                rejected.push((
                    kind,
                    AnalysisError::FitFailed(format!("{} has non-finite MAE", kind)),
                ));
            }
            Err(e) => {
                tracing::warn!(%kind, error = %e, "skipping calibration candidate");
                rejected.push((kind, e));
            }
        }
    }

    CandidateReport {
        evaluations,
        rejected,
    }
}

/// One calibration method scored over every channel of a recording
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodEvaluation {
    pub kind: FitKind,
    /// Channels the kind could be fitted on
    pub channels: usize,
    pub mae_mean: f64,
    pub mae_variance: f64,
    /// Mean correlation of calibrated channel and reference; `None` when no
    /// channel had a defined correlation (e.g. a constant reference)
    pub correlation: Option<f64>,
}

/// Score each kind on every channel and summarise per kind
///
/// Kinds that fit no channel at all are left out of the result.
pub fn evaluate_methods(
    recording: &Recording,
    channels: &[String],
    reference: &[f64],
    kinds: &[FitKind],
) -> Result<Vec<MethodEvaluation>> {
    let mut maes: Vec<Vec<f64>> = vec![Vec::new(); kinds.len()];
    let mut correlations: Vec<Vec<f64>> = vec![Vec::new(); kinds.len()];

    for name in channels {
        let raw = recording.values(name)?;
        for evaluation in evaluate_candidates(raw, reference, kinds).evaluations {
            let Some(slot) = kinds.iter().position(|k| *k == evaluation.kind) else {
                continue;
            };
            maes[slot].push(evaluation.mae);
            if let Ok(r) = pearson(&apply(&evaluation.fit, raw), reference) {
                correlations[slot].push(r);
            }
        }
    }

    let mean = |values: &[f64]| values.iter().sum::<f64>() / values.len() as f64;
    Ok(kinds
        .iter()
        .zip(maes.iter().zip(&correlations))
        .filter(|(_, (maes, _))| !maes.is_empty())
        .map(|(&kind, (maes, correlations))| {
            let mae_mean = mean(maes);
            let mae_variance = maes.iter().map(|m| (m - mae_mean).powi(2)).sum::<f64>() / maes.len() as f64;
            MethodEvaluation {
                kind,
                channels: maes.len(),
                mae_mean,
                mae_variance,
                correlation: (!correlations.is_empty()).then(|| mean(correlations)),
            }
        })
        .collect())
}

/// Lowest-MAE candidate; the earlier kind wins ties
pub fn select_best(raw: &[f64], reference: &[f64], kinds: &[FitKind]) -> Result<FitEvaluation> {
    if kinds.is_empty() {
        return Err(AnalysisError::InvalidParameter(
            "no candidate fit kinds given".to_string(),
        ));
    }

    let report = evaluate_candidates(raw, reference, kinds);
    let best = report
        .evaluations
        .into_iter()
        .reduce(|best, next| if next.mae < best.mae { next } else { best });

    match best {
        Some(best) => {
            tracing::debug!(kind = %best.kind, mae = best.mae, "selected calibration fit");
            Ok(best)
        }
        // Every candidate failed; surface the first failure.
        None => Err(report
            .rejected
            .into_iter()
            .next()
            .map(|(_, e)| e)
            .unwrap_or_else(|| AnalysisError::FitFailed("no candidate could be fitted".to_string()))),
    }
}
