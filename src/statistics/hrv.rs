// HRV time-domain metrics over RR-interval series
//
// RR series carry no timestamp column: a phase is located by summing interval
// durations up to a "mm:ss" marker (see `segmentation::time_to_index`).

use crate::error::{AnalysisError, Result};
use crate::segmentation::{time_to_index, Marker};
use nalgebra::DVector;
use serde::Serialize;

fn intervals_vector(rr: &[f64], required: usize) -> Result<DVector<f64>> {
    let valid: Vec<f64> = rr.iter().copied().filter(|v| !v.is_nan()).collect();
    if valid.len() < required {
        return Err(AnalysisError::InsufficientSamples {
            required,
            actual: valid.len(),
        });
    }
    Ok(DVector::from_vec(valid))
}

/// Standard deviation of RR intervals (population, ms)
pub fn sdnn(rr: &[f64]) -> Result<f64> {
    let intervals = intervals_vector(rr, 2)?;
    let centered = intervals.add_scalar(-intervals.mean());
    Ok((centered.dot(&centered) / intervals.len() as f64).sqrt())
}

/// Root mean square of successive RR differences (ms)
pub fn rmssd(rr: &[f64]) -> Result<f64> {
    let intervals = intervals_vector(rr, 2)?;
    let n = intervals.len();
    let successive = intervals.rows(1, n - 1) - intervals.rows(0, n - 1);
    Ok((successive.dot(&successive) / successive.len() as f64).sqrt())
}

/// Time-domain HRV summary of one phase
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HrvSummary {
    pub intervals: usize,
    pub mean_rr: f64,
    /// Mean heart rate in beats per minute
    pub mean_hr: f64,
    pub sdnn: f64,
    pub rmssd: f64,
}

impl HrvSummary {
    pub fn from_intervals(rr: &[f64]) -> Result<Self> {
        let intervals = intervals_vector(rr, 2)?;
        let mean_rr = intervals.mean();
        if mean_rr <= 0.0 {
            return Err(AnalysisError::DegenerateSample(format!(
                "mean RR interval must be positive, got {}",
                mean_rr
            )));
        }

        Ok(Self {
            intervals: intervals.len(),
            mean_rr,
            mean_hr: 60_000.0 / mean_rr,
            sdnn: sdnn(rr)?,
            rmssd: rmssd(rr)?,
        })
    }
}

/// RR intervals between two named markers, `[start, end)` in index space
pub fn rr_between<'a>(
    rr: &'a [f64],
    markers: &[Marker],
    start: &str,
    end: &str,
) -> Result<&'a [f64]> {
    let find = |name: &str| {
        markers
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| AnalysisError::MissingData(format!("no marker named {}", name)))
    };
    let start_marker = find(start)?;
    let end_marker = find(end)?;

    let start_idx = time_to_index(rr, &start_marker.at)?;
    let end_idx = time_to_index(rr, &end_marker.at)?;
    if start_idx >= end_idx {
        return Err(AnalysisError::MisalignedRange(format!(
            "{} ({}) maps to index {}, not before {} ({}) at index {}",
            start, start_marker.at, start_idx, end, end_marker.at, end_idx
        )));
    }

    Ok(&rr[start_idx..end_idx])
}

/// HRV summary of the intervals between two named markers
pub fn hrv_between(rr: &[f64], markers: &[Marker], start: &str, end: &str) -> Result<HrvSummary> {
    HrvSummary::from_intervals(rr_between(rr, markers, start, end)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdnn_population() {
        // mean 800, deviations ±50
        let value = sdnn(&[750.0, 850.0, 750.0, 850.0]).unwrap();
        assert!((value - 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_rmssd() {
        // diffs 100, -100, 100
        let value = rmssd(&[750.0, 850.0, 750.0, 850.0]).unwrap();
        assert!((value - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_metrics_need_two_intervals() {
        assert!(sdnn(&[800.0]).is_err());
        assert!(rmssd(&[f64::NAN, 800.0]).is_err());
    }

    #[test]
    fn test_summary_heart_rate() {
        let summary = HrvSummary::from_intervals(&[1000.0, 1000.0, 1000.0]).unwrap();
        assert_eq!(summary.intervals, 3);
        assert!((summary.mean_hr - 60.0).abs() < 1e-12);
        assert_eq!(summary.sdnn, 0.0);
        assert_eq!(summary.rmssd, 0.0);
    }

    fn study_markers() -> Vec<Marker> {
        vec![
            Marker::new("start_sitting", "0:00"),
            Marker::new("stroop_start", "0:02"),
            Marker::new("stress_end", "0:04"),
        ]
    }

    #[test]
    fn test_rr_between_markers() {
        let rr = vec![500.0; 10];
        let slice = rr_between(&rr, &study_markers(), "stroop_start", "stress_end").unwrap();
        // cumulative 2000 reached at index 3, 4000 at index 7
        assert_eq!(slice.len(), 4);
    }

    #[test]
    fn test_hrv_between_inverted_markers() {
        let rr = vec![500.0; 10];
        assert!(matches!(
            hrv_between(&rr, &study_markers(), "stress_end", "stroop_start"),
            Err(AnalysisError::MisalignedRange(_))
        ));
    }

    #[test]
    fn test_hrv_between_unknown_marker() {
        let rr = vec![500.0; 10];
        assert!(matches!(
            hrv_between(&rr, &study_markers(), "math_start", "stress_end"),
            Err(AnalysisError::MissingData(_))
        ));
    }
}
