//! Error taxonomy for the analysis core
//!
//! Every core operation returns `Result<T, AnalysisError>`. The error is
//! `Clone + PartialEq` so it can be stored as an explicit "no result" marker
//! next to successful measurements and compared in tests.

use serde::Serialize;
use thiserror::Error;

/// Errors raised by smoothing, calibration, segmentation and statistics
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum AnalysisError {
    /// A channel or phase has no valid (non-NaN) samples
    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Insufficient samples: need at least {required}, got {actual}")]
    InsufficientSamples { required: usize, actual: usize },

    /// Phase interval is empty, inverted or outside the recording
    #[error("Misaligned range: {0}")]
    MisalignedRange(String),

    /// A "mm:ss" marker could not be parsed
    #[error("Bad marker format: {0:?}")]
    BadMarkerFormat(String),

    #[error("Length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Input is valid but the statistic is undefined (zero variance, zero power)
    #[error("Degenerate sample: {0}")]
    DegenerateSample(String),

    #[error("Calibration fit failed: {0}")]
    FitFailed(String),

    #[error("Statistical test failed: {0}")]
    TestFailed(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_samples_message() {
        let err = AnalysisError::InsufficientSamples {
            required: 3,
            actual: 1,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient samples: need at least 3, got 1"
        );
    }

    #[test]
    fn test_bad_marker_message_quotes_input() {
        let err = AnalysisError::BadMarkerFormat("12-30".to_string());
        assert!(err.to_string().contains("\"12-30\""));
    }
}
