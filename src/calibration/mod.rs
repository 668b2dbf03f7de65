// Sensor calibration
//
// Maps raw channel readings onto a reference with a constant offset, a linear
// map or a least-squares polynomial, picks the degree by mean absolute error
// against the reference, and scores every candidate kind for pooled fits.
//
// Implementation:
// - nalgebra SVD for the polynomial least-squares problem (f64 throughout)
// - Horner evaluation when applying a fit
// - Fits are immutable once computed; applying one returns a new series

mod fit;
mod reference;
mod selection;

pub use fit::{apply, fit, CalibrationFit, FitKind};
pub use reference::{reference_series, CalibrationReference, CalibrationSet, FitStrategy};
pub use selection::{
    evaluate_candidates, evaluate_methods, mean_absolute_error, select_best, CandidateReport,
    FitEvaluation, MethodEvaluation,
};
