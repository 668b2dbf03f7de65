// Per-phase statistics
//
// Descriptive summaries, significance tests between phases or sensor groups,
// sensor agreement (relative change, Pearson, Spearman), IMU movement and HRV
// metrics over RR-interval series.
//
// Implementation:
// - aprender (crates.io) for t-tests and one-way ANOVA
// - nalgebra vectors for moments and HRV reductions
// - rustfft for the LF/HF spectral ratio
// - Every reducer omits NaN readings instead of propagating them

mod correlation;
mod descriptive;
pub mod hrv;
mod hypothesis;
mod movement;
mod spectral;

pub use correlation::{pearson, relative_change, spearman};
pub use descriptive::{describe, Summary};
pub use hrv::{hrv_between, rmssd, rr_between, sdnn, HrvSummary};
pub use hypothesis::{independent_t_test, one_way_anova, paired_t_test, TestOutcome};
pub use movement::movement_magnitude;
pub use spectral::{spectral_ratio, HF_BAND, LF_BAND};
