// Spectral LF/HF ratio of an RR-interval sequence
//
// The DFT is taken over the RR values as an evenly spaced sequence, so band
// edges are in cycles per beat rather than Hz. RR intervals are irregularly
// spaced in time and are not resampled here; results stay comparable with the
// published study tables, which were computed the same way.

use crate::error::{AnalysisError, Result};
use rustfft::{num_complex::Complex, FftPlanner};

/// Low-frequency band, cycles per sample (inclusive)
pub const LF_BAND: (f64, f64) = (0.04, 0.15);

/// High-frequency band, cycles per sample (inclusive; 0.15 belongs to both)
pub const HF_BAND: (f64, f64) = (0.15, 0.4);

/// Sample frequency of DFT bin `i` for a length-`n` transform, numpy order
fn bin_frequency(i: usize, n: usize) -> f64 {
    if i <= (n - 1) / 2 {
        i as f64 / n as f64
    } else {
        (i as f64 - n as f64) / n as f64
    }
}

/// Squared DFT magnitude per bin
fn power_spectrum(values: &[f64]) -> Vec<f64> {
    let mut buffer: Vec<Complex<f64>> = values.iter().map(|&v| Complex::new(v, 0.0)).collect();
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(buffer.len());
    fft.process(&mut buffer);

    buffer.iter().map(|c| c.norm_sqr()).collect()
}

fn band_power(power: &[f64], (low, high): (f64, f64)) -> f64 {
    let n = power.len();
    power
        .iter()
        .enumerate()
        .filter(|(i, _)| {
            let f = bin_frequency(*i, n);
            f >= low && f <= high
        })
        .map(|(_, p)| p)
        .sum()
}

/// Ratio of LF to HF spectral power of an RR sequence
///
/// NaN intervals are dropped before the transform. Fails with
/// `DegenerateSample` when the HF band carries no power beyond rounding noise.
pub fn spectral_ratio(rr_intervals: &[f64]) -> Result<f64> {
    let rr: Vec<f64> = rr_intervals.iter().copied().filter(|v| !v.is_nan()).collect();
    if rr.len() < 2 {
        return Err(AnalysisError::InsufficientSamples {
            required: 2,
            actual: rr.len(),
        });
    }

    let power = power_spectrum(&rr);
    let lf = band_power(&power, LF_BAND);
    let hf = band_power(&power, HF_BAND);

    // Rounding in the transform leaves residue in empty bins.
    let total: f64 = power.iter().sum();
    if hf <= total * f64::EPSILON {
        return Err(AnalysisError::DegenerateSample(format!(
            "no HF power in {} intervals (LF power {})",
            rr.len(),
            lf
        )));
    }

    tracing::trace!(lf, hf, intervals = rr.len(), "computed LF/HF");
    Ok(lf / hf)
}
