//! Moving-average smoothing of raw channel values
//!
//! Window semantics follow the pandas `rolling(...).mean()` calls the study
//! analyses were built on: a trailing window covers the previous `size`
//! samples including the current one, a centered window ends `(size - 1) / 2`
//! samples after the current one. NaN readings are skipped inside a window;
//! a window with fewer than `min_periods` valid readings yields NaN.

use crate::error::{AnalysisError, Result};
use crate::recording::{Channel, Recording};
use serde::{Deserialize, Serialize};

/// Window parameters for `rolling_mean`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    /// Number of samples in the window (>= 1)
    pub size: usize,

    /// Minimum number of valid samples needed to emit a value
    ///
    /// `None` means "the full window" (the pandas default).
    #[serde(default)]
    pub min_periods: Option<usize>,

    /// Center the window on the current sample instead of trailing it
    #[serde(default)]
    pub centered: bool,
}

impl WindowSpec {
    pub fn trailing(size: usize) -> Self {
        Self {
            size,
            min_periods: None,
            centered: false,
        }
    }

    pub fn centered(size: usize) -> Self {
        Self {
            size,
            min_periods: None,
            centered: true,
        }
    }

    pub fn with_min_periods(mut self, min_periods: usize) -> Self {
        self.min_periods = Some(min_periods);
        self
    }

    /// Derive a centered window from the total sample count
    ///
    /// The pooled calibration dataset used `total / 50` samples per window and
    /// `total / 200` as the minimum period count. Both are clamped to >= 1.
    pub fn fraction_of(total: usize, size_divisor: usize, min_periods_divisor: usize) -> Self {
        let size = (total / size_divisor.max(1)).max(1);
        let min_periods = (total / min_periods_divisor.max(1)).clamp(1, size);
        Self::centered(size).with_min_periods(min_periods)
    }

    pub fn effective_min_periods(&self) -> usize {
        self.min_periods.unwrap_or(self.size)
    }

    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(AnalysisError::InvalidParameter(
                "window size must be >= 1".to_string(),
            ));
        }
        let min_periods = self.effective_min_periods();
        if min_periods == 0 || min_periods > self.size {
            return Err(AnalysisError::InvalidParameter(format!(
                "min_periods must be in 1..={}, got {}",
                self.size, min_periods
            )));
        }
        Ok(())
    }

    /// Inclusive index range covered by the window ending (or centered) at `i`
    fn bounds(&self, i: usize, len: usize) -> (usize, usize) {
        let end = if self.centered {
            i + (self.size - 1) / 2
        } else {
            i
        };
        let start = (end + 1).saturating_sub(self.size);
        (start, end.min(len.saturating_sub(1)))
    }
}

/// Compensated sum of the valid readings currently inside the window
#[derive(Debug, Default)]
struct WindowSum {
    sum: f64,
    compensation: f64,
    count: usize,
}

impl WindowSum {
    fn add(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        let y = value - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
        self.count += 1;
    }

    fn remove(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.count -= 1;
        if self.count == 0 {
            // Empty window: drop accumulated rounding error
            *self = Self::default();
            return;
        }
        let y = -value - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
    }

    fn mean(&self, min_periods: usize) -> f64 {
        if self.count >= min_periods {
            self.sum / self.count as f64
        } else {
            f64::NAN
        }
    }
}

/// Moving average of `values` with the given window
///
/// The output has the same length as the input. A window size of 1 with the
/// default `min_periods` reproduces the input exactly. Runs in O(n) for any
/// window size: both window edges only move forward, so each reading enters
/// and leaves the running sum once.
pub fn rolling_mean(values: &[f64], spec: &WindowSpec) -> Result<Vec<f64>> {
    spec.validate()?;
    let min_periods = spec.effective_min_periods();

    let mut window = WindowSum::default();
    // Half-open range of readings currently in `window`
    let (mut lo, mut hi) = (0usize, 0usize);
    let mut smoothed = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        let (start, end) = spec.bounds(i, values.len());
        while lo < start {
            window.remove(values[lo]);
            lo += 1;
        }
        while hi <= end {
            window.add(values[hi]);
            hi += 1;
        }
        smoothed.push(window.mean(min_periods));
    }

    Ok(smoothed)
}

/// Smooth the named channels of a recording, returning a new recording
pub fn smooth_recording(
    recording: &Recording,
    channels: &[String],
    spec: &WindowSpec,
) -> Result<Recording> {
    let smoothed = channels
        .iter()
        .map(|name| {
            let values = rolling_mean(recording.values(name)?, spec)?;
            Ok(Channel::new(name.clone(), values))
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(
        participant = recording.participant(),
        window = spec.size,
        centered = spec.centered,
        "smoothed {} channels",
        smoothed.len()
    );

    recording.with_channels(smoothed)
}
