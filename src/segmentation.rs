//! Phase segmentation
//!
//! A recording is split into phases either by runs of its phase-id column or
//! by named "mm:ss" event markers measured from the first timestamp. Every
//! `Phase` carries an explicit `EndBound` so slicing never guesses whether the
//! end timestamp belongs to the phase.

use crate::error::{AnalysisError, Result};
use crate::recording::{PhaseId, Recording};
use serde::{Deserialize, Serialize};

/// Whether `Phase::end_ms` belongs to the phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndBound {
    Inclusive,
    Exclusive,
}

/// Labeled sub-interval of a recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    /// Phase id of the run this phase was derived from, if any
    pub label: Option<PhaseId>,
    pub start_ms: i64,
    pub end_ms: i64,
    pub end_bound: EndBound,
}

impl Phase {
    pub fn contains(&self, timestamp_ms: i64) -> bool {
        match self.end_bound {
            EndBound::Inclusive => (self.start_ms..=self.end_ms).contains(&timestamp_ms),
            EndBound::Exclusive => (self.start_ms..self.end_ms).contains(&timestamp_ms),
        }
    }

    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }
}

/// Named event marker, e.g. `stroop_start` at `"12:30"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub name: String,
    /// Elapsed time since recording start, "mm:ss"
    pub at: String,
}

impl Marker {
    pub fn new(name: impl Into<String>, at: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            at: at.into(),
        }
    }
}

/// One phase per maximal run of equal phase ids
///
/// A label that recurs later in the recording yields a second phase. Bounds
/// are the first and last timestamp of the run, both inclusive.
pub fn segment_by_label(recording: &Recording) -> Vec<Phase> {
    let timestamps = recording.timestamps_ms();
    let ids = recording.phase_ids();
    let mut phases: Vec<Phase> = Vec::new();

    for (i, (&ts, &id)) in timestamps.iter().zip(ids).enumerate() {
        let continues_run = i > 0 && ids[i - 1] == id;
        match phases.last_mut() {
            Some(current) if continues_run => current.end_ms = ts,
            _ => phases.push(Phase {
                name: format!("phase_{}", id),
                label: Some(id),
                start_ms: ts,
                end_ms: ts,
                end_bound: EndBound::Inclusive,
            }),
        }
    }

    phases
}

/// Parse a "mm:ss" marker into milliseconds
///
/// # Example
/// ```
/// use earstudy::segmentation::parse_marker;
///
/// assert_eq!(parse_marker("12:30").unwrap(), 750_000);
/// assert!(parse_marker("12:75").is_err());
/// ```
pub fn parse_marker(text: &str) -> Result<i64> {
    let bad = || AnalysisError::BadMarkerFormat(text.to_string());

    let (minutes, seconds) = text.trim().split_once(':').ok_or_else(bad)?;
    let field = |s: &str| -> Result<i64> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        s.parse::<i64>().map_err(|_| bad())
    };

    let minutes = field(minutes)?;
    let seconds = field(seconds)?;
    if seconds >= 60 {
        return Err(bad());
    }

    minutes
        .checked_mul(60_000)
        .and_then(|ms| ms.checked_add(seconds * 1_000))
        .ok_or_else(bad)
}

/// Named `[marker_i, marker_i+1)` intervals from recording start
///
/// All markers are parsed up front; any malformed marker fails the whole call.
/// Inverted or empty intervals are logged and left out.
pub fn segment_by_markers(recording: &Recording, markers: &[Marker]) -> Result<Vec<Phase>> {
    let offsets = markers
        .iter()
        .map(|m| parse_marker(&m.at))
        .collect::<Result<Vec<_>>>()?;

    let Some(origin) = recording.start_ms() else {
        return Err(AnalysisError::MissingData(format!(
            "recording {} has no samples to place markers on",
            recording.participant()
        )));
    };

    let mut phases = Vec::with_capacity(markers.len().saturating_sub(1));
    for (pair, window) in markers.windows(2).zip(offsets.windows(2)) {
        let phase = Phase {
            name: pair[0].name.clone(),
            label: None,
            start_ms: origin + window[0],
            end_ms: origin + window[1],
            end_bound: EndBound::Exclusive,
        };

        if phase.start_ms >= phase.end_ms {
            let err = AnalysisError::MisalignedRange(format!(
                "{} ({}) does not precede {} ({})",
                pair[0].name, pair[0].at, pair[1].name, pair[1].at
            ));
            tracing::warn!(participant = recording.participant(), error = %err, "dropping phase");
            continue;
        }
        phases.push(phase);
    }

    Ok(phases)
}

/// Samples of `recording` that fall inside `phase`
///
/// May return an empty recording; callers check `is_empty()` before computing
/// statistics.
pub fn slice_recording(recording: &Recording, phase: &Phase) -> Recording {
    let timestamps = recording.timestamps_ms();
    let sliced = recording.select(|i| phase.contains(timestamps[i]));
    if sliced.is_empty() {
        tracing::debug!(
            participant = recording.participant(),
            phase = %phase.name,
            "phase contains no samples"
        );
    }
    sliced
}

/// Samples of every run carrying `label`
pub fn slice_label(recording: &Recording, label: PhaseId) -> Recording {
    let ids = recording.phase_ids();
    recording.select(|i| ids[i] == label)
}

/// Index of the first RR interval at which the elapsed time reaches `marker`
///
/// Returns `rr_intervals.len()` when the recording ends before the marker.
///
/// # Example
/// ```
/// use earstudy::segmentation::time_to_index;
///
/// assert_eq!(time_to_index(&[500.0, 500.0, 500.0, 500.0], "0:01").unwrap(), 1);
/// ```
pub fn time_to_index(rr_intervals: &[f64], marker: &str) -> Result<usize> {
    let target = parse_marker(marker)? as f64;

    let mut elapsed = 0.0;
    for (i, rr) in rr_intervals.iter().enumerate() {
        elapsed += rr;
        if elapsed >= target {
            return Ok(i);
        }
    }
    Ok(rr_intervals.len())
}

/// Timestamp of each heartbeat when the first interval starts at `start_ms`
pub fn beat_times(start_ms: i64, rr_intervals: &[f64]) -> Vec<i64> {
    rr_intervals
        .iter()
        .scan(0.0, |elapsed, rr| {
            *elapsed += rr;
            Some(start_ms + elapsed.round() as i64)
        })
        .collect()
}

/// Reading of `channel` at the sample nearest in time to each of `at`
///
/// Ties go to the earlier sample.
pub fn resample_nearest(recording: &Recording, channel: &str, at: &[i64]) -> Result<Vec<f64>> {
    let values = recording.values(channel)?;
    let timestamps = recording.timestamps_ms();
    if timestamps.is_empty() {
        return Err(AnalysisError::MissingData(format!(
            "no samples of {} to resample",
            channel
        )));
    }

    Ok(at
        .iter()
        .map(|&t| {
            let after = timestamps.partition_point(|&ts| ts < t);
            let index = if after == 0 {
                0
            } else if after == timestamps.len() || t - timestamps[after - 1] <= timestamps[after] - t {
                after - 1
            } else {
                after
            };
            values[index]
        })
        .collect())
}
