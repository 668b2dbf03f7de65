//! Columnar per-participant recording
//!
//! A `Recording` holds one participant's continuous time series: a timestamp
//! column (milliseconds), a categorical phase-id column and an ordered list of
//! named numeric channels. Missing readings are `f64::NAN`.
//!
//! Transformations never mutate a recording in place; they return a new one
//! (`with_channels`, `select`) so the raw copy stays available next to the
//! smoothed and calibrated copies.

use crate::error::{AnalysisError, Result};
use serde::Serialize;

/// Categorical phase label (the `ID` column of the study files)
pub type PhaseId = i32;

/// A named numeric sensor stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Channel {
    pub name: String,
    pub values: Vec<f64>,
}

impl Channel {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Number of non-NaN readings
    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_nan()).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    participant: String,
    timestamps_ms: Vec<i64>,
    phase_ids: Vec<PhaseId>,
    channels: Vec<Channel>,
}

impl Recording {
    /// Build a recording, checking column lengths and timestamp order
    pub fn new(
        participant: impl Into<String>,
        timestamps_ms: Vec<i64>,
        phase_ids: Vec<PhaseId>,
        channels: Vec<Channel>,
    ) -> Result<Self> {
        let len = timestamps_ms.len();
        if phase_ids.len() != len {
            return Err(AnalysisError::LengthMismatch {
                left: len,
                right: phase_ids.len(),
            });
        }
        if let Some(channel) = channels.iter().find(|c| c.values.len() != len) {
            return Err(AnalysisError::LengthMismatch {
                left: len,
                right: channel.values.len(),
            });
        }
        if let Some(pos) = timestamps_ms.windows(2).position(|w| w[1] < w[0]) {
            return Err(AnalysisError::MisalignedRange(format!(
                "timestamp decreases at sample {} ({} -> {})",
                pos + 1,
                timestamps_ms[pos],
                timestamps_ms[pos + 1]
            )));
        }

        Ok(Self {
            participant: participant.into(),
            timestamps_ms,
            phase_ids,
            channels,
        })
    }

    pub fn participant(&self) -> &str {
        &self.participant
    }

    pub fn len(&self) -> usize {
        self.timestamps_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps_ms.is_empty()
    }

    pub fn timestamps_ms(&self) -> &[i64] {
        &self.timestamps_ms
    }

    pub fn phase_ids(&self) -> &[PhaseId] {
        &self.phase_ids
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// Values of a channel, or `MissingData` if the recording does not carry it
    pub fn values(&self, name: &str) -> Result<&[f64]> {
        self.channel(name)
            .map(|c| c.values.as_slice())
            .ok_or_else(|| {
                AnalysisError::MissingData(format!(
                    "channel {} not present in recording {}",
                    name, self.participant
                ))
            })
    }

    /// First timestamp, the origin for "mm:ss" marker offsets
    pub fn start_ms(&self) -> Option<i64> {
        self.timestamps_ms.first().copied()
    }

    pub fn end_ms(&self) -> Option<i64> {
        self.timestamps_ms.last().copied()
    }

    /// Copy of this recording with the named channels replaced
    ///
    /// Channels not mentioned in `replacements` are carried over unchanged;
    /// replacement channels not present in the recording are appended.
    pub fn with_channels(&self, replacements: Vec<Channel>) -> Result<Self> {
        let mut channels = self.channels.clone();
        for replacement in replacements {
            if replacement.values.len() != self.len() {
                return Err(AnalysisError::LengthMismatch {
                    left: self.len(),
                    right: replacement.values.len(),
                });
            }
            match channels.iter_mut().find(|c| c.name == replacement.name) {
                Some(existing) => *existing = replacement,
                None => channels.push(replacement),
            }
        }

        Ok(Self {
            participant: self.participant.clone(),
            timestamps_ms: self.timestamps_ms.clone(),
            phase_ids: self.phase_ids.clone(),
            channels,
        })
    }

    /// Copy of the samples for which `keep(index)` is true
    pub fn select<F>(&self, keep: F) -> Self
    where
        F: Fn(usize) -> bool,
    {
        let indices: Vec<usize> = (0..self.len()).filter(|&i| keep(i)).collect();

        Self {
            participant: self.participant.clone(),
            timestamps_ms: indices.iter().map(|&i| self.timestamps_ms[i]).collect(),
            phase_ids: indices.iter().map(|&i| self.phase_ids[i]).collect(),
            channels: self
                .channels
                .iter()
                .map(|c| Channel::new(c.name.clone(), indices.iter().map(|&i| c.values[i]).collect()))
                .collect(),
        }
    }

    /// Concatenate the samples of several recordings
    ///
    /// Joins a participant's recording files. Timestamps are shifted so the
    /// result stays non-decreasing. The result carries every channel seen in
    /// any part, in first-seen order; a part without a channel contributes NaN
    /// for its samples.
    pub fn concat(participant: impl Into<String>, parts: &[Recording]) -> Result<Self> {
        if parts.is_empty() {
            return Err(AnalysisError::MissingData(
                "no recordings to concatenate".to_string(),
            ));
        }

        let mut names: Vec<String> = Vec::new();
        for channel in parts.iter().flat_map(|part| &part.channels) {
            if !names.contains(&channel.name) {
                names.push(channel.name.clone());
            }
        }

        let mut timestamps_ms = Vec::new();
        let mut phase_ids = Vec::new();
        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
        let mut offset = 0i64;

        for part in parts {
            let (Some(start), Some(end)) = (part.start_ms(), part.end_ms()) else {
                continue;
            };
            let shift = offset - start;
            timestamps_ms.extend(part.timestamps_ms.iter().map(|t| t + shift));
            phase_ids.extend_from_slice(&part.phase_ids);
            for (name, column) in names.iter().zip(columns.iter_mut()) {
                match part.channel(name) {
                    Some(channel) => column.extend_from_slice(&channel.values),
                    None => {
                        tracing::debug!(
                            participant = %part.participant,
                            channel = %name,
                            "channel missing from part, padding with NaN"
                        );
                        column.extend(std::iter::repeat(f64::NAN).take(part.len()));
                    }
                }
            }
            offset += end - start + 1;
        }

        let channels = names
            .into_iter()
            .zip(columns)
            .map(|(name, values)| Channel::new(name, values))
            .collect();
        Self::new(participant, timestamps_ms, phase_ids, channels)
    }
}
