//! Study file loading
//!
//! - CSV recordings: `TIMESTAMP` (ms), `ID` (phase label) and one column per
//!   channel. Temperature channels hold raw counts (scaled by
//!   `count_scale`, a raw 0 is a dropped sample); IMU channels are optional.
//! - TXT RR series: one interval in milliseconds per line.
//!
//! Files are discovered recursively and grouped by the participant id the
//! configured pattern extracts from each file stem.

use crate::config::InputConfig;
use crate::pipeline::ParticipantInput;
use crate::recording::{Channel, PhaseId, Recording};
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

pub const TIMESTAMP_COLUMN: &str = "TIMESTAMP";
pub const PHASE_COLUMN: &str = "ID";

/// Files found for one participant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantFiles {
    pub recordings: Vec<PathBuf>,
    pub rr_intervals: Option<PathBuf>,
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == name)
}

/// Integer cell that may have been written as a float ("1700000000000.0")
fn parse_integer(cell: &str) -> Option<i64> {
    let cell = cell.trim();
    cell.parse::<i64>().ok().or_else(|| {
        cell.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && v.fract() == 0.0)
            .map(|v| v as i64)
    })
}

fn parse_reading(cell: &str) -> Result<f64> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    cell.parse::<f64>()
        .with_context(|| format!("Invalid numeric reading {:?}", cell))
}

/// Parse a recording from CSV text
pub fn parse_recording<R: Read>(participant: &str, reader: R, input: &InputConfig) -> Result<Recording> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(false)
        .from_reader(reader);
    let headers = csv_reader.headers().context("Failed to read CSV header")?.clone();

    let Some(timestamp_idx) = column_index(&headers, TIMESTAMP_COLUMN) else {
        bail!("Missing {} column", TIMESTAMP_COLUMN);
    };
    let Some(phase_idx) = column_index(&headers, PHASE_COLUMN) else {
        bail!("Missing {} column", PHASE_COLUMN);
    };

    let mut temperature_columns = Vec::with_capacity(input.temperature_channels.len());
    for name in &input.temperature_channels {
        let Some(idx) = column_index(&headers, name) else {
            bail!("Missing temperature column {}", name);
        };
        temperature_columns.push((name.clone(), idx));
    }

    let imu_columns: Vec<(String, usize)> = input
        .imu_channels
        .iter()
        .filter_map(|name| match column_index(&headers, name) {
            Some(idx) => Some((name.clone(), idx)),
            None => {
                tracing::debug!(participant, channel = %name, "IMU column not present");
                None
            }
        })
        .collect();

    let mut timestamps = Vec::new();
    let mut phase_ids: Vec<PhaseId> = Vec::new();
    let mut temperature_values = vec![Vec::new(); temperature_columns.len()];
    let mut imu_values = vec![Vec::new(); imu_columns.len()];

    for (row, record) in csv_reader.records().enumerate() {
        // Header is line 1
        let line = row + 2;
        let record = record.with_context(|| format!("Malformed CSV at line {}", line))?;
        let cell = |idx: usize| record.get(idx).unwrap_or("");

        let timestamp = parse_integer(cell(timestamp_idx))
            .with_context(|| format!("Invalid {} at line {}", TIMESTAMP_COLUMN, line))?;
        let phase = parse_integer(cell(phase_idx))
            .and_then(|v| PhaseId::try_from(v).ok())
            .with_context(|| format!("Invalid {} at line {}", PHASE_COLUMN, line))?;
        timestamps.push(timestamp);
        phase_ids.push(phase);

        for ((_, idx), values) in temperature_columns.iter().zip(temperature_values.iter_mut()) {
            let raw = parse_reading(cell(*idx)).with_context(|| format!("at line {}", line))?;
            let value = if input.zero_is_missing && raw == 0.0 {
                f64::NAN
            } else {
                raw / input.count_scale
            };
            values.push(value);
        }
        for ((_, idx), values) in imu_columns.iter().zip(imu_values.iter_mut()) {
            values.push(parse_reading(cell(*idx)).with_context(|| format!("at line {}", line))?);
        }
    }

    let channels = temperature_columns
        .into_iter()
        .zip(temperature_values)
        .chain(imu_columns.into_iter().zip(imu_values))
        .map(|((name, _), values)| Channel::new(name, values))
        .collect();

    Ok(Recording::new(participant, timestamps, phase_ids, channels)?)
}

/// Load one CSV recording file
pub fn load_recording(path: &Path, participant: &str, input: &InputConfig) -> Result<Recording> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open recording {}", path.display()))?;
    let recording = parse_recording(participant, file, input)
        .with_context(|| format!("Failed to load recording {}", path.display()))?;

    tracing::info!(
        participant,
        samples = recording.len(),
        channels = recording.channels().len(),
        "loaded {}",
        path.display()
    );
    Ok(recording)
}

/// Parse RR intervals, one integer millisecond value per line
pub fn parse_rr_intervals(text: &str) -> Result<Vec<f64>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            line.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v > 0.0)
                .with_context(|| format!("Invalid RR interval {:?} at line {}", line.trim(), i + 1))
        })
        .collect()
}

pub fn load_rr_intervals(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read RR file {}", path.display()))?;
    parse_rr_intervals(&text).with_context(|| format!("Failed to load RR file {}", path.display()))
}

/// Load every file found for one participant
///
/// Several CSV recordings are concatenated in file-name order.
pub fn load_participant(participant: &str, files: &ParticipantFiles, input: &InputConfig) -> Result<ParticipantInput> {
    let parts = files
        .recordings
        .iter()
        .map(|path| load_recording(path, participant, input))
        .collect::<Result<Vec<_>>>()?;

    let recording = match parts.len() {
        0 => None,
        1 => parts.into_iter().next(),
        _ => Some(
            Recording::concat(participant, &parts)
                .with_context(|| format!("Failed to join recordings of participant {}", participant))?,
        ),
    };

    let rr_intervals = files
        .rr_intervals
        .as_deref()
        .map(load_rr_intervals)
        .transpose()?;

    Ok(ParticipantInput {
        participant: participant.to_string(),
        recording,
        rr_intervals,
    })
}

/// Participant id from a file name, via the first capture group of `pattern`
pub fn participant_id(path: &Path, pattern: &Regex) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    pattern
        .captures(stem)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to read entry in {}", dir.display()))?
            .path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

/// Walk `dir` recursively and group `.csv` / `.txt` files by participant
///
/// Files whose name does not match `pattern` are skipped with a warning. A
/// participant may have several CSV recordings (they are concatenated by the
/// pipeline) but only one RR file.
pub fn discover(dir: &Path, pattern: &Regex) -> Result<BTreeMap<String, ParticipantFiles>> {
    if !dir.is_dir() {
        bail!("Data directory {} does not exist", dir.display());
    }

    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    files.sort();

    let mut participants: BTreeMap<String, ParticipantFiles> = BTreeMap::new();
    for path in files {
        let is_csv = has_extension(&path, "csv");
        let is_txt = has_extension(&path, "txt");
        if !is_csv && !is_txt {
            continue;
        }

        let Some(id) = participant_id(&path, pattern) else {
            tracing::warn!("Skipping {}: no participant id in file name", path.display());
            continue;
        };

        let entry = participants.entry(id.clone()).or_default();
        if is_csv {
            entry.recordings.push(path);
        } else if let Some(existing) = &entry.rr_intervals {
            tracing::warn!(
                participant = %id,
                "Ignoring {}: RR file {} already found",
                path.display(),
                existing.display()
            );
        } else {
            entry.rr_intervals = Some(path);
        }
    }

    tracing::info!(participants = participants.len(), "discovered study files in {}", dir.display());
    Ok(participants)
}
