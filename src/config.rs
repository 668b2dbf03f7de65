//! Study configuration
//!
//! Everything that varies between study variants lives here rather than in
//! code: channel sets, smoothing window, calibration reference and fit kinds,
//! phase selection, phase comparisons, and the per-participant lookup tables
//! (ground-truth temperature, "mm:ss" phase markers, reference HRV indices).
//!
//! Loaded from TOML; every section has defaults so a config file only needs to
//! state what differs.

use crate::aggregate::{ComparisonTest, Metric};
use crate::calibration::{CalibrationReference, FitKind, FitStrategy};
use crate::segmentation::{parse_marker, Marker};
use crate::smoothing::WindowSpec;
use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const STUDY1_TEMPERATURE_CHANNELS: [&str; 6] = [
    "TympanicMembrane",
    "Concha",
    "EarCanal",
    "Out_Bottom",
    "Out_Top",
    "Out_Middle",
];

pub const STUDY1_IMU_CHANNELS: [&str; 9] = [
    "ACC_X", "ACC_Y", "ACC_Z", "GYRO_X", "GYRO_Y", "GYRO_Z", "MAG_X", "MAG_Y", "MAG_Z",
];

fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Input file layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Temperature columns; required in every recording
    pub temperature_channels: Vec<String>,

    /// IMU columns; loaded when present, never scaled
    pub imu_channels: Vec<String>,

    /// Raw temperature counts are divided by this to get °C
    pub count_scale: f64,

    /// Treat a raw reading of exactly 0 as a missing sample
    pub zero_is_missing: bool,

    /// Regex applied to the file stem; the first capture group is the participant id
    pub participant_pattern: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            temperature_channels: strings(&STUDY1_TEMPERATURE_CHANNELS),
            imu_channels: strings(&STUDY1_IMU_CHANNELS),
            count_scale: 100.0,
            zero_is_missing: true,
            participant_pattern: r"_(\d+)$".to_string(),
        }
    }
}

/// What the per-participant calibration is fitted against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSource {
    ChannelMean,
    /// Participant's entry in `ground_truth`
    GroundTruth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub enabled: bool,
    pub reference: ReferenceSource,

    /// Candidate kinds; with `select_best = false` only the first is used
    pub kinds: Vec<FitKind>,

    /// Pick the lowest mean-absolute-error kind per channel
    pub select_best: bool,

    /// Pooled calibration window: total samples / this
    pub pooled_window_divisor: usize,

    /// Pooled calibration min periods: total samples / this
    pub pooled_min_periods_divisor: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reference: ReferenceSource::ChannelMean,
            kinds: vec![FitKind::Constant],
            select_best: false,
            pooled_window_divisor: 50,
            pooled_min_periods_divisor: 200,
        }
    }
}

impl CalibrationConfig {
    pub fn strategy(&self) -> FitStrategy {
        match (self.select_best, self.kinds.first()) {
            (true, _) => FitStrategy::BestOf(self.kinds.clone()),
            (false, Some(kind)) => FitStrategy::Fixed(*kind),
            (false, None) => FitStrategy::default(),
        }
    }
}

/// How recordings are split into phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segmentation {
    /// By the phase-id column; phase `n` is named `phase_n`
    Label,
    /// By the participant's entry in `markers`
    Markers,
}

/// Comparison between two phases across participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSpec {
    #[serde(default = "default_metric")]
    pub metric: Metric,
    pub phase_a: String,
    pub phase_b: String,
    #[serde(default)]
    pub test: ComparisonTest,
    /// Channels to compare; empty means every temperature channel plus the sensor mean
    #[serde(default)]
    pub channels: Vec<String>,
}

fn default_metric() -> Metric {
    Metric::Mean
}

/// Temperature sensors behind the ear and inside the ear
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorGroups {
    pub behind_ear: Vec<String>,
    pub in_ear: Vec<String>,
}

impl Default for SensorGroups {
    fn default() -> Self {
        Self {
            behind_ear: strings(&["Out_Bottom", "Out_Top", "Out_Middle"]),
            in_ear: strings(&["TympanicMembrane", "Concha", "EarCanal"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Family-wise significance level before Bonferroni correction
    pub significance_level: f64,

    pub segmentation: Segmentation,

    /// Phase ids to summarise with label segmentation; empty means all
    pub labels: Vec<i32>,

    /// Spearman correlation of relative change between every temperature sensor pair
    pub sensor_correlations: bool,

    /// Per phase: group means, each in-ear sensor against the behind-the-ear
    /// mean, and an ANOVA across all of them
    pub sensor_groups: Option<SensorGroups>,

    /// IMU movement magnitude per phase and its correlation with temperature change
    pub movement: bool,

    /// Phase whose temperatures are correlated with the RR intervals; the RR
    /// series is taken to start at that phase's first sample
    pub hrv_temperature_phase: Option<String>,

    pub comparisons: Vec<ComparisonSpec>,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            significance_level: 0.05,
            segmentation: Segmentation::Label,
            labels: Vec::new(),
            sensor_correlations: false,
            sensor_groups: None,
            movement: false,
            hrv_temperature_phase: None,
            comparisons: Vec::new(),
        }
    }
}

/// HRV phase between two named markers of the RR series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HrvPhaseSpec {
    pub name: String,
    pub start: String,
    pub end: String,
}

/// Reference indices exported by an external HRV tool for one phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceIndices {
    pub pns_index: Option<f64>,
    pub sns_index: Option<f64>,
    pub stress_index: Option<f64>,
    pub mean_rr: Option<f64>,
    pub mean_hr: Option<f64>,
}

/// Complete study configuration
///
/// # Example
/// ```
/// use earstudy::config::StudyConfig;
///
/// let config = StudyConfig::default();
/// assert_eq!(config.statistics.significance_level, 0.05);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    pub input: InputConfig,
    pub smoothing: WindowSpec,
    pub calibration: CalibrationConfig,
    pub statistics: StatisticsConfig,

    /// HRV phases computed from each participant's RR file
    pub hrv_phases: Vec<HrvPhaseSpec>,

    /// Participant id → ground-truth temperature (°C)
    pub ground_truth: BTreeMap<String, f64>,

    /// Participant id → ordered "mm:ss" markers
    pub markers: BTreeMap<String, Vec<Marker>>,

    /// Participant id → phase name → reference indices
    pub reference_indices: BTreeMap<String, BTreeMap<String, ReferenceIndices>>,

    /// Process participants in parallel
    pub parallel: bool,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            input: InputConfig::default(),
            // 120-sample trailing mean, partial windows allowed
            smoothing: WindowSpec::trailing(120).with_min_periods(1),
            calibration: CalibrationConfig::default(),
            statistics: StatisticsConfig::default(),
            hrv_phases: Vec::new(),
            ground_truth: BTreeMap::new(),
            markers: BTreeMap::new(),
            reference_indices: BTreeMap::new(),
            parallel: true,
        }
    }
}

impl StudyConfig {
    /// First study: six ear sensors, phases 2 and 3 compared, degree chosen by MAE
    pub fn temperature_study() -> Self {
        Self {
            calibration: CalibrationConfig {
                kinds: FitKind::study_candidates(),
                select_best: true,
                ..CalibrationConfig::default()
            },
            statistics: StatisticsConfig {
                labels: vec![1, 2, 3, 4],
                sensor_correlations: true,
                sensor_groups: Some(SensorGroups::default()),
                movement: true,
                comparisons: vec![
                    ComparisonSpec {
                        metric: Metric::Mean,
                        phase_a: "phase_2".to_string(),
                        phase_b: "phase_3".to_string(),
                        test: ComparisonTest::Paired,
                        channels: Vec::new(),
                    },
                    // Indoor and outdoor variability as two groups
                    ComparisonSpec {
                        metric: Metric::Variance,
                        phase_a: "phase_2".to_string(),
                        phase_b: "phase_3".to_string(),
                        test: ComparisonTest::Independent,
                        channels: Vec::new(),
                    },
                ],
                ..StatisticsConfig::default()
            },
            ..Self::default()
        }
    }

    /// Stress study: marker phases, HRV from RR files, ground-truth calibration
    pub fn stress_study() -> Self {
        let hrv_phase = |name: &str, start: &str| HrvPhaseSpec {
            name: name.to_string(),
            start: start.to_string(),
            end: "stress_end".to_string(),
        };
        Self {
            calibration: CalibrationConfig {
                reference: ReferenceSource::GroundTruth,
                ..CalibrationConfig::default()
            },
            statistics: StatisticsConfig {
                segmentation: Segmentation::Markers,
                ..StatisticsConfig::default()
            },
            hrv_phases: vec![
                hrv_phase("whole", "start_sitting"),
                hrv_phase("stress", "stroop_start"),
                hrv_phase("math", "math_start"),
            ],
            ..Self::default()
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text).context("Failed to parse study configuration")?;
        config.validate().map_err(|e| anyhow::anyhow!(e))?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn participant_regex(&self) -> Result<Regex, String> {
        let regex = Regex::new(&self.input.participant_pattern)
            .map_err(|e| format!("participant_pattern is not a valid regex: {}", e))?;
        if regex.captures_len() < 2 {
            return Err("participant_pattern needs a capture group for the participant id".to_string());
        }
        Ok(regex)
    }

    /// Calibration reference for one participant
    pub fn reference_for(&self, participant: &str) -> Option<CalibrationReference> {
        match self.calibration.reference {
            ReferenceSource::ChannelMean => Some(CalibrationReference::ChannelMean),
            ReferenceSource::GroundTruth => self
                .ground_truth
                .get(participant)
                .map(|t| CalibrationReference::GroundTruth(*t)),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(self.statistics.significance_level > 0.0 && self.statistics.significance_level < 1.0) {
            return Err(format!(
                "significance_level must be in (0, 1), got {}",
                self.statistics.significance_level
            ));
        }

        if self.input.temperature_channels.is_empty() {
            return Err("temperature_channels must not be empty".to_string());
        }

        if !(self.input.count_scale.is_finite() && self.input.count_scale > 0.0) {
            return Err(format!(
                "count_scale must be positive, got {}",
                self.input.count_scale
            ));
        }

        self.participant_regex()?;
        self.smoothing.validate().map_err(|e| e.to_string())?;

        if self.calibration.enabled && self.calibration.kinds.is_empty() {
            return Err("calibration.kinds must list at least one fit kind".to_string());
        }

        // A ground-truth reference is one constant per participant; any fit
        // with a slope maps every reading onto it and flattens the signal.
        if self.calibration.enabled && self.calibration.reference == ReferenceSource::GroundTruth {
            if let Some(kind) = self.calibration.kinds.iter().find(|k| **k != FitKind::Constant) {
                return Err(format!(
                    "calibration kind {} needs a varying reference; ground_truth only supports constant",
                    String::from(*kind)
                ));
            }
        }

        if self.calibration.pooled_window_divisor == 0 || self.calibration.pooled_min_periods_divisor == 0 {
            return Err("pooled calibration divisors must be >= 1".to_string());
        }

        for (participant, markers) in &self.markers {
            for marker in markers {
                parse_marker(&marker.at)
                    .map_err(|e| format!("marker {} of participant {}: {}", marker.name, participant, e))?;
            }
        }

        if let Some(groups) = &self.statistics.sensor_groups {
            if groups.behind_ear.is_empty() || groups.in_ear.is_empty() {
                return Err("sensor_groups needs at least one behind_ear and one in_ear channel".to_string());
            }
            if let Some(name) = groups
                .behind_ear
                .iter()
                .chain(&groups.in_ear)
                .find(|name| !self.input.temperature_channels.contains(name))
            {
                return Err(format!("sensor group channel {} is not a temperature channel", name));
            }
        }

        if self.statistics.movement && self.input.imu_channels.is_empty() {
            return Err("movement statistics need imu_channels".to_string());
        }

        for comparison in &self.statistics.comparisons {
            if comparison.phase_a == comparison.phase_b {
                return Err(format!(
                    "comparison of {} against itself",
                    comparison.phase_a
                ));
            }
        }

        Ok(())
    }
}
