// Reference series and per-channel calibration sets
//
// A calibration needs something to calibrate against:
// - the per-sample mean across the recording's own temperature channels, or
// - a ground-truth thermometer reading taken for the participant.
//
// `CalibrationSet` holds one fit per channel. Channels whose fit failed are
// kept as explicit failures so that applying the set never passes uncalibrated
// readings off as calibrated ones.

use super::fit::{apply, fit, CalibrationFit, FitKind};
use super::selection::{evaluate_methods, select_best, MethodEvaluation};
use crate::error::{AnalysisError, Result};
use crate::recording::{Channel, Recording};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a channel is calibrated against
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CalibrationReference {
    /// NaN-omitting mean across the calibrated channels at each sample
    ChannelMean,
    /// Constant reference temperature in °C
    GroundTruth(f64),
}

/// How the fit kind for each channel is chosen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "kinds", rename_all = "snake_case")]
pub enum FitStrategy {
    Fixed(FitKind),
    /// Lowest mean absolute error among the listed kinds
    BestOf(Vec<FitKind>),
}

impl Default for FitStrategy {
    fn default() -> Self {
        FitStrategy::Fixed(FitKind::Constant)
    }
}

impl FitStrategy {
    /// Every kind this strategy may fit
    pub fn kinds(&self) -> &[FitKind] {
        match self {
            FitStrategy::Fixed(kind) => std::slice::from_ref(kind),
            FitStrategy::BestOf(kinds) => kinds,
        }
    }

    fn fit_channel(&self, raw: &[f64], reference: &[f64]) -> Result<CalibrationFit> {
        match self {
            FitStrategy::Fixed(kind) => fit(raw, reference, *kind),
            FitStrategy::BestOf(kinds) => select_best(raw, reference, kinds).map(|best| best.fit),
        }
    }
}

/// Build the reference series for a recording
///
/// With `ChannelMean` the listed channels must all be present; a sample where
/// every channel is NaN yields NaN.
pub fn reference_series(
    recording: &Recording,
    channels: &[String],
    reference: &CalibrationReference,
) -> Result<Vec<f64>> {
    match reference {
        CalibrationReference::GroundTruth(value) => {
            if !value.is_finite() {
                return Err(AnalysisError::InvalidParameter(format!(
                    "ground truth temperature must be finite, got {}",
                    value
                )));
            }
            Ok(vec![*value; recording.len()])
        }
        CalibrationReference::ChannelMean => {
            if channels.is_empty() {
                return Err(AnalysisError::InvalidParameter(
                    "channel mean reference needs at least one channel".to_string(),
                ));
            }
            let columns = channels
                .iter()
                .map(|name| recording.values(name))
                .collect::<Result<Vec<_>>>()?;

            Ok((0..recording.len())
                .map(|i| {
                    let (sum, count) = columns
                        .iter()
                        .map(|column| column[i])
                        .filter(|v| !v.is_nan())
                        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
                    if count == 0 {
                        f64::NAN
                    } else {
                        sum / count as f64
                    }
                })
                .collect())
        }
    }
}

/// Per-channel calibration fits
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CalibrationSet {
    pub fits: BTreeMap<String, CalibrationFit>,
    /// Channels that could not be fitted
    pub failures: BTreeMap<String, AnalysisError>,
    /// Every candidate kind scored across the channels; pooled fits only
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<MethodEvaluation>,
}

impl CalibrationSet {
    /// Fit every channel of one recording against its own reference
    pub fn fit_recording(
        recording: &Recording,
        channels: &[String],
        reference: &CalibrationReference,
        strategy: &FitStrategy,
    ) -> Result<Self> {
        let reference_values = reference_series(recording, channels, reference)?;
        let set = Self::fit_channels(recording, channels, &reference_values, strategy)?;

        tracing::debug!(
            participant = recording.participant(),
            fitted = set.fits.len(),
            failed = set.failures.len(),
            "fitted calibration"
        );
        Ok(set)
    }

    /// Fit on several recordings concatenated into one calibration dataset
    ///
    /// Each part brings its own reference, so ground-truth readings can differ
    /// per participant.
    pub fn fit_pooled(
        parts: &[(Recording, CalibrationReference)],
        channels: &[String],
        strategy: &FitStrategy,
    ) -> Result<Self> {
        let mut reference_values = Vec::new();
        for (recording, reference) in parts {
            reference_values.extend(reference_series(recording, channels, reference)?);
        }

        let recordings: Vec<Recording> = parts.iter().map(|(r, _)| r.clone()).collect();
        let pooled = Recording::concat("pooled", &recordings)?;
        let mut set = Self::fit_channels(&pooled, channels, &reference_values, strategy)?;
        set.methods = evaluate_methods(&pooled, channels, &reference_values, strategy.kinds())?;

        tracing::info!(
            recordings = parts.len(),
            samples = pooled.len(),
            fitted = set.fits.len(),
            "fitted pooled calibration"
        );
        Ok(set)
    }

    fn fit_channels(
        recording: &Recording,
        channels: &[String],
        reference_values: &[f64],
        strategy: &FitStrategy,
    ) -> Result<Self> {
        let mut set = Self::default();
        for name in channels {
            let raw = recording.values(name)?;
            match strategy.fit_channel(raw, reference_values) {
                Ok(fitted) => {
                    set.fits.insert(name.clone(), fitted);
                }
                Err(e) => {
                    tracing::warn!(channel = %name, error = %e, "calibration fit failed");
                    set.failures.insert(name.clone(), e);
                }
            }
        }
        Ok(set)
    }

    pub fn get(&self, channel: &str) -> Option<&CalibrationFit> {
        self.fits.get(channel)
    }

    /// Calibrated copy of `recording`
    ///
    /// Fitted channels are replaced by their calibrated values, failed channels
    /// by NaN. Channels the set knows nothing about are carried over as-is.
    pub fn apply_to(&self, recording: &Recording) -> Result<Recording> {
        let mut replacements = Vec::new();
        for (name, fitted) in &self.fits {
            if let Some(channel) = recording.channel(name) {
                replacements.push(Channel::new(name.clone(), apply(fitted, &channel.values)));
            }
        }
        for name in self.failures.keys() {
            if recording.channel(name).is_some() {
                replacements.push(Channel::new(name.clone(), vec![f64::NAN; recording.len()]));
            }
        }
        recording.with_channels(replacements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn two_channel_recording(participant: &str, offset: f64) -> Recording {
        Recording::new(
            participant,
            (0..10).map(|i| i * 100).collect(),
            vec![1; 10],
            vec![
                Channel::new("Concha", (0..10).map(|i| 35.0 + offset + i as f64 * 0.1).collect()),
                Channel::new("EarCanal", (0..10).map(|i| 36.0 + offset + i as f64 * 0.1).collect()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_channel_mean_reference() {
        let rec = two_channel_recording("01", 0.0);
        let reference = reference_series(&rec, &names(&["Concha", "EarCanal"]), &CalibrationReference::ChannelMean).unwrap();
        assert!((reference[0] - 35.5).abs() < 1e-12);
        assert!((reference[9] - 36.4).abs() < 1e-12);
    }

    #[test]
    fn test_channel_mean_skips_nan_channels() {
        let rec = Recording::new(
            "01",
            vec![0, 1],
            vec![1, 1],
            vec![
                Channel::new("A", vec![f64::NAN, f64::NAN]),
                Channel::new("B", vec![36.0, f64::NAN]),
            ],
        )
        .unwrap();
        let reference = reference_series(&rec, &names(&["A", "B"]), &CalibrationReference::ChannelMean).unwrap();
        assert_eq!(reference[0], 36.0);
        assert!(reference[1].is_nan());
    }

    #[test]
    fn test_ground_truth_reference_is_constant() {
        let rec = two_channel_recording("01", 0.0);
        let reference = reference_series(&rec, &[], &CalibrationReference::GroundTruth(36.4)).unwrap();
        assert_eq!(reference.len(), 10);
        assert!(reference.iter().all(|v| *v == 36.4));
    }

    #[test]
    fn test_constant_calibration_moves_channels_onto_channel_mean() {
        let rec = two_channel_recording("01", 0.0);
        let channels = names(&["Concha", "EarCanal"]);
        let set = CalibrationSet::fit_recording(
            &rec,
            &channels,
            &CalibrationReference::ChannelMean,
            &FitStrategy::Fixed(FitKind::Constant),
        )
        .unwrap();

        assert!((set.get("Concha").unwrap().offset().unwrap() - 0.5).abs() < 1e-9);
        assert!((set.get("EarCanal").unwrap().offset().unwrap() + 0.5).abs() < 1e-9);

        let calibrated = set.apply_to(&rec).unwrap();
        let concha = calibrated.values("Concha").unwrap();
        let ear_canal = calibrated.values("EarCanal").unwrap();
        for (a, b) in concha.iter().zip(ear_canal) {
            assert!((a - b).abs() < 1e-9);
        }
        // Raw copy is untouched.
        assert_eq!(rec.values("Concha").unwrap()[0], 35.0);
    }

    #[test]
    fn test_failed_channel_becomes_nan() {
        let rec = Recording::new(
            "01",
            vec![0, 1],
            vec![1, 1],
            vec![
                Channel::new("A", vec![36.0, 36.2]),
                Channel::new("B", vec![f64::NAN, f64::NAN]),
            ],
        )
        .unwrap();
        let set = CalibrationSet::fit_recording(
            &rec,
            &names(&["A", "B"]),
            &CalibrationReference::GroundTruth(36.5),
            &FitStrategy::Fixed(FitKind::Constant),
        )
        .unwrap();

        assert!(set.failures.contains_key("B"));
        let calibrated = set.apply_to(&rec).unwrap();
        assert!(calibrated.values("B").unwrap().iter().all(|v| v.is_nan()));
        let a = calibrated.values("A").unwrap();
        assert!(((a[0] + a[1]) / 2.0 - 36.5).abs() < 1e-9);
    }

    #[test]
    fn test_pooled_fit_uses_all_parts() {
        let parts = vec![
            (two_channel_recording("01", 0.0), CalibrationReference::GroundTruth(36.4)),
            (two_channel_recording("02", 0.5), CalibrationReference::GroundTruth(36.5)),
        ];
        let set = CalibrationSet::fit_pooled(
            &parts,
            &names(&["Concha"]),
            &FitStrategy::Fixed(FitKind::Constant),
        )
        .unwrap();

        let fitted = set.get("Concha").unwrap();
        assert_eq!(fitted.samples(), 20);
        // mean(reference) = 36.45, mean(raw) = 35.45 + 0.25
        assert!((fitted.offset().unwrap() - 0.75).abs() < 1e-9);
        assert_eq!(set.methods.len(), 1);
        assert_eq!(set.methods[0].kind, FitKind::Constant);
    }

    #[test]
    fn test_pooled_fit_scores_every_candidate() {
        let parts = vec![
            (two_channel_recording("01", 0.0), CalibrationReference::ChannelMean),
            (two_channel_recording("02", 0.5), CalibrationReference::ChannelMean),
        ];
        let set = CalibrationSet::fit_pooled(
            &parts,
            &names(&["Concha", "EarCanal"]),
            &FitStrategy::BestOf(vec![FitKind::Constant, FitKind::Linear]),
        )
        .unwrap();

        let kinds: Vec<FitKind> = set.methods.iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![FitKind::Constant, FitKind::Linear]);
        assert!(set.methods.iter().all(|m| m.channels == 2));
        // Channels are the reference shifted by ±0.5, so both kinds are exact
        assert!(set.methods.iter().all(|m| m.mae_mean < 1e-9));
        assert!((set.methods[1].correlation.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_strategy_kinds() {
        assert_eq!(FitStrategy::Fixed(FitKind::Linear).kinds(), &[FitKind::Linear]);
        let best = FitStrategy::BestOf(FitKind::study_candidates());
        assert_eq!(best.kinds(), FitKind::study_candidates().as_slice());
    }

    #[test]
    fn test_best_of_strategy() {
        let rec = two_channel_recording("01", 0.0);
        let set = CalibrationSet::fit_recording(
            &rec,
            &names(&["Concha", "EarCanal"]),
            &CalibrationReference::ChannelMean,
            &FitStrategy::BestOf(vec![FitKind::Constant, FitKind::Linear]),
        )
        .unwrap();
        assert_eq!(set.fits.len(), 2);
    }

    #[test]
    fn test_missing_channel_is_error() {
        let rec = two_channel_recording("01", 0.0);
        let result = CalibrationSet::fit_recording(
            &rec,
            &names(&["Out_Top"]),
            &CalibrationReference::ChannelMean,
            &FitStrategy::default(),
        );
        assert!(matches!(result, Err(AnalysisError::MissingData(_))));
    }
}
