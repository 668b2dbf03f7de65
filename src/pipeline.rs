//! Per-participant analysis pipeline
//!
//! raw recording -> smoothed -> calibrated -> phases -> ParticipantStatistics
//!
//! Each stage receives its input explicitly and returns a new value; nothing is
//! stashed on the pipeline between calls. Participants are independent, so the
//! batch is mapped in parallel with rayon and reduced by the (order-independent)
//! aggregator afterwards.

use crate::aggregate::{
    aggregate, compare, AggregateResult, Metric, ParticipantStatistics, PhaseComparison, StatKey,
};
use crate::calibration::CalibrationSet;
use crate::config::{ReferenceIndices, Segmentation, StudyConfig};
use crate::error::AnalysisError;
use crate::phase_analyses::{
    ground_truth_offsets, movement_statistics, rr_temperature_correlation, sensor_group_statistics,
};
use crate::recording::Recording;
use crate::segmentation::{segment_by_label, segment_by_markers, slice_label, slice_recording, Phase};
use crate::smoothing::{smooth_recording, WindowSpec};
use crate::statistics::{describe, hrv_between, relative_change, rr_between, spearman, spectral_ratio};
use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;

/// Channel name under which the across-sensor mean is recorded
pub const SENSOR_MEAN_CHANNEL: &str = "sensor_mean";

/// Channel name for HRV metrics computed from RR files
pub const RR_CHANNEL: &str = "rr";

/// Channel name for externally supplied reference indices
pub const REFERENCE_CHANNEL: &str = "reference";

/// A raw recording after smoothing and calibration
#[derive(Debug, Clone)]
pub struct PreparedRecording {
    /// Smoothed, not calibrated
    pub smoothed: Recording,
    pub calibrated: Recording,
    pub calibration: Option<CalibrationSet>,
}

/// Everything loaded for one participant
#[derive(Debug, Clone)]
pub struct ParticipantInput {
    pub participant: String,
    pub recording: Option<Recording>,
    pub rr_intervals: Option<Vec<f64>>,
}

/// Per-participant result kept for reporting
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantOutcome {
    pub participant: String,
    pub samples: usize,
    pub phases: Vec<Phase>,
    pub calibration: Option<CalibrationSet>,
    #[serde(skip)]
    pub statistics: ParticipantStatistics,
}

/// Participant that could not be analysed at all
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantFailure {
    pub participant: String,
    pub error: String,
}

/// Result of a full study run
#[derive(Debug, Clone, Serialize)]
pub struct StudyOutcome {
    pub participants: Vec<ParticipantOutcome>,
    pub failures: Vec<ParticipantFailure>,
    pub pooled_calibration: Option<CalibrationSet>,
    pub aggregate: AggregateResult,
}

impl StudyOutcome {
    /// Add participants that failed before the pipeline ran (e.g. while loading)
    pub fn record_failures(&mut self, failures: Vec<ParticipantFailure>) {
        self.failures.extend(failures);
        self.failures.sort_by(|a, b| a.participant.cmp(&b.participant));
    }
}

pub struct Pipeline<'a> {
    config: &'a StudyConfig,
    pooled: Option<CalibrationSet>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a StudyConfig) -> Self {
        Self {
            config,
            pooled: None,
        }
    }

    /// Apply one pooled calibration to every participant instead of fitting per recording
    pub fn with_pooled_calibration(mut self, calibration: CalibrationSet) -> Self {
        self.pooled = Some(calibration);
        self
    }

    fn temperature_channels(&self) -> &[String] {
        &self.config.input.temperature_channels
    }

    /// Smoothed and calibrated copies of a raw recording plus the fits used
    pub fn prepare(&self, raw: &Recording) -> Result<PreparedRecording> {
        let smoothed = smooth_recording(raw, self.temperature_channels(), &self.config.smoothing)
            .context("Smoothing failed")?;

        if !self.config.calibration.enabled {
            return Ok(PreparedRecording {
                calibrated: smoothed.clone(),
                smoothed,
                calibration: None,
            });
        }

        let calibration = match &self.pooled {
            Some(pooled) => pooled.clone(),
            None => {
                let reference = self.config.reference_for(raw.participant()).with_context(|| {
                    format!("No ground-truth temperature for participant {}", raw.participant())
                })?;
                CalibrationSet::fit_recording(
                    &smoothed,
                    self.temperature_channels(),
                    &reference,
                    &self.config.calibration.strategy(),
                )
                .context("Calibration failed")?
            }
        };

        let calibrated = calibration
            .apply_to(&smoothed)
            .context("Applying calibration failed")?;
        Ok(PreparedRecording {
            smoothed,
            calibrated,
            calibration: Some(calibration),
        })
    }

    /// Phases to summarise, paired with their samples
    fn phase_slices(&self, recording: &Recording) -> Result<(Vec<Phase>, Vec<(String, Recording)>)> {
        match self.config.statistics.segmentation {
            Segmentation::Label => {
                let runs = segment_by_label(recording);
                let labels: BTreeSet<i32> = if self.config.statistics.labels.is_empty() {
                    runs.iter().filter_map(|p| p.label).collect()
                } else {
                    self.config.statistics.labels.iter().copied().collect()
                };
                let slices = labels
                    .into_iter()
                    .map(|label| (format!("phase_{}", label), slice_label(recording, label)))
                    .collect();
                Ok((runs, slices))
            }
            Segmentation::Markers => {
                let markers = self
                    .config
                    .markers
                    .get(recording.participant())
                    .with_context(|| format!("No phase markers for participant {}", recording.participant()))?;
                let phases = segment_by_markers(recording, markers).context("Marker segmentation failed")?;
                let slices = phases
                    .iter()
                    .map(|phase| (phase.name.clone(), slice_recording(recording, phase)))
                    .collect();
                Ok((phases, slices))
            }
        }
    }

    fn summarise_phase(&self, stats: &mut ParticipantStatistics, phase: &str, slice: &Recording) {
        let mut channel_means = Vec::new();

        for channel in self.temperature_channels() {
            let summary = if slice.is_empty() {
                Err(AnalysisError::MissingData(format!("phase {} has no samples", phase)))
            } else {
                slice.values(channel).and_then(describe)
            };
            if let Ok(s) = &summary {
                channel_means.push(s.mean);
            }
            stats.insert_summary(channel, phase, &summary);
        }

        // Participant-level temperature: mean of the per-sensor phase means
        let sensor_mean = describe(&channel_means).map(|s| s.mean);
        stats.insert(StatKey::new(Metric::Mean, SENSOR_MEAN_CHANNEL, phase), sensor_mean);

        if self.config.statistics.sensor_correlations {
            let channels = self.temperature_channels();
            for (i, a) in channels.iter().enumerate() {
                for b in &channels[i + 1..] {
                    let value = slice.values(a).and_then(|va| {
                        let vb = slice.values(b)?;
                        spearman(&relative_change(va), &relative_change(vb))
                    });
                    stats.insert(
                        StatKey::new(Metric::Spearman, format!("{}~{}", a, b), phase),
                        value,
                    );
                }
            }
        }

        if let Some(groups) = &self.config.statistics.sensor_groups {
            sensor_group_statistics(stats, phase, slice, groups);
        }

        if self.config.statistics.movement {
            movement_statistics(
                stats,
                phase,
                slice,
                &self.config.input.imu_channels,
                self.temperature_channels(),
            );
        }
    }

    fn summarise_rr(&self, stats: &mut ParticipantStatistics, participant: &str, rr: &[f64]) {
        let markers = self.config.markers.get(participant);

        for spec in &self.config.hrv_phases {
            let key = |metric| StatKey::new(metric, RR_CHANNEL, spec.name.as_str());
            let Some(markers) = markers else {
                let missing = AnalysisError::MissingData(format!("no markers for participant {}", participant));
                for metric in [Metric::Sdnn, Metric::Rmssd, Metric::MeanRr, Metric::MeanHr, Metric::LfHf] {
                    stats.insert(key(metric), Err(missing.clone()));
                }
                continue;
            };

            let summary = hrv_between(rr, markers, &spec.start, &spec.end);
            let entries = [
                (Metric::Sdnn, summary.as_ref().map(|s| s.sdnn)),
                (Metric::Rmssd, summary.as_ref().map(|s| s.rmssd)),
                (Metric::MeanRr, summary.as_ref().map(|s| s.mean_rr)),
                (Metric::MeanHr, summary.as_ref().map(|s| s.mean_hr)),
            ];
            for (metric, value) in entries {
                stats.insert(key(metric), value.map_err(Clone::clone));
            }

            let lf_hf = rr_between(rr, markers, &spec.start, &spec.end).and_then(spectral_ratio);
            if let Err(e) = &lf_hf {
                tracing::warn!(participant, phase = %spec.name, error = %e, "no LF/HF ratio");
            }
            stats.insert(key(Metric::LfHf), lf_hf);
        }
    }

    fn insert_reference_indices(&self, stats: &mut ParticipantStatistics, participant: &str) {
        let Some(phases) = self.config.reference_indices.get(participant) else {
            return;
        };
        for (phase, indices) in phases {
            let ReferenceIndices {
                pns_index,
                sns_index,
                stress_index,
                mean_rr,
                mean_hr,
            } = *indices;
            let entries = [
                (Metric::PnsIndex, pns_index),
                (Metric::SnsIndex, sns_index),
                (Metric::StressIndex, stress_index),
                (Metric::MeanRr, mean_rr),
                (Metric::MeanHr, mean_hr),
            ];
            for (metric, value) in entries {
                if let Some(value) = value {
                    stats.insert(StatKey::new(metric, REFERENCE_CHANNEL, phase.as_str()), Ok(value));
                }
            }
        }
    }

    /// Run every stage for one participant
    pub fn run_participant(&self, input: &ParticipantInput) -> Result<ParticipantOutcome> {
        if input.recording.is_none() && input.rr_intervals.is_none() {
            anyhow::bail!("No recording or RR file for participant {}", input.participant);
        }

        let mut stats = ParticipantStatistics::new(input.participant.clone());
        let mut outcome_phases = Vec::new();
        let mut calibration = None;
        let mut samples = 0;

        if let Some(raw) = &input.recording {
            samples = raw.len();
            let prepared = self.prepare(raw)?;

            let (phases, slices) = self.phase_slices(&prepared.calibrated)?;
            for (name, slice) in &slices {
                if slice.is_empty() {
                    tracing::warn!(participant = %input.participant, phase = %name, "phase has no samples");
                }
                self.summarise_phase(&mut stats, name, slice);
            }

            if let Some(&ground_truth) = self.config.ground_truth.get(&input.participant) {
                let (_, uncalibrated) = self.phase_slices(&prepared.smoothed)?;
                for (name, slice) in &uncalibrated {
                    ground_truth_offsets(&mut stats, name, slice, self.temperature_channels(), ground_truth);
                }
            }

            if let (Some(phase), Some(rr)) = (&self.config.statistics.hrv_temperature_phase, &input.rr_intervals) {
                let slice = slices.iter().find(|(name, _)| name == phase).map(|(_, slice)| slice);
                rr_temperature_correlation(&mut stats, phase, slice, rr, self.temperature_channels(), RR_CHANNEL);
            }

            outcome_phases = phases;
            calibration = prepared.calibration;
        }

        if let Some(rr) = &input.rr_intervals {
            self.summarise_rr(&mut stats, &input.participant, rr);
        }

        self.insert_reference_indices(&mut stats, &input.participant);

        tracing::info!(
            participant = %input.participant,
            statistics = stats.values.len(),
            "participant analysed"
        );

        Ok(ParticipantOutcome {
            participant: input.participant.clone(),
            samples,
            phases: outcome_phases,
            calibration,
            statistics: stats,
        })
    }

    fn comparisons(&self, stats: &[ParticipantStatistics]) -> Vec<PhaseComparison> {
        let mut comparisons = Vec::new();
        for spec in &self.config.statistics.comparisons {
            let channels: Vec<String> = if spec.channels.is_empty() {
                self.temperature_channels()
                    .iter()
                    .cloned()
                    .chain(std::iter::once(SENSOR_MEAN_CHANNEL.to_string()))
                    .collect()
            } else {
                spec.channels.clone()
            };
            for channel in &channels {
                comparisons.push(compare(stats, spec.test, spec.metric, channel, &spec.phase_a, &spec.phase_b));
            }
        }
        comparisons
    }

    /// Analyse every participant and aggregate
    ///
    /// A participant that fails is reported in `failures`; the rest of the
    /// batch continues.
    pub fn run(&self, inputs: &[ParticipantInput]) -> StudyOutcome {
        let results: Vec<(String, Result<ParticipantOutcome>)> = if self.config.parallel {
            inputs
                .par_iter()
                .map(|input| (input.participant.clone(), self.run_participant(input)))
                .collect()
        } else {
            inputs
                .iter()
                .map(|input| (input.participant.clone(), self.run_participant(input)))
                .collect()
        };

        let mut participants = Vec::new();
        let mut failures = Vec::new();
        for (participant, result) in results {
            match result {
                Ok(outcome) => participants.push(outcome),
                Err(e) => {
                    tracing::warn!(participant = %participant, "participant failed: {:#}", e);
                    failures.push(ParticipantFailure {
                        participant,
                        error: format!("{:#}", e),
                    });
                }
            }
        }
        participants.sort_by(|a, b| a.participant.cmp(&b.participant));
        failures.sort_by(|a, b| a.participant.cmp(&b.participant));

        let stats: Vec<ParticipantStatistics> = participants.iter().map(|p| p.statistics.clone()).collect();
        let aggregate = aggregate(&stats, self.config.statistics.significance_level)
            .with_comparisons(self.comparisons(&stats));

        StudyOutcome {
            participants,
            failures,
            pooled_calibration: self.pooled.clone(),
            aggregate,
        }
    }
}

/// Fit one calibration on several recordings pooled together
///
/// Each recording is smoothed with a centered window derived from the total
/// pooled sample count, then all are fitted as one dataset.
pub fn fit_pooled_calibration(config: &StudyConfig, recordings: &[Recording]) -> Result<CalibrationSet> {
    if recordings.is_empty() {
        anyhow::bail!("No recordings for pooled calibration");
    }

    let total: usize = recordings.iter().map(Recording::len).sum();
    let window = WindowSpec::fraction_of(
        total,
        config.calibration.pooled_window_divisor,
        config.calibration.pooled_min_periods_divisor,
    );
    let channels = &config.input.temperature_channels;

    let parts = recordings
        .iter()
        .map(|recording| {
            let smoothed = smooth_recording(recording, channels, &window)
                .with_context(|| format!("Smoothing {} failed", recording.participant()))?;
            let reference = config.reference_for(recording.participant()).with_context(|| {
                format!(
                    "No ground-truth temperature for calibration participant {}",
                    recording.participant()
                )
            })?;
            Ok((smoothed, reference))
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(
        recordings = recordings.len(),
        window = window.size,
        "fitting pooled calibration"
    );
    CalibrationSet::fit_pooled(&parts, channels, &config.calibration.strategy()).context("Pooled calibration failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ComparisonTest;
    use crate::config::{ComparisonSpec, HrvPhaseSpec, SensorGroups};
    use crate::phase_analyses::{pair_channel, BEHIND_EAR_CHANNEL, IN_EAR_CHANNEL, MOVEMENT_CHANNEL};
    use crate::recording::Channel;
    use crate::segmentation::Marker;

    fn config() -> StudyConfig {
        let mut config = StudyConfig::default();
        config.input.temperature_channels = vec!["Concha".to_string(), "EarCanal".to_string()];
        config.smoothing = WindowSpec::trailing(1);
        config.parallel = false;
        config
    }

    /// Phase 2 then phase 3, ear canal reads 1 °C above concha
    fn recording(participant: &str, phase2: f64, phase3: f64) -> Recording {
        let ids: Vec<i32> = vec![2, 2, 2, 3, 3, 3];
        let concha: Vec<f64> = ids.iter().map(|&id| if id == 2 { phase2 } else { phase3 } - 0.5).collect();
        let ear_canal: Vec<f64> = concha.iter().map(|v| v + 1.0).collect();
        Recording::new(
            participant,
            (0..6).map(|i| i * 1_000).collect(),
            ids,
            vec![Channel::new("Concha", concha), Channel::new("EarCanal", ear_canal)],
        )
        .unwrap()
    }

    fn input(participant: &str, recording: Option<Recording>) -> ParticipantInput {
        ParticipantInput {
            participant: participant.to_string(),
            recording,
            rr_intervals: None,
        }
    }

    #[test]
    fn test_channel_mean_calibration_aligns_sensors() {
        let config = config();
        let pipeline = Pipeline::new(&config);
        let outcome = pipeline
            .run_participant(&input("01", Some(recording("01", 36.5, 37.2))))
            .unwrap();

        let mean = |channel: &str, phase: &str| {
            outcome
                .statistics
                .get(&StatKey::new(Metric::Mean, channel, phase))
                .cloned()
                .unwrap()
                .unwrap()
        };
        assert!((mean("Concha", "phase_2") - mean("EarCanal", "phase_2")).abs() < 1e-9);
        assert!((mean(SENSOR_MEAN_CHANNEL, "phase_2") - 36.5).abs() < 1e-9);
        assert!((mean(SENSOR_MEAN_CHANNEL, "phase_3") - 37.2).abs() < 1e-9);
        assert_eq!(outcome.phases.len(), 2);
    }

    #[test]
    fn test_requested_missing_label_is_recorded_not_fatal() {
        let mut config = config();
        config.statistics.labels = vec![2, 4];
        let pipeline = Pipeline::new(&config);
        let outcome = pipeline
            .run_participant(&input("01", Some(recording("01", 36.5, 37.2))))
            .unwrap();

        let missing = outcome
            .statistics
            .get(&StatKey::new(Metric::Mean, "Concha", "phase_4"))
            .unwrap();
        assert!(matches!(missing, Err(AnalysisError::MissingData(_))));
    }

    #[test]
    fn test_run_aggregates_and_compares() {
        let mut config = config();
        config.statistics.comparisons.push(ComparisonSpec {
            metric: Metric::Mean,
            phase_a: "phase_2".to_string(),
            phase_b: "phase_3".to_string(),
            test: ComparisonTest::Paired,
            channels: vec![SENSOR_MEAN_CHANNEL.to_string()],
        });
        let pipeline = Pipeline::new(&config);
        let outcome = pipeline.run(&[
            input("01", Some(recording("01", 36.5, 37.2))),
            input("02", Some(recording("02", 37.0, 37.8))),
            input("03", None),
        ]);

        assert_eq!(outcome.participants.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].participant, "03");

        let phase2 = outcome
            .aggregate
            .get(&StatKey::new(Metric::Mean, SENSOR_MEAN_CHANNEL, "phase_2"))
            .unwrap();
        assert!((phase2.mean.unwrap() - 36.75).abs() < 1e-9);

        assert_eq!(outcome.aggregate.comparisons, 1);
        let comparison = &outcome.aggregate.phase_comparisons[0];
        let t = comparison.outcome.as_ref().unwrap().statistic;
        assert!((t.abs() - 15.0).abs() < 0.05, "t = {}", t);
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let mut sequential = config();
        sequential.parallel = false;
        let mut parallel = config();
        parallel.parallel = true;

        let inputs = vec![
            input("02", Some(recording("02", 37.0, 37.8))),
            input("01", Some(recording("01", 36.5, 37.2))),
        ];
        let a = Pipeline::new(&sequential).run(&inputs);
        let b = Pipeline::new(&parallel).run(&inputs);
        assert_eq!(a.aggregate, b.aggregate);
    }

    #[test]
    fn test_ground_truth_without_entry_fails_participant() {
        let mut config = config();
        config.calibration.reference = crate::config::ReferenceSource::GroundTruth;
        let pipeline = Pipeline::new(&config);
        let result = pipeline.run_participant(&input("01", Some(recording("01", 36.5, 37.2))));
        assert!(format!("{:#}", result.unwrap_err()).contains("ground-truth"));
    }

    #[test]
    fn test_marker_segmentation_and_hrv() {
        let mut config = config();
        config.statistics.segmentation = Segmentation::Markers;
        config.markers.insert(
            "01".to_string(),
            vec![
                Marker::new("start_sitting", "0:00"),
                Marker::new("stroop_start", "0:03"),
                Marker::new("stress_end", "0:06"),
            ],
        );
        config.hrv_phases.push(HrvPhaseSpec {
            name: "stress".to_string(),
            start: "stroop_start".to_string(),
            end: "stress_end".to_string(),
        });

        let rr: Vec<f64> = (0..16).map(|i| if i % 2 == 0 { 450.0 } else { 550.0 }).collect();
        let pipeline = Pipeline::new(&config);
        let outcome = pipeline
            .run_participant(&ParticipantInput {
                participant: "01".to_string(),
                recording: Some(recording("01", 36.5, 37.2)),
                rr_intervals: Some(rr),
            })
            .unwrap();

        assert_eq!(outcome.phases.len(), 2);
        assert!(outcome
            .statistics
            .get(&StatKey::new(Metric::Mean, "Concha", "stroop_start"))
            .unwrap()
            .is_ok());

        let rmssd = outcome
            .statistics
            .get(&StatKey::new(Metric::Rmssd, RR_CHANNEL, "stress"))
            .cloned()
            .unwrap()
            .unwrap();
        assert!((rmssd - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_reference_indices_become_statistics() {
        let mut config = config();
        let mut phases = std::collections::BTreeMap::new();
        phases.insert(
            "sitting".to_string(),
            ReferenceIndices {
                pns_index: Some(0.4),
                ..ReferenceIndices::default()
            },
        );
        config.reference_indices.insert("01".to_string(), phases);

        let pipeline = Pipeline::new(&config);
        let outcome = pipeline
            .run_participant(&input("01", Some(recording("01", 36.5, 37.2))))
            .unwrap();
        assert_eq!(
            outcome
                .statistics
                .get(&StatKey::new(Metric::PnsIndex, REFERENCE_CHANNEL, "sitting")),
            Some(&Ok(0.4))
        );
    }

    #[test]
    fn test_pooled_calibration_is_applied() {
        let config = config();
        let recordings = vec![recording("01", 36.5, 37.2), recording("02", 37.0, 37.8)];
        let pooled = fit_pooled_calibration(&config, &recordings).unwrap();
        assert_eq!(pooled.fits.len(), 2);

        let pipeline = Pipeline::new(&config).with_pooled_calibration(pooled);
        let outcome = pipeline.run(&[input("01", Some(recording("01", 36.5, 37.2)))]);
        assert!(outcome.pooled_calibration.is_some());
        assert_eq!(outcome.participants.len(), 1);
    }

    #[test]
    fn test_pooled_calibration_requires_every_ground_truth() {
        let mut config = config();
        config.calibration.reference = crate::config::ReferenceSource::GroundTruth;
        config.ground_truth.insert("01".to_string(), 36.8);
        let recordings = vec![recording("01", 36.5, 37.2), recording("02", 37.0, 37.8)];

        let err = fit_pooled_calibration(&config, &recordings).unwrap_err();
        assert!(format!("{:#}", err).contains("calibration participant 02"));

        config.ground_truth.insert("02".to_string(), 37.1);
        assert!(fit_pooled_calibration(&config, &recordings).is_ok());
    }

    /// Concha and EarCanal in the ear, Out_Top behind it, plus one IMU axis
    fn study_recording(participant: &str) -> Recording {
        let n = 16;
        let ids: Vec<i32> = (0..n).map(|i| if i < n / 2 { 2 } else { 3 }).collect();
        let wobble = |i: usize| (i % 3) as f64 * 0.05;
        Recording::new(
            participant,
            (0..n as i64).map(|i| i * 1_000).collect(),
            ids,
            vec![
                Channel::new("Concha", (0..n).map(|i| 36.5 + wobble(i)).collect()),
                Channel::new("EarCanal", (0..n).map(|i| 36.7 + wobble(i + 1)).collect()),
                Channel::new("Out_Top", (0..n).map(|i| 35.0 + wobble(i + 2)).collect()),
                Channel::new("ACC_X", (0..n).map(|i| (i % 4) as f64).collect()),
            ],
        )
        .unwrap()
    }

    fn study_config() -> StudyConfig {
        let mut config = config();
        config.input.temperature_channels = vec!["Concha".to_string(), "EarCanal".to_string(), "Out_Top".to_string()];
        config.input.imu_channels = vec!["ACC_X".to_string()];
        config.calibration.enabled = false;
        config.statistics.sensor_groups = Some(SensorGroups {
            behind_ear: vec!["Out_Top".to_string()],
            in_ear: vec!["Concha".to_string(), "EarCanal".to_string()],
        });
        config.statistics.movement = true;
        config
    }

    #[test]
    fn test_sensor_groups_and_movement_per_phase() {
        let config = study_config();
        let outcome = Pipeline::new(&config)
            .run_participant(&input("01", Some(study_recording("01"))))
            .unwrap();
        let get = |metric, channel: &str| outcome.statistics.get(&StatKey::new(metric, channel, "phase_3")).cloned();

        let behind = get(Metric::Mean, BEHIND_EAR_CHANNEL).unwrap().unwrap();
        let in_ear = get(Metric::Mean, IN_EAR_CHANNEL).unwrap().unwrap();
        assert!(in_ear - behind > 1.4);
        assert!(get(Metric::TStatistic, &pair_channel("Concha", BEHIND_EAR_CHANNEL)).unwrap().unwrap() > 0.0);
        assert!(get(Metric::FStatistic, "sensor_groups").unwrap().is_ok());

        assert!((get(Metric::Mean, MOVEMENT_CHANNEL).unwrap().unwrap() - 1.5).abs() < 1e-9);
        assert!(get(Metric::Pearson, &pair_channel("Concha", MOVEMENT_CHANNEL)).is_some());
    }

    #[test]
    fn test_ground_truth_offset_uses_uncalibrated_readings() {
        let mut config = study_config();
        config.calibration.enabled = true;
        config.ground_truth.insert("01".to_string(), 37.0);
        let outcome = Pipeline::new(&config)
            .run_participant(&input("01", Some(study_recording("01"))))
            .unwrap();

        // Calibration moves Out_Top onto the channel mean; the offset must not see that
        let offset = outcome
            .statistics
            .get(&StatKey::new(Metric::GroundTruthOffset, "Out_Top", "phase_2"))
            .cloned()
            .unwrap()
            .unwrap();
        assert!((offset + 1.95).abs() < 1e-9, "offset = {}", offset);

        let other = Pipeline::new(&config)
            .run_participant(&input("02", Some(study_recording("02"))))
            .unwrap();
        assert!(other
            .statistics
            .values
            .keys()
            .all(|key| key.metric != Metric::GroundTruthOffset));
    }

    #[test]
    fn test_rr_correlated_with_configured_phase() {
        let mut config = study_config();
        config.statistics.hrv_temperature_phase = Some("phase_3".to_string());
        let rr: Vec<f64> = (0..8).map(|i| 600.0 + (i % 3) as f64 * 50.0).collect();
        let outcome = Pipeline::new(&config)
            .run_participant(&ParticipantInput {
                participant: "01".to_string(),
                recording: Some(study_recording("01")),
                rr_intervals: Some(rr),
            })
            .unwrap();

        let r = outcome
            .statistics
            .get(&StatKey::new(Metric::Pearson, pair_channel("Concha", RR_CHANNEL), "phase_3"))
            .unwrap();
        assert!(r.as_ref().is_ok_and(|r| (-1.0..=1.0).contains(r)), "{:?}", r);

        config.statistics.hrv_temperature_phase = Some("phase_9".to_string());
        let outcome = Pipeline::new(&config)
            .run_participant(&ParticipantInput {
                participant: "01".to_string(),
                recording: Some(study_recording("01")),
                rr_intervals: Some(vec![600.0; 8]),
            })
            .unwrap();
        assert!(matches!(
            outcome
                .statistics
                .get(&StatKey::new(Metric::Pearson, pair_channel("Concha", RR_CHANNEL), "phase_9")),
            Some(Err(AnalysisError::MissingData(_)))
        ));
    }

    #[test]
    fn test_independent_comparison_is_dispatched() {
        let mut config = config();
        config.statistics.comparisons.push(ComparisonSpec {
            metric: Metric::Mean,
            phase_a: "phase_2".to_string(),
            phase_b: "phase_3".to_string(),
            test: ComparisonTest::Independent,
            channels: vec![SENSOR_MEAN_CHANNEL.to_string()],
        });
        let outcome = Pipeline::new(&config).run(&[
            input("01", Some(recording("01", 36.5, 37.2))),
            input("02", Some(recording("02", 37.0, 37.8))),
        ]);

        let comparison = &outcome.aggregate.phase_comparisons[0];
        assert_eq!(comparison.test, ComparisonTest::Independent);
        assert_eq!(comparison.outcome.as_ref().unwrap().df, 2.0);
    }
}
