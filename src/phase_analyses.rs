//! Study analyses run on one phase of one participant
//!
//! Each function records its values into `ParticipantStatistics` under its own
//! channel names; a value that cannot be computed is recorded as the error.
//!
//! - sensor groups: behind-the-ear against in-ear temperature
//! - movement: IMU movement magnitude and its relation to temperature change
//! - RR intervals against the temperature at each heartbeat
//! - ground-truth offset of the uncalibrated readings

use crate::aggregate::{Metric, ParticipantStatistics, StatKey};
use crate::calibration::{reference_series, CalibrationReference};
use crate::config::SensorGroups;
use crate::error::{AnalysisError, Result};
use crate::recording::Recording;
use crate::segmentation::{beat_times, resample_nearest};
use crate::statistics::{
    describe, independent_t_test, movement_magnitude, one_way_anova, pearson, relative_change, TestOutcome,
};

/// Group of temperature sensors placed behind the ear
pub const BEHIND_EAR_CHANNEL: &str = "behind_ear";

/// Group of temperature sensors placed inside the ear
pub const IN_EAR_CHANNEL: &str = "in_ear";

/// ANOVA across every in-ear sensor and the behind-the-ear mean
pub const SENSOR_GROUPS_CHANNEL: &str = "sensor_groups";

/// IMU movement magnitude
pub const MOVEMENT_CHANNEL: &str = "movement";

/// Channel name for a statistic relating two series
pub fn pair_channel(a: &str, b: &str) -> String {
    format!("{}~{}", a, b)
}

fn insert_test(
    stats: &mut ParticipantStatistics,
    statistic: Metric,
    channel: &str,
    phase: &str,
    outcome: Result<TestOutcome>,
) {
    stats.insert(
        StatKey::new(statistic, channel, phase),
        outcome.as_ref().map(|t| t.statistic).map_err(Clone::clone),
    );
    stats.insert(StatKey::new(Metric::PValue, channel, phase), outcome.map(|t| t.p_value));
}

/// Mean of the per-sensor means and mean of the per-sensor standard deviations
fn group_summary(slice: &Recording, members: &[String]) -> Result<(f64, f64)> {
    if members.is_empty() {
        return Err(AnalysisError::InvalidParameter("sensor group has no channels".to_string()));
    }
    let summaries = members
        .iter()
        .map(|name| slice.values(name).and_then(describe))
        .collect::<Result<Vec<_>>>()?;
    let n = summaries.len() as f64;
    Ok((
        summaries.iter().map(|s| s.mean).sum::<f64>() / n,
        summaries.iter().map(|s| s.std_dev).sum::<f64>() / n,
    ))
}

/// Behind-the-ear against in-ear temperature within one phase
///
/// Records group mean and std-dev, a Student's t-test of each in-ear sensor
/// against the per-sample behind-the-ear mean, and a one-way ANOVA across the
/// in-ear sensors and that mean.
pub fn sensor_group_statistics(
    stats: &mut ParticipantStatistics,
    phase: &str,
    slice: &Recording,
    groups: &SensorGroups,
) {
    for (channel, members) in [(BEHIND_EAR_CHANNEL, &groups.behind_ear), (IN_EAR_CHANNEL, &groups.in_ear)] {
        let summary = group_summary(slice, members);
        stats.insert(
            StatKey::new(Metric::Mean, channel, phase),
            summary.as_ref().map(|s| s.0).map_err(Clone::clone),
        );
        stats.insert(StatKey::new(Metric::StdDev, channel, phase), summary.map(|s| s.1));
    }

    let behind = reference_series(slice, &groups.behind_ear, &CalibrationReference::ChannelMean);

    for sensor in &groups.in_ear {
        let outcome = behind
            .as_ref()
            .map_err(Clone::clone)
            .and_then(|behind| independent_t_test(slice.values(sensor)?, behind));
        insert_test(stats, Metric::TStatistic, &pair_channel(sensor, BEHIND_EAR_CHANNEL), phase, outcome);
    }

    let anova = behind.and_then(|behind| {
        let mut samples = groups
            .in_ear
            .iter()
            .map(|sensor| slice.values(sensor).map(<[f64]>::to_vec))
            .collect::<Result<Vec<_>>>()?;
        samples.push(behind);
        one_way_anova(&samples)
    });
    if let Err(e) = &anova {
        tracing::debug!(participant = slice.participant(), phase, error = %e, "no sensor group ANOVA");
    }
    insert_test(stats, Metric::FStatistic, SENSOR_GROUPS_CHANNEL, phase, anova);
}

/// Movement magnitude within one phase and its link to temperature change
///
/// Records the mean magnitude over the IMU channels present, and per
/// temperature channel the Pearson correlation of the magnitude with the
/// absolute relative change of that channel.
pub fn movement_statistics(
    stats: &mut ParticipantStatistics,
    phase: &str,
    slice: &Recording,
    imu_channels: &[String],
    temperature_channels: &[String],
) {
    let axes: Vec<&[f64]> = imu_channels
        .iter()
        .filter_map(|name| slice.channel(name))
        .map(|channel| channel.values.as_slice())
        .collect();
    let movement = if axes.is_empty() {
        Err(AnalysisError::MissingData(format!(
            "no IMU channels in recording {}",
            slice.participant()
        )))
    } else {
        movement_magnitude(&axes)
    };

    stats.insert(
        StatKey::new(Metric::Mean, MOVEMENT_CHANNEL, phase),
        movement.as_ref().map_err(Clone::clone).and_then(|m| describe(m)).map(|s| s.mean),
    );

    for sensor in temperature_channels {
        let r = movement.as_ref().map_err(Clone::clone).and_then(|m| {
            let change: Vec<f64> = relative_change(slice.values(sensor)?).iter().map(|v| v.abs()).collect();
            pearson(m, &change)
        });
        stats.insert(StatKey::new(Metric::Pearson, pair_channel(sensor, MOVEMENT_CHANNEL), phase), r);
    }
}

fn rr_temperature_pearson(slice: &Recording, sensor: &str, rr_intervals: &[f64]) -> Result<f64> {
    let (Some(start), Some(end)) = (slice.start_ms(), slice.end_ms()) else {
        return Err(AnalysisError::MissingData("phase has no samples".to_string()));
    };
    let beats: Vec<i64> = beat_times(start, rr_intervals)
        .into_iter()
        .take_while(|&t| t <= end)
        .collect();
    let temperatures = resample_nearest(slice, sensor, &beats)?;
    pearson(&rr_intervals[..beats.len()], &temperatures)
}

/// Pearson correlation of RR intervals with the temperature at each beat
///
/// The RR series is taken to start at the first sample of the phase. Beats
/// after the phase's last sample are left out; each remaining beat reads the
/// temperature of the nearest sample. `slice` is `None` when the participant
/// has no such phase.
pub fn rr_temperature_correlation(
    stats: &mut ParticipantStatistics,
    phase: &str,
    slice: Option<&Recording>,
    rr_intervals: &[f64],
    temperature_channels: &[String],
    rr_channel: &str,
) {
    for sensor in temperature_channels {
        let r = match slice {
            Some(slice) => rr_temperature_pearson(slice, sensor, rr_intervals),
            None => Err(AnalysisError::MissingData(format!("no phase {}", phase))),
        };
        stats.insert(StatKey::new(Metric::Pearson, pair_channel(sensor, rr_channel), phase), r);
    }
}

/// Phase mean of each uncalibrated channel minus the participant's
/// ground-truth temperature
pub fn ground_truth_offsets(
    stats: &mut ParticipantStatistics,
    phase: &str,
    uncalibrated: &Recording,
    channels: &[String],
    ground_truth: f64,
) {
    for channel in channels {
        let offset = uncalibrated
            .values(channel)
            .and_then(describe)
            .map(|s| s.mean - ground_truth);
        stats.insert(StatKey::new(Metric::GroundTruthOffset, channel.as_str(), phase), offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::Channel;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn value(stats: &ParticipantStatistics, metric: Metric, channel: &str) -> f64 {
        stats
            .get(&StatKey::new(metric, channel, "phase_3"))
            .cloned()
            .unwrap()
            .unwrap()
    }

    /// In-ear sensors read about 1.5 °C above the behind-the-ear ones
    fn ear_recording() -> Recording {
        let n = 20;
        let wobble = |i: usize| if i % 2 == 0 { 0.1 } else { -0.1 } + (i % 5) as f64 * 0.02;
        let series = |base: f64, phase: usize| (0..n).map(|i| base + wobble(i + phase)).collect::<Vec<f64>>();
        Recording::new(
            "01",
            (0..n as i64).map(|i| i * 1_000).collect(),
            vec![3; n],
            vec![
                Channel::new("Concha", series(36.5, 0)),
                Channel::new("EarCanal", series(36.6, 1)),
                Channel::new("Out_Top", series(35.0, 2)),
                Channel::new("Out_Bottom", series(35.1, 3)),
                Channel::new("ACC_X", (0..n).map(|i| (i % 4) as f64).collect()),
                Channel::new("ACC_Y", vec![0.0; n]),
            ],
        )
        .unwrap()
    }

    fn groups() -> SensorGroups {
        SensorGroups {
            behind_ear: names(&["Out_Top", "Out_Bottom"]),
            in_ear: names(&["Concha", "EarCanal"]),
        }
    }

    #[test]
    fn test_sensor_groups_separate_in_ear_from_behind_ear() {
        let mut stats = ParticipantStatistics::new("01");
        sensor_group_statistics(&mut stats, "phase_3", &ear_recording(), &groups());

        let behind = value(&stats, Metric::Mean, BEHIND_EAR_CHANNEL);
        let in_ear = value(&stats, Metric::Mean, IN_EAR_CHANNEL);
        assert!((in_ear - behind - 1.5).abs() < 1e-9, "{} vs {}", in_ear, behind);
        assert!(value(&stats, Metric::StdDev, IN_EAR_CHANNEL) > 0.0);

        let concha = pair_channel("Concha", BEHIND_EAR_CHANNEL);
        assert!(value(&stats, Metric::TStatistic, &concha) > 10.0);
        assert!(value(&stats, Metric::PValue, &concha) < 0.001);

        assert!(value(&stats, Metric::FStatistic, SENSOR_GROUPS_CHANNEL) > 10.0);
        assert!(value(&stats, Metric::PValue, SENSOR_GROUPS_CHANNEL) < 0.001);
    }

    #[test]
    fn test_missing_group_sensor_is_recorded() {
        let mut stats = ParticipantStatistics::new("01");
        let groups = SensorGroups {
            behind_ear: names(&["Out_Top", "Out_Middle"]),
            in_ear: names(&["Concha"]),
        };
        sensor_group_statistics(&mut stats, "phase_3", &ear_recording(), &groups);

        let key = |metric, channel: &str| StatKey::new(metric, channel, "phase_3");
        assert!(matches!(
            stats.get(&key(Metric::Mean, BEHIND_EAR_CHANNEL)),
            Some(Err(AnalysisError::MissingData(_)))
        ));
        assert!(stats.get(&key(Metric::Mean, IN_EAR_CHANNEL)).unwrap().is_ok());
        assert!(stats.get(&key(Metric::FStatistic, SENSOR_GROUPS_CHANNEL)).unwrap().is_err());
        assert!(stats.get(&key(Metric::PValue, SENSOR_GROUPS_CHANNEL)).unwrap().is_err());
    }

    #[test]
    fn test_movement_mean_and_correlation() {
        let mut stats = ParticipantStatistics::new("01");
        let recording = ear_recording();
        movement_statistics(
            &mut stats,
            "phase_3",
            &recording,
            &names(&["ACC_X", "ACC_Y", "ACC_Z"]),
            &names(&["Concha"]),
        );

        // ACC_X cycles 0, 1, 2, 3 and ACC_Y is zero
        assert!((value(&stats, Metric::Mean, MOVEMENT_CHANNEL) - 1.5).abs() < 1e-9);
        let r = value(&stats, Metric::Pearson, &pair_channel("Concha", MOVEMENT_CHANNEL));
        assert!((-1.0..=1.0).contains(&r));
    }

    #[test]
    fn test_movement_without_imu_is_missing_data() {
        let mut stats = ParticipantStatistics::new("01");
        movement_statistics(&mut stats, "phase_3", &ear_recording(), &names(&["GYRO_X"]), &names(&["Concha"]));
        assert!(matches!(
            stats.get(&StatKey::new(Metric::Mean, MOVEMENT_CHANNEL, "phase_3")),
            Some(Err(AnalysisError::MissingData(_)))
        ));
        assert!(stats
            .get(&StatKey::new(Metric::Pearson, pair_channel("Concha", MOVEMENT_CHANNEL), "phase_3"))
            .unwrap()
            .is_err());
    }

    #[test]
    fn test_rr_follows_temperature() {
        // Temperature rises 0.1 °C per second; RR lengthens with it
        let n = 30;
        let recording = Recording::new(
            "01",
            (0..n as i64).map(|i| 10_000 + i * 1_000).collect(),
            vec![3; n],
            vec![Channel::new("Concha", (0..n).map(|i| 36.0 + i as f64 * 0.1).collect())],
        )
        .unwrap();
        let rr: Vec<f64> = (0..40).map(|i| 700.0 + i as f64 * 5.0).collect();

        let mut stats = ParticipantStatistics::new("01");
        rr_temperature_correlation(&mut stats, "phase_3", Some(&recording), &rr, &names(&["Concha"]), "rr");
        let r = value(&stats, Metric::Pearson, "Concha~rr");
        assert!(r > 0.95, "r = {}", r);
    }

    #[test]
    fn test_rr_without_phase_is_missing_data() {
        let mut stats = ParticipantStatistics::new("01");
        rr_temperature_correlation(&mut stats, "phase_3", None, &[800.0; 4], &names(&["Concha"]), "rr");
        assert!(matches!(
            stats.get(&StatKey::new(Metric::Pearson, "Concha~rr", "phase_3")),
            Some(Err(AnalysisError::MissingData(_)))
        ));
    }

    #[test]
    fn test_ground_truth_offsets() {
        let mut stats = ParticipantStatistics::new("01");
        ground_truth_offsets(&mut stats, "phase_3", &ear_recording(), &names(&["Out_Top", "Out_Middle"]), 36.5);

        // Out_Top averages 35.04 over the phase
        let offset = value(&stats, Metric::GroundTruthOffset, "Out_Top");
        assert!((offset + 1.46).abs() < 1e-9, "offset = {}", offset);
        assert!(stats
            .get(&StatKey::new(Metric::GroundTruthOffset, "Out_Middle", "phase_3"))
            .unwrap()
            .is_err());
    }
}
