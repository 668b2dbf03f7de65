//! Cross-participant aggregation with multiple-comparison correction
//!
//! Per-participant statistics are keyed by (metric, channel, phase). The
//! aggregator reduces each key across participants to a mean and a population
//! standard deviation, and records for every key which participants
//! contributed and which were skipped and why. A missing phase never fails the
//! whole aggregation; it only removes that participant from that key.
//!
//! Phase comparisons are t-tests across participants (paired, or unpaired
//! when each phase is its own group), judged against a Bonferroni-corrected
//! alpha (alpha / number of comparisons).

use crate::error::{AnalysisError, Result};
use crate::statistics::{independent_t_test, paired_t_test, Summary, TestOutcome};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Statistic recorded per (channel, phase)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Mean,
    StdDev,
    Variance,
    Mad,
    Sdnn,
    Rmssd,
    LfHf,
    MeanRr,
    MeanHr,
    /// Spearman correlation of relative change between two sensors
    Spearman,
    PnsIndex,
    SnsIndex,
    StressIndex,
    /// Pearson correlation between two series
    Pearson,
    /// t statistic of a within-participant test
    TStatistic,
    /// F statistic of a within-participant ANOVA
    FStatistic,
    /// p-value of the test recorded under the same channel and phase
    PValue,
    /// Phase mean of the uncalibrated reading minus the ground-truth temperature
    GroundTruthOffset,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Mean => "mean",
            Metric::StdDev => "std_dev",
            Metric::Variance => "variance",
            Metric::Mad => "mad",
            Metric::Sdnn => "sdnn",
            Metric::Rmssd => "rmssd",
            Metric::LfHf => "lf_hf",
            Metric::MeanRr => "mean_rr",
            Metric::MeanHr => "mean_hr",
            Metric::Spearman => "spearman",
            Metric::PnsIndex => "pns_index",
            Metric::SnsIndex => "sns_index",
            Metric::StressIndex => "stress_index",
            Metric::Pearson => "pearson",
            Metric::TStatistic => "t_statistic",
            Metric::FStatistic => "f_statistic",
            Metric::PValue => "p_value",
            Metric::GroundTruthOffset => "ground_truth_offset",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatKey {
    pub metric: Metric,
    pub channel: String,
    pub phase: String,
}

impl StatKey {
    pub fn new(metric: Metric, channel: impl Into<String>, phase: impl Into<String>) -> Self {
        Self {
            metric,
            channel: channel.into(),
            phase: phase.into(),
        }
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.metric, self.channel, self.phase)
    }
}

/// A statistic value, or the reason there is none
pub type Measurement = std::result::Result<f64, AnalysisError>;

/// Every statistic computed for one participant
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticipantStatistics {
    pub participant: String,
    pub values: BTreeMap<StatKey, Measurement>,
}

impl ParticipantStatistics {
    pub fn new(participant: impl Into<String>) -> Self {
        Self {
            participant: participant.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: StatKey, value: Measurement) {
        self.values.insert(key, value);
    }

    /// Record mean, std-dev, variance and MAD of a channel within a phase
    ///
    /// A failed summary is recorded as the same error under all four metrics.
    pub fn insert_summary(&mut self, channel: &str, phase: &str, summary: &Result<Summary>) {
        let entries = [
            (Metric::Mean, summary.as_ref().map(|s| s.mean)),
            (Metric::StdDev, summary.as_ref().map(|s| s.std_dev)),
            (Metric::Variance, summary.as_ref().map(|s| s.variance)),
            (Metric::Mad, summary.as_ref().map(|s| s.mad)),
        ];
        for (metric, value) in entries {
            self.insert(
                StatKey::new(metric, channel, phase),
                value.map_err(Clone::clone),
            );
        }
    }

    pub fn get(&self, key: &StatKey) -> Option<&Measurement> {
        self.values.get(key)
    }

    /// Finite value for `key`, or the reason it cannot be used
    fn usable(&self, key: &StatKey) -> Measurement {
        match self.values.get(key) {
            None => Err(AnalysisError::MissingData(format!("no value for {}", key))),
            Some(Err(e)) => Err(e.clone()),
            Some(Ok(v)) if !v.is_finite() => Err(AnalysisError::DegenerateSample(format!(
                "non-finite value {} for {}",
                v, key
            ))),
            Some(Ok(v)) => Ok(*v),
        }
    }
}

/// Participant left out of one aggregate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedParticipant {
    pub participant: String,
    pub reason: AnalysisError,
}

/// Cross-participant reduction of one key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyAggregate {
    pub key: StatKey,
    /// `None` when no participant contributed
    pub mean: Option<f64>,
    /// Population standard deviation across contributors
    pub std_dev: Option<f64>,
    pub contributors: Vec<String>,
    pub skipped: Vec<SkippedParticipant>,
}

/// How two phases are compared across participants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonTest {
    /// Paired t-test over participants with a value in both phases
    #[default]
    Paired,
    /// Student's t-test between the two phases' participant values
    Independent,
}

impl fmt::Display for ComparisonTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonTest::Paired => f.write_str("paired t-test"),
            ComparisonTest::Independent => f.write_str("independent t-test"),
        }
    }
}

/// Comparison of one metric between two phases across participants
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseComparison {
    pub metric: Metric,
    pub channel: String,
    pub phase_a: String,
    pub phase_b: String,
    pub test: ComparisonTest,
    /// t-test of phase_b against phase_a
    pub outcome: std::result::Result<TestOutcome, AnalysisError>,
    pub mean_a: Option<f64>,
    pub mean_b: Option<f64>,
    pub contributors: Vec<String>,
    /// `p < corrected_alpha`; set by `AggregateResult::with_comparisons`
    pub significant: bool,
}

/// Study-wide aggregate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResult {
    pub alpha: f64,
    /// Number of simultaneous comparisons the alpha is corrected for
    pub comparisons: usize,
    pub corrected_alpha: f64,
    /// One entry per key, ordered by key
    pub aggregates: Vec<KeyAggregate>,
    pub phase_comparisons: Vec<PhaseComparison>,
}

impl AggregateResult {
    pub fn get(&self, key: &StatKey) -> Option<&KeyAggregate> {
        self.aggregates
            .binary_search_by(|entry| entry.key.cmp(key))
            .ok()
            .map(|i| &self.aggregates[i])
    }

    /// Attach phase comparisons and correct alpha for their count
    pub fn with_comparisons(mut self, comparisons: Vec<PhaseComparison>) -> Self {
        self.comparisons = comparisons.len();
        self.corrected_alpha = bonferroni(self.alpha, self.comparisons).unwrap_or(self.alpha);

        let corrected = self.corrected_alpha;
        self.phase_comparisons = comparisons
            .into_iter()
            .map(|mut comparison| {
                comparison.significant = comparison
                    .outcome
                    .as_ref()
                    .map(|o| o.p_value < corrected)
                    .unwrap_or(false);
                comparison
            })
            .collect();
        self
    }
}

/// Bonferroni-corrected significance threshold
///
/// # Example
/// ```
/// use earstudy::aggregate::bonferroni;
///
/// let corrected = bonferroni(0.05, 6).unwrap();
/// assert!((corrected - 0.008333).abs() < 1e-6);
/// ```
pub fn bonferroni(alpha: f64, comparisons: usize) -> Result<f64> {
    if comparisons == 0 {
        return Err(AnalysisError::InvalidParameter(
            "number of comparisons must be >= 1".to_string(),
        ));
    }
    Ok(alpha / comparisons as f64)
}

/// Participants sorted by id, so reductions do not depend on input order
fn sorted_by_participant(stats: &[ParticipantStatistics]) -> Vec<&ParticipantStatistics> {
    let mut sorted: Vec<&ParticipantStatistics> = stats.iter().collect();
    sorted.sort_by(|a, b| a.participant.cmp(&b.participant));
    sorted
}

fn mean_and_std(values: &[f64]) -> (Option<f64>, Option<f64>) {
    if values.is_empty() {
        return (None, None);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (Some(mean), Some(variance.sqrt()))
}

/// Mean and std-dev per key across participants
///
/// The key set is the union over all participants. The correction starts at
/// one comparison; use `with_comparisons` to attach phase tests.
pub fn aggregate(stats: &[ParticipantStatistics], alpha: f64) -> AggregateResult {
    let participants = sorted_by_participant(stats);
    let keys: BTreeSet<&StatKey> = stats.iter().flat_map(|s| s.values.keys()).collect();

    let aggregates = keys
        .into_iter()
        .map(|key| {
            let mut values = Vec::new();
            let mut contributors = Vec::new();
            let mut skipped = Vec::new();

            for participant in &participants {
                match participant.usable(key) {
                    Ok(v) => {
                        values.push(v);
                        contributors.push(participant.participant.clone());
                    }
                    Err(reason) => {
                        tracing::debug!(
                            participant = %participant.participant,
                            key = %key,
                            reason = %reason,
                            "participant skipped in aggregate"
                        );
                        skipped.push(SkippedParticipant {
                            participant: participant.participant.clone(),
                            reason,
                        });
                    }
                }
            }

            let (mean, std_dev) = mean_and_std(&values);
            KeyAggregate {
                key: key.clone(),
                mean,
                std_dev,
                contributors,
                skipped,
            }
        })
        .collect();

    AggregateResult {
        alpha,
        comparisons: 1,
        corrected_alpha: alpha,
        aggregates,
        phase_comparisons: Vec::new(),
    }
}

/// Paired t-test of `metric` on `channel` between two phases
///
/// Only participants with a usable value in both phases take part.
pub fn compare_phases(
    stats: &[ParticipantStatistics],
    metric: Metric,
    channel: &str,
    phase_a: &str,
    phase_b: &str,
) -> PhaseComparison {
    let key_a = StatKey::new(metric, channel, phase_a);
    let key_b = StatKey::new(metric, channel, phase_b);

    let mut values_a = Vec::new();
    let mut values_b = Vec::new();
    let mut contributors = Vec::new();
    for participant in sorted_by_participant(stats) {
        if let (Ok(a), Ok(b)) = (participant.usable(&key_a), participant.usable(&key_b)) {
            values_a.push(a);
            values_b.push(b);
            contributors.push(participant.participant.clone());
        }
    }

    let outcome = paired_t_test(&values_b, &values_a);
    if let Err(e) = &outcome {
        tracing::warn!(
            %metric,
            channel,
            phase_a,
            phase_b,
            error = %e,
            "phase comparison has no result"
        );
    }

    PhaseComparison {
        metric,
        channel: channel.to_string(),
        phase_a: phase_a.to_string(),
        phase_b: phase_b.to_string(),
        test: ComparisonTest::Paired,
        outcome,
        mean_a: mean_and_std(&values_a).0,
        mean_b: mean_and_std(&values_b).0,
        contributors,
        significant: false,
    }
}

/// Unpaired t-test of `metric` on `channel` between two phases
///
/// Each phase is a group of every participant with a usable value for it, so
/// a participant missing one phase still counts towards the other.
pub fn compare_phases_independent(
    stats: &[ParticipantStatistics],
    metric: Metric,
    channel: &str,
    phase_a: &str,
    phase_b: &str,
) -> PhaseComparison {
    let key_a = StatKey::new(metric, channel, phase_a);
    let key_b = StatKey::new(metric, channel, phase_b);

    let mut values_a = Vec::new();
    let mut values_b = Vec::new();
    let mut contributors = Vec::new();
    for participant in sorted_by_participant(stats) {
        let a = participant.usable(&key_a).ok();
        let b = participant.usable(&key_b).ok();
        values_a.extend(a);
        values_b.extend(b);
        if a.is_some() || b.is_some() {
            contributors.push(participant.participant.clone());
        }
    }

    let outcome = independent_t_test(&values_b, &values_a);
    if let Err(e) = &outcome {
        tracing::warn!(
            %metric,
            channel,
            phase_a,
            phase_b,
            error = %e,
            "unpaired phase comparison has no result"
        );
    }

    PhaseComparison {
        metric,
        channel: channel.to_string(),
        phase_a: phase_a.to_string(),
        phase_b: phase_b.to_string(),
        test: ComparisonTest::Independent,
        outcome,
        mean_a: mean_and_std(&values_a).0,
        mean_b: mean_and_std(&values_b).0,
        contributors,
        significant: false,
    }
}

/// Compare two phases with the given test
pub fn compare(
    stats: &[ParticipantStatistics],
    test: ComparisonTest,
    metric: Metric,
    channel: &str,
    phase_a: &str,
    phase_b: &str,
) -> PhaseComparison {
    match test {
        ComparisonTest::Paired => compare_phases(stats, metric, channel, phase_a, phase_b),
        ComparisonTest::Independent => compare_phases_independent(stats, metric, channel, phase_a, phase_b),
    }
}
