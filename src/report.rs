//! Text, JSON and CSV renderings of a study run

use crate::aggregate::{KeyAggregate, PhaseComparison};
use crate::pipeline::StudyOutcome;
use anyhow::Result;

fn format_optional(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", precision, v),
        None => "-".to_string(),
    }
}

fn format_aggregate(aggregate: &KeyAggregate) -> String {
    let mut line = format!(
        "  {:<40} mean={} sd={} n={}",
        aggregate.key.to_string(),
        format_optional(aggregate.mean, 4),
        format_optional(aggregate.std_dev, 4),
        aggregate.contributors.len()
    );
    if !aggregate.skipped.is_empty() {
        line.push_str(&format!(" (skipped {})", aggregate.skipped.len()));
    }
    line.push('\n');
    line
}

fn format_comparison(comparison: &PhaseComparison) -> String {
    let subject = format!(
        "{} {}: {} -> {}",
        comparison.metric, comparison.channel, comparison.phase_a, comparison.phase_b
    );
    match &comparison.outcome {
        Ok(test) => format!(
            "  {} {} [{}] (t={:.3}, p={:.4}, df={}, n={}, mean {} -> {})\n",
            if comparison.significant { "✅" } else { "  " },
            subject,
            comparison.test,
            test.statistic,
            test.p_value,
            test.df,
            comparison.contributors.len(),
            format_optional(comparison.mean_a, 3),
            format_optional(comparison.mean_b, 3),
        ),
        Err(e) => format!("  ⚠️  {} [{}] (no result: {})\n", subject, comparison.test, e),
    }
}

impl StudyOutcome {
    /// Generate human-readable report
    pub fn to_report_string(&self) -> String {
        let mut report = String::new();

        report.push_str(&format!(
            "📊 STUDY SUMMARY ({} participants analysed, {} failed)\n\n",
            self.participants.len(),
            self.failures.len()
        ));
        report.push_str(&format!(
            "Significance level: {} ({} comparisons, corrected {:.5})\n",
            self.aggregate.alpha, self.aggregate.comparisons, self.aggregate.corrected_alpha
        ));

        if let Some(pooled) = &self.pooled_calibration {
            report.push_str("\nPooled calibration:\n");
            for (channel, fit) in &pooled.fits {
                report.push_str(&format!(
                    "  {} {} {:?}\n",
                    channel,
                    fit.kind(),
                    fit.coefficients()
                ));
            }
            if !pooled.methods.is_empty() {
                report.push_str("  Methods (MAE against reference):\n");
                for method in &pooled.methods {
                    report.push_str(&format!(
                        "    {:<8} mae={:.4} var={:.6} r={} ({} channels)\n",
                        method.kind.to_string(),
                        method.mae_mean,
                        method.mae_variance,
                        format_optional(method.correlation, 4),
                        method.channels
                    ));
                }
            }
        }

        if !self.failures.is_empty() {
            report.push_str(&format!("\n❌ Failed participants ({}):\n", self.failures.len()));
            for failure in &self.failures {
                report.push_str(&format!("  - {}: {}\n", failure.participant, failure.error));
            }
        }

        if !self.participants.is_empty() {
            report.push_str("\nParticipants:\n");
            for participant in &self.participants {
                let phases: Vec<&str> = participant.phases.iter().map(|p| p.name.as_str()).collect();
                report.push_str(&format!(
                    "  {} ({} samples, phases: {})\n",
                    participant.participant,
                    participant.samples,
                    if phases.is_empty() { "-".to_string() } else { phases.join(", ") }
                ));
                if let Some(calibration) = &participant.calibration {
                    for (channel, fit) in &calibration.fits {
                        report.push_str(&format!("    {} {} (n={})\n", channel, fit.kind(), fit.samples()));
                    }
                    for (channel, error) in &calibration.failures {
                        report.push_str(&format!("    ⚠️  {} not calibrated: {}\n", channel, error));
                    }
                }
            }
        }

        if !self.aggregate.aggregates.is_empty() {
            report.push_str("\n📊 Aggregated statistics:\n");
            for aggregate in &self.aggregate.aggregates {
                report.push_str(&format_aggregate(aggregate));
            }
        }

        if !self.aggregate.phase_comparisons.is_empty() {
            report.push_str("\n📊 Phase comparisons:\n");
            for comparison in &self.aggregate.phase_comparisons {
                report.push_str(&format_comparison(comparison));
            }
        }

        report
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// One row per aggregated statistic, followed by one row per comparison
    ///
    /// Comparison rows put `phase_a->phase_b` in the phase column and leave the
    /// aggregate-only fields empty.
    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([
            "record",
            "metric",
            "channel",
            "phase",
            "mean",
            "std_dev",
            "n",
            "statistic",
            "p_value",
            "significant",
        ])?;

        let opt = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();

        for aggregate in &self.aggregate.aggregates {
            writer.write_record([
                "aggregate".to_string(),
                aggregate.key.metric.to_string(),
                aggregate.key.channel.clone(),
                aggregate.key.phase.clone(),
                opt(aggregate.mean),
                opt(aggregate.std_dev),
                aggregate.contributors.len().to_string(),
                String::new(),
                String::new(),
                String::new(),
            ])?;
        }

        for comparison in &self.aggregate.phase_comparisons {
            let test = comparison.outcome.as_ref().ok();
            writer.write_record([
                "comparison".to_string(),
                comparison.metric.to_string(),
                comparison.channel.clone(),
                format!("{}->{}", comparison.phase_a, comparison.phase_b),
                opt(comparison.mean_b.zip(comparison.mean_a).map(|(b, a)| b - a)),
                String::new(),
                comparison.contributors.len().to_string(),
                opt(test.map(|t| t.statistic)),
                opt(test.map(|t| t.p_value)),
                comparison.significant.to_string(),
            ])?;
        }

        let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!("{}", e.error()))?;
        Ok(String::from_utf8(bytes)?)
    }
}
