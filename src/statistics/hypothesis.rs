// Significance tests between phases or sensor groups using aprender
//
// Inputs are validated and NaN-filtered here in f64, then converted to the f32
// samples aprender's hypothesis tests take. Degenerate inputs that the
// underlying formulas cannot handle (zero variance) are detected on those f32
// samples, since readings that differ in f64 can collapse after the cast, and
// resolved before the call:
// - paired test, all differences zero: no evidence of change (t = 0, p = 1)
// - independent test, both groups constant: t = 0 / p = 1 for equal means,
//   t = ±inf / p = 0 otherwise
// - ANOVA with no variance at all: undefined, reported as DegenerateSample

use super::descriptive::valid_values;
use crate::error::{AnalysisError, Result};
use serde::Serialize;

/// Result of a t-test or one-way ANOVA
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TestOutcome {
    /// t statistic, or F statistic for ANOVA
    pub statistic: f64,

    /// Two-tailed p-value
    pub p_value: f64,

    /// Degrees of freedom (between-groups df for ANOVA)
    pub df: f64,

    /// Within-groups df, ANOVA only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub df_within: Option<f64>,
}

impl TestOutcome {
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

fn to_f32(values: &[f64]) -> Vec<f32> {
    values.iter().map(|&v| v as f32).collect()
}

fn is_constant(values: &[f32]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

fn mean(values: &[f32]) -> f64 {
    values.iter().map(|&v| f64::from(v)).sum::<f64>() / values.len() as f64
}

/// Paired t-test on `a[i]` vs `b[i]`
///
/// Pairs where either side is NaN are dropped; at least 2 pairs must remain.
///
/// # Example
/// ```
/// use earstudy::statistics::paired_t_test;
///
/// let before = vec![36.5, 37.0, 36.8];
/// let outcome = paired_t_test(&before, &before).unwrap();
/// assert_eq!(outcome.statistic, 0.0);
/// assert_eq!(outcome.p_value, 1.0);
/// ```
pub fn paired_t_test(a: &[f64], b: &[f64]) -> Result<TestOutcome> {
    if a.len() != b.len() {
        return Err(AnalysisError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let (a, b): (Vec<f64>, Vec<f64>) = a
        .iter()
        .zip(b)
        .filter(|(x, y)| !x.is_nan() && !y.is_nan())
        .map(|(x, y)| (*x, *y))
        .unzip();

    if a.len() < 2 {
        return Err(AnalysisError::InsufficientSamples {
            required: 2,
            actual: a.len(),
        });
    }

    let df = (a.len() - 1) as f64;
    let (a, b) = (to_f32(&a), to_f32(&b));
    let differences: Vec<f32> = a.iter().zip(&b).map(|(x, y)| x - y).collect();
    if is_constant(&differences) {
        let (statistic, p_value) = match differences[0] {
            d if d == 0.0 => (0.0, 1.0),
            d if d > 0.0 => (f64::INFINITY, 0.0),
            _ => (f64::NEG_INFINITY, 0.0),
        };
        return Ok(TestOutcome {
            statistic,
            p_value,
            df,
            df_within: None,
        });
    }

    let result = aprender::stats::hypothesis::ttest_rel(&a, &b)
        .map_err(|e| AnalysisError::TestFailed(e.to_string()))?;

    Ok(TestOutcome {
        statistic: f64::from(result.statistic),
        p_value: f64::from(result.pvalue),
        df,
        df_within: None,
    })
}

/// Student's two-sample t-test with pooled variance
///
/// Group sizes may differ; NaN readings are omitted per group and each group
/// needs at least 2 valid samples.
pub fn independent_t_test(a: &[f64], b: &[f64]) -> Result<TestOutcome> {
    let a = valid_values(a);
    let b = valid_values(b);

    if let Some(short) = [&a, &b].into_iter().find(|g| g.len() < 2) {
        return Err(AnalysisError::InsufficientSamples {
            required: 2,
            actual: short.len(),
        });
    }

    let df = (a.len() + b.len() - 2) as f64;
    let (a, b) = (to_f32(&a), to_f32(&b));
    if is_constant(&a) && is_constant(&b) {
        let difference = mean(&a) - mean(&b);
        let (statistic, p_value) = if difference == 0.0 {
            (0.0, 1.0)
        } else {
            (difference.signum() * f64::INFINITY, 0.0)
        };
        return Ok(TestOutcome {
            statistic,
            p_value,
            df,
            df_within: None,
        });
    }

    let result = aprender::stats::hypothesis::ttest_ind(&a, &b, true)
        .map_err(|e| AnalysisError::TestFailed(e.to_string()))?;

    Ok(TestOutcome {
        statistic: f64::from(result.statistic),
        p_value: f64::from(result.pvalue),
        df,
        df_within: None,
    })
}

/// One-way ANOVA across two or more groups
pub fn one_way_anova(groups: &[Vec<f64>]) -> Result<TestOutcome> {
    if groups.len() < 2 {
        return Err(AnalysisError::InsufficientSamples {
            required: 2,
            actual: groups.len(),
        });
    }

    let groups: Vec<Vec<f64>> = groups.iter().map(|g| valid_values(g)).collect();
    if let Some(position) = groups.iter().position(|g| g.is_empty()) {
        return Err(AnalysisError::MissingData(format!(
            "group {} has no valid samples",
            position
        )));
    }

    let total: usize = groups.iter().map(Vec::len).sum();
    if total <= groups.len() {
        return Err(AnalysisError::InsufficientSamples {
            required: groups.len() + 1,
            actual: total,
        });
    }

    let converted: Vec<Vec<f32>> = groups.iter().map(|g| to_f32(g)).collect();
    if converted.iter().all(|g| is_constant(g)) {
        return Err(AnalysisError::DegenerateSample(
            "every group is constant, F statistic is undefined".to_string(),
        ));
    }

    let result = aprender::stats::hypothesis::f_oneway(&converted)
        .map_err(|e| AnalysisError::TestFailed(e.to_string()))?;

    Ok(TestOutcome {
        statistic: f64::from(result.statistic),
        p_value: f64::from(result.pvalue),
        df: (groups.len() - 1) as f64,
        df_within: Some((total - groups.len()) as f64),
    })
}
