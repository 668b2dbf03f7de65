// Sensor agreement: relative change series and correlation coefficients
//
// Sensor pairs are compared on their sample-to-sample relative change rather
// than on absolute temperature, which removes each sensor's fixed offset.

use crate::error::{AnalysisError, Result};

/// Percent change from the previous sample
///
/// The first element is NaN. A NaN on either side yields NaN; a zero previous
/// value yields ±inf (or NaN for 0/0).
///
/// # Example
/// ```
/// use earstudy::statistics::relative_change;
///
/// let change = relative_change(&[100.0, 110.0, 99.0]);
/// assert!(change[0].is_nan());
/// assert!((change[1] - 10.0).abs() < 1e-12);
/// assert!((change[2] + 10.0).abs() < 1e-12);
/// ```
pub fn relative_change(series: &[f64]) -> Vec<f64> {
    std::iter::once(f64::NAN)
        .chain(series.windows(2).map(|w| (w[1] - w[0]) / w[0] * 100.0))
        .take(series.len())
        .collect()
}

fn complete_pairs(a: &[f64], b: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
    if a.len() != b.len() {
        return Err(AnalysisError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    let pairs: (Vec<f64>, Vec<f64>) = a
        .iter()
        .zip(b)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (*x, *y))
        .unzip();
    if pairs.0.len() < 2 {
        return Err(AnalysisError::InsufficientSamples {
            required: 2,
            actual: pairs.0.len(),
        });
    }
    Ok(pairs)
}

fn pearson_of_complete(a: &[f64], b: &[f64]) -> Result<f64> {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let (cov, var_a, var_b) = a.iter().zip(b).fold((0.0, 0.0, 0.0), |(c, va, vb), (x, y)| {
        let (dx, dy) = (x - mean_a, y - mean_b);
        (c + dx * dy, va + dx * dx, vb + dy * dy)
    });

    if var_a == 0.0 || var_b == 0.0 {
        return Err(AnalysisError::DegenerateSample(
            "correlation undefined for a constant series".to_string(),
        ));
    }
    Ok((cov / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0))
}

/// Pearson correlation over pairs where both values are finite
pub fn pearson(a: &[f64], b: &[f64]) -> Result<f64> {
    let (a, b) = complete_pairs(a, b)?;
    pearson_of_complete(&a, &b)
}

/// 1-based ranks, ties share their average rank
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&i, &j| values[i].total_cmp(&values[j]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && values[order[end + 1]] == values[order[start]] {
            end += 1;
        }
        let rank = (start + end) as f64 / 2.0 + 1.0;
        for &index in &order[start..=end] {
            ranks[index] = rank;
        }
        start = end + 1;
    }
    ranks
}

/// Spearman rank correlation over pairs where both values are finite
pub fn spearman(a: &[f64], b: &[f64]) -> Result<f64> {
    let (a, b) = complete_pairs(a, b)?;
    pearson_of_complete(&average_ranks(&a), &average_ranks(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_change_lengths() {
        assert!(relative_change(&[]).is_empty());
        let single = relative_change(&[36.0]);
        assert_eq!(single.len(), 1);
        assert!(single[0].is_nan());
    }

    #[test]
    fn test_relative_change_propagates_nan() {
        let change = relative_change(&[1.0, f64::NAN, 2.0]);
        assert!(change[1].is_nan());
        assert!(change[2].is_nan());
    }

    #[test]
    fn test_pearson_perfect_linear() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [3.0, 5.0, 7.0, 9.0];
        assert!((pearson(&a, &b).unwrap() - 1.0).abs() < 1e-12);
        let c = [4.0, 3.0, 2.0, 1.0];
        assert!((pearson(&a, &c).unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_spearman_monotonic_nonlinear() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b: Vec<f64> = a.iter().map(|x: &f64| x.powi(3)).collect();
        assert!((spearman(&a, &b).unwrap() - 1.0).abs() < 1e-12);
        assert!(pearson(&a, &b).unwrap() < 1.0);
    }

    #[test]
    fn test_average_ranks_with_ties() {
        assert_eq!(average_ranks(&[10.0, 20.0, 10.0, 30.0]), vec![1.5, 3.0, 1.5, 4.0]);
    }

    #[test]
    fn test_spearman_skips_leading_nan() {
        // relative_change output always starts with NaN
        let a = relative_change(&[36.0, 36.1, 36.3, 36.2, 36.6]);
        let b = relative_change(&[35.0, 35.2, 35.5, 35.4, 35.9]);
        assert!((spearman(&a, &b).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_series_is_degenerate() {
        assert!(matches!(
            pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]),
            Err(AnalysisError::DegenerateSample(_))
        ));
    }

    #[test]
    fn test_too_few_pairs() {
        assert!(matches!(
            spearman(&[1.0, f64::NAN], &[1.0, 2.0]),
            Err(AnalysisError::InsufficientSamples { required: 2, actual: 1 })
        ));
    }
}
