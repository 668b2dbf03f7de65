// Head movement from IMU channels
//
// Movement at a sample is sqrt(sum of squares) over every IMU axis, leaving
// out axes with a missing reading. A sample with no reading on any axis is NaN.

use crate::error::{AnalysisError, Result};

/// Per-sample movement magnitude over equally long IMU axes
pub fn movement_magnitude(axes: &[&[f64]]) -> Result<Vec<f64>> {
    let Some(first) = axes.first() else {
        return Err(AnalysisError::MissingData("no IMU axes".to_string()));
    };
    let len = first.len();
    if let Some(axis) = axes.iter().find(|axis| axis.len() != len) {
        return Err(AnalysisError::LengthMismatch {
            left: len,
            right: axis.len(),
        });
    }

    Ok((0..len)
        .map(|i| {
            let readings = axes.iter().map(|axis| axis[i]).filter(|v| !v.is_nan());
            let (count, sum_sq) = readings.fold((0usize, 0.0), |(n, acc), v| (n + 1, acc + v * v));
            if count == 0 {
                f64::NAN
            } else {
                sum_sq.sqrt()
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnitude_is_euclidean_norm() {
        let x = [3.0, 0.0, 1.0];
        let y = [4.0, 0.0, 2.0];
        let z = [0.0, 0.0, 2.0];
        let magnitude = movement_magnitude(&[&x, &y, &z]).unwrap();
        assert_eq!(magnitude, vec![5.0, 0.0, 3.0]);
    }

    #[test]
    fn test_missing_axes_are_left_out() {
        let x = [3.0, f64::NAN];
        let y = [f64::NAN, f64::NAN];
        let magnitude = movement_magnitude(&[&x, &y]).unwrap();
        assert_eq!(magnitude[0], 3.0);
        assert!(magnitude[1].is_nan());
    }

    #[test]
    fn test_no_axes_is_missing_data() {
        assert!(matches!(movement_magnitude(&[]), Err(AnalysisError::MissingData(_))));
    }

    #[test]
    fn test_ragged_axes_rejected() {
        let x = [1.0, 2.0];
        let y = [1.0];
        assert!(matches!(
            movement_magnitude(&[&x, &y]),
            Err(AnalysisError::LengthMismatch { left: 2, right: 1 })
        ));
    }
}
