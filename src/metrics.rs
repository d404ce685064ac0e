use ndarray::Array1;

use crate::error::{Result, TrainerError};

/// Coefficient of determination of `y_pred` against `y_true`.
///
/// Fewer than two samples yields NaN. A constant target scores 1.0 when
/// predicted exactly and 0.0 otherwise.
pub fn r2_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    if y_true.len() != y_pred.len() {
        return Err(TrainerError::Shape {
            expected: format!("{} predictions", y_true.len()),
            actual: format!("{} predictions", y_pred.len()),
        });
    }

    if y_true.len() < 2 {
        return Ok(f64::NAN);
    }

    let mean = y_true.mean().unwrap_or(0.0);
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p) * (t - p))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean) * (t - mean)).sum();

    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }

    Ok(1.0 - ss_res / ss_tot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_float_eq::assert_float_absolute_eq;
    use ndarray::array;

    #[test]
    fn test_perfect_prediction() {
        let y = array![1.0, 2.0, 3.0, 4.0];
        assert_float_absolute_eq!(r2_score(&y, &y).unwrap(), 1.0, 1e-12);
    }

    #[test]
    fn test_mean_prediction_scores_zero() {
        let y = array![1.0, 2.0, 3.0, 4.0];
        let pred = Array1::from_elem(4, 2.5);
        assert_float_absolute_eq!(r2_score(&y, &pred).unwrap(), 0.0, 1e-12);
    }

    #[test]
    fn test_known_value() {
        let y = array![3.0, -0.5, 2.0, 7.0];
        let pred = array![2.5, 0.0, 2.0, 8.0];
        assert_float_absolute_eq!(r2_score(&y, &pred).unwrap(), 0.948_608_137, 1e-6);
    }

    #[test]
    fn test_constant_target() {
        let y = array![2.0, 2.0, 2.0];
        assert_eq!(r2_score(&y, &y).unwrap(), 1.0);
        assert_eq!(r2_score(&y, &array![2.0, 2.0, 3.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_single_sample_is_nan() {
        assert!(r2_score(&array![1.0], &array![1.0]).unwrap().is_nan());
    }

    #[test]
    fn test_length_mismatch() {
        let err = r2_score(&array![1.0, 2.0], &array![1.0]).unwrap_err();
        assert!(matches!(err, TrainerError::Shape { .. }));
    }
}
