//! Descriptive statistics over percent-fill series.
//!
//! All functions operate on plain `f64` slices. Contract violations
//! (empty input to `mean`, mismatched lengths to `covariance`/`pearson`)
//! are returned as typed errors rather than silent sentinels: they point
//! at a bug in the caller, not at bad sensor data.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum StatsError {
    #[error("empty input series")]
    EmptyInput,
    #[error("series length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },
}

/// Arithmetic mean. Errors on empty input: every caller in this crate
/// holds a non-empty bucket set when it asks for a mean, so an empty
/// slice here is an upstream contract violation.
pub fn mean(values: &[f64]) -> Result<f64, StatsError> {
    if values.is_empty() {
        return Err(StatsError::EmptyInput);
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance (divide by n, not n - 1).
///
/// Returns 0.0 for empty and single-element input: a series without at
/// least two points carries no dispersion signal, and 0.0 is a usable
/// value for the ranking code downstream.
pub fn variance(values: &[f64]) -> f64 {
    let Ok(m) = mean(values) else {
        return 0.0;
    };
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn stddev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Population covariance of two equal-length, non-empty series.
pub fn covariance(xs: &[f64], ys: &[f64]) -> Result<f64, StatsError> {
    if xs.len() != ys.len() {
        return Err(StatsError::LengthMismatch {
            left: xs.len(),
            right: ys.len(),
        });
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;

    let cov = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (x - mx) * (y - my))
        .sum::<f64>()
        / xs.len() as f64;

    Ok(cov)
}

/// Pearson correlation coefficient in [-1, 1].
///
/// Returns `Ok(0.0)` when either series has zero variance: "no
/// correlation signal" must be a defined, comparable value for the
/// ranking code, never a platform-dependent NaN from dividing by zero.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Result<f64, StatsError> {
    let cov = covariance(xs, ys)?;

    let sx = stddev(xs);
    let sy = stddev(ys);
    if sx == 0.0 || sy == 0.0 {
        return Ok(0.0);
    }

    Ok(cov / (sx * sy))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_simple() {
        assert_eq!(mean(&[1.0, 2.0, 3.0]).unwrap(), 2.0);
    }

    #[test]
    fn test_mean_empty_is_error() {
        assert_eq!(mean(&[]), Err(StatsError::EmptyInput));
    }

    #[test]
    fn test_variance_single_element_is_zero() {
        assert_eq!(variance(&[42.0]), 0.0);
        assert_eq!(variance(&[-3.5]), 0.0);
    }

    #[test]
    fn test_variance_empty_is_zero() {
        assert_eq!(variance(&[]), 0.0);
        assert_eq!(stddev(&[]), 0.0);
    }

    #[test]
    fn test_variance_is_population_variance() {
        // mean 5, squared deviations 9+1+1+9 = 20, / 4 (not / 3)
        assert_eq!(variance(&[2.0, 4.0, 6.0, 8.0]), 5.0);
    }

    #[test]
    fn test_stddev() {
        assert_eq!(stddev(&[2.0, 4.0, 6.0, 8.0]), 5.0_f64.sqrt());
    }

    #[test]
    fn test_covariance_length_mismatch() {
        assert_eq!(
            covariance(&[1.0, 2.0], &[1.0]),
            Err(StatsError::LengthMismatch { left: 2, right: 1 })
        );
    }

    #[test]
    fn test_covariance_empty_is_error() {
        assert_eq!(covariance(&[], &[]), Err(StatsError::EmptyInput));
    }

    #[test]
    fn test_pearson_perfect_positive() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [10.0, 20.0, 30.0, 40.0];
        assert!((pearson(&xs, &ys).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_perfect_negative() {
        let xs = [1.0, 2.0, 3.0];
        let ys = [3.0, 2.0, 1.0];
        assert!((pearson(&xs, &ys).unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_symmetry() {
        let xs = [1.0, 5.0, 2.0, 8.0, 3.0];
        let ys = [2.0, 4.0, 4.0, 9.0, 1.0];
        assert_eq!(pearson(&xs, &ys).unwrap(), pearson(&ys, &xs).unwrap());
    }

    #[test]
    fn test_pearson_zero_variance_is_zero_not_nan() {
        let flat = [5.0, 5.0, 5.0];
        let moving = [1.0, 2.0, 3.0];
        assert_eq!(pearson(&flat, &moving).unwrap(), 0.0);
        assert_eq!(pearson(&moving, &flat).unwrap(), 0.0);
    }

    #[test]
    fn test_pearson_length_mismatch() {
        assert_eq!(
            pearson(&[1.0], &[1.0, 2.0]),
            Err(StatsError::LengthMismatch { left: 1, right: 2 })
        );
    }
}
