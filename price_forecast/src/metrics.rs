//! Metrics for evaluating forecast performance
//!
//! Values are computed at full precision. Rounding to [`REPORT_DECIMALS`]
//! only happens when a report is written.

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median};

/// Decimal places used when metrics are written out
pub const REPORT_DECIMALS: u32 = 2;

/// Error metrics of one forecast against its actuals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Median Absolute Percentage Error, absent when no row qualifies
    pub mdape: Option<f64>,
}

impl std::fmt::Display for ErrorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Forecast Error Metrics:")?;
        writeln!(f, "  MAE:   {:.4}", self.mae)?;
        writeln!(f, "  RMSE:  {:.4}", self.rmse)?;
        match self.mdape {
            Some(mdape) => writeln!(f, "  MdAPE: {:.4}%", mdape)?,
            None => writeln!(f, "  MdAPE: unavailable")?,
        }
        Ok(())
    }
}

fn check_aligned(actual: &[f64], predicted: &[f64]) -> Result<()> {
    if actual.len() != predicted.len() || actual.is_empty() {
        return Err(ForecastError::Validation(format!(
            "Actual ({}) and predicted ({}) values must have the same non-zero length",
            actual.len(),
            predicted.len()
        )));
    }
    Ok(())
}

/// Mean of `|actual - predicted|`
pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_aligned(actual, predicted)?;
    let sum: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum();
    Ok(sum / actual.len() as f64)
}

/// Square root of the mean of `(actual - predicted)^2`
pub fn root_mean_squared_error(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    Ok(mean_squared_error(actual, predicted)?.sqrt())
}

/// Mean of `(actual - predicted)^2`
pub fn mean_squared_error(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_aligned(actual, predicted)?;
    let sum: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    Ok(sum / actual.len() as f64)
}

/// Percentage errors `100 * |actual - predicted| / actual` of the rows that
/// qualify for MdAPE.
///
/// Rows with a zero actual or a non-finite ratio are dropped. The denominator
/// keeps its sign, so negative prices yield negative percentages.
pub fn percentage_errors(actual: &[f64], predicted: &[f64]) -> Result<Vec<f64>> {
    check_aligned(actual, predicted)?;
    Ok(actual
        .iter()
        .zip(predicted)
        .filter(|(a, _)| **a != 0.0)
        .map(|(a, p)| 100.0 * (a - p).abs() / a)
        .filter(|ratio| ratio.is_finite())
        .collect())
}

/// Median Absolute Percentage Error over the qualifying rows
pub fn median_absolute_percentage_error(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    let errors = percentage_errors(actual, predicted)?;
    if errors.is_empty() {
        return Err(ForecastError::UndefinedMetric(format!(
            "MdAPE: all {} rows have a zero actual or a non-finite ratio",
            actual.len()
        )));
    }
    Ok(Data::new(errors).median())
}

/// Compute MAE, RMSE and MdAPE; an undefined MdAPE is reported as absent
pub fn evaluate_forecast(actual: &[f64], predicted: &[f64]) -> Result<ErrorMetrics> {
    let mae = mean_absolute_error(actual, predicted)?;
    let rmse = root_mean_squared_error(actual, predicted)?;
    let mdape = match median_absolute_percentage_error(actual, predicted) {
        Ok(value) => Some(value),
        Err(ForecastError::UndefinedMetric(_)) => None,
        Err(e) => return Err(e),
    };

    Ok(ErrorMetrics { mae, rmse, mdape })
}

/// Round half away from zero to a number of decimals
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_percentage_errors_keep_sign_of_actual() {
        let errors = percentage_errors(&[-10.0, 10.0], &[-5.0, 5.0]).unwrap();
        assert_eq!(errors, vec![-50.0, 50.0]);
    }

    #[test]
    fn test_non_finite_prediction_excluded_from_mdape() {
        let mdape =
            median_absolute_percentage_error(&[10.0, 20.0, 40.0], &[f64::NAN, 18.0, 36.0])
                .unwrap();
        assert_abs_diff_eq!(mdape, 10.0);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.234_9, 2), 1.23);
        assert_eq!(round_to(-2.005_1, 2), -2.01);
        assert_eq!(round_to(7.0, 0), 7.0);
    }
}
