//! Gaussian linear model with identity link
//!
//! Additive in the share predictors and the exogenous drivers, without an
//! intercept or regularisation. Coefficients solve the normal equations
//! `X'X b = X'y` through a Cholesky factorisation.

use crate::data::PanelView;
use crate::error::{ForecastError, Result};
use crate::features::FeatureSet;
use crate::models::{ensure_min_rows, ForecastModel, TrainedForecastModel, DEFAULT_MIN_TRAIN_ROWS};
use crate::tuning::ParamSet;
use nalgebra::{DMatrix, DVector};
use tracing::debug;

/// Smallest pivot of the Cholesky factor, relative to the largest
const PIVOT_TOLERANCE: f64 = 1e-7;

/// Ordinary least squares through the origin
#[derive(Debug, Clone)]
pub struct LinearModel {
    name: String,
    features: FeatureSet,
    min_train_rows: usize,
}

/// Fitted coefficients, one per feature
#[derive(Debug, Clone)]
pub struct TrainedLinearModel {
    features: FeatureSet,
    coefficients: Vec<f64>,
}

impl LinearModel {
    /// Linear model over the given predictors
    pub fn new(features: FeatureSet) -> Self {
        Self {
            name: "glm".to_string(),
            features,
            min_train_rows: DEFAULT_MIN_TRAIN_ROWS,
        }
    }

    /// Override the smallest accepted training window
    pub fn with_min_train_rows(mut self, min_train_rows: usize) -> Self {
        self.min_train_rows = min_train_rows;
        self
    }
}

impl TrainedLinearModel {
    /// Coefficients in feature order
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }
}

impl ForecastModel for LinearModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn train(&self, train: &PanelView<'_>) -> Result<Box<dyn TrainedForecastModel>> {
        ensure_min_rows(train, self.min_train_rows)?;
        if self.features.is_empty() {
            return Err(ForecastError::ModelFit(format!(
                "{}: no predictor columns",
                self.name
            )));
        }

        let rows = train.feature_matrix(self.features.columns())?;
        let target = train.target();
        let k = self.features.len();

        let mut xtx = DMatrix::<f64>::zeros(k, k);
        let mut xty = DVector::<f64>::zeros(k);
        for (row, &y) in rows.iter().zip(&target) {
            for i in 0..k {
                xty[i] += row[i] * y;
                for j in i..k {
                    xtx[(i, j)] += row[i] * row[j];
                }
            }
        }
        for i in 0..k {
            for j in 0..i {
                xtx[(i, j)] = xtx[(j, i)];
            }
        }

        let singular = || {
            ForecastError::ModelFit(format!(
                "{}: design matrix over {} is singular",
                self.name,
                self.features.columns().join(", ")
            ))
        };
        let cholesky = xtx.cholesky().ok_or_else(singular)?;

        // A zero or vanishing pivot means dependent columns.
        let pivots = cholesky.l().diagonal();
        if pivots.min() <= pivots.max() * PIVOT_TOLERANCE {
            return Err(singular());
        }

        let coefficients: Vec<f64> = cholesky.solve(&xty).iter().copied().collect();
        if coefficients.iter().any(|b| !b.is_finite()) {
            return Err(singular());
        }
        debug!("{} coefficients: {:?}", self.name, coefficients);

        Ok(Box::new(TrainedLinearModel {
            features: self.features.clone(),
            coefficients,
        }))
    }

    fn with_params(&self, params: &ParamSet) -> Result<Box<dyn ForecastModel>> {
        params.ensure_known(&self.name, &[])?;
        Ok(Box::new(self.clone()))
    }
}

impl TrainedForecastModel for TrainedLinearModel {
    fn predict(&self, test: &PanelView<'_>) -> Result<Vec<f64>> {
        let rows = test.feature_matrix(self.features.columns())?;
        Ok(rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&self.coefficients)
                    .map(|(x, b)| x * b)
                    .sum()
            })
            .collect())
    }
}
