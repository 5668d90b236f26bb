//! Single regression tree over the full feature set

use crate::data::PanelView;
use crate::error::{ForecastError, Result};
use crate::features::FeatureSet;
use crate::models::{
    design_matrix, ensure_min_rows, fit_error, ForecastModel, TrainedForecastModel,
    DEFAULT_MIN_TRAIN_ROWS,
};
use crate::tuning::{HyperparameterGrid, ParamSet};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};
use std::fmt;

const PARAMS: [&str; 2] = ["min_samples_split", "max_depth"];

pub(crate) type TreeRegressor = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Regression tree
#[derive(Debug, Clone)]
pub struct DecisionTree {
    name: String,
    /// Tuning grid replacing the default one
    grid: Option<HyperparameterGrid>,
    features: FeatureSet,
    min_train_rows: usize,
    /// Smallest node that may still be split
    min_samples_split: usize,
    /// Depth limit; `None` grows until leaves are pure
    max_depth: Option<u16>,
}

/// Fitted regression tree
pub struct TrainedDecisionTree {
    features: FeatureSet,
    regressor: TreeRegressor,
}

impl DecisionTree {
    /// Tree over the given predictors with default settings
    pub fn new(features: FeatureSet) -> Self {
        Self {
            name: "dt".to_string(),
            features,
            min_train_rows: DEFAULT_MIN_TRAIN_ROWS,
            min_samples_split: 2,
            max_depth: None,
            grid: None,
        }
    }

    /// Override the smallest accepted training window
    pub fn with_min_train_rows(mut self, min_train_rows: usize) -> Self {
        self.min_train_rows = min_train_rows;
        self
    }

    /// Tune over `grid` instead of the default grid
    pub fn with_param_grid(mut self, grid: HyperparameterGrid) -> Self {
        self.grid = Some(grid);
        self
    }

    /// Set the smallest splittable node
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Limit the tree depth
    pub fn with_max_depth(mut self, max_depth: u16) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    fn parameters(&self) -> DecisionTreeRegressorParameters {
        let parameters =
            DecisionTreeRegressorParameters::default().with_min_samples_split(self.min_samples_split);
        match self.max_depth {
            Some(depth) => parameters.with_max_depth(depth),
            None => parameters,
        }
    }
}

impl ForecastModel for DecisionTree {
    fn name(&self) -> &str {
        &self.name
    }

    fn train(&self, train: &PanelView<'_>) -> Result<Box<dyn TrainedForecastModel>> {
        ensure_min_rows(train, self.min_train_rows)?;
        let x = design_matrix(train, &self.features)?;
        let y = train.target();
        let regressor = TreeRegressor::fit(&x, &y, self.parameters())
            .map_err(|e| fit_error(&self.name, e))?;

        Ok(Box::new(TrainedDecisionTree {
            features: self.features.clone(),
            regressor,
        }))
    }

    fn with_params(&self, params: &ParamSet) -> Result<Box<dyn ForecastModel>> {
        params.ensure_known(&self.name, &PARAMS)?;
        let mut model = self.clone();
        if let Some(split) = params.get_usize("min_samples_split")? {
            model.min_samples_split = split;
        }
        if let Some(depth) = params.get_usize("max_depth")? {
            model.max_depth = Some(depth_param(depth)?);
        }
        Ok(Box::new(model))
    }

    fn param_grid(&self) -> Option<HyperparameterGrid> {
        Some(self.grid.clone().unwrap_or_else(default_grid))
    }
}

// The smartcore tree draws no per-split feature subsample, so there is no
// max_features axis.
fn default_grid() -> HyperparameterGrid {
    HyperparameterGrid::new()
        .with("min_samples_split", vec![10.0, 20.0, 30.0, 50.0, 70.0])
        .with("max_depth", vec![2.0, 3.0, 4.0, 5.0, 6.0, 7.0])
}

impl TrainedForecastModel for TrainedDecisionTree {
    fn predict(&self, test: &PanelView<'_>) -> Result<Vec<f64>> {
        let x = design_matrix(test, &self.features)?;
        self.regressor.predict(&x).map_err(|e| fit_error("dt", e))
    }
}

impl fmt::Debug for TrainedDecisionTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainedDecisionTree")
            .field("features", &self.features.len())
            .finish()
    }
}

/// Depth parameters are stored as `u16` by the tree backend
pub(crate) fn depth_param(depth: usize) -> Result<u16> {
    if depth == 0 {
        return Err(ForecastError::InvalidParameter(
            "max_depth must be at least 1".to_string(),
        ));
    }
    u16::try_from(depth)
        .map_err(|_| ForecastError::InvalidParameter(format!("max_depth {} is too large", depth)))
}
