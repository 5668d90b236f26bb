//! Random forest of regression trees

use crate::data::PanelView;
use crate::error::{ForecastError, Result};
use crate::features::FeatureSet;
use crate::models::tree::depth_param;
use crate::models::{
    design_matrix, ensure_min_rows, fit_error, ForecastModel, TrainedForecastModel,
    DEFAULT_MIN_TRAIN_ROWS,
};
use crate::tuning::{HyperparameterGrid, ParamSet};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::fmt;

const PARAMS: [&str; 3] = ["n_trees", "max_depth", "min_samples_split"];

/// Seed of the bootstrap samples, fixed so fits repeat exactly
pub const FOREST_SEED: u64 = 0;

type ForestRegressor = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Bagged regression trees
#[derive(Debug, Clone)]
pub struct RandomForest {
    name: String,
    /// Tuning grid replacing the default one
    grid: Option<HyperparameterGrid>,
    features: FeatureSet,
    min_train_rows: usize,
    n_trees: usize,
    max_depth: Option<u16>,
    min_samples_split: usize,
}

/// Fitted forest
pub struct TrainedRandomForest {
    features: FeatureSet,
    n_trees: usize,
    regressor: ForestRegressor,
}

impl RandomForest {
    /// Forest of 100 unrestricted trees over the given predictors
    pub fn new(features: FeatureSet) -> Self {
        Self {
            name: "rf".to_string(),
            features,
            min_train_rows: DEFAULT_MIN_TRAIN_ROWS,
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
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

    /// Set the number of trees
    pub fn with_n_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees;
        self
    }

    /// Limit the depth of every tree
    pub fn with_max_depth(mut self, max_depth: u16) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    fn check(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(ForecastError::InvalidParameter(
                "a forest needs at least one tree".to_string(),
            ));
        }
        if self.min_samples_split < 2 {
            return Err(ForecastError::InvalidParameter(format!(
                "min_samples_split must be at least 2, got {}",
                self.min_samples_split
            )));
        }
        Ok(())
    }

    fn parameters(&self) -> RandomForestRegressorParameters {
        let parameters = RandomForestRegressorParameters::default()
            .with_n_trees(self.n_trees)
            .with_min_samples_split(self.min_samples_split)
            .with_seed(FOREST_SEED);
        match self.max_depth {
            Some(depth) => parameters.with_max_depth(depth),
            None => parameters,
        }
    }
}

impl ForecastModel for RandomForest {
    fn name(&self) -> &str {
        &self.name
    }

    fn train(&self, train: &PanelView<'_>) -> Result<Box<dyn TrainedForecastModel>> {
        self.check()?;
        ensure_min_rows(train, self.min_train_rows)?;
        let x = design_matrix(train, &self.features)?;
        let y = train.target();
        let regressor = ForestRegressor::fit(&x, &y, self.parameters())
            .map_err(|e| fit_error(&self.name, e))?;

        Ok(Box::new(TrainedRandomForest {
            features: self.features.clone(),
            n_trees: self.n_trees,
            regressor,
        }))
    }

    fn with_params(&self, params: &ParamSet) -> Result<Box<dyn ForecastModel>> {
        params.ensure_known(&self.name, &PARAMS)?;
        let mut model = self.clone();
        if let Some(n_trees) = params.get_usize("n_trees")? {
            model.n_trees = n_trees;
        }
        if let Some(depth) = params.get_usize("max_depth")? {
            model.max_depth = Some(depth_param(depth)?);
        }
        if let Some(split) = params.get_usize("min_samples_split")? {
            model.min_samples_split = split;
        }
        model.check()?;
        Ok(Box::new(model))
    }

    fn param_grid(&self) -> Option<HyperparameterGrid> {
        Some(self.grid.clone().unwrap_or_else(default_grid))
    }
}

fn default_grid() -> HyperparameterGrid {
    HyperparameterGrid::new()
        .with("n_trees", vec![100.0, 200.0, 300.0])
        .with("max_depth", vec![4.0, 5.0, 6.0])
        .with("min_samples_split", vec![20.0, 30.0, 50.0])
}

impl TrainedForecastModel for TrainedRandomForest {
    fn predict(&self, test: &PanelView<'_>) -> Result<Vec<f64>> {
        let x = design_matrix(test, &self.features)?;
        self.regressor.predict(&x).map_err(|e| fit_error("rf", e))
    }
}

impl fmt::Debug for TrainedRandomForest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainedRandomForest")
            .field("features", &self.features.len())
            .field("n_trees", &self.n_trees)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{parse_timestamp, Panel};

    fn ramp_panel() -> Panel {
        let n = 96;
        let x: Vec<f64> = (0..n).map(|i| (i % 24) as f64).collect();
        let y: Vec<f64> = x.iter().map(|&h| 40.0 + 2.0 * h).collect();
        Panel::new(
            (0..n)
                .map(|h| {
                    parse_timestamp(&format!("2021-03-{:02} {:02}:00:00", 1 + h / 24, h % 24))
                        .unwrap()
                })
                .collect(),
            y,
            vec![("hour".to_string(), x)],
            None,
        )
        .unwrap()
    }

    fn forest() -> RandomForest {
        RandomForest::new(FeatureSet::new(vec!["hour".into()]))
            .with_min_train_rows(1)
            .with_n_trees(8)
            .with_max_depth(6)
    }

    #[test]
    fn test_fixed_seed_repeats_fit() {
        let panel = ramp_panel();
        let train = panel.view(0..72);
        let test = panel.view(72..96);

        let first = forest().train(&train).unwrap().predict(&test).unwrap();
        let second = forest().train(&train).unwrap().predict(&test).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 24);
    }

    #[test]
    fn test_with_params_rejects_invalid_values() {
        let model = forest();
        for params in [
            ParamSet::new().with("n_trees", 0.0),
            ParamSet::new().with("max_depth", 0.0),
            ParamSet::new().with("max_depth", 70_000.0),
            ParamSet::new().with("min_samples_split", 1.0),
            ParamSet::new().with("max_features", 20.0),
        ] {
            assert!(matches!(
                model.with_params(&params),
                Err(ForecastError::InvalidParameter(_))
            ));
        }

        let tuned = model
            .with_params(&ParamSet::new().with("n_trees", 4.0).with("max_depth", 3.0))
            .unwrap();
        assert_eq!(tuned.name(), "rf");
    }

    #[test]
    fn test_zero_trees_rejected_at_fit() {
        let panel = ramp_panel();
        let err = forest().with_n_trees(0).train(&panel.full_view()).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidParameter(_)));
    }
}
