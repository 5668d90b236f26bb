//! Least-squares gradient boosting over regression trees
//!
//! Starts from the training mean and fits one shallow tree per round to the
//! current residuals, adding it with a shrinkage factor. Rows may be
//! subsampled per round with a seeded generator so fits repeat exactly.

use crate::data::PanelView;
use crate::error::{ForecastError, Result};
use crate::features::FeatureSet;
use crate::models::tree::{depth_param, TreeRegressor};
use crate::models::{
    design_matrix, ensure_min_rows, fit_error, ForecastModel, TrainedForecastModel,
    DEFAULT_MIN_TRAIN_ROWS,
};
use crate::tuning::{HyperparameterGrid, ParamSet};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::DecisionTreeRegressorParameters;
use statrs::statistics::Statistics;
use std::fmt;
use tracing::debug;

const PARAMS: [&str; 4] = ["n_estimators", "learning_rate", "max_depth", "subsample"];

/// Seed of the row subsampling
pub const BOOSTING_SEED: u64 = 0;

/// Residuals below this are treated as a perfect fit
const RESIDUAL_TOLERANCE: f64 = 1e-12;

/// Gradient-boosted trees
#[derive(Debug, Clone)]
pub struct GradientBoosting {
    name: String,
    /// Tuning grid replacing the default one
    grid: Option<HyperparameterGrid>,
    features: FeatureSet,
    min_train_rows: usize,
    n_estimators: usize,
    learning_rate: f64,
    max_depth: u16,
    /// Smallest node a round's tree may split
    min_samples_split: usize,
    /// Fraction of rows drawn for each round
    subsample: f64,
}

/// Fitted ensemble
pub struct TrainedGradientBoosting {
    features: FeatureSet,
    init: f64,
    learning_rate: f64,
    trees: Vec<TreeRegressor>,
}

impl GradientBoosting {
    /// 100 rounds of depth-5 trees with shrinkage 0.1
    pub fn new(features: FeatureSet) -> Self {
        Self {
            name: "gbm".to_string(),
            features,
            min_train_rows: DEFAULT_MIN_TRAIN_ROWS,
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 5,
            min_samples_split: 20,
            subsample: 1.0,
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

    /// Set the number of boosting rounds
    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    /// Set the shrinkage applied to each tree
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the depth of each tree
    pub fn with_max_depth(mut self, max_depth: u16) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the fraction of rows drawn per round
    pub fn with_subsample(mut self, subsample: f64) -> Self {
        self.subsample = subsample;
        self
    }

    fn check(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "learning_rate must lie in (0, 1], got {}",
                self.learning_rate
            )));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "subsample must lie in (0, 1], got {}",
                self.subsample
            )));
        }
        Ok(())
    }

    fn round_rows(&self, n: usize, rng: &mut StdRng) -> Option<Vec<usize>> {
        if self.subsample >= 1.0 {
            return None;
        }
        let size = ((n as f64) * self.subsample).ceil() as usize;
        let mut rows: Vec<usize> = (0..n).collect();
        rows.shuffle(rng);
        rows.truncate(size.max(1));
        rows.sort_unstable();
        Some(rows)
    }
}

impl ForecastModel for GradientBoosting {
    fn name(&self) -> &str {
        &self.name
    }

    fn train(&self, train: &PanelView<'_>) -> Result<Box<dyn TrainedForecastModel>> {
        ensure_min_rows(train, self.min_train_rows)?;
        self.check()?;

        let rows = train.feature_matrix(self.features.columns())?;
        let x = DenseMatrix::from_2d_vec(&rows);
        let y = train.target();
        let init = y.iter().mean();

        let parameters = DecisionTreeRegressorParameters::default()
            .with_max_depth(self.max_depth)
            .with_min_samples_split(self.min_samples_split);
        let mut rng = StdRng::seed_from_u64(BOOSTING_SEED);
        let mut fitted = vec![init; y.len()];
        let mut trees = Vec::with_capacity(self.n_estimators);

        for round in 0..self.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(a, f)| a - f).collect();
            if residuals.iter().all(|r| r.abs() < RESIDUAL_TOLERANCE) {
                debug!("{}: residuals vanished after {} rounds", self.name, round);
                break;
            }

            let tree = match self.round_rows(y.len(), &mut rng) {
                Some(sample) => {
                    let sampled: Vec<Vec<f64>> = sample.iter().map(|&i| rows[i].clone()).collect();
                    let x_round = DenseMatrix::from_2d_vec(&sampled);
                    let y_round: Vec<f64> = sample.iter().map(|&i| residuals[i]).collect();
                    TreeRegressor::fit(&x_round, &y_round, parameters.clone())
                }
                None => TreeRegressor::fit(&x, &residuals, parameters.clone()),
            }
            .map_err(|e| fit_error(&self.name, e))?;

            let step = tree.predict(&x).map_err(|e| fit_error(&self.name, e))?;
            for (f, s) in fitted.iter_mut().zip(&step) {
                *f += self.learning_rate * s;
            }
            trees.push(tree);
        }

        Ok(Box::new(TrainedGradientBoosting {
            features: self.features.clone(),
            init,
            learning_rate: self.learning_rate,
            trees,
        }))
    }

    fn with_params(&self, params: &ParamSet) -> Result<Box<dyn ForecastModel>> {
        params.ensure_known(&self.name, &PARAMS)?;
        let mut model = self.clone();
        if let Some(n) = params.get_usize("n_estimators")? {
            model.n_estimators = n;
        }
        if let Some(rate) = params.get("learning_rate") {
            model.learning_rate = rate;
        }
        if let Some(depth) = params.get_usize("max_depth")? {
            model.max_depth = depth_param(depth)?;
        }
        if let Some(subsample) = params.get("subsample") {
            model.subsample = subsample;
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
        .with("n_estimators", vec![500.0, 1000.0, 1500.0])
        .with("learning_rate", vec![0.01, 0.1, 0.2])
        .with("max_depth", vec![4.0, 5.0, 6.0, 7.0])
}

impl TrainedForecastModel for TrainedGradientBoosting {
    fn predict(&self, test: &PanelView<'_>) -> Result<Vec<f64>> {
        let x = design_matrix(test, &self.features)?;
        let mut predictions = vec![self.init; test.len()];
        for tree in &self.trees {
            let step = tree.predict(&x).map_err(|e| fit_error("gbm", e))?;
            for (p, s) in predictions.iter_mut().zip(&step) {
                *p += self.learning_rate * s;
            }
        }
        Ok(predictions)
    }
}

impl fmt::Debug for TrainedGradientBoosting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainedGradientBoosting")
            .field("features", &self.features.len())
            .field("init", &self.init)
            .field("rounds", &self.trees.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{parse_timestamp, Panel};

    fn ramp_panel(n: usize) -> Panel {
        let x: Vec<f64> = (0..n).map(|i| (i % 24) as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 20.0 + 2.0 * v).collect();
        Panel::new(
            (0..n)
                .map(|h| {
                    parse_timestamp(&format!("2021-03-{:02} {:02}:00:00", 1 + h / 24, h % 24))
                        .unwrap()
                })
                .collect(),
            y,
            vec![("x".to_string(), x)],
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_boosting_reduces_error() {
        let panel = ramp_panel(240);
        let view = panel.full_view();
        let target = view.target();
        let mean = target.iter().mean();
        let baseline: f64 = target.iter().map(|y| (y - mean).abs()).sum();

        let model = GradientBoosting::new(FeatureSet::new(vec!["x".into()]))
            .with_min_train_rows(1)
            .with_n_estimators(50)
            .with_max_depth(4);
        let predictions = model.train(&view).unwrap().predict(&view).unwrap();
        let boosted: f64 = target
            .iter()
            .zip(&predictions)
            .map(|(y, p)| (y - p).abs())
            .sum();
        assert!(boosted < baseline * 0.25);
    }

    #[test]
    fn test_subsampled_fit_is_deterministic() {
        let panel = ramp_panel(240);
        let view = panel.full_view();
        let model = GradientBoosting::new(FeatureSet::new(vec!["x".into()]))
            .with_min_train_rows(1)
            .with_n_estimators(10)
            .with_subsample(0.5);
        let first = model.train(&view).unwrap().predict(&view).unwrap();
        let second = model.train(&view).unwrap().predict(&view).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_learning_rate_rejected() {
        let model = GradientBoosting::new(FeatureSet::new(vec!["x".into()]));
        let params = ParamSet::new().with("learning_rate", 0.0);
        assert!(matches!(
            model.with_params(&params),
            Err(ForecastError::InvalidParameter(_))
        ));
    }
}
