//! Forecasting strategies evaluated by the walk-forward runner
//!
//! Every model family sits behind the same [`ForecastModel`] /
//! [`TrainedForecastModel`] pair. A fitted model lives for one window only.

use crate::config::CountryConfig;
use crate::data::{Panel, PanelView};
use crate::error::{ForecastError, Result};
use crate::features::FeatureSet;
use crate::tuning::{HyperparameterGrid, ParamSet};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::fmt::{self, Debug};
use std::str::FromStr;

pub mod boosting;
pub mod forest;
pub mod linear;
pub mod naive;
pub mod tree;

pub use boosting::GradientBoosting;
pub use forest::RandomForest;
pub use linear::LinearModel;
pub use naive::SeasonalNaive;
pub use tree::DecisionTree;

/// Smallest training window accepted by default: 30 days of hours
pub const DEFAULT_MIN_TRAIN_ROWS: usize = 720;

/// Model fitted on one training window
pub trait TrainedForecastModel: Debug + Send {
    /// One prediction per row of `test`, in row order
    fn predict(&self, test: &PanelView<'_>) -> Result<Vec<f64>>;
}

/// Forecasting strategy that can be fitted on a training window
pub trait ForecastModel: Debug + Send + Sync {
    /// Short name used in reports, e.g. "dt"
    fn name(&self) -> &str;

    /// Fit on a training window
    fn train(&self, train: &PanelView<'_>) -> Result<Box<dyn TrainedForecastModel>>;

    /// Copy of the model with some hyperparameters replaced
    fn with_params(&self, params: &ParamSet) -> Result<Box<dyn ForecastModel>>;

    /// Default tuning grid; `None` when the model has nothing to tune
    fn param_grid(&self) -> Option<HyperparameterGrid> {
        None
    }
}

/// Fail with [`ForecastError::InsufficientData`] below `required` rows
pub(crate) fn ensure_min_rows(view: &PanelView<'_>, required: usize) -> Result<()> {
    if view.len() < required {
        return Err(ForecastError::InsufficientData {
            required,
            actual: view.len(),
        });
    }
    Ok(())
}

/// Dense design matrix for the smartcore backends
pub(crate) fn design_matrix(view: &PanelView<'_>, features: &FeatureSet) -> Result<DenseMatrix<f64>> {
    let rows = view.feature_matrix(features.columns())?;
    Ok(DenseMatrix::from_2d_vec(&rows))
}

pub(crate) fn fit_error(model: &str, err: impl fmt::Display) -> ForecastError {
    ForecastError::ModelFit(format!("{}: {}", model, err))
}

/// The model families of the benchmark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModelKind {
    /// Same-month mean of the previous year
    Naive,
    /// Gaussian linear model on shares and exogenous drivers
    Glm,
    /// Single regression tree
    DecisionTree,
    /// Bagged regression trees
    RandomForest,
    /// Least-squares gradient boosting over regression trees
    GradientBoosting,
}

impl ModelKind {
    /// Every family, in report order
    pub fn all() -> [ModelKind; 5] {
        [
            ModelKind::Naive,
            ModelKind::Glm,
            ModelKind::DecisionTree,
            ModelKind::RandomForest,
            ModelKind::GradientBoosting,
        ]
    }

    /// Report name of the family
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Naive => "naive",
            ModelKind::Glm => "glm",
            ModelKind::DecisionTree => "dt",
            ModelKind::RandomForest => "rf",
            ModelKind::GradientBoosting => "gbm",
        }
    }

    /// Feature set the family is fitted on
    pub fn feature_set(&self, config: &CountryConfig, panel: &Panel) -> Option<FeatureSet> {
        match self {
            ModelKind::Naive => None,
            ModelKind::Glm => Some(FeatureSet::linear(config)),
            ModelKind::DecisionTree | ModelKind::RandomForest | ModelKind::GradientBoosting => {
                Some(FeatureSet::full(config, panel))
            }
        }
    }

    /// Model of this family with default hyperparameters
    pub fn build(
        &self,
        config: &CountryConfig,
        panel: &Panel,
        min_train_rows: usize,
    ) -> Box<dyn ForecastModel> {
        match self {
            ModelKind::Naive => Box::new(SeasonalNaive::new().with_min_train_rows(min_train_rows)),
            ModelKind::Glm => Box::new(
                LinearModel::new(FeatureSet::linear(config)).with_min_train_rows(min_train_rows),
            ),
            ModelKind::DecisionTree => Box::new(
                DecisionTree::new(FeatureSet::full(config, panel))
                    .with_min_train_rows(min_train_rows),
            ),
            ModelKind::RandomForest => Box::new(
                RandomForest::new(FeatureSet::full(config, panel))
                    .with_min_train_rows(min_train_rows),
            ),
            ModelKind::GradientBoosting => Box::new(
                GradientBoosting::new(FeatureSet::full(config, panel))
                    .with_min_train_rows(min_train_rows),
            ),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ModelKind {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "naive" => Ok(ModelKind::Naive),
            "glm" | "linear" => Ok(ModelKind::Glm),
            "dt" | "tree" | "decision_tree" => Ok(ModelKind::DecisionTree),
            "rf" | "forest" | "random_forest" => Ok(ModelKind::RandomForest),
            "gbm" | "lgbm" | "boosting" | "gradient_boosting" => {
                Ok(ModelKind::GradientBoosting)
            }
            other => Err(ForecastError::Configuration(format!(
                "Unknown model '{}'",
                other
            ))),
        }
    }
}
