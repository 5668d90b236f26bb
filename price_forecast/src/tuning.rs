//! Exhaustive hyperparameter search over a training window
//!
//! Candidates are scored by validation mean squared error on rows carved out
//! of the training window according to a [`ValidationPolicy`]. The winner is
//! refitted on the whole window before it is returned.

use crate::config::RunOptions;
use crate::data::PanelView;
use crate::error::{ForecastError, Result};
use crate::metrics::mean_squared_error;
use crate::models::{ForecastModel, TrainedForecastModel};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use tracing::{debug, info, warn};

/// One combination of hyperparameter values, keyed by parameter name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSet(BTreeMap<String, f64>);

impl ParamSet {
    /// Empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, builder style
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.0.insert(name.to_string(), value);
        self
    }

    /// Set a value
    pub fn insert(&mut self, name: &str, value: f64) {
        self.0.insert(name.to_string(), value);
    }

    /// Raw value of a parameter
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Value of a parameter that must be a non-negative whole number
    pub fn get_usize(&self, name: &str) -> Result<Option<usize>> {
        match self.get(name) {
            None => Ok(None),
            Some(value) if value >= 0.0 && value.fract() == 0.0 && value.is_finite() => {
                Ok(Some(value as usize))
            }
            Some(value) => Err(ForecastError::InvalidParameter(format!(
                "{} must be a non-negative integer, got {}",
                name, value
            ))),
        }
    }

    /// Parameter names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    /// Whether no parameter is set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fail with [`ForecastError::InvalidParameter`] on any name not in `known`
    pub fn ensure_known(&self, model: &str, known: &[&str]) -> Result<()> {
        match self.names().find(|name| !known.contains(name)) {
            Some(name) => Err(ForecastError::InvalidParameter(format!(
                "{} has no hyperparameter '{}' (expected one of: {})",
                model,
                name,
                known.join(", ")
            ))),
            None => Ok(()),
        }
    }

    /// JSON object of the values, as written to the best-parameter table
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.0 {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
            first = false;
        }
        Ok(())
    }
}

/// Ordered mapping from parameter name to its candidate values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterGrid {
    params: Vec<(String, Vec<f64>)>,
}

impl HyperparameterGrid {
    /// Empty grid
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter and its candidates, builder style
    pub fn with(mut self, name: &str, values: Vec<f64>) -> Self {
        self.params.push((name.to_string(), values));
        self
    }

    /// Parameter names in grid order
    pub fn names(&self) -> Vec<&str> {
        self.params.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Number of combinations
    pub fn len(&self) -> usize {
        if self.params.is_empty() {
            return 0;
        }
        self.params.iter().map(|(_, values)| values.len()).product()
    }

    /// Whether the grid has no combination at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every combination in grid order; the last parameter varies fastest
    pub fn combinations(&self) -> Vec<ParamSet> {
        let total = self.len();
        let mut combos = Vec::with_capacity(total);
        for mut index in 0..total {
            let mut set = ParamSet::new();
            for (name, values) in self.params.iter().rev() {
                set.insert(name, values[index % values.len()]);
                index /= values.len();
            }
            combos.push(set);
        }
        combos
    }
}

/// How validation rows are carved out of a training window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// The last `fraction` of the window validates, the rest trains
    HoldOutTail { fraction: f64 },
    /// `folds` consecutive blocks at the end of the window, each trained on
    /// every row before it
    ExpandingFolds { folds: usize },
    /// Contiguous k-fold that also trains on rows after the validation block.
    /// Leaks future rows into training.
    UnorderedKFold { folds: usize },
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        ValidationPolicy::HoldOutTail { fraction: 0.2 }
    }
}

/// Training and validation positions relative to a training window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationSplit {
    /// Positions fitted on
    pub train: Vec<usize>,
    /// Positions scored
    pub validation: Range<usize>,
}

impl ValidationPolicy {
    /// Reject parameters that cannot produce a split
    pub fn validate(&self) -> Result<()> {
        match *self {
            ValidationPolicy::HoldOutTail { fraction } => {
                if !(fraction > 0.0 && fraction < 1.0) {
                    return Err(ForecastError::Configuration(format!(
                        "Hold-out fraction must lie in (0, 1), got {}",
                        fraction
                    )));
                }
            }
            ValidationPolicy::ExpandingFolds { folds } => {
                if folds == 0 {
                    return Err(ForecastError::Configuration(
                        "Expanding validation needs at least one fold".to_string(),
                    ));
                }
            }
            ValidationPolicy::UnorderedKFold { folds } => {
                if folds < 2 {
                    return Err(ForecastError::Configuration(format!(
                        "K-fold validation needs at least two folds, got {}",
                        folds
                    )));
                }
            }
        }
        Ok(())
    }

    /// Whether some split trains on rows that come after its validation rows
    pub fn looks_ahead(&self) -> bool {
        matches!(self, ValidationPolicy::UnorderedKFold { .. })
    }

    /// Splits of a window of `n` rows
    pub fn splits(&self, n: usize) -> Result<Vec<ValidationSplit>> {
        self.validate()?;
        match *self {
            ValidationPolicy::HoldOutTail { fraction } => {
                if n < 2 {
                    return Err(ForecastError::InsufficientData {
                        required: 2,
                        actual: n,
                    });
                }
                let validation_len = ((n as f64 * fraction).round() as usize).clamp(1, n - 1);
                let cut = n - validation_len;
                Ok(vec![ValidationSplit {
                    train: (0..cut).collect(),
                    validation: cut..n,
                }])
            }
            ValidationPolicy::ExpandingFolds { folds } => {
                let block = n / (folds + 1);
                if block == 0 {
                    return Err(ForecastError::InsufficientData {
                        required: folds + 1,
                        actual: n,
                    });
                }
                let first = n - folds * block;
                Ok((0..folds)
                    .map(|i| {
                        let start = first + i * block;
                        ValidationSplit {
                            train: (0..start).collect(),
                            validation: start..start + block,
                        }
                    })
                    .collect())
            }
            ValidationPolicy::UnorderedKFold { folds } => {
                if n < folds {
                    return Err(ForecastError::InsufficientData {
                        required: folds,
                        actual: n,
                    });
                }
                let base = n / folds;
                let extra = n % folds;
                let mut start = 0;
                let mut splits = Vec::with_capacity(folds);
                for i in 0..folds {
                    let size = base + usize::from(i < extra);
                    let end = start + size;
                    splits.push(ValidationSplit {
                        train: (0..start).chain(end..n).collect(),
                        validation: start..end,
                    });
                    start = end;
                }
                Ok(splits)
            }
        }
    }
}

/// Winner of a tuning run, refitted on the whole training window
#[derive(Debug)]
pub struct TunedModel {
    /// Winning parameter set
    pub params: ParamSet,
    /// Validation mean squared error of the winner
    pub score: f64,
    /// Winner fitted on every training row
    pub trained: Box<dyn TrainedForecastModel>,
}

/// Grid search driver
#[derive(Debug, Clone)]
pub struct Tuner {
    policy: ValidationPolicy,
    max_evaluations: Option<usize>,
    parallel: bool,
}

impl Tuner {
    /// Create a tuner with the given validation policy, no evaluation bound
    /// and parallel scoring
    pub fn new(policy: ValidationPolicy) -> Self {
        if policy.looks_ahead() {
            warn!(
                "Validation policy {:?} trains on rows after the validation block; \
                 tuning scores carry look-ahead bias",
                policy
            );
        }
        Self {
            policy,
            max_evaluations: None,
            parallel: true,
        }
    }

    /// Tuner configured from run options
    pub fn from_options(options: &RunOptions) -> Self {
        Self::new(options.validation)
            .with_max_evaluations(options.max_evaluations)
            .with_parallel(options.parallel)
    }

    /// Bound the number of candidates evaluated per call
    pub fn with_max_evaluations(mut self, max_evaluations: Option<usize>) -> Self {
        self.max_evaluations = max_evaluations;
        self
    }

    /// Switch parallel candidate scoring on or off
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Validation policy in use
    pub fn policy(&self) -> ValidationPolicy {
        self.policy
    }

    /// Score every grid candidate and refit the best one on `train`
    pub fn tune(
        &self,
        model: &dyn ForecastModel,
        grid: &HyperparameterGrid,
        train: &PanelView<'_>,
    ) -> Result<TunedModel> {
        let mut candidates = grid.combinations();
        if candidates.is_empty() {
            return Err(ForecastError::InvalidParameter(format!(
                "Empty hyperparameter grid for {}",
                model.name()
            )));
        }
        if let Some(limit) = self.max_evaluations {
            if candidates.len() > limit {
                info!(
                    "Evaluating {} of {} candidates for {}",
                    limit,
                    candidates.len(),
                    model.name()
                );
                candidates.truncate(limit);
            }
        }

        let splits = self.policy.splits(train.len())?;
        debug!(
            "Tuning {} over {} candidates and {} validation splits",
            model.name(),
            candidates.len(),
            splits.len()
        );

        let scores: Vec<Result<f64>> = if self.parallel {
            candidates
                .par_iter()
                .map(|params| score_candidate(model, params, train, &splits))
                .collect()
        } else {
            candidates
                .iter()
                .map(|params| score_candidate(model, params, train, &splits))
                .collect()
        };

        let mut best: Option<(usize, f64)> = None;
        let mut first_error = None;
        for (i, score) in scores.into_iter().enumerate() {
            match score {
                Ok(score) => {
                    if best.map_or(true, |(_, best_score)| score < best_score) {
                        best = Some((i, score));
                    }
                }
                Err(e) => {
                    debug!("Candidate {} of {} failed: {}", candidates[i], model.name(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        let (index, score) = match (best, first_error) {
            (Some(best), _) => best,
            (None, Some(e)) => return Err(e),
            (None, None) => {
                return Err(ForecastError::ModelFit(format!(
                    "No candidate of {} could be scored",
                    model.name()
                )))
            }
        };

        let params = candidates.swap_remove(index);
        debug!(
            "Best parameters for {}: {} (validation MSE {:.4})",
            model.name(),
            params,
            score
        );
        let trained = model.with_params(&params)?.train(train)?;

        Ok(TunedModel {
            params,
            score,
            trained,
        })
    }
}

fn score_candidate(
    model: &dyn ForecastModel,
    params: &ParamSet,
    train: &PanelView<'_>,
    splits: &[ValidationSplit],
) -> Result<f64> {
    let candidate = model.with_params(params)?;
    let mut total = 0.0;
    for split in splits {
        let fitted = candidate.train(&train.select(&split.train))?;
        let validation = train.slice(split.validation.clone());
        let predicted = fitted.predict(&validation)?;
        total += mean_squared_error(&validation.target(), &predicted)?;
    }
    Ok(total / splits.len() as f64)
}
