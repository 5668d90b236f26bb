//! Walk-forward evaluation of forecasting strategies
//!
//! [`WalkForwardRunner`] drives one strategy through every window of the
//! study horizon. [`Benchmark`] runs several strategies on the same panel and
//! hands the results to the report layer. A failing window is recorded as
//! skipped; only configuration errors stop a run.

use crate::config::{CountryConfig, RunOptions, StudyHorizon};
use crate::data::{Panel, Timestamp};
use crate::error::{ForecastError, Result};
use crate::features::add_share_columns;
use crate::metrics::{evaluate_forecast, ErrorMetrics};
use crate::models::{ForecastModel, ModelKind};
use crate::report::{CombinedPredictions, ErrorTable, ReportWriter};
use crate::splitter::{WalkForwardSplitter, Window};
use crate::tuning::{HyperparameterGrid, ParamSet, Tuner};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Forecast of one test hour
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionRecord {
    /// Hour being forecast
    pub timestamp: Timestamp,
    /// Observed price
    pub actual: f64,
    /// Forecast of the default configuration
    pub predicted: f64,
    /// Forecast of the tuned configuration, when tuning ran and succeeded
    pub tuned: Option<f64>,
}

/// Result of tuning within one window
#[derive(Debug, Clone, PartialEq)]
pub enum TunedYear {
    /// The winner was refitted and scored on the test year
    Completed {
        /// Winning parameter set
        params: ParamSet,
        /// Validation MSE of the winner
        score: f64,
        /// Test-year errors of the winner
        errors: ErrorMetrics,
    },
    /// Tuning failed; the default fit of the year still stands
    Failed {
        /// Error text
        reason: String,
    },
}

/// A window that produced forecasts
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedYear {
    /// Test year
    pub year: i32,
    /// One record per test row, in time order
    pub predictions: Vec<PredictionRecord>,
    /// Errors of the default configuration
    pub errors: ErrorMetrics,
    /// Tuning result; `None` when the model was not tuned
    pub tuned: Option<TunedYear>,
}

impl CompletedYear {
    /// Test-year errors of the tuned configuration, if any
    pub fn tuned_errors(&self) -> Option<&ErrorMetrics> {
        match &self.tuned {
            Some(TunedYear::Completed { errors, .. }) => Some(errors),
            _ => None,
        }
    }

    /// Winning parameters of the year, if tuning succeeded
    pub fn best_params(&self) -> Option<&ParamSet> {
        match &self.tuned {
            Some(TunedYear::Completed { params, .. }) => Some(params),
            _ => None,
        }
    }
}

/// Outcome of one walk-forward year
#[derive(Debug, Clone, PartialEq)]
pub enum YearOutcome {
    /// Forecasts and metrics were produced
    Completed(CompletedYear),
    /// The window could not run
    Skipped {
        /// Test year
        year: i32,
        /// Error text
        reason: String,
    },
}

impl YearOutcome {
    /// Test year of the outcome
    pub fn year(&self) -> i32 {
        match self {
            YearOutcome::Completed(completed) => completed.year,
            YearOutcome::Skipped { year, .. } => *year,
        }
    }

    /// The completed year, if the window ran
    pub fn completed(&self) -> Option<&CompletedYear> {
        match self {
            YearOutcome::Completed(completed) => Some(completed),
            YearOutcome::Skipped { .. } => None,
        }
    }
}

/// Every year of one strategy
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyRun {
    /// Report name of the strategy
    pub model_name: String,
    /// Whether a tuned variant was requested for this strategy
    pub tuned: bool,
    /// Outcomes in year order
    pub years: Vec<YearOutcome>,
}

impl StrategyRun {
    /// Years that produced forecasts
    pub fn completed(&self) -> impl Iterator<Item = &CompletedYear> {
        self.years.iter().filter_map(|outcome| outcome.completed())
    }

    /// Report name of the tuned variant
    pub fn tuned_name(&self) -> String {
        format!("{}_tuned", self.model_name)
    }
}

/// Runs strategies over the walk-forward windows of a panel
#[derive(Debug, Clone)]
pub struct WalkForwardRunner<'a> {
    panel: &'a Panel,
    horizon: StudyHorizon,
    options: RunOptions,
    tuner: Tuner,
    /// Receives each year's predictions as soon as its window finishes
    writer: Option<ReportWriter>,
}

impl<'a> WalkForwardRunner<'a> {
    /// Create a runner; invalid options are a configuration error
    pub fn new(panel: &'a Panel, horizon: StudyHorizon, options: RunOptions) -> Result<Self> {
        options.validate()?;
        let tuner = Tuner::from_options(&options);
        Ok(Self {
            panel,
            horizon,
            options,
            tuner,
            writer: None,
        })
    }

    /// Write every completed year's prediction table as soon as it exists.
    ///
    /// A write failure aborts the run.
    pub fn with_report_writer(mut self, writer: ReportWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Options of the run
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Evaluate one strategy over every year of the horizon
    pub fn run(&self, model: &dyn ForecastModel) -> Result<StrategyRun> {
        let grid = if self.options.tune {
            model.param_grid()
        } else {
            None
        };
        let splitter = WalkForwardSplitter::new(self.panel, self.horizon);
        let items: Vec<(i32, Result<Window>)> =
            self.horizon.test_years().zip(splitter.windows()).collect();

        info!(
            "Running {} over {} walk-forward years{}",
            model.name(),
            items.len(),
            if grid.is_some() { " with tuning" } else { "" }
        );

        let evaluate = |(year, item): &(i32, Result<Window>)| -> Result<YearOutcome> {
            let window = match item {
                Ok(window) => window,
                Err(e) => {
                    return Ok(YearOutcome::Skipped {
                        year: *year,
                        reason: e.to_string(),
                    })
                }
            };
            match self.run_window(model, window, grid.as_ref()) {
                Ok(completed) => {
                    if let Some(writer) = &self.writer {
                        writer.write_year_predictions(model.name(), &completed)?;
                    }
                    Ok(YearOutcome::Completed(completed))
                }
                Err(e) if e.is_fatal() => Err(e),
                Err(e) => {
                    warn!("{} skipped {}: {}", model.name(), year, e);
                    Ok(YearOutcome::Skipped {
                        year: *year,
                        reason: e.to_string(),
                    })
                }
            }
        };

        let years = if self.options.parallel {
            items.par_iter().map(evaluate).collect::<Result<Vec<_>>>()?
        } else {
            items.iter().map(evaluate).collect::<Result<Vec<_>>>()?
        };

        Ok(StrategyRun {
            model_name: model.name().to_string(),
            tuned: grid.is_some(),
            years,
        })
    }

    fn run_window(
        &self,
        model: &dyn ForecastModel,
        window: &Window,
        grid: Option<&HyperparameterGrid>,
    ) -> Result<CompletedYear> {
        debug!(
            "{} {}: {} training rows, {} test rows",
            model.name(),
            window.year,
            window.train_len(),
            window.test_len()
        );
        let train = self.panel.view(window.train.clone());
        let test = self.panel.view(window.test.clone());
        let actual = test.target();

        let predicted = model.train(&train)?.predict(&test)?;
        check_length(model.name(), predicted.len(), test.len())?;
        let errors = evaluate_forecast(&actual, &predicted)?;

        let mut tuned_predictions = None;
        let tuned = match grid {
            None => None,
            Some(grid) => {
                let outcome = self.tuner.tune(model, grid, &train).and_then(|tuned| {
                    let predicted = tuned.trained.predict(&test)?;
                    check_length(model.name(), predicted.len(), test.len())?;
                    let errors = evaluate_forecast(&actual, &predicted)?;
                    tuned_predictions = Some(predicted);
                    Ok(TunedYear::Completed {
                        params: tuned.params,
                        score: tuned.score,
                        errors,
                    })
                });
                Some(match outcome {
                    Ok(completed) => completed,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!("{} tuning failed for {}: {}", model.name(), window.year, e);
                        TunedYear::Failed {
                            reason: e.to_string(),
                        }
                    }
                })
            }
        };

        let predictions = test
            .timestamps()
            .into_iter()
            .enumerate()
            .map(|(i, timestamp)| PredictionRecord {
                timestamp,
                actual: actual[i],
                predicted: predicted[i],
                tuned: tuned_predictions.as_ref().map(|p| p[i]),
            })
            .collect();

        info!("{} {}: MAE {:.2}, RMSE {:.2}", model.name(), window.year, errors.mae, errors.rmse);

        Ok(CompletedYear {
            year: window.year,
            predictions,
            errors,
            tuned,
        })
    }
}

fn check_length(model: &str, predicted: usize, expected: usize) -> Result<()> {
    if predicted != expected {
        return Err(ForecastError::Validation(format!(
            "{} returned {} predictions for {} test rows",
            model, predicted, expected
        )));
    }
    Ok(())
}

/// Several strategies evaluated on the same panel and horizon
#[derive(Debug)]
pub struct Benchmark<'a> {
    runner: WalkForwardRunner<'a>,
    models: Vec<Box<dyn ForecastModel>>,
}

impl<'a> Benchmark<'a> {
    /// Benchmark without strategies
    pub fn new(panel: &'a Panel, horizon: StudyHorizon, options: RunOptions) -> Result<Self> {
        Ok(Self {
            runner: WalkForwardRunner::new(panel, horizon, options)?,
            models: Vec::new(),
        })
    }

    /// Benchmark of the given model families for one country.
    ///
    /// Every family's predictor columns must be present in the panel; a
    /// missing column is a configuration error raised before any window runs.
    pub fn for_country(
        panel: &'a Panel,
        config: &CountryConfig,
        horizon: StudyHorizon,
        options: RunOptions,
        kinds: &[ModelKind],
    ) -> Result<Self> {
        config.validate()?;
        let min_train_rows = options.min_train_rows;
        let mut benchmark = Self::new(panel, horizon, options)?;
        for kind in kinds {
            if let Some(features) = kind.feature_set(config, panel) {
                features.check_against(panel)?;
            }
            benchmark = benchmark.with_model(kind.build(config, panel, min_train_rows));
        }
        Ok(benchmark)
    }

    /// Persist each year's predictions while the benchmark runs
    pub fn with_report_writer(mut self, writer: ReportWriter) -> Self {
        self.runner = self.runner.with_report_writer(writer);
        self
    }

    /// Add a strategy
    pub fn with_model(mut self, model: Box<dyn ForecastModel>) -> Self {
        self.models.push(model);
        self
    }

    /// Strategies in report order
    pub fn models(&self) -> &[Box<dyn ForecastModel>] {
        &self.models
    }

    /// Run every strategy; results keep the order the strategies were added in
    pub fn run(&self) -> Result<BenchmarkResults> {
        if self.models.is_empty() {
            return Err(ForecastError::Configuration(
                "Benchmark has no strategies".to_string(),
            ));
        }

        let runs = if self.runner.options().parallel {
            self.models
                .par_iter()
                .map(|model| self.runner.run(model.as_ref()))
                .collect::<Result<Vec<_>>>()?
        } else {
            self.models
                .iter()
                .map(|model| self.runner.run(model.as_ref()))
                .collect::<Result<Vec<_>>>()?
        };

        let results = BenchmarkResults { runs };
        for (model, means) in results.error_table().mean_by_model() {
            info!("{} mean over available years: {}", model, means);
        }
        Ok(results)
    }
}

/// Runs of every strategy of a benchmark
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkResults {
    /// One run per strategy, in the order they were added
    pub runs: Vec<StrategyRun>,
}

impl BenchmarkResults {
    /// Every (model, year) error row, tuned variants included
    pub fn error_table(&self) -> ErrorTable {
        ErrorTable::from_runs(&self.runs)
    }

    /// Forecasts of every strategy joined on timestamp
    pub fn combined_predictions(&self) -> CombinedPredictions {
        CombinedPredictions::from_runs(&self.runs)
    }

    /// The run of a strategy by report name
    pub fn run(&self, model_name: &str) -> Option<&StrategyRun> {
        self.runs.iter().find(|run| run.model_name == model_name)
    }
}

/// Derive share columns, build the default strategies and run them
pub fn run_country_benchmark(
    panel: &mut Panel,
    config: &CountryConfig,
    horizon: StudyHorizon,
    options: RunOptions,
    kinds: &[ModelKind],
) -> Result<BenchmarkResults> {
    add_share_columns(panel, config, options.missing_source_policy)?;
    let panel: &Panel = panel;
    Benchmark::for_country(panel, config, horizon, options, kinds)?.run()
}
