//! # Price Forecast
//!
//! Walk-forward benchmarking of hourly day-ahead electricity price forecasts.
//!
//! ## Features
//!
//! - Hourly panel loading from CSV (polars) with timestamp deduplication
//! - Generation-share predictors from per-country source lists
//! - Seasonal naive, linear, decision tree, random forest and gradient
//!   boosting strategies behind one trait
//! - Expanding yearly walk-forward windows without look-ahead
//! - Grid search tuning on a time-respecting validation split
//! - MAE, RMSE and MdAPE per model and year, written as CSV tables
//!
//! ## Quick Start
//!
//! ```no_run
//! use price_forecast::config::{CountryRegistry, RunOptions, StudyHorizon};
//! use price_forecast::data::DataLoader;
//! use price_forecast::evaluation::run_country_benchmark;
//! use price_forecast::models::ModelKind;
//! use price_forecast::report::ReportWriter;
//!
//! fn main() -> price_forecast::error::Result<()> {
//!     let registry = CountryRegistry::builtin();
//!     let config = registry.resolve("GR")?;
//!     let horizon = StudyHorizon::parse("20150101", "20221231")?;
//!
//!     let mut panel = DataLoader::from_csv("GR_20150101_20221231.csv")?;
//!     let results = run_country_benchmark(
//!         &mut panel,
//!         config,
//!         horizon,
//!         RunOptions::default(),
//!         &ModelKind::all(),
//!     )?;
//!
//!     ReportWriter::new("results", "GR")?.write_all(&results)?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod metrics;
pub mod models;
pub mod report;
pub mod splitter;
pub mod tuning;

// Re-export commonly used types
pub use crate::config::{CountryConfig, CountryRegistry, RunOptions, StudyHorizon};
pub use crate::data::{DataLoader, Panel, PanelView};
pub use crate::error::ForecastError;
pub use crate::evaluation::{Benchmark, BenchmarkResults, StrategyRun, WalkForwardRunner};
pub use crate::metrics::ErrorMetrics;
pub use crate::models::{ForecastModel, ModelKind, TrainedForecastModel};
pub use crate::report::{CombinedPredictions, ErrorTable, ReportWriter};
pub use crate::splitter::{WalkForwardSplitter, Window};
pub use crate::tuning::{HyperparameterGrid, ParamSet, Tuner, ValidationPolicy};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
