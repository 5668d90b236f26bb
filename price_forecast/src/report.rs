//! Result aggregation and CSV output
//!
//! Runs of every strategy are folded into a combined prediction table joined
//! on timestamp and an error table with one row per (model, year). The
//! [`ReportWriter`] is the only code that writes result files.

use crate::data::{format_timestamp, Timestamp};
use crate::error::Result;
use crate::evaluation::{BenchmarkResults, CompletedYear, StrategyRun, TunedYear, YearOutcome};
use crate::metrics::{round_to, ErrorMetrics, REPORT_DECIMALS};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Marker written in place of a metric that could not be computed
pub const UNAVAILABLE: &str = "unavailable";

/// Note attached to rows whose MdAPE has no eligible actual
pub const MDAPE_UNDEFINED_NOTE: &str = "MdAPE undefined: no row with a non-zero actual";

/// Error metrics of one (model, year) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    /// Report name of the model, `_tuned` suffixed for tuned variants
    pub model: String,
    /// Test year
    pub year: i32,
    /// Mean Absolute Error
    pub mae: Option<f64>,
    /// Root Mean Squared Error
    pub rmse: Option<f64>,
    /// Median Absolute Percentage Error
    pub mdape: Option<f64>,
    /// Why the year was skipped or a metric is missing
    pub note: Option<String>,
}

impl ErrorRecord {
    /// Row of a year that produced forecasts
    pub fn from_metrics(model: &str, year: i32, metrics: &ErrorMetrics) -> Self {
        Self {
            model: model.to_string(),
            year,
            mae: Some(metrics.mae),
            rmse: Some(metrics.rmse),
            mdape: metrics.mdape,
            note: metrics
                .mdape
                .is_none()
                .then(|| MDAPE_UNDEFINED_NOTE.to_string()),
        }
    }

    /// Row of a year that could not run
    pub fn skipped(model: &str, year: i32, reason: &str) -> Self {
        Self {
            model: model.to_string(),
            year,
            mae: None,
            rmse: None,
            mdape: None,
            note: Some(reason.to_string()),
        }
    }

    /// Whether the year produced no metrics at all
    pub fn is_skipped(&self) -> bool {
        self.mae.is_none()
    }
}

/// Mean metrics of a model over its available years
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeanErrors {
    /// Mean MAE
    pub mae: f64,
    /// Mean RMSE
    pub rmse: f64,
    /// Mean MdAPE over the years where it is defined
    pub mdape: Option<f64>,
    /// Years that contributed
    pub years: usize,
}

impl fmt::Display for MeanErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MAE {:.2}, RMSE {:.2}, MdAPE {} ({} years)",
            self.mae,
            self.rmse,
            self.mdape
                .map(|m| format!("{:.2}", m))
                .unwrap_or_else(|| UNAVAILABLE.to_string()),
            self.years
        )
    }
}

/// Error rows of every model and year
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorTable {
    records: Vec<ErrorRecord>,
}

impl ErrorTable {
    /// Collect rows in run order; each model's tuned rows follow its own
    pub fn from_runs(runs: &[StrategyRun]) -> Self {
        let mut records = Vec::new();
        for run in runs {
            records.extend(model_records(run));
            if run.tuned {
                records.extend(tuned_records(run));
            }
        }
        Self { records }
    }

    /// Every row
    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    /// Rows of one model, in year order
    pub fn for_model<'a>(&'a self, model: &'a str) -> impl Iterator<Item = &'a ErrorRecord> + 'a {
        self.records.iter().filter(move |r| r.model == model)
    }

    /// Mean metrics per model over the years that have them, in table order
    pub fn mean_by_model(&self) -> Vec<(String, MeanErrors)> {
        let mut order: Vec<&str> = Vec::new();
        for record in &self.records {
            if !order.contains(&record.model.as_str()) {
                order.push(&record.model);
            }
        }

        order
            .into_iter()
            .filter_map(|model| {
                let available: Vec<&ErrorRecord> = self
                    .for_model(model)
                    .filter(|r| !r.is_skipped())
                    .collect();
                if available.is_empty() {
                    return None;
                }
                let n = available.len() as f64;
                let mae = available.iter().filter_map(|r| r.mae).sum::<f64>() / n;
                let rmse = available.iter().filter_map(|r| r.rmse).sum::<f64>() / n;
                let mdapes: Vec<f64> = available.iter().filter_map(|r| r.mdape).collect();
                let mdape = (!mdapes.is_empty())
                    .then(|| mdapes.iter().sum::<f64>() / mdapes.len() as f64);
                Some((
                    model.to_string(),
                    MeanErrors {
                        mae,
                        rmse,
                        mdape,
                        years: available.len(),
                    },
                ))
            })
            .collect()
    }
}

fn model_records(run: &StrategyRun) -> Vec<ErrorRecord> {
    run.years
        .iter()
        .map(|outcome| match outcome {
            YearOutcome::Completed(completed) => {
                ErrorRecord::from_metrics(&run.model_name, completed.year, &completed.errors)
            }
            YearOutcome::Skipped { year, reason } => {
                ErrorRecord::skipped(&run.model_name, *year, reason)
            }
        })
        .collect()
}

fn tuned_records(run: &StrategyRun) -> Vec<ErrorRecord> {
    let name = run.tuned_name();
    run.years
        .iter()
        .map(|outcome| match outcome {
            YearOutcome::Completed(CompletedYear {
                year,
                tuned: Some(TunedYear::Completed { errors, .. }),
                ..
            }) => ErrorRecord::from_metrics(&name, *year, errors),
            YearOutcome::Completed(CompletedYear {
                year,
                tuned: Some(TunedYear::Failed { reason }),
                ..
            }) => ErrorRecord::skipped(&name, *year, reason),
            YearOutcome::Completed(CompletedYear { year, .. }) => {
                ErrorRecord::skipped(&name, *year, "not tuned")
            }
            YearOutcome::Skipped { year, reason } => ErrorRecord::skipped(&name, *year, reason),
        })
        .collect()
}

/// One timestamp of the combined prediction table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedRow {
    /// Observed price
    pub actual: f64,
    /// One value per column of the table; `None` where that model has no
    /// forecast for the hour
    pub values: Vec<Option<f64>>,
}

/// Forecasts of every model outer-joined on timestamp
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CombinedPredictions {
    columns: Vec<String>,
    rows: BTreeMap<Timestamp, CombinedRow>,
}

impl CombinedPredictions {
    /// Join the forecasts of several runs
    pub fn from_runs(runs: &[StrategyRun]) -> Self {
        let mut columns = Vec::new();
        for run in runs {
            columns.push(run.model_name.clone());
            if run.tuned {
                columns.push(run.tuned_name());
            }
        }

        let width = columns.len();
        let mut rows: BTreeMap<Timestamp, CombinedRow> = BTreeMap::new();
        let mut column = 0;
        for run in runs {
            for completed in run.completed() {
                for record in &completed.predictions {
                    let row = rows.entry(record.timestamp).or_insert_with(|| CombinedRow {
                        actual: record.actual,
                        values: vec![None; width],
                    });
                    row.values[column] = Some(record.predicted);
                    if run.tuned {
                        row.values[column + 1] = record.tuned;
                    }
                }
            }
            column += if run.tuned { 2 } else { 1 };
        }

        Self { columns, rows }
    }

    /// Model column names, tuned variants right after their model
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of timestamps
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no model produced a forecast
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in time order
    pub fn rows(&self) -> impl Iterator<Item = (&Timestamp, &CombinedRow)> {
        self.rows.iter()
    }

    /// Forecast of a column at a timestamp
    pub fn value(&self, timestamp: &Timestamp, column: &str) -> Option<f64> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows.get(timestamp)?.values[index]
    }
}

/// Writes benchmark results as CSV files into one directory
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
    country: String,
}

impl ReportWriter {
    /// Writer for a country; the directory is created if needed
    pub fn new<P: AsRef<Path>>(output_dir: P, country: &str) -> Result<Self> {
        fs::create_dir_all(output_dir.as_ref())?;
        Ok(Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            country: country.to_string(),
        })
    }

    /// Output directory
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write every result file and return their paths
    pub fn write_all(&self, results: &BenchmarkResults) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for run in &results.runs {
            for completed in run.completed() {
                written.push(self.write_year_predictions(&run.model_name, completed)?);
            }
        }
        written.extend(self.write_summaries(results)?);
        Ok(written)
    }

    /// Write the error, parameter and combined tables.
    ///
    /// Per-year prediction tables are left out; a runner holding this writer
    /// has already written them as each window finished.
    pub fn write_summaries(&self, results: &BenchmarkResults) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for run in &results.runs {
            written.push(self.write_errors(&run.model_name, &model_records(run))?);
            if run.tuned {
                written.push(self.write_errors(&run.tuned_name(), &tuned_records(run))?);
                written.push(self.write_best_params(run)?);
            }
        }
        written.push(self.write_combined(&results.combined_predictions())?);
        written.push(self.write_error_summary(&results.error_table())?);

        info!(
            "Wrote {} result files to {}",
            written.len(),
            self.output_dir.display()
        );
        Ok(written)
    }

    /// `{model}_{country}_{year}_predictions.csv`
    pub fn write_year_predictions(
        &self,
        model_name: &str,
        completed: &CompletedYear,
    ) -> Result<PathBuf> {
        let path = self.output_dir.join(format!(
            "{}_{}_{}_predictions.csv",
            model_name, self.country, completed.year
        ));
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(["Datetime", "y", "yhat", "yhat_tuned"])?;
        for record in &completed.predictions {
            writer.write_record([
                format_timestamp(&record.timestamp),
                format_number(record.actual),
                format_number(record.predicted),
                record.tuned.map(format_number).unwrap_or_default(),
            ])?;
        }
        writer.flush()?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }

    /// `errors_{model}_{country}.csv`
    pub fn write_errors(&self, model: &str, records: &[ErrorRecord]) -> Result<PathBuf> {
        let path = self
            .output_dir
            .join(format!("errors_{}_{}.csv", model, self.country));
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(["Year", "MAE", "RMSE", "MdAPE", "Note"])?;
        for record in records {
            writer.write_record([
                record.year.to_string(),
                format_metric(record.mae),
                format_metric(record.rmse),
                format_metric(record.mdape),
                record.note.clone().unwrap_or_default(),
            ])?;
        }
        writer.flush()?;
        Ok(path)
    }

    /// `best_params_{model}_{country}.csv`, one JSON object per tuned year
    pub fn write_best_params(&self, run: &StrategyRun) -> Result<PathBuf> {
        let path = self
            .output_dir
            .join(format!("best_params_{}_{}.csv", run.model_name, self.country));
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(["Year", "Best_Params"])?;
        for completed in run.completed() {
            if let Some(params) = completed.best_params() {
                writer.write_record([completed.year.to_string(), params.to_json()?])?;
            }
        }
        writer.flush()?;
        Ok(path)
    }

    /// `combined_results_{country}.csv`
    pub fn write_combined(&self, combined: &CombinedPredictions) -> Result<PathBuf> {
        let path = self
            .output_dir
            .join(format!("combined_results_{}.csv", self.country));
        let mut writer = csv::Writer::from_path(&path)?;

        let mut header = vec!["Datetime".to_string(), "Original_Price".to_string()];
        header.extend(combined.columns().iter().map(|c| format!("Result_{}", c)));
        writer.write_record(&header)?;

        for (timestamp, row) in combined.rows() {
            let mut record = vec![format_timestamp(timestamp), format_number(row.actual)];
            record.extend(
                row.values
                    .iter()
                    .map(|v| v.map(format_number).unwrap_or_default()),
            );
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(path)
    }

    /// `error_summary_{country}.csv`
    pub fn write_error_summary(&self, table: &ErrorTable) -> Result<PathBuf> {
        let path = self
            .output_dir
            .join(format!("error_summary_{}.csv", self.country));
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(["Model", "Year", "MAE", "RMSE", "MdAPE", "Note"])?;
        for record in table.records() {
            writer.write_record([
                record.model.clone(),
                record.year.to_string(),
                format_metric(record.mae),
                format_metric(record.rmse),
                format_metric(record.mdape),
                record.note.clone().unwrap_or_default(),
            ])?;
        }
        writer.flush()?;
        Ok(path)
    }
}

fn format_number(value: f64) -> String {
    // Adding zero turns a rounded -0.0 into 0.0.
    let rounded = round_to(value, REPORT_DECIMALS) + 0.0;
    format!("{:.*}", REPORT_DECIMALS as usize, rounded)
}

fn format_metric(value: Option<f64>) -> String {
    value
        .map(format_number)
        .unwrap_or_else(|| UNAVAILABLE.to_string())
}
