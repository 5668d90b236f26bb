//! Seasonal naive baseline
//!
//! Each hour is predicted with the mean price of the same calendar month one
//! year earlier.

use crate::data::PanelView;
use crate::error::{ForecastError, Result};
use crate::models::{ensure_min_rows, ForecastModel, TrainedForecastModel, DEFAULT_MIN_TRAIN_ROWS};
use crate::tuning::ParamSet;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use tracing::warn;

/// Same-month-last-year mean model
#[derive(Debug, Clone)]
pub struct SeasonalNaive {
    /// Name of the model
    name: String,
    /// Smallest accepted training window
    min_train_rows: usize,
}

/// Monthly mean prices of one training window
#[derive(Debug, Clone)]
pub struct TrainedSeasonalNaive {
    name: String,
    /// Mean price per (year, month) of the training rows
    monthly_means: BTreeMap<(i32, u32), f64>,
}

impl SeasonalNaive {
    /// Create the baseline
    pub fn new() -> Self {
        Self {
            name: "naive".to_string(),
            min_train_rows: DEFAULT_MIN_TRAIN_ROWS,
        }
    }

    /// Override the smallest accepted training window
    pub fn with_min_train_rows(mut self, min_train_rows: usize) -> Self {
        self.min_train_rows = min_train_rows;
        self
    }
}

impl Default for SeasonalNaive {
    fn default() -> Self {
        Self::new()
    }
}

impl ForecastModel for SeasonalNaive {
    fn name(&self) -> &str {
        &self.name
    }

    fn train(&self, train: &PanelView<'_>) -> Result<Box<dyn TrainedForecastModel>> {
        ensure_min_rows(train, self.min_train_rows)?;

        Ok(Box::new(TrainedSeasonalNaive {
            name: self.name.clone(),
            monthly_means: monthly_means(train),
        }))
    }

    fn with_params(&self, params: &ParamSet) -> Result<Box<dyn ForecastModel>> {
        params.ensure_known(&self.name, &[])?;
        Ok(Box::new(self.clone()))
    }
}

impl TrainedForecastModel for TrainedSeasonalNaive {
    fn predict(&self, test: &PanelView<'_>) -> Result<Vec<f64>> {
        let panel = test.panel();
        if test.is_empty() {
            return Ok(Vec::new());
        }
        let first_month = month_number(panel.year_month(0));

        // Same-year means of the test rows, built only when the first months
        // of the panel have no prior year to look back on.
        let mut bootstrap: Option<BTreeMap<(i32, u32), f64>> = None;

        let mut predictions = Vec::with_capacity(test.len());
        for &row in test.rows() {
            let (year, month) = panel.year_month(row);
            if let Some(&mean) = self.monthly_means.get(&(year - 1, month)) {
                predictions.push(mean);
                continue;
            }

            if month_number((year, month)) - first_month < 12 {
                let means = bootstrap.get_or_insert_with(|| {
                    warn!(
                        "{}: no prior-year month for the first months of the panel; \
                         using same-month means of the test year",
                        self.name
                    );
                    monthly_means(test)
                });
                if let Some(&mean) = means.get(&(year, month)) {
                    predictions.push(mean);
                    continue;
                }
            }

            return Err(ForecastError::ModelFit(format!(
                "{}: no training rows for {}-{:02}",
                self.name,
                year - 1,
                month
            )));
        }

        Ok(predictions)
    }
}

fn month_number((year, month): (i32, u32)) -> i64 {
    year as i64 * 12 + month as i64
}

fn monthly_means(view: &PanelView<'_>) -> BTreeMap<(i32, u32), f64> {
    let panel = view.panel();
    let mut groups: BTreeMap<(i32, u32), Vec<f64>> = BTreeMap::new();
    for &row in view.rows() {
        groups
            .entry(panel.year_month(row))
            .or_default()
            .push(panel.target()[row]);
    }
    groups
        .into_iter()
        .map(|(key, prices)| (key, prices.mean()))
        .collect()
}
