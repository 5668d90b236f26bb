//! Share predictors and feature-set selection
//!
//! Generation is turned into per-source shares of the configured sources'
//! total. Absent sources and zero totals follow [`MissingSourcePolicy`]
//! rather than being filled in silently.

use crate::config::{share_column, CountryConfig};
use crate::data::Panel;
use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Name of the derived total-generation column
pub const SUM_COLUMN: &str = "Sum";

/// Prefixes of the one-hot calendar indicator columns
pub const CALENDAR_PREFIXES: [&str; 3] = ["Month_", "Weekday_", "Hour_"];

/// Handling of configured sources that have no generation column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MissingSourcePolicy {
    /// The source contributes nothing and its share is 0 in every row
    #[default]
    ZeroFill,
    /// An absent source is a configuration error
    Reject,
}

/// Add a `<source>_share` column for every configured source plus the
/// `Sum` column they are derived from.
///
/// Share columns already present in the panel are left untouched. A row whose
/// total generation is zero gets a share of 0 for every source.
pub fn add_share_columns(
    panel: &mut Panel,
    config: &CountryConfig,
    policy: MissingSourcePolicy,
) -> Result<()> {
    let shares = config.share_columns();
    if shares.iter().all(|share| panel.has_column(share)) {
        return Ok(());
    }

    let mut present: Vec<&str> = Vec::with_capacity(config.sources.len());
    for source in &config.sources {
        if panel.has_column(source) {
            present.push(source);
        } else if panel.has_column(&share_column(source)) {
            continue;
        } else {
            match policy {
                MissingSourcePolicy::ZeroFill => {
                    warn!(
                        "Source '{}' of {} has no generation column; its share is 0",
                        source, config.code
                    );
                }
                MissingSourcePolicy::Reject => {
                    return Err(ForecastError::Configuration(format!(
                        "Source '{}' of {} has no generation column",
                        source, config.code
                    )));
                }
            }
        }
    }

    let n = panel.len();
    let mut total = vec![0.0; n];
    for source in &present {
        for (sum, value) in total.iter_mut().zip(panel.column(source)?) {
            *sum += value;
        }
    }

    for source in &config.sources {
        let share_name = share_column(source);
        if panel.has_column(&share_name) {
            continue;
        }
        let share = if panel.has_column(source) {
            panel
                .column(source)?
                .iter()
                .zip(&total)
                .map(|(&value, &sum)| if sum == 0.0 { 0.0 } else { value / sum })
                .collect()
        } else {
            vec![0.0; n]
        };
        panel.set_column(&share_name, share)?;
    }

    panel.set_column(SUM_COLUMN, total)
}

/// Ordered list of predictor columns a model is fitted on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSet {
    columns: Vec<String>,
}

impl FeatureSet {
    /// Explicit column list
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    /// Shares plus gas price, load, holiday flag and flow
    pub fn linear(config: &CountryConfig) -> Self {
        let mut columns = config.share_columns();
        columns.extend(
            ["Gas_Price", "Load", "Holiday", "Flow"]
                .iter()
                .map(|c| c.to_string()),
        );
        Self { columns }
    }

    /// Shares, calendar dummies found in the panel, then load, gas price,
    /// holiday flag and flow
    pub fn full(config: &CountryConfig, panel: &Panel) -> Self {
        let mut columns = config.share_columns();
        for prefix in CALENDAR_PREFIXES {
            columns.extend(
                panel
                    .column_names()
                    .iter()
                    .filter(|name| name.starts_with(prefix))
                    .cloned(),
            );
        }
        columns.extend(
            ["Load", "Gas_Price", "Holiday", "Flow"]
                .iter()
                .map(|c| c.to_string()),
        );
        Self { columns }
    }

    /// Column names in order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Fail with a configuration error if the panel lacks any column
    pub fn check_against(&self, panel: &Panel) -> Result<()> {
        let missing: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| !panel.has_column(c))
            .map(|c| c.as_str())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ForecastError::Configuration(format!(
                "Panel lacks predictor columns: {}",
                missing.join(", ")
            )))
        }
    }
}
