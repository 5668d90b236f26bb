//! Per-country configuration, study horizon and run options
//!
//! Country records are resolved once at startup and passed down explicitly.
//! Nothing in the crate branches on a country code after that point.

use crate::error::{ForecastError, Result};
use crate::features::MissingSourcePolicy;
use crate::tuning::ValidationPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;

/// Generation sources and labels of one bidding zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryConfig {
    /// Country code, e.g. "GR"
    #[serde(default)]
    pub code: String,
    /// Generation source columns used to derive share predictors
    pub sources: Vec<String>,
    /// Display labels, one per source
    #[serde(default)]
    pub labels: Vec<String>,
}

impl CountryConfig {
    /// Create a record with sources only
    pub fn new(code: &str, sources: &[&str]) -> Self {
        Self {
            code: code.to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            labels: Vec::new(),
        }
    }

    /// Names of the derived share columns, in source order
    pub fn share_columns(&self) -> Vec<String> {
        self.sources.iter().map(|s| share_column(s)).collect()
    }

    /// Check the record is usable for a run
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(ForecastError::Configuration(format!(
                "Country '{}' has an empty source list",
                self.code
            )));
        }

        for (i, source) in self.sources.iter().enumerate() {
            if source.trim().is_empty() {
                return Err(ForecastError::Configuration(format!(
                    "Country '{}' has a blank source name",
                    self.code
                )));
            }
            if self.sources[..i].contains(source) {
                return Err(ForecastError::Configuration(format!(
                    "Country '{}' lists source '{}' twice",
                    self.code, source
                )));
            }
        }

        if !self.labels.is_empty() && self.labels.len() != self.sources.len() {
            return Err(ForecastError::Configuration(format!(
                "Country '{}' has {} labels for {} sources",
                self.code,
                self.labels.len(),
                self.sources.len()
            )));
        }

        Ok(())
    }
}

/// Column name of the share predictor derived from a source
pub fn share_column(source: &str) -> String {
    format!("{}_share", source)
}

/// Immutable set of country records keyed by code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryRegistry {
    countries: BTreeMap<String, CountryConfig>,
}

impl CountryRegistry {
    /// Registry with the Greek, Polish and Swedish zones
    pub fn builtin() -> Self {
        let mut countries = BTreeMap::new();

        countries.insert(
            "GR".to_string(),
            CountryConfig {
                code: "GR".to_string(),
                sources: strings(&["Coal", "Gas", "Oil", "Solar", "Wind", "Hydro"]),
                labels: strings(&["Lignite", "Natural Gas", "Oil", "Solar", "Wind", "Hydro"]),
            },
        );

        countries.insert(
            "PL".to_string(),
            CountryConfig {
                code: "PL".to_string(),
                sources: strings(&[
                    "Biomass", "Coal", "Hard Coal", "Coal Gas", "Gas", "Oil", "Solar", "Wind",
                    "Hydro",
                ]),
                labels: strings(&[
                    "Biomass",
                    "Lignite",
                    "Hard Coal",
                    "Coal Gas",
                    "Natural Gas",
                    "Oil",
                    "Solar",
                    "Wind",
                    "Hydro",
                ]),
            },
        );

        countries.insert(
            "SE".to_string(),
            CountryConfig {
                code: "SE".to_string(),
                sources: strings(&["Gas", "Nuclear", "Hydro", "Solar", "Wind", "Other"]),
                labels: strings(&[
                    "Natural Gas",
                    "Nuclear",
                    "Hydro",
                    "Solar",
                    "Wind",
                    "Other Renewables",
                ]),
            },
        );

        Self { countries }
    }

    /// Build a registry from explicit records
    pub fn from_configs(configs: Vec<CountryConfig>) -> Self {
        let countries = configs
            .into_iter()
            .map(|config| (config.code.clone(), config))
            .collect();
        Self { countries }
    }

    /// Parse a JSON object mapping country codes to records
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut countries: BTreeMap<String, CountryConfig> = serde_json::from_str(json)?;
        for (code, config) in countries.iter_mut() {
            if config.code.is_empty() {
                config.code = code.clone();
            } else if &config.code != code {
                return Err(ForecastError::Configuration(format!(
                    "Record keyed '{}' declares code '{}'",
                    code, config.code
                )));
            }
        }
        Ok(Self { countries })
    }

    /// Load a registry from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Look up and validate the record of a country
    pub fn resolve(&self, code: &str) -> Result<&CountryConfig> {
        let config = self.countries.get(code).ok_or_else(|| {
            ForecastError::Configuration(format!("Unknown country: {}", code))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Known country codes, sorted
    pub fn codes(&self) -> Vec<&str> {
        self.countries.keys().map(|k| k.as_str()).collect()
    }
}

impl Default for CountryRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Inclusive range of calendar years covered by a study
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyHorizon {
    /// First year of data; never tested, only trained on
    pub start_year: i32,
    /// Last year tested
    pub end_year: i32,
}

impl StudyHorizon {
    /// Create a horizon from inclusive years
    pub fn new(start_year: i32, end_year: i32) -> Result<Self> {
        if end_year < start_year {
            return Err(ForecastError::Configuration(format!(
                "Horizon ends ({}) before it starts ({})",
                end_year, start_year
            )));
        }
        Ok(Self {
            start_year,
            end_year,
        })
    }

    /// Parse `YYYYMMDD` bounds; only the year part is significant
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_year(start)?, parse_year(end)?)
    }

    /// Years that get a walk-forward window
    pub fn test_years(&self) -> RangeInclusive<i32> {
        (self.start_year + 1)..=self.end_year
    }
}

fn parse_year(value: &str) -> Result<i32> {
    value
        .get(..4)
        .and_then(|year| year.parse::<i32>().ok())
        .ok_or_else(|| {
            ForecastError::Configuration(format!(
                "Horizon bound '{}' does not start with a four digit year",
                value
            ))
        })
}

/// Options of one benchmark run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Smallest training window a model may be fitted on
    pub min_train_rows: usize,
    /// Run the tuner next to the default fit for tunable models
    pub tune: bool,
    /// How the tuner carves validation rows out of a training window
    pub validation: ValidationPolicy,
    /// Upper bound on grid candidates per tuning call; `None` evaluates all
    pub max_evaluations: Option<usize>,
    /// Fan out strategies, years and grid candidates over the rayon pool
    pub parallel: bool,
    /// What to do when a configured source column is absent
    pub missing_source_policy: MissingSourcePolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            min_train_rows: 720,
            tune: true,
            validation: ValidationPolicy::default(),
            max_evaluations: None,
            parallel: true,
            missing_source_policy: MissingSourcePolicy::default(),
        }
    }
}

impl RunOptions {
    /// Load options from a JSON file; missing fields keep their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Reject option combinations that cannot run
    pub fn validate(&self) -> Result<()> {
        if self.min_train_rows == 0 {
            return Err(ForecastError::Configuration(
                "min_train_rows must be positive".to_string(),
            ));
        }
        if self.max_evaluations == Some(0) {
            return Err(ForecastError::Configuration(
                "max_evaluations must be positive when set".to_string(),
            ));
        }
        self.validation.validate()
    }
}
