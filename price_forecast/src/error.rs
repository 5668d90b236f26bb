//! Error types for the price_forecast crate

use polars::prelude::PolarsError;
use thiserror::Error;

/// Custom error types for the price_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Training window holds fewer rows than a model needs
    #[error("Insufficient data: need at least {required} training rows, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// A year of the study horizon has no rows in the panel
    #[error("Missing year: {0} has no rows in the panel")]
    MissingYear(i32),

    /// A metric has no eligible rows to be computed from
    #[error("Undefined metric: {0}")]
    UndefinedMetric(String),

    /// Invalid or incomplete run configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A regression backend failed to fit or predict
    #[error("Model fit error: {0}")]
    ModelFit(String),

    /// Error related to data validation or processing
    #[error("Data error: {0}")]
    DataError(String),

    /// Error related to input validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),

    /// Error while writing CSV reports
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Error while (de)serializing configuration or parameters
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<PolarsError> for ForecastError {
    fn from(err: PolarsError) -> Self {
        ForecastError::PolarsError(err.to_string())
    }
}

impl From<csv::Error> for ForecastError {
    fn from(err: csv::Error) -> Self {
        ForecastError::CsvError(err.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::Serialization(err.to_string())
    }
}

impl ForecastError {
    /// Whether the error should abort the whole run instead of a single window
    pub fn is_fatal(&self) -> bool {
        matches!(self, ForecastError::Configuration(_))
    }
}
