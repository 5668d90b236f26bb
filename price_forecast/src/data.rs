//! Hourly panel data handling
//!
//! A [`Panel`] is the single time-ordered table every strategy is evaluated
//! on. Rows are sorted and deduplicated by timestamp at construction, and the
//! `Year` key is indexed so that year boundaries are looked up rather than
//! inferred from row counts.
//!
//! Timestamps keep their UTC offset. Rows are ordered and deduplicated by the
//! instant they denote, while the year and month keys come from the local
//! wall-clock time, so both hours of an autumn clock change survive.

use crate::error::{ForecastError, Result};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use polars::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::ops::Range;
use std::path::Path;
use tracing::debug;

/// Name of the timestamp column
pub const TIME_COLUMN: &str = "Datetime";
/// Name of the target column
pub const TARGET_COLUMN: &str = "Price";
/// Name of the year grouping column
pub const YEAR_COLUMN: &str = "Year";

/// Local wall-clock time of a panel row together with its UTC offset
pub type Timestamp = DateTime<FixedOffset>;

/// Attach a zero UTC offset to a wall-clock time
pub fn at_utc(ts: NaiveDateTime) -> Timestamp {
    Utc.from_utc_datetime(&ts).into()
}

/// Render a timestamp, adding the offset only when it is not UTC
pub fn format_timestamp(ts: &Timestamp) -> String {
    if ts.offset().local_minus_utc() == 0 {
        ts.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.format("%Y-%m-%d %H:%M:%S%:z").to_string()
    }
}

/// Time-ordered hourly table of a target price and its predictors
#[derive(Debug, Clone)]
pub struct Panel {
    timestamps: Vec<Timestamp>,
    years: Vec<i32>,
    target: Vec<f64>,
    /// Predictor names in insertion order
    column_names: Vec<String>,
    columns: HashMap<String, Vec<f64>>,
    year_index: BTreeMap<i32, Range<usize>>,
}

impl Panel {
    /// Build a panel, sorting rows by instant and keeping the last row of
    /// any duplicated instant.
    ///
    /// When `years` is `None` the year key is taken from the local time of
    /// the timestamps.
    pub fn new(
        timestamps: Vec<Timestamp>,
        target: Vec<f64>,
        features: Vec<(String, Vec<f64>)>,
        years: Option<Vec<i32>>,
    ) -> Result<Self> {
        let n = timestamps.len();
        if n == 0 {
            return Err(ForecastError::DataError("Panel has no rows".to_string()));
        }
        if target.len() != n {
            return Err(ForecastError::DataError(format!(
                "Target has {} rows, timestamps have {}",
                target.len(),
                n
            )));
        }
        if let Some(years) = &years {
            if years.len() != n {
                return Err(ForecastError::DataError(format!(
                    "Year key has {} rows, timestamps have {}",
                    years.len(),
                    n
                )));
            }
        }
        for (name, values) in &features {
            if values.len() != n {
                return Err(ForecastError::DataError(format!(
                    "Column '{}' has {} rows, timestamps have {}",
                    name,
                    values.len(),
                    n
                )));
            }
            if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
                return Err(ForecastError::DataError(format!(
                    "Non-finite value in column '{}' at row {}",
                    name, pos
                )));
            }
        }
        if let Some(pos) = target.iter().position(|v| !v.is_finite()) {
            return Err(ForecastError::DataError(format!(
                "Non-finite {} at row {}",
                TARGET_COLUMN, pos
            )));
        }

        // Timestamps compare by instant. The stable sort keeps the original
        // order among equal instants, so the last occurrence wins.
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&i| timestamps[i]);
        let mut keep: Vec<usize> = Vec::with_capacity(n);
        for i in order {
            match keep.last_mut() {
                Some(last) if timestamps[*last] == timestamps[i] => *last = i,
                _ => keep.push(i),
            }
        }
        if keep.len() < n {
            debug!("Dropped {} duplicated timestamps", n - keep.len());
        }

        let gather = |values: &[f64]| keep.iter().map(|&i| values[i]).collect::<Vec<f64>>();

        let sorted_timestamps: Vec<Timestamp> = keep.iter().map(|&i| timestamps[i]).collect();
        let sorted_years: Vec<i32> = match &years {
            Some(years) => keep.iter().map(|&i| years[i]).collect(),
            None => sorted_timestamps.iter().map(|t| t.year()).collect(),
        };

        let mut column_names = Vec::with_capacity(features.len());
        let mut columns = HashMap::with_capacity(features.len());
        for (name, values) in features {
            if name == TARGET_COLUMN || columns.contains_key(&name) {
                return Err(ForecastError::DataError(format!(
                    "Duplicate column '{}'",
                    name
                )));
            }
            columns.insert(name.clone(), gather(&values));
            column_names.push(name);
        }

        let year_index = build_year_index(&sorted_years)?;

        Ok(Self {
            timestamps: sorted_timestamps,
            years: sorted_years,
            target: gather(&target),
            column_names,
            columns,
            year_index,
        })
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether the panel has no rows
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Row timestamps in order
    pub fn timestamps(&self) -> &[Timestamp] {
        &self.timestamps
    }

    /// Target prices in row order
    pub fn target(&self) -> &[f64] {
        &self.target
    }

    /// Year key of every row
    pub fn years(&self) -> &[i32] {
        &self.years
    }

    /// Predictor column names in insertion order
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Whether a predictor column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Values of a predictor column
    pub fn column(&self, name: &str) -> Result<&[f64]> {
        self.columns
            .get(name)
            .map(|values| values.as_slice())
            .ok_or_else(|| ForecastError::DataError(format!("Column '{}' not found", name)))
    }

    /// Add or replace a predictor column
    pub fn set_column(&mut self, name: &str, values: Vec<f64>) -> Result<()> {
        if values.len() != self.len() {
            return Err(ForecastError::DataError(format!(
                "Column '{}' has {} rows, panel has {}",
                name,
                values.len(),
                self.len()
            )));
        }
        if name == TARGET_COLUMN {
            return Err(ForecastError::DataError(format!(
                "'{}' is the target, not a predictor",
                TARGET_COLUMN
            )));
        }
        if self.columns.insert(name.to_string(), values).is_none() {
            self.column_names.push(name.to_string());
        }
        Ok(())
    }

    /// Years present in the panel, ascending
    pub fn years_present(&self) -> Vec<i32> {
        self.year_index.keys().copied().collect()
    }

    /// Rows belonging to a year, if the year is present
    pub fn year_rows(&self, year: i32) -> Option<Range<usize>> {
        self.year_index.get(&year).cloned()
    }

    /// Calendar (year, month) of a row, from its local time
    pub fn year_month(&self, row: usize) -> (i32, u32) {
        let ts = self.timestamps[row];
        (ts.year(), ts.month())
    }

    /// View over a contiguous block of rows
    pub fn view(&self, rows: Range<usize>) -> PanelView<'_> {
        let end = rows.end.min(self.len());
        let start = rows.start.min(end);
        PanelView {
            panel: self,
            rows: (start..end).collect(),
        }
    }

    /// View over every row
    pub fn full_view(&self) -> PanelView<'_> {
        self.view(0..self.len())
    }
}

fn build_year_index(years: &[i32]) -> Result<BTreeMap<i32, Range<usize>>> {
    let mut index: BTreeMap<i32, Range<usize>> = BTreeMap::new();
    let mut start = 0;
    for i in 1..=years.len() {
        if i == years.len() || years[i] != years[start] {
            let year = years[start];
            if index.contains_key(&year) {
                return Err(ForecastError::DataError(format!(
                    "{} {} does not form a contiguous block of rows",
                    YEAR_COLUMN, year
                )));
            }
            if let Some((&last, _)) = index.iter().next_back() {
                if last > year {
                    return Err(ForecastError::DataError(format!(
                        "{} {} appears after {}",
                        YEAR_COLUMN, year, last
                    )));
                }
            }
            index.insert(year, start..i);
            start = i;
        }
    }
    Ok(index)
}

/// A selection of panel rows handed to a strategy
///
/// Row positions are kept in ascending order, so iteration order is the
/// panel's time order.
#[derive(Debug, Clone)]
pub struct PanelView<'a> {
    panel: &'a Panel,
    rows: Vec<usize>,
}

impl<'a> PanelView<'a> {
    /// The underlying panel
    pub fn panel(&self) -> &'a Panel {
        self.panel
    }

    /// Panel row indices covered by the view
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the view has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Timestamps of the covered rows
    pub fn timestamps(&self) -> Vec<Timestamp> {
        self.rows.iter().map(|&r| self.panel.timestamps[r]).collect()
    }

    /// Target values of the covered rows
    pub fn target(&self) -> Vec<f64> {
        self.rows.iter().map(|&r| self.panel.target[r]).collect()
    }

    /// Row-major feature matrix over the given columns
    pub fn feature_matrix(&self, features: &[String]) -> Result<Vec<Vec<f64>>> {
        let columns = features
            .iter()
            .map(|name| self.panel.column(name))
            .collect::<Result<Vec<&[f64]>>>()?;

        Ok(self
            .rows
            .iter()
            .map(|&r| columns.iter().map(|col| col[r]).collect())
            .collect())
    }

    /// Sub-view over positions relative to this view
    pub fn slice(&self, positions: Range<usize>) -> PanelView<'a> {
        let end = positions.end.min(self.rows.len());
        let start = positions.start.min(end);
        PanelView {
            panel: self.panel,
            rows: self.rows[start..end].to_vec(),
        }
    }

    /// Sub-view over arbitrary relative positions, kept in time order
    pub fn select(&self, positions: &[usize]) -> PanelView<'a> {
        let mut rows: Vec<usize> = positions
            .iter()
            .filter_map(|&p| self.rows.get(p).copied())
            .collect();
        rows.sort_unstable();
        rows.dedup();
        PanelView {
            panel: self.panel,
            rows,
        }
    }
}

/// Data loader for hourly panels
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load a panel from a CSV file
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Panel> {
        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()?;

        Self::from_dataframe(df)
    }

    /// Create a panel from an existing DataFrame
    pub fn from_dataframe(df: DataFrame) -> Result<Panel> {
        let time_column = Self::detect_time_column(&df)?;
        let timestamps = Self::column_as_timestamps(&df, &time_column)?;

        if df.column(TARGET_COLUMN).is_err() {
            return Err(ForecastError::DataError(format!(
                "Panel has no '{}' column",
                TARGET_COLUMN
            )));
        }
        let target = Self::column_as_f64(&df, TARGET_COLUMN)?;

        let years = if df.column(YEAR_COLUMN).is_ok() {
            Some(
                Self::column_as_f64(&df, YEAR_COLUMN)?
                    .into_iter()
                    .map(|y| y as i32)
                    .collect(),
            )
        } else {
            None
        };

        let mut features = Vec::new();
        for series in df.get_columns() {
            let name = series.name();
            if name == time_column || name == TARGET_COLUMN || name == YEAR_COLUMN {
                continue;
            }
            if !(series.dtype().is_numeric() || series.dtype() == &DataType::Boolean) {
                debug!("Skipping non-numeric column '{}'", name);
                continue;
            }
            features.push((name.to_string(), Self::column_as_f64(&df, name)?));
        }

        Panel::new(timestamps, target, features, years)
    }

    /// Detect the time column in a DataFrame
    fn detect_time_column(df: &DataFrame) -> Result<String> {
        let column_names = df.get_column_names();

        if column_names.iter().any(|name| *name == TIME_COLUMN) {
            return Ok(TIME_COLUMN.to_string());
        }

        for name in &column_names {
            let lower_name = name.to_lowercase();
            if lower_name.contains("time") || lower_name.contains("date") {
                return Ok(name.to_string());
            }
        }

        Err(ForecastError::DataError(
            "No time column found in data".to_string(),
        ))
    }

    /// Read a numeric column as f64, rejecting nulls
    fn column_as_f64(df: &DataFrame, column_name: &str) -> Result<Vec<f64>> {
        let col = df.column(column_name).map_err(|e| {
            ForecastError::DataError(format!("Column '{}' not found: {}", column_name, e))
        })?;
        let casted = col.cast(&DataType::Float64).map_err(|e| {
            ForecastError::DataError(format!(
                "Column '{}' cannot be converted to f64: {}",
                column_name, e
            ))
        })?;

        casted
            .f64()?
            .into_iter()
            .enumerate()
            .map(|(row, value)| {
                value.ok_or_else(|| {
                    ForecastError::DataError(format!(
                        "Column '{}' has a missing value at row {}",
                        column_name, row
                    ))
                })
            })
            .collect()
    }

    /// Read the time column, whatever dtype polars inferred for it
    fn column_as_timestamps(df: &DataFrame, column_name: &str) -> Result<Vec<Timestamp>> {
        let col = df.column(column_name)?;

        match col.dtype() {
            DataType::Utf8 => col
                .utf8()?
                .into_iter()
                .enumerate()
                .map(|(row, value)| {
                    value.and_then(parse_timestamp).ok_or_else(|| {
                        ForecastError::DataError(format!(
                            "Unparseable timestamp in '{}' at row {}",
                            column_name, row
                        ))
                    })
                })
                .collect(),
            DataType::Datetime(unit, _) => {
                let unit = *unit;
                col.cast(&DataType::Int64)?
                    .i64()?
                    .into_iter()
                    .enumerate()
                    .map(|(row, value)| {
                        value.and_then(|v| from_epoch(v, unit)).ok_or_else(|| {
                            ForecastError::DataError(format!(
                                "Missing timestamp in '{}' at row {}",
                                column_name, row
                            ))
                        })
                    })
                    .collect()
            }
            DataType::Date => col
                .cast(&DataType::Int32)?
                .i32()?
                .into_iter()
                .enumerate()
                .map(|(row, value)| {
                    value
                        .and_then(|days| {
                            NaiveDate::from_ymd_opt(1970, 1, 1)?
                                .checked_add_signed(chrono::Duration::days(days as i64))
                        })
                        .and_then(|date| date.and_hms_opt(0, 0, 0))
                        .map(at_utc)
                        .ok_or_else(|| {
                            ForecastError::DataError(format!(
                                "Missing date in '{}' at row {}",
                                column_name, row
                            ))
                        })
                })
                .collect(),
            other => Err(ForecastError::DataError(format!(
                "Column '{}' has dtype {} and cannot hold timestamps",
                column_name, other
            ))),
        }
    }
}

fn from_epoch(value: i64, unit: TimeUnit) -> Option<Timestamp> {
    let (secs, nanos) = match unit {
        TimeUnit::Nanoseconds => (value.div_euclid(1_000_000_000), value.rem_euclid(1_000_000_000)),
        TimeUnit::Microseconds => (
            value.div_euclid(1_000_000),
            value.rem_euclid(1_000_000) * 1_000,
        ),
        TimeUnit::Milliseconds => (value.div_euclid(1_000), value.rem_euclid(1_000) * 1_000_000),
    };
    DateTime::<Utc>::from_timestamp(secs, nanos as u32).map(Timestamp::from)
}

/// Parse a panel timestamp.
///
/// A UTC offset in the value is kept; values without one are taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<Timestamp> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt);
    }

    const FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
    for format in FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Some(at_utc(ts));
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(at_utc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let local = ts("2020-03-01 05:00:00+02:00");
        assert_eq!(local, ts("2020-03-01 03:00:00"));
        assert_eq!(local.naive_local(), ts("2020-03-01 05:00:00").naive_utc());
        assert_eq!(format_timestamp(&local), "2020-03-01 05:00:00+02:00");
        assert_eq!(format_timestamp(&ts("2020-03-01 05:00")), "2020-03-01 05:00:00");
        assert_eq!(ts("2020-03-01T05:00:00"), ts("2020-03-01 05:00"));
        assert_eq!(ts("2020-03-01"), ts("2020-03-01 00:00:00"));
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_panel_sorts_and_keeps_last_duplicate() {
        let panel = Panel::new(
            vec![
                ts("2020-01-01 02:00:00"),
                ts("2020-01-01 00:00:00"),
                ts("2020-01-01 02:00:00"),
            ],
            vec![1.0, 2.0, 3.0],
            vec![("Load".to_string(), vec![10.0, 20.0, 30.0])],
            None,
        )
        .unwrap();

        assert_eq!(panel.len(), 2);
        assert_eq!(panel.target(), &[2.0, 3.0]);
        assert_eq!(panel.column("Load").unwrap(), &[20.0, 30.0]);
    }

    #[test]
    fn test_year_index_rejects_interleaved_years() {
        let result = Panel::new(
            vec![
                ts("2020-01-01 00:00:00"),
                ts("2020-01-01 01:00:00"),
                ts("2020-01-01 02:00:00"),
            ],
            vec![1.0, 2.0, 3.0],
            Vec::new(),
            Some(vec![2020, 2021, 2020]),
        );
        assert!(matches!(result, Err(ForecastError::DataError(_))));
    }

    #[test]
    fn test_view_slice_and_select() {
        let panel = Panel::new(
            (0..6)
                .map(|h| ts(&format!("2020-01-01 0{}:00:00", h)))
                .collect(),
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
            Vec::new(),
            None,
        )
        .unwrap();

        let view = panel.view(1..5);
        assert_eq!(view.target(), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(view.slice(2..10).target(), vec![3.0, 4.0]);
        assert_eq!(view.select(&[3, 0]).rows(), &[1, 4]);
    }
}
