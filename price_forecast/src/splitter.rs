//! Walk-forward window generation
//!
//! Expanding scheme: the window of year `y` trains on every row before the
//! first row of `y` and tests on the rows of `y`. Year boundaries come from
//! the panel's year index, so leap years and DST shifts need no special care.

use crate::config::StudyHorizon;
use crate::data::Panel;
use crate::error::{ForecastError, Result};
use std::ops::{Range, RangeInclusive};
use tracing::warn;

/// One train/test split of the panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    /// Year being tested
    pub year: i32,
    /// Training rows, always starting at the first panel row
    pub train: Range<usize>,
    /// Test rows, all of them after the training rows
    pub test: Range<usize>,
}

impl Window {
    /// Number of training rows
    pub fn train_len(&self) -> usize {
        self.train.len()
    }

    /// Number of test rows
    pub fn test_len(&self) -> usize {
        self.test.len()
    }
}

/// Splits a panel into expanding yearly windows over a study horizon
#[derive(Debug, Clone, Copy)]
pub struct WalkForwardSplitter<'a> {
    panel: &'a Panel,
    horizon: StudyHorizon,
}

impl<'a> WalkForwardSplitter<'a> {
    /// Create a splitter for the years `start_year + 1 ..= end_year`
    pub fn new(panel: &'a Panel, horizon: StudyHorizon) -> Self {
        Self { panel, horizon }
    }

    /// Fresh iterator over the windows; every call starts from the first year
    pub fn windows(&self) -> Windows<'a> {
        Windows {
            panel: self.panel,
            years: self.horizon.test_years(),
        }
    }

    /// Number of items the iterator yields, skipped years included
    pub fn len(&self) -> usize {
        self.horizon.test_years().count()
    }

    /// Whether the horizon spans a single year and yields nothing
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lazy sequence of windows, one item per test year
///
/// A year absent from the panel yields [`ForecastError::MissingYear`] in its
/// place instead of an empty test range.
#[derive(Debug, Clone)]
pub struct Windows<'a> {
    panel: &'a Panel,
    years: RangeInclusive<i32>,
}

impl<'a> Iterator for Windows<'a> {
    type Item = Result<Window>;

    fn next(&mut self) -> Option<Self::Item> {
        let year = self.years.next()?;
        match self.panel.year_rows(year) {
            Some(test) => Some(Ok(Window {
                year,
                train: 0..test.start,
                test,
            })),
            None => {
                warn!("Year {} is missing from the panel; skipping its window", year);
                Some(Err(ForecastError::MissingYear(year)))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.years.size_hint()
    }
}
