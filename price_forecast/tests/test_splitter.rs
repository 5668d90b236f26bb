mod common;

use chrono::Datelike;
use common::synthetic_panel;
use price_forecast::config::StudyHorizon;
use price_forecast::error::ForecastError;
use price_forecast::splitter::{WalkForwardSplitter, Window};
use pretty_assertions::assert_eq;

#[test]
fn test_windows_expand_and_never_leak() {
    let panel = synthetic_panel(&[2018, 2019, 2020, 2021], |_| 50.0);
    let splitter = WalkForwardSplitter::new(&panel, StudyHorizon::new(2018, 2021).unwrap());
    let windows: Vec<Window> = splitter.windows().map(|w| w.unwrap()).collect();

    assert_eq!(
        windows.iter().map(|w| w.year).collect::<Vec<_>>(),
        vec![2019, 2020, 2021]
    );

    let mut previous_train = 0;
    for window in &windows {
        assert_eq!(window.train.start, 0);
        assert_eq!(window.train.end, window.test.start);
        assert!(window.train_len() > previous_train);
        previous_train = window.train_len();

        let timestamps = panel.timestamps();
        let last_train = timestamps[window.train.end - 1];
        let first_test = timestamps[window.test.start];
        assert!(last_train < first_test);
        assert!(timestamps[window.train.clone()]
            .iter()
            .all(|ts| ts.year() < window.year));
        assert!(timestamps[window.test.clone()]
            .iter()
            .all(|ts| ts.year() == window.year));
    }

    assert_eq!(windows[1].test_len(), 8784);
    assert_eq!(windows[2].test.end, panel.len());
}

#[test]
fn test_rows_outside_horizon_stay_out_of_tests() {
    let panel = synthetic_panel(&[2018, 2019, 2020, 2021], |_| 50.0);
    let splitter = WalkForwardSplitter::new(&panel, StudyHorizon::new(2019, 2020).unwrap());
    let windows: Vec<Window> = splitter.windows().map(|w| w.unwrap()).collect();

    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].year, 2020);
    // Training still starts at the first row of the panel.
    assert_eq!(windows[0].train_len(), 8760 * 2);
}

#[test]
fn test_missing_year_yields_error_in_place() {
    let panel = synthetic_panel(&[2019, 2021], |_| 50.0);
    let splitter = WalkForwardSplitter::new(&panel, StudyHorizon::new(2019, 2021).unwrap());
    let items: Vec<_> = splitter.windows().collect();

    assert_eq!(items.len(), 2);
    assert!(matches!(items[0], Err(ForecastError::MissingYear(2020))));
    let window = items[1].as_ref().unwrap();
    assert_eq!(window.year, 2021);
    assert_eq!(window.train, 0..8760);
}

#[test]
fn test_single_year_horizon_is_empty() {
    let panel = synthetic_panel(&[2019], |_| 50.0);
    let splitter = WalkForwardSplitter::new(&panel, StudyHorizon::new(2019, 2019).unwrap());
    assert!(splitter.is_empty());
    assert_eq!(splitter.windows().count(), 0);
}

#[test]
fn test_horizon_parses_day_bounds() {
    let horizon = StudyHorizon::parse("20150101", "20221231").unwrap();
    assert_eq!(horizon.test_years().collect::<Vec<_>>(), (2016..=2022).collect::<Vec<_>>());
    assert!(StudyHorizon::parse("2015", "20141231").unwrap_err().is_fatal());
}
