//! Synthetic hourly panels shared by the integration tests

#![allow(dead_code)]

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Weekday};
use price_forecast::config::CountryConfig;
use price_forecast::data::{at_utc, Panel};
use std::f64::consts::PI;

/// Generation sources of the synthetic country
pub const SOURCES: [&str; 3] = ["Coal", "Gas", "Wind"];

const WEEKDAYS: [(Weekday, &str); 7] = [
    (Weekday::Mon, "Monday"),
    (Weekday::Tue, "Tuesday"),
    (Weekday::Wed, "Wednesday"),
    (Weekday::Thu, "Thursday"),
    (Weekday::Fri, "Friday"),
    (Weekday::Sat, "Saturday"),
    (Weekday::Sun, "Sunday"),
];

/// Country record of the synthetic panels
pub fn country() -> CountryConfig {
    CountryConfig::new("XX", &SOURCES)
}

/// Every hour of the given calendar years, in order
pub fn hourly_timestamps(years: &[i32]) -> Vec<NaiveDateTime> {
    let mut timestamps = Vec::new();
    for &year in years {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let end = NaiveDate::from_ymd_opt(year + 1, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let hours = (end - start).num_hours();
        timestamps.extend((0..hours).map(|h| start + Duration::hours(h)));
    }
    timestamps
}

/// Hourly panel with raw generation, exogenous drivers and calendar dummies.
///
/// Share columns are not derived; tests call `add_share_columns` or go
/// through `run_country_benchmark`.
pub fn synthetic_panel<F>(years: &[i32], price: F) -> Panel
where
    F: Fn(NaiveDateTime) -> f64,
{
    let timestamps = hourly_timestamps(years);
    let n = timestamps.len();
    let t: Vec<f64> = (0..n).map(|i| i as f64).collect();

    let hour = |ts: &NaiveDateTime| ts.hour() as f64;
    let day = |ts: &NaiveDateTime| ts.ordinal() as f64;

    let mut columns: Vec<(String, Vec<f64>)> = vec![
        (
            "Coal".to_string(),
            timestamps
                .iter()
                .map(|ts| 3.0 + (2.0 * PI * hour(ts) / 24.0).sin())
                .collect(),
        ),
        (
            "Gas".to_string(),
            timestamps
                .iter()
                .map(|ts| 2.0 + (2.0 * PI * day(ts) / 7.0).cos())
                .collect(),
        ),
        (
            "Wind".to_string(),
            t.iter().map(|i| 1.5 + (2.0 * PI * i / 37.0).sin()).collect(),
        ),
        (
            "Load".to_string(),
            t.iter().map(|i| 1.0 + 0.3 * (2.0 * PI * i / 84.0).sin()).collect(),
        ),
        (
            "Gas_Price".to_string(),
            timestamps
                .iter()
                .map(|ts| 2.0 + 0.5 * (2.0 * PI * day(ts) / 30.0).sin())
                .collect(),
        ),
        (
            "Holiday".to_string(),
            timestamps
                .iter()
                .map(|ts| if ts.ordinal() % 17 == 0 { 1.0 } else { 0.0 })
                .collect(),
        ),
        (
            "Flow".to_string(),
            t.iter().map(|i| 0.5 * (2.0 * PI * i / 50.0).cos()).collect(),
        ),
    ];

    for month in 1..=12 {
        columns.push((
            format!("Month_{}", month),
            timestamps
                .iter()
                .map(|ts| indicator(ts.month() == month))
                .collect(),
        ));
    }
    for (weekday, name) in WEEKDAYS {
        columns.push((
            format!("Weekday_{}", name),
            timestamps
                .iter()
                .map(|ts| indicator(ts.weekday() == weekday))
                .collect(),
        ));
    }
    for h in 0..24 {
        columns.push((
            format!("Hour_{}", h),
            timestamps.iter().map(|ts| indicator(ts.hour() == h)).collect(),
        ));
    }

    let target = timestamps.iter().map(|ts| price(*ts)).collect();
    Panel::new(
        timestamps.into_iter().map(at_utc).collect(),
        target,
        columns,
        None,
    )
    .unwrap()
}

fn indicator(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}
