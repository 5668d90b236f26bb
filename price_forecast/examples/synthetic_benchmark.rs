use chrono::{Datelike, Duration, NaiveDate, Timelike};
use price_forecast::config::{CountryConfig, RunOptions, StudyHorizon};
use price_forecast::data::{at_utc, Panel};
use price_forecast::evaluation::run_country_benchmark;
use price_forecast::models::ModelKind;
use std::f64::consts::PI;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Three years of hourly data for a made-up zone with two sources
    let start = NaiveDate::from_ymd_opt(2019, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or("invalid start date")?;
    let timestamps: Vec<_> = (0..26_304).map(|h| start + Duration::hours(h)).collect();

    let daily = |ts: &chrono::NaiveDateTime| (2.0 * PI * ts.hour() as f64 / 24.0).sin();
    let coal: Vec<f64> = timestamps.iter().map(|ts| 3.0 + daily(ts)).collect();
    let wind: Vec<f64> = timestamps
        .iter()
        .map(|ts| 1.5 + (2.0 * PI * ts.ordinal() as f64 / 9.0).cos())
        .collect();
    let gas_price: Vec<f64> = timestamps
        .iter()
        .map(|ts| 20.0 + ts.month() as f64)
        .collect();
    let price: Vec<f64> = timestamps
        .iter()
        .zip(&gas_price)
        .map(|(ts, gas)| 1.5 * gas + 10.0 * daily(ts))
        .collect();

    let load: Vec<f64> = timestamps
        .iter()
        .map(|ts| 1.0 + 0.2 * (2.0 * PI * ts.ordinal() as f64 / 7.0).cos())
        .collect();
    let holiday: Vec<f64> = timestamps
        .iter()
        .map(|ts| if ts.ordinal() % 30 == 0 { 1.0 } else { 0.0 })
        .collect();
    let flow: Vec<f64> = (0..timestamps.len())
        .map(|i| 0.3 * (2.0 * PI * i as f64 / 50.0).sin())
        .collect();

    let mut panel = Panel::new(
        timestamps.into_iter().map(at_utc).collect(),
        price,
        vec![
            ("Coal".to_string(), coal),
            ("Wind".to_string(), wind),
            ("Gas_Price".to_string(), gas_price),
            ("Load".to_string(), load),
            ("Holiday".to_string(), holiday),
            ("Flow".to_string(), flow),
        ],
        None,
    )?;

    let config = CountryConfig::new("XX", &["Coal", "Wind"]);
    let options = RunOptions {
        tune: false,
        ..RunOptions::default()
    };

    let results = run_country_benchmark(
        &mut panel,
        &config,
        StudyHorizon::new(2019, 2021)?,
        options,
        &[ModelKind::Naive, ModelKind::Glm, ModelKind::DecisionTree],
    )?;

    println!("Per-year errors:");
    for record in results.error_table().records() {
        match (record.mae, record.rmse) {
            (Some(mae), Some(rmse)) => println!(
                "  {:<6} {}  MAE {:>7.2}  RMSE {:>7.2}",
                record.model, record.year, mae, rmse
            ),
            _ => println!("  {:<6} {}  skipped", record.model, record.year),
        }
    }

    println!("\nMean over available years:");
    for (model, means) in results.error_table().mean_by_model() {
        println!("  {:<6} {}", model, means);
    }

    Ok(())
}
