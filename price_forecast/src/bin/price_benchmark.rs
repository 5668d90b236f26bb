//! Walk-forward benchmark of day-ahead price forecasting models
//!
//! # Run every model for Greece
//! price_benchmark --panel data/GR_20150101_20221231.csv --country GR \
//!     --start 20150101 --end 20221231
//!
//! # Untuned tree models only, custom country records
//! price_benchmark --panel data/DE.csv --country DE --start 20180101 --end 20231231 \
//!     --countries-config countries.json --models dt,rf --no-tune

use anyhow::{Context, Result};
use clap::Parser;
use price_forecast::config::{CountryRegistry, RunOptions, StudyHorizon};
use price_forecast::data::DataLoader;
use price_forecast::evaluation::Benchmark;
use price_forecast::features::add_share_columns;
use price_forecast::models::ModelKind;
use price_forecast::report::ReportWriter;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "price_benchmark")]
#[command(about = "Walk-forward benchmark of hourly day-ahead price forecasts")]
#[command(version)]
struct Cli {
    /// Hourly panel CSV with Datetime, Price and predictor columns
    #[arg(short, long)]
    panel: PathBuf,

    /// Country code of the panel
    #[arg(short, long)]
    country: String,

    /// First day of the study, YYYYMMDD
    #[arg(long)]
    start: String,

    /// Last day of the study, YYYYMMDD
    #[arg(long)]
    end: String,

    /// Output directory for result tables
    #[arg(short, long, default_value = "results")]
    output: PathBuf,

    /// JSON file of country records replacing the built-in ones
    #[arg(long)]
    countries_config: Option<PathBuf>,

    /// JSON file of run options
    #[arg(long)]
    options: Option<PathBuf>,

    /// Skip hyperparameter tuning
    #[arg(long)]
    no_tune: bool,

    /// Models to run, comma separated (naive, glm, dt, rf, gbm)
    #[arg(short, long, value_delimiter = ',')]
    models: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("price_forecast=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let registry = match &cli.countries_config {
        Some(path) => CountryRegistry::from_json_file(path)
            .with_context(|| format!("Failed to read country records from {}", path.display()))?,
        None => CountryRegistry::builtin(),
    };
    let config = registry.resolve(&cli.country)?;
    let horizon = StudyHorizon::parse(&cli.start, &cli.end)?;

    let mut options = match &cli.options {
        Some(path) => RunOptions::from_json_file(path)
            .with_context(|| format!("Failed to read run options from {}", path.display()))?,
        None => RunOptions::default(),
    };
    if cli.no_tune {
        options.tune = false;
    }

    let kinds = if cli.models.is_empty() {
        ModelKind::all().to_vec()
    } else {
        cli.models
            .iter()
            .map(|name| name.trim().parse::<ModelKind>())
            .collect::<Result<Vec<_>, _>>()?
    };

    info!("Loading panel from {}", cli.panel.display());
    let mut panel = DataLoader::from_csv(&cli.panel)
        .with_context(|| format!("Failed to load panel {}", cli.panel.display()))?;
    info!(
        "Loaded {} hourly rows covering {:?}",
        panel.len(),
        panel.years_present()
    );

    add_share_columns(&mut panel, config, options.missing_source_policy)?;

    let writer = ReportWriter::new(&cli.output, &cli.country)?;
    let results = Benchmark::for_country(&panel, config, horizon, options, &kinds)?
        .with_report_writer(writer.clone())
        .run()?;

    let written = writer.write_summaries(&results)?;
    info!(
        "Benchmark of {} finished; {} summary files in {}",
        cli.country,
        written.len(),
        writer.output_dir().display()
    );

    Ok(())
}
