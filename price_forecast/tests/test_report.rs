use price_forecast::data::parse_timestamp;
use price_forecast::evaluation::{
    BenchmarkResults, CompletedYear, PredictionRecord, StrategyRun, TunedYear, YearOutcome,
};
use price_forecast::metrics::ErrorMetrics;
use price_forecast::report::{ReportWriter, UNAVAILABLE};
use price_forecast::tuning::ParamSet;
use pretty_assertions::assert_eq;
use std::path::Path;

fn record(ts: &str, actual: f64, predicted: f64, tuned: Option<f64>) -> PredictionRecord {
    PredictionRecord {
        timestamp: parse_timestamp(ts).unwrap(),
        actual,
        predicted,
        tuned,
    }
}

fn results() -> BenchmarkResults {
    let naive = StrategyRun {
        model_name: "naive".to_string(),
        tuned: false,
        years: vec![
            YearOutcome::Completed(CompletedYear {
                year: 2020,
                predictions: vec![
                    record("2020-01-01 00:00:00", 0.0, 1.234_5, None),
                    record("2020-01-01 01:00:00", 0.0, -0.001, None),
                ],
                errors: ErrorMetrics {
                    mae: 1.234_5,
                    rmse: 2.0,
                    mdape: None,
                },
                tuned: None,
            }),
            YearOutcome::Skipped {
                year: 2021,
                reason: "Missing year: 2021 has no rows in the panel".to_string(),
            },
        ],
    };

    let dt = StrategyRun {
        model_name: "dt".to_string(),
        tuned: true,
        years: vec![
            YearOutcome::Completed(CompletedYear {
                year: 2020,
                predictions: vec![
                    record("2020-01-01 00:00:00", 0.0, 0.5, Some(0.25)),
                    record("2020-01-01 01:00:00", 0.0, 0.5, Some(0.0)),
                ],
                errors: ErrorMetrics {
                    mae: 0.5,
                    rmse: 0.5,
                    mdape: None,
                },
                tuned: Some(TunedYear::Completed {
                    params: ParamSet::new()
                        .with("max_depth", 4.0)
                        .with("min_samples_split", 20.0),
                    score: 0.1,
                    errors: ErrorMetrics {
                        mae: 0.125,
                        rmse: 0.176_776_695,
                        mdape: None,
                    },
                }),
            }),
            YearOutcome::Completed(CompletedYear {
                year: 2021,
                predictions: vec![record("2021-01-01 00:00:00", 40.0, 44.0, None)],
                errors: ErrorMetrics {
                    mae: 4.0,
                    rmse: 4.0,
                    mdape: Some(10.0),
                },
                tuned: Some(TunedYear::Failed {
                    reason: "Model fit error: dt: no candidate".to_string(),
                }),
            }),
        ],
    };

    BenchmarkResults {
        runs: vec![naive, dt],
    }
}

fn read_rows(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(|field| field.to_string()).collect())
        .collect()
}

#[test]
fn test_write_all_produces_every_table() {
    let dir = tempfile::tempdir().unwrap();
    let writer = ReportWriter::new(dir.path(), "XX").unwrap();
    let written = writer.write_all(&results()).unwrap();

    let mut names: Vec<String> = written
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "best_params_dt_XX.csv",
            "combined_results_XX.csv",
            "dt_XX_2020_predictions.csv",
            "dt_XX_2021_predictions.csv",
            "error_summary_XX.csv",
            "errors_dt_XX.csv",
            "errors_dt_tuned_XX.csv",
            "errors_naive_XX.csv",
            "naive_XX_2020_predictions.csv",
        ]
    );
    assert!(written.iter().all(|p| p.exists()));
}

#[test]
fn test_error_table_marks_unavailable_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let writer = ReportWriter::new(dir.path(), "XX").unwrap();
    writer.write_all(&results()).unwrap();

    let rows = read_rows(&dir.path().join("errors_naive_XX.csv"));
    assert_eq!(rows[0], vec!["Year", "MAE", "RMSE", "MdAPE", "Note"]);
    assert_eq!(rows[1][..4], ["2020", "1.23", "2.00", UNAVAILABLE]);
    assert!(rows[1][4].starts_with("MdAPE undefined"));
    assert_eq!(
        rows[2],
        vec![
            "2021",
            UNAVAILABLE,
            UNAVAILABLE,
            UNAVAILABLE,
            "Missing year: 2021 has no rows in the panel"
        ]
    );

    let tuned = read_rows(&dir.path().join("errors_dt_tuned_XX.csv"));
    assert_eq!(tuned[1][..3], ["2020", "0.13", "0.18"]);
    assert_eq!(tuned[2][1], UNAVAILABLE);
    assert!(tuned[2][4].contains("no candidate"));
}

#[test]
fn test_prediction_tables_round_to_two_decimals() {
    let dir = tempfile::tempdir().unwrap();
    let writer = ReportWriter::new(dir.path(), "XX").unwrap();
    writer.write_all(&results()).unwrap();

    let rows = read_rows(&dir.path().join("naive_XX_2020_predictions.csv"));
    assert_eq!(rows[0], vec!["Datetime", "y", "yhat", "yhat_tuned"]);
    assert_eq!(rows[1], vec!["2020-01-01 00:00:00", "0.00", "1.23", ""]);
    assert_eq!(rows[2], vec!["2020-01-01 01:00:00", "0.00", "0.00", ""]);

    let rows = read_rows(&dir.path().join("dt_XX_2020_predictions.csv"));
    assert_eq!(rows[1], vec!["2020-01-01 00:00:00", "0.00", "0.50", "0.25"]);
}

#[test]
fn test_combined_table_joins_on_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let writer = ReportWriter::new(dir.path(), "XX").unwrap();
    writer.write_all(&results()).unwrap();

    let rows = read_rows(&dir.path().join("combined_results_XX.csv"));
    assert_eq!(
        rows[0],
        vec![
            "Datetime",
            "Original_Price",
            "Result_naive",
            "Result_dt",
            "Result_dt_tuned"
        ]
    );
    assert_eq!(rows.len(), 4);
    assert_eq!(
        rows[1],
        vec!["2020-01-01 00:00:00", "0.00", "1.23", "0.50", "0.25"]
    );
    // Only dt forecast 2021, and its tuning failed that year.
    assert_eq!(rows[3], vec!["2021-01-01 00:00:00", "40.00", "", "44.00", ""]);
}

#[test]
fn test_best_params_are_json_per_year() {
    let dir = tempfile::tempdir().unwrap();
    let writer = ReportWriter::new(dir.path(), "XX").unwrap();
    let path = writer.write_best_params(&results().runs[1]).unwrap();

    let rows = read_rows(&path);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], vec!["Year", "Best_Params"]);
    assert_eq!(rows[1][0], "2020");
    let params: serde_json::Value = serde_json::from_str(&rows[1][1]).unwrap();
    assert_eq!(params["max_depth"], 4.0);
    assert_eq!(params["min_samples_split"], 20.0);
}

#[test]
fn test_error_summary_lists_tuned_rows_after_their_model() {
    let table = results().error_table();
    let models: Vec<(&str, i32)> = table
        .records()
        .iter()
        .map(|r| (r.model.as_str(), r.year))
        .collect();
    assert_eq!(
        models,
        vec![
            ("naive", 2020),
            ("naive", 2021),
            ("dt", 2020),
            ("dt", 2021),
            ("dt_tuned", 2020),
            ("dt_tuned", 2021),
        ]
    );

    let means = table.mean_by_model();
    assert_eq!(means[0].0, "naive");
    assert_eq!(means[0].1.years, 1);
    assert_eq!(means[1].1.mae, 2.25);
    assert_eq!(means[1].1.mdape, Some(10.0));
    assert_eq!(means[2].1.years, 1);
}

#[test]
fn test_summaries_leave_prediction_tables_out() {
    let dir = tempfile::tempdir().unwrap();
    let writer = ReportWriter::new(dir.path(), "XX").unwrap();
    let written = writer.write_summaries(&results()).unwrap();

    assert_eq!(written.len(), 6);
    assert!(written
        .iter()
        .all(|p| !p.to_string_lossy().ends_with("_predictions.csv")));
    assert!(!dir.path().join("naive_XX_2020_predictions.csv").exists());
}

#[test]
fn test_offset_timestamps_written_with_offset() {
    let dir = tempfile::tempdir().unwrap();
    let writer = ReportWriter::new(dir.path(), "XX").unwrap();
    let completed = CompletedYear {
        year: 2020,
        predictions: vec![
            record("2020-10-25 03:00:00+03:00", 10.0, 11.0, None),
            record("2020-10-25 03:00:00+02:00", 20.0, 21.0, None),
        ],
        errors: ErrorMetrics {
            mae: 1.0,
            rmse: 1.0,
            mdape: Some(7.5),
        },
        tuned: None,
    };
    let path = writer.write_year_predictions("naive", &completed).unwrap();

    let rows = read_rows(&path);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1][0], "2020-10-25 03:00:00+03:00");
    assert_eq!(rows[2][0], "2020-10-25 03:00:00+02:00");
}
