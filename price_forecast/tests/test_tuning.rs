mod common;

use chrono::Timelike;
use common::{country, synthetic_panel};
use price_forecast::data::Panel;
use price_forecast::error::ForecastError;
use price_forecast::features::{add_share_columns, FeatureSet, MissingSourcePolicy};
use price_forecast::models::{DecisionTree, ForecastModel, LinearModel};
use price_forecast::tuning::{HyperparameterGrid, ParamSet, Tuner, ValidationPolicy};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn hourly_profile_panel() -> Panel {
    let mut panel = synthetic_panel(&[2019, 2020], |ts| 30.0 + 2.0 * ts.hour() as f64);
    add_share_columns(&mut panel, &country(), MissingSourcePolicy::ZeroFill).unwrap();
    panel
}

fn tree(panel: &Panel) -> DecisionTree {
    DecisionTree::new(FeatureSet::full(&country(), panel))
}

#[test]
fn test_single_candidate_matches_untuned_fit() {
    let panel = hourly_profile_panel();
    let train = panel.view(panel.year_rows(2019).unwrap());
    let test = panel.view(panel.year_rows(2020).unwrap());

    let grid = HyperparameterGrid::new()
        .with("max_depth", vec![4.0])
        .with("min_samples_split", vec![20.0]);
    let tuned = Tuner::new(ValidationPolicy::default())
        .tune(&tree(&panel), &grid, &train)
        .unwrap();
    assert_eq!(
        tuned.params,
        ParamSet::new()
            .with("max_depth", 4.0)
            .with("min_samples_split", 20.0)
    );

    let untuned = tree(&panel)
        .with_max_depth(4)
        .with_min_samples_split(20)
        .train(&train)
        .unwrap()
        .predict(&test)
        .unwrap();
    assert_eq!(tuned.trained.predict(&test).unwrap(), untuned);
}

#[rstest]
#[case(ValidationPolicy::HoldOutTail { fraction: 0.2 })]
#[case(ValidationPolicy::ExpandingFolds { folds: 3 })]
#[case(ValidationPolicy::UnorderedKFold { folds: 3 })]
fn test_deeper_tree_wins_on_hourly_profile(#[case] policy: ValidationPolicy) {
    let panel = hourly_profile_panel();
    let train = panel.view(panel.year_rows(2019).unwrap());
    let grid = HyperparameterGrid::new().with("max_depth", vec![1.0, 6.0]);

    let tuned = Tuner::new(policy).tune(&tree(&panel), &grid, &train).unwrap();
    assert_eq!(tuned.params.get("max_depth"), Some(6.0));
    assert!(tuned.score.is_finite() && tuned.score >= 0.0);
}

#[test]
fn test_max_evaluations_bounds_the_search() {
    let panel = hourly_profile_panel();
    let train = panel.view(panel.year_rows(2019).unwrap());
    let grid = HyperparameterGrid::new().with("max_depth", vec![1.0, 6.0]);

    let tuned = Tuner::new(ValidationPolicy::default())
        .with_max_evaluations(Some(1))
        .tune(&tree(&panel), &grid, &train)
        .unwrap();
    assert_eq!(tuned.params.get("max_depth"), Some(1.0));
}

#[test]
fn test_serial_and_parallel_scoring_agree() {
    let panel = hourly_profile_panel();
    let train = panel.view(panel.year_rows(2019).unwrap());
    let grid = HyperparameterGrid::new()
        .with("max_depth", vec![2.0, 3.0])
        .with("min_samples_split", vec![20.0, 50.0]);

    let parallel = Tuner::new(ValidationPolicy::default())
        .tune(&tree(&panel), &grid, &train)
        .unwrap();
    let serial = Tuner::new(ValidationPolicy::default())
        .with_parallel(false)
        .tune(&tree(&panel), &grid, &train)
        .unwrap();
    assert_eq!(parallel.params, serial.params);
    assert_eq!(parallel.score, serial.score);
}

#[test]
fn test_empty_grid_is_rejected() {
    let panel = hourly_profile_panel();
    let train = panel.view(panel.year_rows(2019).unwrap());
    let err = Tuner::new(ValidationPolicy::default())
        .tune(&tree(&panel), &HyperparameterGrid::new(), &train)
        .unwrap_err();
    assert!(matches!(err, ForecastError::InvalidParameter(_)));
}

#[test]
fn test_unknown_parameter_fails_every_candidate() {
    let panel = hourly_profile_panel();
    let train = panel.view(panel.year_rows(2019).unwrap());
    let model = LinearModel::new(FeatureSet::linear(&country()));
    let grid = HyperparameterGrid::new().with("alpha", vec![0.1, 1.0]);

    let err = Tuner::new(ValidationPolicy::default())
        .tune(&model, &grid, &train)
        .unwrap_err();
    assert!(matches!(err, ForecastError::InvalidParameter(_)));
}

#[test]
fn test_failing_candidates_are_passed_over() {
    let panel = hourly_profile_panel();
    let train = panel.view(panel.year_rows(2019).unwrap());
    // A fractional depth cannot be applied; the whole-number candidate wins.
    let grid = HyperparameterGrid::new().with("max_depth", vec![2.5, 3.0]);

    let tuned = Tuner::new(ValidationPolicy::default())
        .tune(&tree(&panel), &grid, &train)
        .unwrap();
    assert_eq!(tuned.params.get("max_depth"), Some(3.0));
}

#[rstest]
#[case(ValidationPolicy::HoldOutTail { fraction: 1.0 })]
#[case(ValidationPolicy::ExpandingFolds { folds: 0 })]
#[case(ValidationPolicy::UnorderedKFold { folds: 1 })]
fn test_invalid_policies_rejected(#[case] policy: ValidationPolicy) {
    assert!(policy.validate().unwrap_err().is_fatal());
}

#[test]
fn test_expanding_folds_never_look_ahead() {
    let policy = ValidationPolicy::ExpandingFolds { folds: 3 };
    assert!(!policy.looks_ahead());

    let splits = policy.splits(100).unwrap();
    assert_eq!(splits.len(), 3);
    for split in &splits {
        assert!(split.train.iter().all(|&p| p < split.validation.start));
        assert_eq!(split.validation.len(), 25);
    }
    assert_eq!(splits[2].validation.end, 100);
}

#[test]
fn test_unordered_folds_cover_every_row_once() {
    let policy = ValidationPolicy::UnorderedKFold { folds: 4 };
    assert!(policy.looks_ahead());

    let splits = policy.splits(10).unwrap();
    let mut covered: Vec<usize> = splits.iter().flat_map(|s| s.validation.clone()).collect();
    covered.sort_unstable();
    assert_eq!(covered, (0..10).collect::<Vec<_>>());
    for split in &splits {
        assert_eq!(split.train.len() + split.validation.len(), 10);
    }
}
