use chrono::{Days, NaiveDate};
use deltadesk_backtest::{HistoricalBars, WalkForward, WalkForwardConfig};
use deltadesk_core::{Bar, CancelFlag, CoreError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn day(offset: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Days::new(offset)
}

/// Saw-tooth closes so both windows see crossovers.
fn bars(len: u64) -> HistoricalBars {
    HistoricalBars::from_bars((0..len).map(|i| {
        let close = Decimal::from(100 + (i % 12) * 2) - Decimal::from(i % 5);
        Bar {
            ticker: "AAA".to_string(),
            date: day(i),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1000),
        }
    }))
}

fn config() -> WalkForwardConfig {
    let mut config = WalkForwardConfig::new(vec!["AAA".to_string()], day(0), day(39));
    config.train_days = 20;
    config.test_days = 10;
    config.fast_values = vec![2, 3, 6];
    config.slow_values = vec![4, 5];
    config
}

#[test]
fn folds_slide_by_the_test_window() {
    let result = WalkForward::new(config())
        .unwrap()
        .run(&bars(40), &CancelFlag::new())
        .unwrap();

    assert_eq!(result.strategy, "sma_crossover");
    assert_eq!(result.metrics.num_folds, 2);
    let first = &result.folds[0];
    assert_eq!((first.train_start, first.train_end), (day(0), day(19)));
    assert_eq!((first.test_start, first.test_end), (day(20), day(29)));
    let second = &result.folds[1];
    assert_eq!((second.train_start, second.test_end), (day(10), day(39)));

    for fold in &result.folds {
        assert!(fold.fast < fold.slow);
        assert!([2, 3].contains(&fold.fast));
        assert!(fold.train_sharpe.is_finite() && fold.test_sharpe.is_finite());
    }
    let avg_train = (first.train_sharpe + second.train_sharpe) / 2.0;
    assert!((result.metrics.avg_train_sharpe - avg_train).abs() < 1e-12);
    if avg_train != 0.0 {
        let ratio = result.metrics.avg_test_sharpe / avg_train;
        assert!((result.metrics.train_test_ratio - ratio).abs() < 1e-12);
    }

    let again = WalkForward::new(config())
        .unwrap()
        .run(&bars(40), &CancelFlag::new())
        .unwrap();
    assert_eq!(result, again);
}

#[test]
fn too_few_dates_for_one_fold() {
    let out = WalkForward::new(config())
        .unwrap()
        .run(&bars(29), &CancelFlag::new());
    assert!(matches!(out, Err(CoreError::DataUnavailable { .. })));
}

#[test]
fn grid_without_fast_below_slow_is_rejected() {
    let mut cfg = config();
    cfg.fast_values = vec![10];
    cfg.slow_values = vec![5, 10];
    assert!(matches!(WalkForward::new(cfg), Err(CoreError::Configuration(_))));
}

#[test]
fn cancelled_before_the_first_fold() {
    let cancel = CancelFlag::new();
    cancel.cancel();
    let out = WalkForward::new(config()).unwrap().run(&bars(40), &cancel);
    assert_eq!(out, Err(CoreError::Cancelled));
}
