use chrono::{Days, NaiveDate};
use deltadesk_backtest::{HistoricalBars, PortfolioBacktest, PortfolioConfig, CLOSED_AT_END};
use deltadesk_core::{Bar, CancelFlag, CoreError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

fn day(offset: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Days::new(offset)
}

fn series(ticker: &str, closes: &[i64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, c)| Bar {
            ticker: ticker.to_string(),
            date: day(i as u64),
            open: Decimal::from(*c),
            high: Decimal::from(*c),
            low: Decimal::from(*c),
            close: Decimal::from(*c),
            volume: dec!(1000),
        })
        .collect()
}

fn rise_then_fall() -> Vec<i64> {
    let mut closes: Vec<i64> = (1..=10).collect();
    closes.extend((1..=10).rev());
    closes
}

fn config(tickers: &[&str], len: u64) -> PortfolioConfig {
    let mut config = PortfolioConfig::new(
        tickers.iter().map(|t| (*t).to_string()).collect(),
        day(0),
        day(len),
    );
    config.params = serde_json::from_value(json!({"fast": 2, "slow": 4})).unwrap();
    config
}

#[test]
fn round_trip_on_crossovers() {
    let bars = HistoricalBars::from_bars(series("AAA", &rise_then_fall()));
    let backtest = PortfolioBacktest::new(config(&["AAA"], 20)).unwrap();
    let result = backtest.run(&bars, &CancelFlag::new()).unwrap();

    assert_eq!(result.equity_curve.len(), 20);
    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.entry_date, day(3));
    assert_eq!(trade.exit_date, day(12));
    assert_eq!(trade.entry_price, dec!(4.0008));
    assert_eq!(trade.exit_price, dec!(7.9984));
    // floor(0.02 * 100000 / 4.0008)
    assert_eq!(trade.quantity, dec!(499));
    assert!(trade.pnl > Decimal::ZERO);
    assert!(trade.note.is_none());
    assert_eq!(
        result.metrics.final_equity,
        dec!(100000) + trade.pnl
    );
}

#[test]
fn identical_inputs_give_identical_outputs() {
    let mut bars = series("AAA", &rise_then_fall());
    bars.extend(series("BBB", &(5..25).collect::<Vec<_>>()));
    let bars = HistoricalBars::from_bars(bars);
    let backtest = PortfolioBacktest::new(config(&["AAA", "BBB"], 20)).unwrap();

    let first = backtest.run(&bars, &CancelFlag::new()).unwrap();
    let second = backtest.run(&bars, &CancelFlag::new()).unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn position_cap_blocks_later_entries_and_leftovers_close_at_end() {
    let rising: Vec<i64> = (1..=10).collect();
    let mut bars = series("AAA", &rising);
    bars.extend(series("BBB", &rising));
    let mut cfg = config(&["AAA", "BBB"], 10);
    cfg.max_positions = 1;
    let result = PortfolioBacktest::new(cfg)
        .unwrap()
        .run(&HistoricalBars::from_bars(bars), &CancelFlag::new())
        .unwrap();

    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].ticker, "AAA");
    assert_eq!(result.trades[0].note.as_deref(), Some(CLOSED_AT_END));
    assert_eq!(result.trades[0].exit_date, day(9));
}

#[test]
fn cancellation_discards_the_run() {
    let bars = HistoricalBars::from_bars(series("AAA", &rise_then_fall()));
    let cancel = CancelFlag::new();
    cancel.cancel();
    let out = PortfolioBacktest::new(config(&["AAA"], 20))
        .unwrap()
        .run(&bars, &cancel);
    assert_eq!(out, Err(CoreError::Cancelled));
}

#[test]
fn intraday_option_strategies_are_rejected() {
    let mut cfg = config(&["QQQ"], 5);
    cfg.strategy = "zero_dte_credit_spread".to_string();
    cfg.params.clear();
    assert!(matches!(
        PortfolioBacktest::new(cfg),
        Err(CoreError::Configuration(_))
    ));
}

#[test]
fn buy_and_hold_enters_on_the_first_bar() {
    let mut cfg = config(&["AAA"], 10);
    cfg.strategy = "buy_hold".to_string();
    cfg.params.clear();
    let result = PortfolioBacktest::new(cfg)
        .unwrap()
        .run(&HistoricalBars::from_bars(series("AAA", &(10..20).collect::<Vec<_>>())), &CancelFlag::new())
        .unwrap();
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].entry_date, day(0));
    assert_eq!(result.trades[0].note.as_deref(), Some(CLOSED_AT_END));
}

#[test]
fn curve_ends_at_final_equity_after_closing_leftovers() {
    let rising: Vec<i64> = (1..=10).collect();
    let result = PortfolioBacktest::new(config(&["AAA"], 10))
        .unwrap()
        .run(&HistoricalBars::from_bars(series("AAA", &rising)), &CancelFlag::new())
        .unwrap();

    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].note.as_deref(), Some(CLOSED_AT_END));
    assert_eq!(result.equity_curve.len(), 10);
    let last = result.equity_curve.last().unwrap();
    assert_eq!(last.date, day(9));
    assert_eq!(last.equity, result.metrics.final_equity);
    assert_eq!(result.metrics.final_equity, dec!(100000) + result.trades[0].pnl);
}
