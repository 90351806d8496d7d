use std::fs;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime};
use deltadesk_core::{
    Agent, AgentLedger, ChainSlice, CoreError, MarketClock, RiskProfile, RiskState, RunRecord,
    RunType, Side, SnapshotProvider, Store, TradeRecord,
};
use deltadesk_data::{FileSnapshotProvider, JsonFileStore};
use rust_decimal_macros::dec;
use serde_json::json;

fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("deltadesk-data-{}", uuid::Uuid::new_v4().simple()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 10).unwrap()
}

fn write_chain(root: &PathBuf, clock: &MarketClock, hhmm: &str, h: u32, m: u32) {
    let dir = root.join("chains").join("QQQ").join("2025-01-10");
    fs::create_dir_all(&dir).unwrap();
    let chain = ChainSlice {
        underlying: "QQQ".to_string(),
        as_of: clock.at(day(), NaiveTime::from_hms_opt(h, m, 0).unwrap()).unwrap(),
        underlying_price: Some(dec!(410)),
        quotes: Vec::new(),
    };
    fs::write(dir.join(format!("{hhmm}.json")), serde_json::to_vec(&chain).unwrap()).unwrap();
}

#[tokio::test]
async fn bars_and_history_come_from_csv() {
    let root = scratch_dir();
    fs::create_dir_all(root.join("bars")).unwrap();
    fs::write(
        root.join("bars").join("SPY.csv"),
        "date,open,high,low,close,volume\n\
         2025-01-08,100,101,99,100,1000\n\
         2025-01-09,101,102,100,101,1000\n\
         2025-01-10,102,103,101,102,1000\n",
    )
    .unwrap();
    let provider = FileSnapshotProvider::new(&root, MarketClock::new_york());

    let bars = provider
        .bars("spy", NaiveDate::from_ymd_opt(2025, 1, 9).unwrap(), day())
        .await
        .unwrap();
    assert_eq!(bars.len(), 2);
    assert_eq!(bars[0].ticker, "SPY");

    let history = provider
        .history("SPY", NaiveDate::from_ymd_opt(2025, 1, 9).unwrap(), 5)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].close, dec!(101));

    assert!(matches!(
        provider.history("QQQ", day(), 5).await,
        Err(CoreError::DataUnavailable { .. })
    ));
    fs::remove_dir_all(root).ok();
}

#[tokio::test]
async fn chain_is_latest_capture_at_or_before_tick() {
    let root = scratch_dir();
    let clock = MarketClock::new_york();
    write_chain(&root, &clock, "1000", 10, 0);
    write_chain(&root, &clock, "1030", 10, 30);
    let provider = FileSnapshotProvider::new(&root, clock);

    let at = |h, m| clock.at(day(), NaiveTime::from_hms_opt(h, m, 0).unwrap()).unwrap();

    let chain = provider.chain("QQQ", at(10, 29)).await.unwrap();
    assert_eq!(chain.as_of, at(10, 0));
    let chain = provider.chain("QQQ", at(10, 30)).await.unwrap();
    assert_eq!(chain.as_of, at(10, 30));
    assert!(matches!(
        provider.chain("QQQ", at(9, 45)).await,
        Err(CoreError::DataUnavailable { .. })
    ));
    fs::remove_dir_all(root).ok();
}

#[test]
fn json_store_survives_reopen() {
    let root = scratch_dir();
    let path = root.join("state").join("state.json");

    let store = JsonFileStore::open(&path).unwrap();
    store
        .put_agent(&Agent::new("alpha", "Alpha", RiskProfile::Conservative))
        .unwrap();
    let mut state = RiskState::new("alpha", day());
    state.trades_today = 2;
    store.put_risk_state(&state).unwrap();
    let mut run = RunRecord::start(RunType::Backtest, None, json!({}));
    store.put_run(&run).unwrap();
    run.fail("CANCELLED").unwrap();
    store.put_run(&run).unwrap();
    drop(store);

    let reopened = JsonFileStore::open(&path).unwrap();
    assert!(reopened.agent("alpha").unwrap().is_some());
    assert_eq!(reopened.risk_state("alpha", day()).unwrap(), Some(state));
    assert_eq!(reopened.run(&run.id).unwrap(), Some(run.clone()));
    // Finished runs stay finished across restarts too.
    assert!(reopened.put_run(&run).is_err());
    fs::remove_dir_all(root).ok();
}

#[test]
fn failed_write_leaves_store_unchanged() {
    let root = scratch_dir();
    let store = JsonFileStore::open(root.join("state.json")).unwrap();
    let binding = deltadesk_core::StrategyBinding::new(
        "s1",
        "ghost",
        "buy_hold",
        Default::default(),
        deltadesk_core::ExecutionMode::PaperLive,
    );
    assert!(store.put_binding(&binding).is_err());
    assert!(store.bindings("ghost").unwrap().is_empty());
    assert!(!root.join("state.json").exists());
    fs::remove_dir_all(root).ok();
}

fn trade(decision_id: &str) -> TradeRecord {
    TradeRecord {
        id: uuid::Uuid::new_v4().to_string(),
        agent_id: "alpha".to_string(),
        ticker: "SPY".to_string(),
        side: Side::Buy,
        quantity: dec!(10),
        fill_price: dec!(100.02),
        commission: dec!(1),
        slippage: dec!(0.02),
        timestamp: chrono::Utc::now(),
        decision_id: decision_id.to_string(),
    }
}

#[test]
fn execution_is_written_whole_or_not_at_all() {
    let root = scratch_dir();
    let path = root.join("state.json");
    let store = JsonFileStore::open(&path).unwrap();
    store
        .put_agent(&Agent::new("alpha", "Alpha", RiskProfile::Balanced))
        .unwrap();

    let mut ledger = AgentLedger::new("alpha", dec!(100000));
    ledger.account.cash = dec!(98998.8);
    let mut state = RiskState::new("alpha", day());
    state.trades_today = 1;
    state.notional_today = dec!(1000);

    // The temp file the store writes through is blocked, so the write fails.
    fs::create_dir_all(root.join("state.json.tmp")).unwrap();
    assert!(store.record_execution(&[trade("d1")], &ledger, &state).is_err());
    assert!(store.trades("alpha").unwrap().is_empty());
    assert!(store.ledger("alpha").unwrap().is_none());
    assert!(store.risk_state("alpha", day()).unwrap().is_none());

    fs::remove_dir_all(root.join("state.json.tmp")).unwrap();
    store.record_execution(&[trade("d1")], &ledger, &state).unwrap();
    drop(store);

    let reopened = JsonFileStore::open(&path).unwrap();
    assert_eq!(reopened.trades("alpha").unwrap().len(), 1);
    assert_eq!(reopened.ledger("alpha").unwrap(), Some(ledger));
    assert_eq!(reopened.risk_state("alpha", day()).unwrap(), Some(state));
    fs::remove_dir_all(root).ok();
}
