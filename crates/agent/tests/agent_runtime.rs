use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use deltadesk_agent::{AgentRuntime, ReplayParams, TickMode, DISABLED};
use deltadesk_core::{
    Agent, AppConfig, Bar, CancelFlag, ChainSlice, CoreResult, DecisionValue, ExecutionMode,
    MarketClock, MemoryStore, OptionQuote, OptionRight, RiskProfile, RunStatus, Side,
    SnapshotProvider, StaticSnapshotProvider, Store, StrategyBinding, StrategyParams,
};
use deltadesk_execution::{BrokerOutcome, RejectReason};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 10).unwrap()
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn daily_bars(ticker: &str, close: Decimal) -> impl Iterator<Item = Bar> + '_ {
    (6..=10).map(move |d| Bar {
        ticker: ticker.to_string(),
        date: NaiveDate::from_ymd_opt(2025, 1, d).unwrap(),
        open: close,
        high: close,
        low: close,
        close,
        volume: dec!(1000000),
    })
}

fn provider() -> Arc<StaticSnapshotProvider> {
    let provider = StaticSnapshotProvider::new();
    provider.insert_bars(daily_bars("SPY", dec!(100)));
    provider.insert_bars(daily_bars("IWM", dec!(50)));
    Arc::new(provider)
}

fn buy_hold(mode: ExecutionMode) -> StrategyBinding {
    let mut params = StrategyParams::new();
    params.insert("ticker".to_string(), json!("SPY"));
    params.insert("quantity".to_string(), json!(10));
    StrategyBinding::new("bh", "alpha", "buy_hold", params, mode)
}

async fn runtime(trading_enabled: bool, mode: ExecutionMode) -> (AgentRuntime, Arc<MemoryStore>) {
    let mut config = AppConfig::default();
    config.broker.trading_enabled = trading_enabled;
    let store = Arc::new(MemoryStore::new());
    let runtime = AgentRuntime::new(config, store.clone(), provider()).unwrap();
    runtime
        .create_agent(Agent::new("alpha", "Alpha", RiskProfile::Balanced))
        .unwrap();
    runtime.put_strategy(buy_hold(mode)).await.unwrap();
    (runtime, store)
}

#[tokio::test]
async fn live_tick_fills_and_updates_counters() {
    let (runtime, store) = runtime(true, ExecutionMode::PaperLive).await;

    let outcomes = runtime
        .tick("alpha", day(), hm(10, 0), TickMode::Live)
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].decision.value, DecisionValue::Buy);
    assert_eq!(outcomes[0].execution.as_ref().unwrap().fills().len(), 1);

    let ledger = store.ledger("alpha").unwrap().unwrap();
    assert_eq!(ledger.positions.quantity("SPY"), dec!(10));
    assert_eq!(ledger.account.cash, dec!(98998.8));

    let state = store.risk_state("alpha", day()).unwrap().unwrap();
    assert_eq!(state.trades_today, 1);
    assert_eq!(state.notional_today, dec!(1000));
    assert_eq!(store.trades("alpha").unwrap().len(), 1);

    // Already holding, so buy-and-hold stays put.
    let outcomes = runtime
        .tick("alpha", day(), hm(10, 5), TickMode::Live)
        .await
        .unwrap();
    assert_eq!(outcomes[0].decision.value, DecisionValue::Skip);
    assert_eq!(outcomes[0].decision.reason, "HOLDING");
}

#[tokio::test]
async fn plan_only_tick_persists_nothing() {
    let (runtime, store) = runtime(true, ExecutionMode::PaperLive).await;

    let outcomes = runtime
        .tick("alpha", day(), hm(10, 0), TickMode::PlanOnly)
        .await
        .unwrap();
    assert_eq!(outcomes[0].decision.value, DecisionValue::Buy);
    assert!(outcomes[0].execution.is_none());
    assert!(store.decisions("alpha").unwrap().is_empty());
    assert!(store.ledger("alpha").unwrap().is_none());
    assert!(store.risk_state("alpha", day()).unwrap().is_none());
}

#[tokio::test]
async fn cutoff_forces_exit_and_closes_the_day() {
    let (runtime, store) = runtime(true, ExecutionMode::PaperLive).await;
    runtime
        .tick("alpha", day(), hm(10, 0), TickMode::Live)
        .await
        .unwrap();

    let outcomes = runtime
        .tick("alpha", day(), hm(15, 50), TickMode::Live)
        .await
        .unwrap();
    assert_eq!(outcomes[0].decision.value, DecisionValue::ForceExit);
    assert_eq!(outcomes[0].decision.reason, "FORCE_EXIT");

    let ledger = store.ledger("alpha").unwrap().unwrap();
    assert!(ledger.positions.quantity("SPY").is_zero());
    assert_eq!(ledger.account.cash, dec!(99997.6));

    let state = store.risk_state("alpha", day()).unwrap().unwrap();
    assert!(state.day_closed);
    assert_eq!(state.loss_today, dec!(1.4));

    // Later ticks are plain skips: nothing left to flatten, nothing sent.
    let outcomes = runtime
        .tick("alpha", day(), hm(15, 55), TickMode::Live)
        .await
        .unwrap();
    assert_eq!(outcomes[0].decision.value, DecisionValue::Skip);
    assert_eq!(outcomes[0].decision.reason, "FORCE_EXIT_ALREADY_TRIGGERED");
    assert!(outcomes[0].execution.is_none());
    assert_eq!(store.trades("alpha").unwrap().len(), 2);
}

#[tokio::test]
async fn disabled_binding_skips_without_evaluation() {
    let (runtime, store) = runtime(true, ExecutionMode::Disabled).await;

    let outcomes = runtime
        .tick("alpha", day(), hm(10, 0), TickMode::Live)
        .await
        .unwrap();
    assert_eq!(outcomes[0].decision.value, DecisionValue::Skip);
    assert_eq!(outcomes[0].decision.reason, DISABLED);
    assert_eq!(store.decisions("alpha").unwrap().len(), 1);
}

#[tokio::test]
async fn approved_mode_records_but_never_fills() {
    let (runtime, store) = runtime(true, ExecutionMode::Approved).await;

    let outcomes = runtime
        .tick("alpha", day(), hm(10, 0), TickMode::Live)
        .await
        .unwrap();
    assert_eq!(outcomes[0].decision.value, DecisionValue::Buy);
    assert!(outcomes[0].execution.is_none());
    assert!(store.ledger("alpha").unwrap().is_none());
    assert!(store.trades("alpha").unwrap().is_empty());
}

#[tokio::test]
async fn kill_switch_rejects_and_leaves_ledger_untouched() {
    let (runtime, store) = runtime(false, ExecutionMode::PaperLive).await;

    let outcomes = runtime
        .tick("alpha", day(), hm(10, 0), TickMode::Live)
        .await
        .unwrap();
    assert_eq!(
        outcomes[0].execution,
        Some(BrokerOutcome::Rejected(RejectReason::TradingDisabled))
    );
    assert!(store.ledger("alpha").unwrap().is_none());
    let state = store.risk_state("alpha", day()).unwrap().unwrap();
    assert_eq!(state.trades_today, 0);
}

#[tokio::test]
async fn resubmitted_order_fills_once() {
    let (runtime, store) = runtime(true, ExecutionMode::PaperLive).await;
    let now = runtime.clock().at(day(), hm(11, 0)).unwrap();

    let first = runtime
        .submit_order_at("alpha", "bh", "spy", Side::Buy, dec!(5), Some("ord-1"), now)
        .await
        .unwrap();
    assert_eq!(first.decision.value, DecisionValue::Buy);
    assert_eq!(first.execution.as_ref().unwrap().fills().len(), 1);

    let second = runtime
        .submit_order_at("alpha", "bh", "SPY", Side::Buy, dec!(5), Some("ord-1"), now)
        .await
        .unwrap();
    assert_eq!(
        second.execution,
        Some(BrokerOutcome::Rejected(RejectReason::DuplicateDecision))
    );

    let ledger = store.ledger("alpha").unwrap().unwrap();
    assert_eq!(ledger.positions.quantity("SPY"), dec!(5));
    let state = store.risk_state("alpha", day()).unwrap().unwrap();
    assert_eq!(state.trades_today, 1);
}

#[tokio::test]
async fn order_without_price_history_is_skipped() {
    let (runtime, _) = runtime(true, ExecutionMode::PaperLive).await;
    let now = runtime.clock().at(day(), hm(11, 0)).unwrap();

    let outcome = runtime
        .submit_order_at("alpha", "bh", "QQQ", Side::Buy, dec!(1), None, now)
        .await
        .unwrap();
    assert_eq!(outcome.decision.value, DecisionValue::Skip);
    assert_eq!(outcome.decision.reason, "DATA_UNAVAILABLE");
    assert!(outcome.execution.is_none());
}

#[tokio::test]
async fn replay_leaves_live_state_alone() {
    let (runtime, store) = runtime(true, ExecutionMode::PaperLive).await;
    runtime
        .tick("alpha", day(), hm(10, 0), TickMode::Live)
        .await
        .unwrap();
    let state_before = store.risk_state("alpha", day()).unwrap();
    let ledger_before = store.ledger("alpha").unwrap();
    let decisions_before = store.decisions("alpha").unwrap().len();

    let mut params = ReplayParams::new(day());
    params.interval_minutes = 30;
    let run = runtime
        .run_replay("alpha", params, &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Success);
    let entries = run.result.as_ref().unwrap()["entries"].as_array().unwrap().len();
    // 09:30 through 16:00 every 30 minutes.
    assert_eq!(entries, 14);

    assert_eq!(store.risk_state("alpha", day()).unwrap(), state_before);
    assert_eq!(store.ledger("alpha").unwrap(), ledger_before);
    assert_eq!(store.decisions("alpha").unwrap().len(), decisions_before);
    assert_eq!(store.run(&run.id).unwrap(), Some(run));
}

#[tokio::test]
async fn cancelled_replay_is_recorded_as_failed() {
    let (runtime, store) = runtime(true, ExecutionMode::PaperLive).await;
    let cancel = CancelFlag::new();
    cancel.cancel();

    let run = runtime
        .run_replay("alpha", ReplayParams::new(day()), &cancel)
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.reason.as_deref(), Some("CANCELLED"));
    assert!(run.result.is_none());
    assert_eq!(store.runs().unwrap().len(), 1);
}

#[tokio::test]
async fn replay_with_unknown_strategy_fails_before_recording() {
    let (runtime, store) = runtime(true, ExecutionMode::PaperLive).await;
    let mut params = ReplayParams::new(day());
    params.strategy_id = Some("nope".to_string());

    assert!(runtime
        .run_replay("alpha", params, &CancelFlag::new())
        .await
        .is_err());
    assert!(store.runs().unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_agent_is_rejected() {
    let (runtime, _) = runtime(true, ExecutionMode::PaperLive).await;
    assert!(runtime
        .create_agent(Agent::new("alpha", "Again", RiskProfile::Conservative))
        .is_err());
}

#[tokio::test]
async fn invalid_strategy_params_are_rejected() {
    let (runtime, store) = runtime(true, ExecutionMode::PaperLive).await;
    let mut params = StrategyParams::new();
    params.insert("fast".to_string(), json!(30));
    params.insert("slow".to_string(), json!(10));
    let binding =
        StrategyBinding::new("sma", "alpha", "sma_crossover", params, ExecutionMode::PaperLive);

    assert!(runtime.put_strategy(binding).await.is_err());
    assert_eq!(store.bindings("alpha").unwrap().len(), 1);
}

#[tokio::test]
async fn distinct_orders_in_the_same_second_both_fill() {
    let (runtime, store) = runtime(true, ExecutionMode::PaperLive).await;
    let now = runtime.clock().at(day(), hm(11, 0)).unwrap();

    let spy = runtime
        .submit_order_at("alpha", "bh", "SPY", Side::Buy, dec!(5), None, now)
        .await
        .unwrap();
    let iwm = runtime
        .submit_order_at(
            "alpha",
            "bh",
            "IWM",
            Side::Buy,
            dec!(5),
            None,
            now + Duration::milliseconds(500),
        )
        .await
        .unwrap();

    assert_ne!(spy.decision.id, iwm.decision.id);
    assert_eq!(spy.execution.as_ref().unwrap().fills().len(), 1);
    assert_eq!(iwm.execution.as_ref().unwrap().fills().len(), 1);

    let ledger = store.ledger("alpha").unwrap().unwrap();
    assert_eq!(ledger.positions.quantity("SPY"), dec!(5));
    assert_eq!(ledger.positions.quantity("IWM"), dec!(5));
    assert_eq!(store.trades("alpha").unwrap().len(), 2);
    assert_eq!(store.risk_state("alpha", day()).unwrap().unwrap().trades_today, 2);
}

#[tokio::test]
async fn new_session_forgets_yesterdays_fills() {
    let (runtime, store) = runtime(true, ExecutionMode::PaperLive).await;
    let monday = NaiveDate::from_ymd_opt(2025, 1, 13).unwrap();

    let friday = runtime
        .submit_order_at(
            "alpha",
            "bh",
            "SPY",
            Side::Buy,
            dec!(1),
            Some("fri"),
            runtime.clock().at(day(), hm(11, 0)).unwrap(),
        )
        .await
        .unwrap();
    let ledger = store.ledger("alpha").unwrap().unwrap();
    assert!(ledger.applied_decisions.contains(&friday.decision.id));

    let next = runtime
        .submit_order_at(
            "alpha",
            "bh",
            "SPY",
            Side::Buy,
            dec!(1),
            Some("mon"),
            runtime.clock().at(monday, hm(11, 0)).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(next.execution.as_ref().unwrap().fills().len(), 1);

    let ledger = store.ledger("alpha").unwrap().unwrap();
    assert_eq!(ledger.session_day, Some(monday));
    assert_eq!(
        ledger.applied_decisions.iter().collect::<Vec<_>>(),
        vec![&next.decision.id]
    );
    assert_eq!(ledger.positions.quantity("SPY"), dec!(2));
}

fn put(strike: Decimal, bid: Decimal, ask: Decimal, delta: Option<f64>) -> OptionQuote {
    OptionQuote {
        strike,
        right: OptionRight::Put,
        expiration: day(),
        bid,
        ask,
        last: None,
        volume: 500,
        delta,
    }
}

fn qqq_chain(time: NaiveTime, quotes: Vec<OptionQuote>) -> ChainSlice {
    ChainSlice {
        underlying: "QQQ".to_string(),
        as_of: MarketClock::new_york().at(day(), time).unwrap(),
        underlying_price: Some(dec!(405)),
        quotes,
    }
}

#[tokio::test]
async fn force_exit_reprices_spread_from_the_chain() {
    let provider = provider();
    provider.insert_chain(qqq_chain(
        hm(10, 0),
        vec![
            put(dec!(396), dec!(0.20), dec!(0.22), Some(-0.08)),
            put(dec!(398), dec!(0.58), dec!(0.62), Some(-0.14)),
            put(dec!(400), dec!(1.08), dec!(1.12), Some(-0.21)),
            put(dec!(402), dec!(1.70), dec!(1.80), Some(-0.33)),
        ],
    ));
    // The underlying sold off: the 400/398 spread now marks at 1.80.
    provider.insert_chain(qqq_chain(
        hm(15, 40),
        vec![
            put(dec!(398), dec!(0.55), dec!(0.65), None),
            put(dec!(400), dec!(2.30), dec!(2.50), None),
        ],
    ));

    let mut config = AppConfig::default();
    config.broker.trading_enabled = true;
    let store = Arc::new(MemoryStore::new());
    let runtime = AgentRuntime::new(config, store.clone(), provider).unwrap();
    runtime
        .create_agent(Agent::new("theta", "Theta", RiskProfile::Balanced))
        .unwrap();
    runtime
        .put_strategy(StrategyBinding::new(
            "qqq-put",
            "theta",
            "zero_dte_credit_spread",
            StrategyParams::new(),
            ExecutionMode::PaperLive,
        ))
        .await
        .unwrap();

    let open = runtime
        .tick("theta", day(), hm(10, 0), TickMode::Live)
        .await
        .unwrap();
    assert_eq!(open[0].decision.value, DecisionValue::Buy);
    let spread = open[0].decision.payload.as_ref().unwrap().spread.clone().unwrap();
    assert_eq!((spread.short_strike, spread.long_strike), (dec!(400), dec!(398)));
    assert_eq!(spread.credit, dec!(0.50));

    let close = runtime
        .tick("theta", day(), hm(15, 45), TickMode::Live)
        .await
        .unwrap();
    assert_eq!(close[0].decision.value, DecisionValue::ForceExit);
    let fills = close[0].execution.as_ref().unwrap().fills();
    assert_eq!(fills.len(), 1);
    // 1.80 plus 2 bps, not the 0.50 entry.
    assert_eq!(fills[0].price, dec!(1.80036));
    assert_eq!(fills[0].realized_pnl, Some(dec!(-131.046)));

    let ledger = store.ledger("theta").unwrap().unwrap();
    assert!(ledger.positions.open_positions().next().is_none());
    assert!(ledger.spreads.is_empty());
    assert_eq!(ledger.account.cash, dec!(99867.954));
    let state = store.risk_state("theta", day()).unwrap().unwrap();
    assert_eq!(state.loss_today, dec!(131.046));
}

/// Serves SPY's bars whenever IWM history is asked for.
struct MislabelledProvider(Arc<StaticSnapshotProvider>);

#[async_trait]
impl SnapshotProvider for MislabelledProvider {
    async fn bars(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> CoreResult<Vec<Bar>> {
        self.0.bars(ticker, start, end).await
    }

    async fn history(&self, ticker: &str, through: NaiveDate, limit: usize) -> CoreResult<Vec<Bar>> {
        let source = if ticker == "IWM" { "SPY" } else { ticker };
        self.0.history(source, through, limit).await
    }

    async fn chain(&self, underlying: &str, as_of: DateTime<Utc>) -> CoreResult<ChainSlice> {
        self.0.chain(underlying, as_of).await
    }
}

#[tokio::test]
async fn malformed_snapshot_is_an_error_decision_not_a_failure() {
    let mut config = AppConfig::default();
    config.broker.trading_enabled = true;
    let store = Arc::new(MemoryStore::new());
    let runtime =
        AgentRuntime::new(config, store.clone(), Arc::new(MislabelledProvider(provider()))).unwrap();
    runtime
        .create_agent(Agent::new("alpha", "Alpha", RiskProfile::Balanced))
        .unwrap();
    runtime.put_strategy(buy_hold(ExecutionMode::PaperLive)).await.unwrap();
    let mut params = StrategyParams::new();
    params.insert("ticker".to_string(), json!("IWM"));
    runtime
        .put_strategy(StrategyBinding::new(
            "iwm",
            "alpha",
            "buy_hold",
            params,
            ExecutionMode::PaperLive,
        ))
        .await
        .unwrap();

    // A replay runs through every tick despite the broken binding.
    let mut replay = ReplayParams::new(day());
    replay.interval_minutes = 60;
    let run = runtime
        .run_replay("alpha", replay, &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Success);
    let entries = run.result.as_ref().unwrap()["entries"].as_array().unwrap().clone();
    assert_eq!(entries.len(), 14);
    assert!(entries
        .iter()
        .filter(|e| e["strategy_id"] == "iwm")
        .all(|e| e["decision"] == "ERROR"));
    assert!(entries
        .iter()
        .any(|e| e["strategy_id"] == "bh" && e["decision"] == "BUY"));

    let outcomes = runtime
        .tick("alpha", day(), hm(10, 0), TickMode::Live)
        .await
        .unwrap();
    let (bh, iwm) = (&outcomes[0], &outcomes[1]);
    assert_eq!(bh.decision.value, DecisionValue::Buy);
    assert_eq!(iwm.decision.value, DecisionValue::Error);
    assert!(iwm.decision.reason.starts_with("malformed snapshot"));
    assert!(iwm.decision.reason.contains("IWM"));
    assert!(iwm.execution.is_none());

    // Only the SPY fill reached the counters.
    let state = store.risk_state("alpha", day()).unwrap().unwrap();
    assert_eq!(state.trades_today, 1);
    assert_eq!(state.notional_today, dec!(1000));
    assert_eq!(state.loss_today, Decimal::ZERO);
    assert_eq!(store.trades("alpha").unwrap().len(), 1);
    assert_eq!(store.decisions("alpha").unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_orders_and_ticks_respect_the_trade_limit() {
    let (runtime, store) = runtime(true, ExecutionMode::PaperLive).await;
    let runtime = Arc::new(runtime);
    let now = runtime.clock().at(day(), hm(11, 0)).unwrap();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let runtime = runtime.clone();
        tasks.push(tokio::spawn(async move {
            let id = format!("ord-{i}");
            let outcome = runtime
                .submit_order_at("alpha", "bh", "SPY", Side::Buy, dec!(1), Some(id.as_str()), now)
                .await
                .unwrap();
            outcome.execution.map_or(0, |e| e.fills().len())
        }));
    }
    for minute in [0, 5, 10, 15] {
        let runtime = runtime.clone();
        tasks.push(tokio::spawn(async move {
            runtime
                .tick("alpha", day(), hm(10, minute), TickMode::Live)
                .await
                .unwrap()
                .into_iter()
                .filter_map(|o| o.execution)
                .map(|e| e.fills().len())
                .sum::<usize>()
        }));
    }

    let mut fills = 0;
    for task in tasks {
        fills += task.await.unwrap();
    }

    // Balanced profile: five trades a day.
    assert_eq!(fills, 5);
    let state = store.risk_state("alpha", day()).unwrap().unwrap();
    assert_eq!(state.trades_today, 5);
    assert_eq!(store.trades("alpha").unwrap().len(), 5);
}
