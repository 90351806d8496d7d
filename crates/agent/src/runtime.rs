//! Per-agent execution context: serialized ticks and orders, plus backtest
//! and replay runs recorded in the store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use deltadesk_backtest::{
    HistoricalBars, IntradayChains, PortfolioBacktest, PortfolioConfig, SpreadBacktest,
    SpreadBacktestConfig, WalkForward, WalkForwardConfig,
};
use deltadesk_core::{
    Agent, AgentLedger, AppConfig, CancelFlag, CoreError, CoreResult, Decision, DecisionValue,
    ExecutionMode, MarketClock, OrderIntent, RiskState, RunRecord, RunType, Side,
    SnapshotProvider, Store, StrategyBinding, TradeRecord,
};
use deltadesk_execution::{BrokerOutcome, FillModel, KillSwitch, PaperBroker};
use deltadesk_strategy::StrategyVariant;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::decision::{DecisionEngine, TickContext};
use crate::replay::{ReplayParams, ReplayRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickMode {
    /// Decide only: nothing is persisted and nothing reaches the broker.
    PlanOnly,
    Live,
}

impl std::str::FromStr for TickMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "plan_only" | "plan" => Ok(Self::PlanOnly),
            "live" => Ok(Self::Live),
            other => Err(format!("unknown tick mode '{other}' (plan_only | live)")),
        }
    }
}

/// A decision and, when it was sent to the broker, what the broker did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<BrokerOutcome>,
}

pub struct AgentRuntime {
    config: AppConfig,
    clock: MarketClock,
    engine: DecisionEngine,
    broker: PaperBroker,
    store: Arc<dyn Store>,
    provider: Arc<dyn SnapshotProvider>,
    sessions: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AgentRuntime {
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` when the configuration is invalid.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn Store>,
        provider: Arc<dyn SnapshotProvider>,
    ) -> CoreResult<Self> {
        config.validate()?;
        let clock = config.market.clock()?;
        let broker = PaperBroker::new(
            FillModel::from_config(&config.broker),
            KillSwitch::new(config.broker.trading_enabled),
        );
        Ok(Self {
            engine: DecisionEngine::new(clock, config.broker.contract_multiplier),
            clock,
            broker,
            config,
            store,
            provider,
            sessions: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub const fn clock(&self) -> &MarketClock {
        &self.clock
    }

    #[must_use]
    pub const fn kill_switch(&self) -> &KillSwitch {
        self.broker.kill_switch()
    }

    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Critical section serializing everything that touches one agent's
    /// risk state and ledger.
    fn session(&self, agent_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.sessions
            .lock()
            .entry(agent_id.to_string())
            .or_default()
            .clone()
    }

    fn load_agent(&self, agent_id: &str) -> CoreResult<Agent> {
        self.store
            .agent(agent_id)?
            .ok_or_else(|| CoreError::not_found("agent", agent_id))
    }

    fn load_ledger(&self, agent_id: &str) -> CoreResult<AgentLedger> {
        Ok(self
            .store
            .ledger(agent_id)?
            .unwrap_or_else(|| AgentLedger::new(agent_id, self.config.broker.initial_cash)))
    }

    fn load_risk_state(&self, agent_id: &str, day: NaiveDate) -> CoreResult<RiskState> {
        Ok(self
            .store
            .risk_state(agent_id, day)?
            .unwrap_or_else(|| RiskState::new(agent_id, day)))
    }

    fn sorted_bindings(&self, agent_id: &str) -> CoreResult<Vec<StrategyBinding>> {
        let mut bindings = self.store.bindings(agent_id)?;
        bindings.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(bindings)
    }

    /// # Errors
    ///
    /// Returns `CoreError::Invariant` if an agent with the same id exists.
    pub fn create_agent(&self, agent: Agent) -> CoreResult<Agent> {
        if self.store.agent(&agent.id)?.is_some() {
            return Err(CoreError::Invariant(format!("agent {} already exists", agent.id)));
        }
        self.store.put_agent(&agent)?;
        info!(agent_id = %agent.id, profile = ?agent.risk_profile, "agent created");
        Ok(agent)
    }

    /// Agents are never deleted, only disabled.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` for an unknown agent.
    pub async fn set_agent_enabled(&self, agent_id: &str, enabled: bool) -> CoreResult<Agent> {
        let session = self.session(agent_id);
        let _guard = session.lock().await;
        let mut agent = self.load_agent(agent_id)?;
        agent.enabled = enabled;
        self.store.put_agent(&agent)?;
        info!(agent_id, enabled, "agent updated");
        Ok(agent)
    }

    /// Adds or replaces a strategy binding after validating its parameters.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` for invalid parameters and
    /// `CoreError::NotFound` for an unknown agent.
    pub async fn put_strategy(&self, binding: StrategyBinding) -> CoreResult<StrategyBinding> {
        StrategyVariant::from_binding(&binding)?;
        let session = self.session(&binding.agent_id);
        let _guard = session.lock().await;
        self.load_agent(&binding.agent_id)?;
        self.store.put_binding(&binding)?;
        info!(
            agent_id = %binding.agent_id,
            strategy_id = %binding.id,
            strategy = %binding.strategy_name,
            mode = ?binding.execution_mode,
            "strategy bound"
        );
        Ok(binding)
    }

    /// Evaluates every binding of the agent at an exchange-local date/time.
    ///
    /// # Errors
    ///
    /// Fails for an unknown agent, a non-existent local time, or storage errors.
    pub async fn tick(
        &self,
        agent_id: &str,
        date: NaiveDate,
        time: NaiveTime,
        mode: TickMode,
    ) -> CoreResult<Vec<DecisionOutcome>> {
        let now = self.clock.at(date, time)?;
        self.tick_at(agent_id, now, mode).await
    }

    /// # Errors
    ///
    /// See [`AgentRuntime::tick`].
    pub async fn tick_at(
        &self,
        agent_id: &str,
        now: DateTime<Utc>,
        mode: TickMode,
    ) -> CoreResult<Vec<DecisionOutcome>> {
        let session = self.session(agent_id);
        let _guard = session.lock().await;

        let agent = self.load_agent(agent_id)?;
        let day = self.clock.trading_day(now);
        let mut state = self.load_risk_state(agent_id, day)?;
        let mut ledger = self.load_ledger(agent_id)?;
        let bindings = self.sorted_bindings(agent_id)?;

        let mut outcomes = Vec::with_capacity(bindings.len());
        for binding in &bindings {
            let ctx = TickContext {
                agent: &agent,
                binding,
                now,
                holding: holds_symbol(&ledger, binding),
            };
            let decision = self.engine.tick(ctx, &mut state, self.provider.as_ref()).await;

            let execution = match mode {
                TickMode::PlanOnly => None,
                TickMode::Live => {
                    self.store.append_decision(&decision)?;
                    if decision.is_executable() && binding.execution_mode == ExecutionMode::PaperLive {
                        Some(self.execute(&agent, binding, &decision, &mut state, &mut ledger).await?)
                    } else {
                        None
                    }
                }
            };
            outcomes.push(DecisionOutcome {
                decision,
                execution,
            });
        }

        if mode == TickMode::Live {
            self.store.put_risk_state(&state)?;
        }
        Ok(outcomes)
    }

    /// Operator order through the same risk checks and broker as ticks.
    ///
    /// `order_id` identifies the order for duplicate detection: resubmitting
    /// with the same id fills at most once. Without one, a fresh id is drawn.
    ///
    /// # Errors
    ///
    /// Fails for unknown agent/strategy, a non-positive quantity, or storage
    /// errors. Risk denials and broker rejections are outcomes, not errors.
    pub async fn submit_order(
        &self,
        agent_id: &str,
        strategy_id: &str,
        ticker: &str,
        side: Side,
        quantity: Decimal,
        order_id: Option<&str>,
    ) -> CoreResult<DecisionOutcome> {
        self.submit_order_at(agent_id, strategy_id, ticker, side, quantity, order_id, Utc::now())
            .await
    }

    /// # Errors
    ///
    /// See [`AgentRuntime::submit_order`].
    #[allow(clippy::too_many_arguments)]
    pub async fn submit_order_at(
        &self,
        agent_id: &str,
        strategy_id: &str,
        ticker: &str,
        side: Side,
        quantity: Decimal,
        order_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> CoreResult<DecisionOutcome> {
        if quantity <= Decimal::ZERO {
            return Err(CoreError::config("order quantity must be positive"));
        }
        let ticker = ticker.trim().to_uppercase();
        let order_id = match order_id.map(str::trim) {
            Some("") => return Err(CoreError::config("order id cannot be empty")),
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().simple().to_string(),
        };

        let session = self.session(agent_id);
        let _guard = session.lock().await;

        let agent = self.load_agent(agent_id)?;
        let binding = self
            .store
            .bindings(agent_id)?
            .into_iter()
            .find(|b| b.id == strategy_id)
            .ok_or_else(|| CoreError::not_found("strategy", strategy_id))?;
        let day = self.clock.trading_day(now);
        let mut state = self.load_risk_state(agent_id, day)?;
        let mut ledger = self.load_ledger(agent_id)?;

        let order = self
            .provider
            .history(&ticker, day, 1)
            .await
            .and_then(|bars| {
                bars.last()
                    .map(|b| b.close)
                    .ok_or_else(|| CoreError::unavailable(&ticker, "no bars"))
            })
            .map(|price| OrderIntent {
                ticker: ticker.clone(),
                side,
                quantity,
                reference_price: price,
            });

        let ctx = TickContext {
            agent: &agent,
            binding: &binding,
            now,
            holding: !ledger.positions.quantity(&ticker).is_zero(),
        };
        let decision = self.engine.decide_order(&ctx, &mut state, &order_id, order);
        self.store.append_decision(&decision)?;

        let execution = if decision.is_executable() {
            Some(self.execute(&agent, &binding, &decision, &mut state, &mut ledger).await?)
        } else {
            None
        };
        self.store.put_risk_state(&state)?;
        Ok(DecisionOutcome {
            decision,
            execution,
        })
    }

    /// Sends a decision to the broker and checkpoints the result.
    async fn execute(
        &self,
        agent: &Agent,
        binding: &StrategyBinding,
        decision: &Decision,
        state: &mut RiskState,
        ledger: &mut AgentLedger,
    ) -> CoreResult<BrokerOutcome> {
        let marks = if decision.value == DecisionValue::ForceExit {
            self.marks(ledger, decision.tick).await
        } else {
            BTreeMap::new()
        };
        ledger.begin_session(self.clock.trading_day(decision.tick));
        let outcome = self
            .broker
            .submit(ledger, binding.execution_mode, decision, &marks);

        if let BrokerOutcome::Filled(fills) = &outcome {
            let governor = self.engine.governor(agent);
            let mut trades = Vec::with_capacity(fills.len());
            for fill in fills {
                let notional = decision
                    .payload
                    .as_ref()
                    .map_or_else(|| fill.notional(), |p| p.notional);
                governor.record_fill(state, notional, fill.realized_pnl, decision.tick);
                trades.push(TradeRecord::from_fill(&agent.id, fill));
            }
            self.store.record_execution(&trades, ledger, state)?;
        }
        Ok(outcome)
    }

    /// Current marks for the agent's open positions: spreads from the latest
    /// chain capture of their underlying, everything else from its latest
    /// close. Instruments that cannot be priced are left out and fall back to
    /// their last fill.
    async fn marks(&self, ledger: &AgentLedger, now: DateTime<Utc>) -> BTreeMap<String, Decimal> {
        let day = self.clock.trading_day(now);
        let mut marks = BTreeMap::new();
        let tickers: Vec<String> = ledger
            .positions
            .open_positions()
            .map(|p| p.ticker.clone())
            .collect();
        for ticker in tickers {
            let mark = match ledger.spreads.get(&ticker) {
                Some(spread) => self.provider.chain(&spread.underlying, now).await.and_then(|chain| {
                    chain
                        .spread_mark(spread)
                        .ok_or_else(|| CoreError::unavailable(&ticker, "spread legs not quoted"))
                }),
                None => self.provider.history(&ticker, day, 1).await.and_then(|bars| {
                    bars.last()
                        .map(|b| b.close)
                        .ok_or_else(|| CoreError::unavailable(&ticker, "no bars"))
                }),
            };
            match mark {
                Ok(price) => {
                    marks.insert(ticker, price);
                }
                Err(e) => warn!(ticker = %ticker, error = %e, "no mark, using last fill price"),
            }
        }
        marks
    }

    /// Runs a portfolio backtest and records it as a run.
    ///
    /// # Errors
    ///
    /// Invalid settings fail before any run is recorded. Failures during the
    /// run are recorded as a FAILED run, not returned.
    pub async fn run_backtest(
        &self,
        config: PortfolioConfig,
        cancel: &CancelFlag,
    ) -> CoreResult<RunRecord> {
        let backtest = PortfolioBacktest::new(config.clone())?.with_clock(self.clock);
        let mut run = RunRecord::start(RunType::Backtest, None, to_json(&config)?);
        self.store.put_run(&run)?;
        info!(run_id = %run.id, tickers = ?config.tickers, "backtest run started");

        let result = match HistoricalBars::load(
            self.provider.as_ref(),
            &config.tickers,
            config.start,
            config.end,
        )
        .await
        {
            Ok(bars) => {
                let cancel = cancel.clone();
                tokio::task::spawn_blocking(move || backtest.run(&bars, &cancel))
                    .await
                    .map_err(|e| CoreError::Invariant(format!("backtest task failed: {e}")))
                    .and_then(|r| r)
                    .and_then(|r| to_json(&r))
            }
            Err(e) => Err(e),
        };

        self.finish(&mut run, result)?;
        Ok(run)
    }

    /// Runs the intraday credit-spread backtest over captured chains and
    /// records it as a run.
    ///
    /// # Errors
    ///
    /// Invalid settings fail before any run is recorded.
    pub async fn run_spread_backtest(
        &self,
        config: SpreadBacktestConfig,
        cancel: &CancelFlag,
    ) -> CoreResult<RunRecord> {
        let backtest = SpreadBacktest::new(config.clone())?.with_clock(self.clock);
        let mut run = RunRecord::start(RunType::SpreadBacktest, None, to_json(&config)?);
        self.store.put_run(&run)?;
        info!(
            run_id = %run.id,
            underlying = %backtest.variant().symbol(),
            "spread backtest run started"
        );

        let chains = IntradayChains::load(
            self.provider.as_ref(),
            backtest.variant(),
            &self.clock,
            config.start,
            config.end,
            config.interval_minutes,
        )
        .await;
        let result = match chains {
            Ok(chains) => {
                let cancel = cancel.clone();
                tokio::task::spawn_blocking(move || backtest.run(&chains, &cancel))
                    .await
                    .map_err(|e| CoreError::Invariant(format!("backtest task failed: {e}")))
                    .and_then(|r| r)
                    .and_then(|r| to_json(&r))
            }
            Err(e) => Err(e),
        };

        self.finish(&mut run, result)?;
        Ok(run)
    }

    /// Runs walk-forward validation of the crossover grid and records it as
    /// a run.
    ///
    /// # Errors
    ///
    /// Invalid settings fail before any run is recorded.
    pub async fn run_walk_forward(
        &self,
        config: WalkForwardConfig,
        cancel: &CancelFlag,
    ) -> CoreResult<RunRecord> {
        let validation = WalkForward::new(config.clone())?.with_clock(self.clock);
        let mut run = RunRecord::start(RunType::WalkForward, None, to_json(&config)?);
        self.store.put_run(&run)?;
        info!(run_id = %run.id, tickers = ?config.tickers, "walk-forward run started");

        let result = match HistoricalBars::load(
            self.provider.as_ref(),
            &config.tickers,
            config.start,
            config.end,
        )
        .await
        {
            Ok(bars) => {
                let cancel = cancel.clone();
                tokio::task::spawn_blocking(move || validation.run(&bars, &cancel))
                    .await
                    .map_err(|e| CoreError::Invariant(format!("walk-forward task failed: {e}")))
                    .and_then(|r| r)
                    .and_then(|r| to_json(&r))
            }
            Err(e) => Err(e),
        };

        self.finish(&mut run, result)?;
        Ok(run)
    }

    /// Replays an agent's day in plan-only mode and records it as a run.
    ///
    /// # Errors
    ///
    /// Invalid parameters and unknown agents/strategies fail before any run
    /// is recorded.
    pub async fn run_replay(
        &self,
        agent_id: &str,
        params: ReplayParams,
        cancel: &CancelFlag,
    ) -> CoreResult<RunRecord> {
        params.tick_times()?;

        // Seed copies are taken under the agent's lock; the replay itself
        // works on them only.
        let (agent, bindings, seed, ledger) = {
            let session = self.session(agent_id);
            let _guard = session.lock().await;
            (
                self.load_agent(agent_id)?,
                self.sorted_bindings(agent_id)?,
                self.load_risk_state(agent_id, params.date)?,
                self.load_ledger(agent_id)?,
            )
        };
        if let Some(id) = &params.strategy_id {
            if !bindings.iter().any(|b| &b.id == id) {
                return Err(CoreError::not_found("strategy", id.clone()));
            }
        }

        let mut run = RunRecord::start(RunType::Replay, Some(agent.id.clone()), to_json(&params)?);
        self.store.put_run(&run)?;
        info!(run_id = %run.id, agent_id, date = %params.date, "replay run started");

        let result = ReplayRunner::new(&self.engine, self.provider.as_ref())
            .run(&agent, &bindings, &seed, &ledger, &params, cancel)
            .await
            .and_then(|timeline| to_json(&timeline));

        self.finish(&mut run, result)?;
        Ok(run)
    }

    fn finish(&self, run: &mut RunRecord, result: CoreResult<Value>) -> CoreResult<()> {
        match result {
            Ok(value) => {
                run.succeed(value)?;
                info!(run_id = %run.id, run_type = ?run.run_type, "run succeeded");
            }
            Err(e) => {
                run.fail(e.to_string())?;
                warn!(run_id = %run.id, run_type = ?run.run_type, reason = %e, "run failed");
            }
        }
        self.store.put_run(run)
    }
}

fn holds_symbol(ledger: &AgentLedger, binding: &StrategyBinding) -> bool {
    StrategyVariant::from_binding(binding)
        .map(|v| !ledger.positions.quantity(v.symbol()).is_zero())
        .unwrap_or(false)
}

fn to_json<T: Serialize>(value: &T) -> CoreResult<Value> {
    serde_json::to_value(value).map_err(|e| CoreError::Invariant(format!("serialization failed: {e}")))
}
