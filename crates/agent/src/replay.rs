//! Plan-only replay of one agent's day at a fixed tick interval.

use chrono::{Duration, NaiveDate, NaiveTime};
use deltadesk_core::{
    AgentLedger, Agent, CancelFlag, CoreError, CoreResult, DecisionValue, RiskState, SignalValue,
    SnapshotProvider, StrategyBinding,
};
use deltadesk_strategy::StrategyVariant;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::decision::{DecisionEngine, TickContext};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayParams {
    pub date: NaiveDate,
    #[serde(default = "default_start")]
    pub start: NaiveTime,
    #[serde(default = "default_end")]
    pub end: NaiveTime,
    #[serde(default = "default_interval")]
    pub interval_minutes: u32,
    /// Replay a single binding instead of all of the agent's bindings.
    #[serde(default)]
    pub strategy_id: Option<String>,
}

fn default_start() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN)
}

fn default_end() -> NaiveTime {
    NaiveTime::from_hms_opt(16, 0, 0).unwrap_or(NaiveTime::MIN)
}

const fn default_interval() -> u32 {
    5
}

impl ReplayParams {
    #[must_use]
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            start: default_start(),
            end: default_end(),
            interval_minutes: default_interval(),
            strategy_id: None,
        }
    }

    /// Tick times from `start` every `interval_minutes`. `end` is included
    /// only when it falls exactly on a step.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` for a zero interval or `start > end`.
    pub fn tick_times(&self) -> CoreResult<Vec<NaiveTime>> {
        if self.interval_minutes == 0 {
            return Err(CoreError::config("replay interval must be at least one minute"));
        }
        if self.start > self.end {
            return Err(CoreError::config(format!(
                "replay start {} is after end {}",
                self.start, self.end
            )));
        }
        let step = Duration::minutes(i64::from(self.interval_minutes));
        let mut times = Vec::new();
        let mut t = self.start;
        while t <= self.end {
            times.push(t);
            let (next, wrapped) = t.overflowing_add_signed(step);
            if wrapped != 0 {
                break;
            }
            t = next;
        }
        Ok(times)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub time: NaiveTime,
    pub strategy_id: String,
    pub decision: DecisionValue,
    pub signal: Option<SignalValue>,
    pub short_strike: Option<Decimal>,
    pub long_strike: Option<Decimal>,
    pub credit: Option<Decimal>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub agent_id: String,
    pub date: NaiveDate,
    pub entries: Vec<TimelineEntry>,
}

pub struct ReplayRunner<'a> {
    engine: &'a DecisionEngine,
    provider: &'a dyn SnapshotProvider,
}

impl<'a> ReplayRunner<'a> {
    #[must_use]
    pub fn new(engine: &'a DecisionEngine, provider: &'a dyn SnapshotProvider) -> Self {
        Self { engine, provider }
    }

    /// Drives the engine over the day. `seed` is copied; neither it nor
    /// `ledger` is modified, and nothing reaches a broker.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` for bad parameters or an unknown
    /// `strategy_id`, and `CoreError::Cancelled` when `cancel` fires between
    /// ticks.
    pub async fn run(
        &self,
        agent: &Agent,
        bindings: &[StrategyBinding],
        seed: &RiskState,
        ledger: &AgentLedger,
        params: &ReplayParams,
        cancel: &CancelFlag,
    ) -> CoreResult<Timeline> {
        let times = params.tick_times()?;
        let selected: Vec<&StrategyBinding> = match &params.strategy_id {
            Some(id) => {
                let found: Vec<_> = bindings.iter().filter(|b| &b.id == id).collect();
                if found.is_empty() {
                    return Err(CoreError::not_found("strategy", id.clone()));
                }
                found
            }
            None => bindings.iter().collect(),
        };

        let clock = self.engine.clock();
        let mut state = seed.clone();
        let mut entries = Vec::with_capacity(times.len() * selected.len());
        info!(
            agent_id = %agent.id,
            date = %params.date,
            ticks = times.len(),
            strategies = selected.len(),
            "replay started"
        );

        for time in times {
            cancel.checkpoint()?;
            let now = clock.at(params.date, time)?;
            for binding in selected.iter().copied() {
                let holding = StrategyVariant::from_binding(binding)
                    .map(|v| !ledger.positions.quantity(v.symbol()).is_zero())
                    .unwrap_or(false);
                let ctx = TickContext {
                    agent,
                    binding,
                    now,
                    holding,
                };
                let decision = self.engine.tick(ctx, &mut state, self.provider).await;
                let spread = decision.payload.as_ref().and_then(|p| p.spread.as_ref());
                entries.push(TimelineEntry {
                    time,
                    strategy_id: binding.id.clone(),
                    decision: decision.value,
                    signal: decision.signal,
                    short_strike: spread.map(|s| s.short_strike),
                    long_strike: spread.map(|s| s.long_strike),
                    credit: spread.map(|s| s.credit),
                    reason: decision.reason,
                });
            }
        }

        info!(agent_id = %agent.id, date = %params.date, entries = entries.len(), "replay finished");
        Ok(Timeline {
            agent_id: agent.id.clone(),
            date: params.date,
            entries,
        })
    }
}
