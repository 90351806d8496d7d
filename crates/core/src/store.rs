//! In-memory [`Store`].

use std::collections::BTreeMap;

use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::account::AgentLedger;
use crate::agent::{Agent, StrategyBinding};
use crate::error::{CoreError, CoreResult};
use crate::events::{Decision, TradeRecord};
use crate::risk_state::RiskState;
use crate::run::RunRecord;
use crate::traits::Store;

/// Every persisted table. Serializable so file-backed stores can reuse it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreTables {
    pub agents: BTreeMap<String, Agent>,
    pub bindings: BTreeMap<String, StrategyBinding>,
    /// Keyed by `agent_id/date`.
    pub risk_states: BTreeMap<String, RiskState>,
    pub ledgers: BTreeMap<String, AgentLedger>,
    pub trades: Vec<TradeRecord>,
    pub decisions: Vec<Decision>,
    pub runs: Vec<RunRecord>,
}

fn risk_key(agent_id: &str, day: NaiveDate) -> String {
    format!("{agent_id}/{day}")
}

impl StoreTables {
    pub fn put_agent(&mut self, agent: &Agent) {
        self.agents.insert(agent.id.clone(), agent.clone());
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the binding's agent does not exist.
    pub fn put_binding(&mut self, binding: &StrategyBinding) -> CoreResult<()> {
        if !self.agents.contains_key(&binding.agent_id) {
            return Err(CoreError::not_found("agent", &binding.agent_id));
        }
        self.bindings.insert(binding.id.clone(), binding.clone());
        Ok(())
    }

    #[must_use]
    pub fn bindings_for(&self, agent_id: &str) -> Vec<StrategyBinding> {
        self.bindings
            .values()
            .filter(|b| b.agent_id == agent_id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn latest_risk_state(&self, agent_id: &str) -> Option<RiskState> {
        self.risk_states
            .values()
            .filter(|s| s.agent_id == agent_id)
            .max_by_key(|s| s.day)
            .cloned()
    }

    #[must_use]
    pub fn risk_state(&self, agent_id: &str, day: NaiveDate) -> Option<RiskState> {
        self.risk_states.get(&risk_key(agent_id, day)).cloned()
    }

    pub fn put_risk_state(&mut self, state: &RiskState) {
        self.risk_states
            .insert(risk_key(&state.agent_id, state.day), state.clone());
    }

    pub fn put_ledger(&mut self, ledger: &AgentLedger) {
        self.ledgers
            .insert(ledger.account.agent_id.clone(), ledger.clone());
    }

    pub fn record_execution(&mut self, trades: &[TradeRecord], ledger: &AgentLedger, state: &RiskState) {
        self.trades.extend_from_slice(trades);
        self.put_ledger(ledger);
        self.put_risk_state(state);
    }

    #[must_use]
    pub fn trades_for(&self, agent_id: &str) -> Vec<TradeRecord> {
        self.trades
            .iter()
            .filter(|t| t.agent_id == agent_id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn decisions_for(&self, agent_id: &str) -> Vec<Decision> {
        self.decisions
            .iter()
            .filter(|d| d.agent_id == agent_id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn run(&self, run_id: &str) -> Option<RunRecord> {
        self.runs.iter().find(|r| r.id == run_id).cloned()
    }

    /// # Errors
    ///
    /// Returns `Invariant` when overwriting a finished run.
    pub fn put_run(&mut self, run: &RunRecord) -> CoreResult<()> {
        match self.runs.iter_mut().find(|r| r.id == run.id) {
            Some(existing) if existing.status.is_terminal() => Err(CoreError::Invariant(format!(
                "run {} is terminal and cannot be rewritten",
                run.id
            ))),
            Some(existing) => {
                *existing = run.clone();
                Ok(())
            }
            None => {
                self.runs.push(run.clone());
                Ok(())
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<StoreTables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_tables(tables: StoreTables) -> Self {
        Self {
            tables: RwLock::new(tables),
        }
    }

    /// Copy of every table, for checkpoints and assertions.
    #[must_use]
    pub fn snapshot(&self) -> StoreTables {
        self.tables.read().clone()
    }
}

impl Store for MemoryStore {
    fn put_agent(&self, agent: &Agent) -> CoreResult<()> {
        self.tables.write().put_agent(agent);
        Ok(())
    }

    fn agent(&self, agent_id: &str) -> CoreResult<Option<Agent>> {
        Ok(self.tables.read().agents.get(agent_id).cloned())
    }

    fn agents(&self) -> CoreResult<Vec<Agent>> {
        Ok(self.tables.read().agents.values().cloned().collect())
    }

    fn put_binding(&self, binding: &StrategyBinding) -> CoreResult<()> {
        self.tables.write().put_binding(binding)
    }

    fn bindings(&self, agent_id: &str) -> CoreResult<Vec<StrategyBinding>> {
        Ok(self.tables.read().bindings_for(agent_id))
    }

    fn risk_state(&self, agent_id: &str, day: NaiveDate) -> CoreResult<Option<RiskState>> {
        Ok(self.tables.read().risk_state(agent_id, day))
    }

    fn latest_risk_state(&self, agent_id: &str) -> CoreResult<Option<RiskState>> {
        Ok(self.tables.read().latest_risk_state(agent_id))
    }

    fn put_risk_state(&self, state: &RiskState) -> CoreResult<()> {
        self.tables.write().put_risk_state(state);
        Ok(())
    }

    fn ledger(&self, agent_id: &str) -> CoreResult<Option<AgentLedger>> {
        Ok(self.tables.read().ledgers.get(agent_id).cloned())
    }

    fn put_ledger(&self, ledger: &AgentLedger) -> CoreResult<()> {
        self.tables.write().put_ledger(ledger);
        Ok(())
    }

    fn append_trade(&self, trade: &TradeRecord) -> CoreResult<()> {
        self.tables.write().trades.push(trade.clone());
        Ok(())
    }

    fn record_execution(
        &self,
        trades: &[TradeRecord],
        ledger: &AgentLedger,
        state: &RiskState,
    ) -> CoreResult<()> {
        self.tables.write().record_execution(trades, ledger, state);
        Ok(())
    }

    fn trades(&self, agent_id: &str) -> CoreResult<Vec<TradeRecord>> {
        Ok(self.tables.read().trades_for(agent_id))
    }

    fn append_decision(&self, decision: &Decision) -> CoreResult<()> {
        self.tables.write().decisions.push(decision.clone());
        Ok(())
    }

    fn decisions(&self, agent_id: &str) -> CoreResult<Vec<Decision>> {
        Ok(self.tables.read().decisions_for(agent_id))
    }

    fn put_run(&self, run: &RunRecord) -> CoreResult<()> {
        self.tables.write().put_run(run)
    }

    fn run(&self, run_id: &str) -> CoreResult<Option<RunRecord>> {
        Ok(self.tables.read().run(run_id))
    }

    fn runs(&self) -> CoreResult<Vec<RunRecord>> {
        Ok(self.tables.read().runs.clone())
    }
}
