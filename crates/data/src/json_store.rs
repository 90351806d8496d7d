//! [`Store`] persisted as one JSON document, rewritten after every change.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use deltadesk_core::{
    Agent, AgentLedger, CoreResult, Decision, RiskState, RunRecord, Store, StoreTables,
    StrategyBinding, TradeRecord,
};
use parking_lot::RwLock;
use tracing::info;

use crate::error::DataError;

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    tables: RwLock<StoreTables>,
}

impl JsonFileStore {
    /// Opens the state file, starting empty if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DataError> {
        let path = path.into();
        let tables = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| DataError::json(&path, e))?,
            Err(e) if e.kind() == ErrorKind::NotFound => StoreTables::default(),
            Err(e) => return Err(DataError::io(&path, e)),
        };
        info!(path = %path.display(), "state store opened");
        Ok(Self {
            path,
            tables: RwLock::new(tables),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `change` to a copy of the tables and swaps it in only once the
    /// copy is on disk, so a failed write leaves both unchanged.
    fn write<T>(&self, change: impl FnOnce(&mut StoreTables) -> CoreResult<T>) -> CoreResult<T> {
        let mut tables = self.tables.write();
        let mut next = tables.clone();
        let out = change(&mut next)?;
        self.persist(&next)?;
        *tables = next;
        Ok(out)
    }

    fn persist(&self, tables: &StoreTables) -> Result<(), DataError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DataError::io(parent, e))?;
        }
        let bytes = serde_json::to_vec_pretty(tables).map_err(|e| DataError::json(&self.path, e))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes).map_err(|e| DataError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| DataError::io(&self.path, e))
    }
}

impl Store for JsonFileStore {
    fn put_agent(&self, agent: &Agent) -> CoreResult<()> {
        self.write(|t| {
            t.put_agent(agent);
            Ok(())
        })
    }

    fn agent(&self, agent_id: &str) -> CoreResult<Option<Agent>> {
        Ok(self.tables.read().agents.get(agent_id).cloned())
    }

    fn agents(&self) -> CoreResult<Vec<Agent>> {
        Ok(self.tables.read().agents.values().cloned().collect())
    }

    fn put_binding(&self, binding: &StrategyBinding) -> CoreResult<()> {
        self.write(|t| t.put_binding(binding))
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
        self.write(|t| {
            t.put_risk_state(state);
            Ok(())
        })
    }

    fn ledger(&self, agent_id: &str) -> CoreResult<Option<AgentLedger>> {
        Ok(self.tables.read().ledgers.get(agent_id).cloned())
    }

    fn put_ledger(&self, ledger: &AgentLedger) -> CoreResult<()> {
        self.write(|t| {
            t.put_ledger(ledger);
            Ok(())
        })
    }

    fn append_trade(&self, trade: &TradeRecord) -> CoreResult<()> {
        self.write(|t| {
            t.trades.push(trade.clone());
            Ok(())
        })
    }

    fn record_execution(
        &self,
        trades: &[TradeRecord],
        ledger: &AgentLedger,
        state: &RiskState,
    ) -> CoreResult<()> {
        self.write(|t| {
            t.record_execution(trades, ledger, state);
            Ok(())
        })
    }

    fn trades(&self, agent_id: &str) -> CoreResult<Vec<TradeRecord>> {
        Ok(self.tables.read().trades_for(agent_id))
    }

    fn append_decision(&self, decision: &Decision) -> CoreResult<()> {
        self.write(|t| {
            t.decisions.push(decision.clone());
            Ok(())
        })
    }

    fn decisions(&self, agent_id: &str) -> CoreResult<Vec<Decision>> {
        Ok(self.tables.read().decisions_for(agent_id))
    }

    fn put_run(&self, run: &RunRecord) -> CoreResult<()> {
        self.write(|t| t.put_run(run))
    }

    fn run(&self, run_id: &str) -> CoreResult<Option<RunRecord>> {
        Ok(self.tables.read().run(run_id))
    }

    fn runs(&self) -> CoreResult<Vec<RunRecord>> {
        Ok(self.tables.read().runs.clone())
    }
}
