use crate::account::AgentLedger;
use crate::agent::{Agent, StrategyBinding};
use crate::error::CoreResult;
use crate::events::{Decision, TradeRecord};
use crate::market::{Bar, ChainSlice};
use crate::risk_state::RiskState;
use crate::run::RunRecord;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// Read-only market data supplier. Timeouts and retries belong to the
/// implementation; callers see a snapshot or `DataUnavailable`.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Bars dated within `[start, end]`, oldest first.
    async fn bars(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> CoreResult<Vec<Bar>>;

    /// The last `limit` bars dated on or before `through`, oldest first.
    async fn history(&self, ticker: &str, through: NaiveDate, limit: usize) -> CoreResult<Vec<Bar>>;

    /// Latest chain snapshot taken at or before `as_of`.
    async fn chain(&self, underlying: &str, as_of: DateTime<Utc>) -> CoreResult<ChainSlice>;
}

/// Key-value persistence contract. Trades, decisions and finished runs are
/// append-only.
pub trait Store: Send + Sync {
    fn put_agent(&self, agent: &Agent) -> CoreResult<()>;
    fn agent(&self, agent_id: &str) -> CoreResult<Option<Agent>>;
    fn agents(&self) -> CoreResult<Vec<Agent>>;

    fn put_binding(&self, binding: &StrategyBinding) -> CoreResult<()>;
    fn bindings(&self, agent_id: &str) -> CoreResult<Vec<StrategyBinding>>;

    fn risk_state(&self, agent_id: &str, day: NaiveDate) -> CoreResult<Option<RiskState>>;
    /// Most recent day's state for the agent, whatever the day.
    fn latest_risk_state(&self, agent_id: &str) -> CoreResult<Option<RiskState>>;
    fn put_risk_state(&self, state: &RiskState) -> CoreResult<()>;

    fn ledger(&self, agent_id: &str) -> CoreResult<Option<AgentLedger>>;
    fn put_ledger(&self, ledger: &AgentLedger) -> CoreResult<()>;

    fn append_trade(&self, trade: &TradeRecord) -> CoreResult<()>;
    /// Trades from one execution together with the ledger and risk state
    /// they produced, written as a single change: all of it lands or none.
    fn record_execution(
        &self,
        trades: &[TradeRecord],
        ledger: &AgentLedger,
        state: &RiskState,
    ) -> CoreResult<()>;
    fn trades(&self, agent_id: &str) -> CoreResult<Vec<TradeRecord>>;

    fn append_decision(&self, decision: &Decision) -> CoreResult<()>;
    fn decisions(&self, agent_id: &str) -> CoreResult<Vec<Decision>>;

    /// Inserts a run or updates a running one. Terminal runs are immutable.
    fn put_run(&self, run: &RunRecord) -> CoreResult<()>;
    fn run(&self, run_id: &str) -> CoreResult<Option<RunRecord>>;
    fn runs(&self) -> CoreResult<Vec<RunRecord>>;
}
