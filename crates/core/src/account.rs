//! Per-agent cash and position book, mutated only by the paper broker.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::events::SpreadProposal;
use crate::position::PositionTracker;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub agent_id: String,
    pub cash: Decimal,
    /// Realized PnL net of commissions.
    pub realized_pnl: Decimal,
    pub commissions_paid: Decimal,
}

impl Account {
    #[must_use]
    pub fn new(agent_id: impl Into<String>, initial_cash: Decimal) -> Self {
        Self {
            agent_id: agent_id.into(),
            cash: initial_cash,
            realized_pnl: Decimal::ZERO,
            commissions_paid: Decimal::ZERO,
        }
    }
}

/// Account plus positions plus the set of decision ids already filled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentLedger {
    pub account: Account,
    pub positions: PositionTracker,
    /// Decision ids filled during `session_day`.
    #[serde(default)]
    pub applied_decisions: BTreeSet<String>,
    #[serde(default)]
    pub session_day: Option<NaiveDate>,
    /// Latest fill price per instrument, used for marks when no quote is at hand.
    #[serde(default)]
    pub last_prices: BTreeMap<String, Decimal>,
    /// Legs of open spread positions, keyed by position symbol.
    #[serde(default)]
    pub spreads: BTreeMap<String, SpreadProposal>,
}

impl AgentLedger {
    #[must_use]
    pub fn new(agent_id: impl Into<String>, initial_cash: Decimal) -> Self {
        Self {
            account: Account::new(agent_id, initial_cash),
            positions: PositionTracker::new(),
            applied_decisions: BTreeSet::new(),
            session_day: None,
            last_prices: BTreeMap::new(),
            spreads: BTreeMap::new(),
        }
    }

    /// Moves the ledger to trading day `day`. Decision ids from earlier days
    /// are dropped; an earlier `day` changes nothing. Returns true on a roll.
    pub fn begin_session(&mut self, day: NaiveDate) -> bool {
        if self.session_day.is_some_and(|current| current >= day) {
            return false;
        }
        self.applied_decisions.clear();
        self.session_day = Some(day);
        true
    }

    /// Unrealized PnL over open positions; missing marks fall back to the
    /// last fill price, then to cost (zero contribution).
    #[must_use]
    pub fn unrealized_pnl(&self, marks: &BTreeMap<String, Decimal>) -> Decimal {
        self.positions
            .open_positions()
            .map(|p| p.unrealized_pnl(self.mark_for(&p.ticker, p.avg_cost, marks)))
            .sum()
    }

    /// Cash plus signed market value of open positions.
    #[must_use]
    pub fn equity(&self, marks: &BTreeMap<String, Decimal>) -> Decimal {
        self.account.cash
            + self
                .positions
                .open_positions()
                .map(|p| p.market_value(self.mark_for(&p.ticker, p.avg_cost, marks)))
                .sum::<Decimal>()
    }

    /// Mark for one instrument: explicit mark, else last fill price, else `fallback`.
    #[must_use]
    pub fn mark_for(&self, ticker: &str, fallback: Decimal, marks: &BTreeMap<String, Decimal>) -> Decimal {
        marks
            .get(ticker)
            .or_else(|| self.last_prices.get(ticker))
            .copied()
            .unwrap_or(fallback)
    }
}
