use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Daily risk counters for one agent, keyed by (agent, exchange-local date).
///
/// Counters only grow within a day. A new day replaces the whole value in
/// one step via [`RiskState::reset_for`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskState {
    pub agent_id: String,
    pub day: NaiveDate,
    pub trades_today: u32,
    pub notional_today: Decimal,
    /// Sum of realized losses, stored as a positive amount.
    pub loss_today: Decimal,
    pub day_closed: bool,
}

impl RiskState {
    #[must_use]
    pub fn new(agent_id: impl Into<String>, day: NaiveDate) -> Self {
        Self {
            agent_id: agent_id.into(),
            day,
            trades_today: 0,
            notional_today: Decimal::ZERO,
            loss_today: Decimal::ZERO,
            day_closed: false,
        }
    }

    /// Replaces every counter when `day` differs from the stored key.
    /// Returns true if a reset happened.
    pub fn reset_for(&mut self, day: NaiveDate) -> bool {
        if self.day == day {
            return false;
        }
        *self = Self::new(std::mem::take(&mut self.agent_id), day);
        true
    }
}
