use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::market::OptionRight;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// +1 for buys, -1 for sells.
    #[must_use]
    pub fn sign(self) -> Decimal {
        match self {
            Self::Buy => Decimal::ONE,
            Self::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => Err(format!("unknown side: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalValue {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for SignalValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

/// Raw strategy output for one ticker at one instant. Logged, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub ticker: String,
    pub value: SignalValue,
    pub strategy: String,
    pub as_of: DateTime<Utc>,
    /// Empty unless the strategy explains a HOLD (e.g. `INSUFFICIENT_HISTORY`).
    #[serde(default)]
    pub reason: String,
    /// Reference price the signal was computed against.
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// Two-leg credit spread selected from a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadProposal {
    pub underlying: String,
    pub right: OptionRight,
    pub expiration: NaiveDate,
    pub short_strike: Decimal,
    pub long_strike: Decimal,
    pub short_mid: Decimal,
    pub long_mid: Decimal,
    /// Estimated net credit per share.
    pub credit: Decimal,
    pub contracts: u32,
}

impl SpreadProposal {
    #[must_use]
    pub fn width(&self) -> Decimal {
        (self.short_strike - self.long_strike).abs()
    }

    /// Dollar notional: width x multiplier x contracts.
    #[must_use]
    pub fn notional(&self, multiplier: Decimal) -> Decimal {
        self.width() * multiplier * Decimal::from(self.contracts)
    }

    /// Worst-case loss at expiry.
    #[must_use]
    pub fn max_loss(&self, multiplier: Decimal) -> Decimal {
        (self.width() - self.credit) * multiplier * Decimal::from(self.contracts)
    }

    /// Instrument key used for the spread's position, e.g. `QQQ 2025-01-10 P400/P398`.
    #[must_use]
    pub fn symbol(&self) -> String {
        format!(
            "{} {} {}{}/{}{}",
            self.underlying,
            self.expiration,
            self.right,
            self.short_strike.normalize(),
            self.right,
            self.long_strike.normalize()
        )
    }
}

/// What the broker should do if the decision is executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub ticker: String,
    pub side: Side,
    pub quantity: Decimal,
    /// Bar close or spread credit the fill is priced from.
    pub reference_price: Decimal,
}

impl OrderIntent {
    #[must_use]
    pub fn notional(&self) -> Decimal {
        (self.quantity * self.reference_price).abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionValue {
    Buy,
    Skip,
    ForceExit,
    Error,
}

impl std::fmt::Display for DecisionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Skip => write!(f, "SKIP"),
            Self::ForceExit => write!(f, "FORCE_EXIT"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPayload {
    pub order: OrderIntent,
    #[serde(default)]
    pub spread: Option<SpreadProposal>,
    /// Notional charged against the daily cap.
    pub notional: Decimal,
}

/// Final verdict for one (agent, strategy, tick).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub agent_id: String,
    pub strategy_id: String,
    pub tick: DateTime<Utc>,
    pub value: DecisionValue,
    #[serde(default)]
    pub signal: Option<SignalValue>,
    #[serde(default)]
    pub payload: Option<DecisionPayload>,
    pub reason: String,
}

impl Decision {
    /// Deterministic identity; resubmitting the same decision reuses it.
    #[must_use]
    pub fn identity(agent_id: &str, strategy_id: &str, tick: DateTime<Utc>) -> String {
        format!("{agent_id}:{strategy_id}:{}", tick.timestamp())
    }

    /// Identity of an operator order. Distinct orders never share it, even
    /// within the same second as each other or as a tick.
    #[must_use]
    pub fn order_identity(agent_id: &str, strategy_id: &str, order_id: &str) -> String {
        format!("{agent_id}:{strategy_id}:order:{order_id}")
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn new(
        agent_id: &str,
        strategy_id: &str,
        tick: DateTime<Utc>,
        value: DecisionValue,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Self::identity(agent_id, strategy_id, tick),
            agent_id: agent_id.to_string(),
            strategy_id: strategy_id.to_string(),
            tick,
            value,
            signal: None,
            payload: None,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn with_signal(mut self, signal: SignalValue) -> Self {
        self.signal = Some(signal);
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: DecisionPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// BUY needs an order payload; FORCE_EXIT flattens whatever is open.
    #[must_use]
    pub fn is_executable(&self) -> bool {
        match self.value {
            DecisionValue::Buy => self.payload.is_some(),
            DecisionValue::ForceExit => true,
            DecisionValue::Skip | DecisionValue::Error => false,
        }
    }
}

/// A simulated execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub decision_id: String,
    pub ticker: String,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
    pub commission: Decimal,
    /// Price degradation per unit versus the reference price.
    pub slippage: Decimal,
    pub timestamp: DateTime<Utc>,
    /// Realized PnL when the fill reduced or closed a position.
    pub realized_pnl: Option<Decimal>,
}

impl Fill {
    #[must_use]
    pub fn notional(&self) -> Decimal {
        (self.quantity * self.price).abs()
    }
}

/// Immutable trade log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub agent_id: String,
    pub ticker: String,
    pub side: Side,
    pub quantity: Decimal,
    pub fill_price: Decimal,
    pub commission: Decimal,
    pub slippage: Decimal,
    pub timestamp: DateTime<Utc>,
    pub decision_id: String,
}

impl TradeRecord {
    #[must_use]
    pub fn from_fill(agent_id: &str, fill: &Fill) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            ticker: fill.ticker.clone(),
            side: fill.side,
            quantity: fill.quantity,
            fill_price: fill.price,
            commission: fill.commission,
            slippage: fill.slippage,
            timestamp: fill.timestamp,
            decision_id: fill.decision_id.clone(),
        }
    }
}
