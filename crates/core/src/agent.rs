//! Agents and their strategy bindings.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskProfile {
    Conservative,
    Balanced,
    SuperRisky,
}

impl Default for RiskProfile {
    fn default() -> Self {
        Self::Balanced
    }
}

impl std::str::FromStr for RiskProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CONSERVATIVE" => Ok(Self::Conservative),
            "BALANCED" => Ok(Self::Balanced),
            "SUPER_RISKY" => Ok(Self::SuperRisky),
            other => Err(format!("unknown risk profile: {other}")),
        }
    }
}

/// Per-trading-day caps enforced by the risk governor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_trades_per_day: u32,
    pub max_notional_per_day: Decimal,
    pub max_loss_per_day: Decimal,
}

impl RiskProfile {
    #[must_use]
    pub fn default_limits(self) -> RiskLimits {
        match self {
            Self::Conservative => RiskLimits {
                max_trades_per_day: 3,
                max_notional_per_day: dec!(10000),
                max_loss_per_day: dec!(750),
            },
            Self::Balanced => RiskLimits {
                max_trades_per_day: 5,
                max_notional_per_day: dec!(20000),
                max_loss_per_day: dec!(1500),
            },
            Self::SuperRisky => RiskLimits {
                max_trades_per_day: 10,
                max_notional_per_day: dec!(50000),
                max_loss_per_day: dec!(3000),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub risk_profile: RiskProfile,
    /// Explicit limits; `None` means the profile defaults.
    #[serde(default)]
    pub risk_limits: Option<RiskLimits>,
    pub enabled: bool,
    /// Broker binding; only `paper` exists.
    pub broker: String,
}

impl Agent {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, risk_profile: RiskProfile) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            display_name: name.clone(),
            name,
            description: String::new(),
            risk_profile,
            risk_limits: None,
            enabled: true,
            broker: "paper".to_string(),
        }
    }

    #[must_use]
    pub fn limits(&self) -> RiskLimits {
        self.risk_limits
            .unwrap_or_else(|| self.risk_profile.default_limits())
    }
}

/// Gates whether a binding's decisions may reach the paper broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    /// Never evaluated.
    Disabled,
    /// Evaluated; accepted decisions are filled by the paper broker.
    PaperLive,
    /// Evaluated and recorded as plans awaiting operator approval; never filled.
    Approved,
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DISABLED" => Ok(Self::Disabled),
            "PAPER_LIVE" => Ok(Self::PaperLive),
            "APPROVED" => Ok(Self::Approved),
            other => Err(format!("unknown execution mode: {other}")),
        }
    }
}

pub type StrategyParams = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyBinding {
    pub id: String,
    pub agent_id: String,
    pub strategy_name: String,
    #[serde(default)]
    pub params: StrategyParams,
    pub execution_mode: ExecutionMode,
    pub enabled: bool,
}

impl StrategyBinding {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        agent_id: impl Into<String>,
        strategy_name: impl Into<String>,
        params: StrategyParams,
        execution_mode: ExecutionMode,
    ) -> Self {
        Self {
            id: id.into(),
            agent_id: agent_id.into(),
            strategy_name: strategy_name.into(),
            params,
            execution_mode,
            enabled: true,
        }
    }

    /// True when the binding must be skipped without evaluation.
    #[must_use]
    pub fn is_inactive(&self) -> bool {
        !self.enabled || self.execution_mode == ExecutionMode::Disabled
    }
}
