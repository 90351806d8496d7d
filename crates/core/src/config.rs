use chrono::NaiveTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::clock::{parse_clock_time, MarketClock};
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub market: MarketConfig,
    pub broker: BrokerConfig,
    pub storage: StorageConfig,
}

/// Exchange session, all times exchange-local.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub timezone: String,
    pub open: String,
    pub close: String,
    pub force_exit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Global kill switch for paper fills.
    pub trading_enabled: bool,
    pub commission_per_trade: Decimal,
    pub slippage_bps: Decimal,
    pub initial_cash: Decimal,
    pub contract_multiplier: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of `bars/<TICKER>.csv` and `chains/<UNDERLYING>/<DATE>/<HHMM>.json`.
    pub data_dir: String,
    /// JSON state file for agents, ledgers, risk state, trades and runs.
    pub state_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            market: MarketConfig::default(),
            broker: BrokerConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            timezone: "America/New_York".to_string(),
            open: "09:30".to_string(),
            close: "16:00".to_string(),
            force_exit: "15:45".to_string(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            trading_enabled: false,
            commission_per_trade: dec!(1.0),
            slippage_bps: dec!(2.0),
            initial_cash: dec!(100000),
            contract_multiplier: dec!(100),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            state_path: "data/state.json".to_string(),
        }
    }
}

impl MarketConfig {
    /// Builds the exchange clock, rejecting unknown zones and a cutoff
    /// outside the session.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` on invalid values.
    pub fn clock(&self) -> CoreResult<MarketClock> {
        let tz = self
            .timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| CoreError::config(format!("market.timezone {}: {e}", self.timezone)))?;
        let open = parse_clock_time(&self.open)?;
        let close = parse_clock_time(&self.close)?;
        let force_exit = parse_clock_time(&self.force_exit)?;

        if open >= close {
            return Err(CoreError::config(format!(
                "market.open {open} must precede market.close {close}"
            )));
        }
        if force_exit <= open || force_exit > close {
            return Err(CoreError::config(format!(
                "market.force_exit {force_exit} must fall inside the session {open}-{close}"
            )));
        }

        Ok(MarketClock::new(tz, open, close, force_exit))
    }
}

impl BrokerConfig {
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` when a cost or balance is negative.
    pub fn validate(&self) -> CoreResult<()> {
        if self.commission_per_trade < Decimal::ZERO {
            return Err(CoreError::config("broker.commission_per_trade must be >= 0"));
        }
        if self.slippage_bps < Decimal::ZERO {
            return Err(CoreError::config("broker.slippage_bps must be >= 0"));
        }
        if self.initial_cash <= Decimal::ZERO {
            return Err(CoreError::config("broker.initial_cash must be > 0"));
        }
        if self.contract_multiplier <= Decimal::ZERO {
            return Err(CoreError::config("broker.contract_multiplier must be > 0"));
        }
        Ok(())
    }
}

impl AppConfig {
    /// # Errors
    ///
    /// Returns the first configuration problem found.
    pub fn validate(&self) -> CoreResult<()> {
        self.market.clock()?;
        self.broker.validate()
    }
}

/// Convenience for tests and defaults.
#[must_use]
pub fn hhmm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        let clock = config.market.clock().unwrap();
        assert_eq!(clock.force_exit(), hhmm(15, 45));
    }

    #[test]
    fn rejects_unknown_timezone() {
        let mut config = AppConfig::default();
        config.market.timezone = "Mars/Olympus".to_string();
        assert!(matches!(
            config.validate(),
            Err(CoreError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_cutoff_after_close() {
        let mut config = AppConfig::default();
        config.market.force_exit = "16:30".to_string();
        assert!(config.market.clock().is_err());
    }

    #[test]
    fn rejects_negative_slippage() {
        let mut config = AppConfig::default();
        config.broker.slippage_bps = dec!(-1);
        assert!(config.validate().is_err());
    }
}
