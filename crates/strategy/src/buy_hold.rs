use deltadesk_core::{CoreResult, MarketSnapshot, Signal, SignalValue, StrategyParams};
use rust_decimal::Decimal;

use crate::params::ParamReader;

pub const NAME: &str = "buy_hold";

/// Benchmark: buy at the first available bar, then hold. Never exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyHold {
    pub ticker: String,
    pub quantity: Decimal,
}

impl BuyHold {
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` for unknown keys or a zero quantity.
    pub fn from_params(params: &StrategyParams) -> CoreResult<Self> {
        let reader = ParamReader::new(NAME, params, &["ticker", "quantity"])?;
        Ok(Self {
            ticker: reader.symbol("ticker", "SPY")?,
            quantity: Decimal::from(reader.count("quantity", 1, 1)?),
        })
    }

    #[must_use]
    pub fn evaluate(&self, snapshot: &MarketSnapshot, holding: bool) -> Signal {
        let (value, reason) = match (holding, snapshot.bars.last()) {
            (true, _) => (SignalValue::Hold, "HOLDING"),
            (false, None) => (SignalValue::Hold, "INSUFFICIENT_HISTORY"),
            (false, Some(_)) => (SignalValue::Buy, "INITIAL_ENTRY"),
        };
        Signal {
            ticker: self.ticker.clone(),
            value,
            strategy: NAME.to_string(),
            as_of: snapshot.as_of,
            reason: reason.to_string(),
            price: snapshot.last_close(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use deltadesk_core::Bar;
    use rust_decimal_macros::dec;

    #[test]
    fn buys_once_then_holds() {
        let strategy = BuyHold::from_params(&StrategyParams::new()).unwrap();
        let as_of = Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap();
        let bar = Bar {
            ticker: "SPY".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: dec!(470),
            high: dec!(472),
            low: dec!(468),
            close: dec!(471),
            volume: dec!(1000),
        };
        let snapshot = MarketSnapshot::from_bars("SPY", as_of, vec![bar]);
        let first = strategy.evaluate(&snapshot, false);
        assert_eq!(first.value, SignalValue::Buy);
        assert_eq!(first.price, Some(dec!(471)));
        assert_eq!(strategy.evaluate(&snapshot, true).value, SignalValue::Hold);
        let empty = MarketSnapshot::from_bars("SPY", as_of, Vec::new());
        assert_eq!(strategy.evaluate(&empty, false).value, SignalValue::Hold);
    }
}
