use deltadesk_core::{CoreError, CoreResult, MarketSnapshot, Signal, SignalValue, StrategyParams};
use rust_decimal::Decimal;

use crate::params::ParamReader;

pub const NAME: &str = "sma_crossover";

/// Simple moving-average crossover.
///
/// Evaluation is a pure function of the trailing bars: the crossover is found
/// by comparing the averages at the latest bar with those one bar earlier, so
/// the same history always yields the same signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmaCrossover {
    pub ticker: String,
    pub fast: usize,
    pub slow: usize,
    /// Units per live/paper order.
    pub quantity: Decimal,
}

impl SmaCrossover {
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` for unknown keys, periods below one,
    /// or `fast >= slow`.
    pub fn from_params(params: &StrategyParams) -> CoreResult<Self> {
        let reader = ParamReader::new(NAME, params, &["ticker", "fast", "slow", "quantity"])?;
        let fast = reader.count("fast", 10, 1)?;
        let slow = reader.count("slow", 30, 1)?;
        if fast >= slow {
            return Err(CoreError::config(format!(
                "{NAME}: 'fast' ({fast}) must be smaller than 'slow' ({slow})"
            )));
        }
        Ok(Self {
            ticker: reader.symbol("ticker", "SPY")?,
            fast: usize::try_from(fast).map_err(|e| CoreError::config(e.to_string()))?,
            slow: usize::try_from(slow).map_err(|e| CoreError::config(e.to_string()))?,
            quantity: Decimal::from(reader.count("quantity", 1, 1)?),
        })
    }

    /// Bars needed to see a crossover at the latest bar.
    #[must_use]
    pub const fn lookback(&self) -> usize {
        self.slow + 1
    }

    fn calculate_ma(closes: &[Decimal]) -> Decimal {
        let sum: Decimal = closes.iter().sum();
        sum / Decimal::from(closes.len())
    }

    /// `(fast, slow)` averages over the trailing window ending at `closes.len()`,
    /// or `None` without `slow` points.
    fn averages(&self, closes: &[Decimal]) -> Option<(Decimal, Decimal)> {
        if closes.len() < self.slow {
            return None;
        }
        let n = closes.len();
        Some((
            Self::calculate_ma(&closes[n - self.fast..]),
            Self::calculate_ma(&closes[n - self.slow..]),
        ))
    }

    #[must_use]
    pub fn evaluate(&self, snapshot: &MarketSnapshot) -> Signal {
        let closes: Vec<Decimal> = snapshot.bars.iter().map(|b| b.close).collect();
        let signal = |value, reason: &str| Signal {
            ticker: self.ticker.clone(),
            value,
            strategy: NAME.to_string(),
            as_of: snapshot.as_of,
            reason: reason.to_string(),
            price: snapshot.last_close(),
        };

        let Some((fast_ma, slow_ma)) = self.averages(&closes) else {
            return signal(SignalValue::Hold, "INSUFFICIENT_HISTORY");
        };
        let previous = self.averages(&closes[..closes.len() - 1]);

        // Without a full previous window the prior state counts as "not above".
        let was_above = previous.is_some_and(|(f, s)| f > s);
        let was_below = previous.is_some_and(|(f, s)| f < s);

        if fast_ma > slow_ma && !was_above {
            signal(SignalValue::Buy, "FAST_CROSSED_ABOVE_SLOW")
        } else if fast_ma < slow_ma && previous.is_some() && !was_below {
            signal(SignalValue::Sell, "FAST_CROSSED_BELOW_SLOW")
        } else {
            signal(SignalValue::Hold, "NO_CROSSOVER")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use deltadesk_core::Bar;
    use serde_json::json;

    fn bars(closes: &[i64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| Bar {
                ticker: "SPY".to_string(),
                date: start + chrono::Days::new(i as u64),
                open: Decimal::from(*c),
                high: Decimal::from(*c),
                low: Decimal::from(*c),
                close: Decimal::from(*c),
                volume: Decimal::from(1000),
            })
            .collect()
    }

    fn strategy(fast: u64, slow: u64) -> SmaCrossover {
        let params = serde_json::from_value(json!({"fast": fast, "slow": slow})).unwrap();
        SmaCrossover::from_params(&params).unwrap()
    }

    fn signals(strategy: &SmaCrossover, closes: &[i64]) -> Vec<SignalValue> {
        let series = bars(closes);
        let as_of = Utc.with_ymd_and_hms(2024, 3, 1, 21, 0, 0).unwrap();
        (1..=series.len())
            .map(|n| {
                let snapshot = MarketSnapshot::from_bars("SPY", as_of, series[..n].to_vec());
                strategy.evaluate(&snapshot).value
            })
            .collect()
    }

    #[test]
    fn rising_series_buys_exactly_once() {
        let closes: Vec<i64> = (1..=40).collect();
        let out = signals(&strategy(10, 30), &closes);
        let buys: Vec<usize> = out
            .iter()
            .enumerate()
            .filter(|(_, v)| **v == SignalValue::Buy)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(buys, vec![29]);
        assert!(out[..29].iter().all(|v| *v == SignalValue::Hold));
        assert!(out[30..].iter().all(|v| *v == SignalValue::Hold));
    }

    #[test]
    fn short_history_holds() {
        let s = strategy(10, 30);
        let as_of = Utc.with_ymd_and_hms(2024, 3, 1, 21, 0, 0).unwrap();
        let snapshot = MarketSnapshot::from_bars("SPY", as_of, bars(&[1, 2, 3]));
        let signal = s.evaluate(&snapshot);
        assert_eq!(signal.value, SignalValue::Hold);
        assert_eq!(signal.reason, "INSUFFICIENT_HISTORY");
    }

    #[test]
    fn falling_after_rise_sells() {
        let mut closes: Vec<i64> = (1..=10).collect();
        closes.extend((1..=10).rev());
        let out = signals(&strategy(2, 4), &closes);
        assert!(out.contains(&SignalValue::Buy));
        let first_buy = out.iter().position(|v| *v == SignalValue::Buy).unwrap();
        let first_sell = out.iter().position(|v| *v == SignalValue::Sell).unwrap();
        assert!(first_sell > first_buy);
        assert_eq!(out.iter().filter(|v| **v == SignalValue::Sell).count(), 1);
    }

    #[test]
    fn rejects_inverted_periods() {
        let params = serde_json::from_value(json!({"fast": 30, "slow": 10})).unwrap();
        assert!(matches!(
            SmaCrossover::from_params(&params),
            Err(CoreError::Configuration(_))
        ));
    }
}
