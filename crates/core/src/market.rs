//! Market data supplied by the snapshot provider.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::events::SpreadProposal;

/// One OHLCV bar. Daily bars carry the session date as `date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionRight {
    Call,
    Put,
}

impl std::fmt::Display for OptionRight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "C"),
            Self::Put => write!(f, "P"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    pub strike: Decimal,
    pub right: OptionRight,
    pub expiration: NaiveDate,
    pub bid: Decimal,
    pub ask: Decimal,
    #[serde(default)]
    pub last: Option<Decimal>,
    #[serde(default)]
    pub volume: u64,
    #[serde(default)]
    pub delta: Option<f64>,
}

impl OptionQuote {
    /// Bid/ask midpoint, falling back to the last trade when the book is empty.
    #[must_use]
    pub fn mid(&self) -> Decimal {
        if self.bid > Decimal::ZERO || self.ask > Decimal::ZERO {
            (self.bid + self.ask) / Decimal::TWO
        } else {
            self.last.unwrap_or(Decimal::ZERO)
        }
    }

    /// Bid/ask width as a fraction of mid. `None` when mid is not positive.
    #[must_use]
    pub fn spread_pct(&self) -> Option<Decimal> {
        let mid = self.mid();
        if mid <= Decimal::ZERO {
            return None;
        }
        Some((self.ask - self.bid) / mid)
    }
}

/// Options-chain snapshot for one underlying at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSlice {
    pub underlying: String,
    pub as_of: DateTime<Utc>,
    #[serde(default)]
    pub underlying_price: Option<Decimal>,
    pub quotes: Vec<OptionQuote>,
}

impl ChainSlice {
    #[must_use]
    pub fn quote(&self, right: OptionRight, expiration: NaiveDate, strike: Decimal) -> Option<&OptionQuote> {
        self.quotes
            .iter()
            .find(|q| q.right == right && q.expiration == expiration && q.strike == strike)
    }

    /// Cost per share to buy back `spread` now: short mid less long mid.
    /// `None` when either leg is missing from this capture.
    #[must_use]
    pub fn spread_mark(&self, spread: &SpreadProposal) -> Option<Decimal> {
        let short = self.quote(spread.right, spread.expiration, spread.short_strike)?;
        let long = self.quote(spread.right, spread.expiration, spread.long_strike)?;
        Some(short.mid() - long.mid())
    }
}

/// Everything a strategy evaluation may look at for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub ticker: String,
    pub as_of: DateTime<Utc>,
    /// Trailing bars, oldest first, none dated after `as_of`.
    pub bars: Vec<Bar>,
    pub chain: Option<ChainSlice>,
}

impl MarketSnapshot {
    #[must_use]
    pub fn from_bars(ticker: impl Into<String>, as_of: DateTime<Utc>, bars: Vec<Bar>) -> Self {
        Self {
            ticker: ticker.into(),
            as_of,
            bars,
            chain: None,
        }
    }

    #[must_use]
    pub fn last_close(&self) -> Option<Decimal> {
        self.bars.last().map(|b| b.close)
    }
}
