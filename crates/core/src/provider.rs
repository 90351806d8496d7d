//! [`SnapshotProvider`] backed by data held in memory.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;

use crate::error::{CoreError, CoreResult};
use crate::market::{Bar, ChainSlice};
use crate::traits::SnapshotProvider;

#[derive(Debug, Default)]
pub struct StaticSnapshotProvider {
    bars: RwLock<BTreeMap<String, BTreeMap<NaiveDate, Bar>>>,
    chains: RwLock<BTreeMap<String, BTreeMap<DateTime<Utc>, ChainSlice>>>,
}

impl StaticSnapshotProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts bars, replacing any with the same ticker and date.
    pub fn insert_bars(&self, bars: impl IntoIterator<Item = Bar>) {
        let mut table = self.bars.write();
        for bar in bars {
            table
                .entry(bar.ticker.clone())
                .or_default()
                .insert(bar.date, bar);
        }
    }

    pub fn insert_chain(&self, chain: ChainSlice) {
        self.chains
            .write()
            .entry(chain.underlying.clone())
            .or_default()
            .insert(chain.as_of, chain);
    }

    #[must_use]
    pub fn tickers(&self) -> Vec<String> {
        self.bars.read().keys().cloned().collect()
    }
}

#[async_trait]
impl SnapshotProvider for StaticSnapshotProvider {
    async fn bars(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> CoreResult<Vec<Bar>> {
        let table = self.bars.read();
        let series = table
            .get(ticker)
            .ok_or_else(|| CoreError::unavailable(ticker, "no bars loaded"))?;
        Ok(series.range(start..=end).map(|(_, b)| b.clone()).collect())
    }

    async fn history(&self, ticker: &str, through: NaiveDate, limit: usize) -> CoreResult<Vec<Bar>> {
        let table = self.bars.read();
        let series = table
            .get(ticker)
            .ok_or_else(|| CoreError::unavailable(ticker, "no bars loaded"))?;
        let mut out: Vec<Bar> = series
            .range(..=through)
            .rev()
            .take(limit)
            .map(|(_, b)| b.clone())
            .collect();
        out.reverse();
        Ok(out)
    }

    async fn chain(&self, underlying: &str, as_of: DateTime<Utc>) -> CoreResult<ChainSlice> {
        let table = self.chains.read();
        table
            .get(underlying)
            .and_then(|by_time| by_time.range(..=as_of).next_back())
            .map(|(_, chain)| chain.clone())
            .ok_or_else(|| {
                CoreError::unavailable(underlying, format!("no chain at or before {as_of}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn bar(day: u32, close: Decimal) -> Bar {
        Bar {
            ticker: "SPY".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1000),
        }
    }

    #[tokio::test]
    async fn history_is_bounded_and_ordered() {
        let provider = StaticSnapshotProvider::new();
        provider.insert_bars((1..=10).map(|d| bar(d, Decimal::from(d))));
        let through = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();
        let bars = provider.history("SPY", through, 3).await.unwrap();
        let closes: Vec<_> = bars.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![dec!(5), dec!(6), dec!(7)]);
    }

    #[tokio::test]
    async fn chain_lookup_never_reads_the_future() {
        let provider = StaticSnapshotProvider::new();
        let t1 = Utc.with_ymd_and_hms(2025, 1, 10, 15, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 1, 10, 15, 30, 0).unwrap();
        for t in [t1, t2] {
            provider.insert_chain(ChainSlice {
                underlying: "QQQ".to_string(),
                as_of: t,
                underlying_price: None,
                quotes: Vec::new(),
            });
        }
        let at = Utc.with_ymd_and_hms(2025, 1, 10, 15, 29, 0).unwrap();
        assert_eq!(provider.chain("QQQ", at).await.unwrap().as_of, t1);
        let early = Utc.with_ymd_and_hms(2025, 1, 10, 14, 0, 0).unwrap();
        assert!(matches!(
            provider.chain("QQQ", early).await,
            Err(CoreError::DataUnavailable { .. })
        ));
    }
}
