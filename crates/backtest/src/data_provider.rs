use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use deltadesk_core::{Bar, CoreError, CoreResult, SnapshotProvider};
use rust_decimal::Decimal;
use tracing::warn;

/// Daily bars for a ticker set, each series in ascending date order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoricalBars {
    series: BTreeMap<String, Vec<Bar>>,
}

impl HistoricalBars {
    /// Builds from loose bars, sorting and de-duplicating by date.
    #[must_use]
    pub fn from_bars(bars: impl IntoIterator<Item = Bar>) -> Self {
        let mut by_ticker: BTreeMap<String, BTreeMap<NaiveDate, Bar>> = BTreeMap::new();
        for bar in bars {
            by_ticker
                .entry(bar.ticker.clone())
                .or_default()
                .insert(bar.date, bar);
        }
        Self {
            series: by_ticker
                .into_iter()
                .map(|(ticker, bars)| (ticker, bars.into_values().collect()))
                .collect(),
        }
    }

    /// Loads `[start, end]` for every ticker. Tickers without data are
    /// skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::DataUnavailable` when no ticker has any bars.
    pub async fn load(
        provider: &dyn SnapshotProvider,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> CoreResult<Self> {
        let mut all = Vec::new();
        for ticker in tickers {
            match provider.bars(ticker, start, end).await {
                Ok(bars) if bars.is_empty() => warn!(ticker = %ticker, "no bars in range, skipping"),
                Ok(bars) => all.extend(bars),
                Err(e @ CoreError::DataUnavailable { .. }) => {
                    warn!(ticker = %ticker, error = %e, "no stored data, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        let loaded = Self::from_bars(all);
        if loaded.series.is_empty() {
            return Err(CoreError::unavailable(
                tickers.join(","),
                format!("no usable bars between {start} and {end}"),
            ));
        }
        Ok(loaded)
    }

    #[must_use]
    pub fn tickers(&self) -> Vec<&str> {
        self.series.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn series(&self, ticker: &str) -> &[Bar] {
        self.series.get(ticker).map_or(&[], Vec::as_slice)
    }

    /// Union of every series' dates, ascending.
    #[must_use]
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.series
            .values()
            .flatten()
            .map(|b| b.date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Bars dated within `[start, end]`; tickers left empty are dropped.
    #[must_use]
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            series: self
                .series
                .iter()
                .map(|(ticker, bars)| {
                    let window: Vec<Bar> = bars
                        .iter()
                        .filter(|b| start <= b.date && b.date <= end)
                        .cloned()
                        .collect();
                    (ticker.clone(), window)
                })
                .filter(|(_, bars)| !bars.is_empty())
                .collect(),
        }
    }

    /// Index of the bar dated exactly `date`.
    #[must_use]
    pub fn index_on(&self, ticker: &str, date: NaiveDate) -> Option<usize> {
        self.series(ticker).binary_search_by_key(&date, |b| b.date).ok()
    }

    #[must_use]
    pub fn close_on(&self, ticker: &str, date: NaiveDate) -> Option<Decimal> {
        self.index_on(ticker, date).map(|i| self.series(ticker)[i].close)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}
