//! [`SnapshotProvider`] over a data directory:
//!
//! ```text
//! <root>/bars/<TICKER>.csv
//! <root>/chains/<UNDERLYING>/<YYYY-MM-DD>/<HHMM>.json
//! ```
//!
//! Chain files hold one serialized [`ChainSlice`]; the file name is the
//! exchange-local capture time.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use deltadesk_core::{Bar, ChainSlice, CoreError, CoreResult, MarketClock, SnapshotProvider};
use tracing::debug;

use crate::csv_storage::CsvStorage;
use crate::error::DataError;

#[derive(Debug, Clone)]
pub struct FileSnapshotProvider {
    root: PathBuf,
    clock: MarketClock,
}

impl FileSnapshotProvider {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, clock: MarketClock) -> Self {
        Self {
            root: root.into(),
            clock,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn bars_path(&self, ticker: &str) -> PathBuf {
        self.root.join("bars").join(format!("{}.csv", ticker.to_uppercase()))
    }

    #[must_use]
    pub fn chain_dir(&self, underlying: &str, day: NaiveDate) -> PathBuf {
        self.root
            .join("chains")
            .join(underlying.to_uppercase())
            .join(day.format("%Y-%m-%d").to_string())
    }

    async fn load_bars(&self, ticker: &str) -> CoreResult<Vec<Bar>> {
        let path = self.bars_path(ticker);
        let contents = match tokio::fs::read(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CoreError::unavailable(ticker, format!("no bar file at {}", path.display())));
            }
            Err(e) => return Err(DataError::io(&path, e).into()),
        };
        let bars = CsvStorage::parse_bars(&path, &ticker.to_uppercase(), &contents)?;
        debug!(ticker, bars = bars.len(), path = %path.display(), "bar file loaded");
        Ok(bars)
    }

    /// Capture times present for one underlying and day, ascending.
    async fn capture_times(&self, dir: &Path) -> CoreResult<Vec<NaiveTime>> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DataError::io(dir, e).into()),
        };
        let mut times = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| DataError::io(dir, e))? {
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if let Ok(time) = NaiveTime::parse_from_str(stem, "%H%M") {
                times.push(time);
            }
        }
        times.sort();
        Ok(times)
    }
}

#[async_trait]
impl SnapshotProvider for FileSnapshotProvider {
    async fn bars(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> CoreResult<Vec<Bar>> {
        Ok(self
            .load_bars(ticker)
            .await?
            .into_iter()
            .filter(|b| b.date >= start && b.date <= end)
            .collect())
    }

    async fn history(&self, ticker: &str, through: NaiveDate, limit: usize) -> CoreResult<Vec<Bar>> {
        let mut bars = self.load_bars(ticker).await?;
        bars.retain(|b| b.date <= through);
        let skip = bars.len().saturating_sub(limit);
        Ok(bars.split_off(skip))
    }

    /// Latest capture of the tick's trading day at or before the tick.
    async fn chain(&self, underlying: &str, as_of: DateTime<Utc>) -> CoreResult<ChainSlice> {
        let day = self.clock.trading_day(as_of);
        let local = self.clock.local_time(as_of);
        let dir = self.chain_dir(underlying, day);

        let times = self.capture_times(&dir).await?;
        let Some(time) = times.into_iter().rev().find(|t| *t <= local) else {
            return Err(CoreError::unavailable(
                underlying,
                format!("no chain at or before {local} on {day}"),
            ));
        };

        let path = dir.join(format!("{}.json", time.format("%H%M")));
        let contents = tokio::fs::read(&path)
            .await
            .map_err(|e| DataError::io(&path, e))?;
        let chain: ChainSlice =
            serde_json::from_slice(&contents).map_err(|e| DataError::json(&path, e))?;
        if chain.as_of > as_of {
            return Err(CoreError::MalformedSnapshot(format!(
                "{} is stamped {} but filed at {time}",
                path.display(),
                chain.as_of
            )));
        }
        debug!(underlying, path = %path.display(), quotes = chain.quotes.len(), "chain loaded");
        Ok(chain)
    }
}
