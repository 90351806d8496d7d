//! Daily bar files: `date,open,high,low,close,volume`, one file per ticker.

use std::path::Path;

use chrono::NaiveDate;
use csv::{Reader, Writer};
use deltadesk_core::Bar;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::DataError;

#[derive(Debug, Serialize, Deserialize)]
struct BarRow {
    date: NaiveDate,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
}

pub struct CsvStorage;

impl CsvStorage {
    /// Parses a bar file for `ticker`. Rows come back sorted by date;
    /// duplicate dates and non-positive prices are rejected.
    ///
    /// # Errors
    ///
    /// Returns `DataError::Csv` for unreadable rows and `DataError::Row` for
    /// rows that parse but make no sense as a bar.
    pub fn parse_bars(path: &Path, ticker: &str, contents: &[u8]) -> Result<Vec<Bar>, DataError> {
        let mut reader = Reader::from_reader(contents);
        let mut bars = Vec::new();
        for row in reader.deserialize::<BarRow>() {
            let row = row.map_err(|source| DataError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            if [row.open, row.high, row.low, row.close]
                .iter()
                .any(|p| *p <= Decimal::ZERO)
            {
                return Err(DataError::Row {
                    path: path.to_path_buf(),
                    detail: format!("non-positive price on {}", row.date),
                });
            }
            bars.push(Bar {
                ticker: ticker.to_string(),
                date: row.date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }

        bars.sort_by_key(|b| b.date);
        if let Some(dup) = bars.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(DataError::Row {
                path: path.to_path_buf(),
                detail: format!("duplicate date {}", dup[0].date),
            });
        }
        Ok(bars)
    }

    /// Writes bars in date order, in the format [`CsvStorage::parse_bars`] reads.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn write_bars(path: &Path, bars: &[Bar]) -> Result<(), DataError> {
        let csv_err = |source| DataError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = Writer::from_path(path).map_err(csv_err)?;

        let mut sorted: Vec<&Bar> = bars.iter().collect();
        sorted.sort_by_key(|b| b.date);
        for bar in sorted {
            writer
                .serialize(BarRow {
                    date: bar.date,
                    open: bar.open,
                    high: bar.high,
                    low: bar.low,
                    close: bar.close,
                    volume: bar.volume,
                })
                .map_err(csv_err)?;
        }
        writer.flush().map_err(|e| DataError::io(path, e))
    }
}
