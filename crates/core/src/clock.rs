//! Exchange-local time.
//!
//! Trading days and the force-exit cutoff are always computed in the
//! exchange's zone, whatever zone the caller lives in.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketClock {
    tz: Tz,
    open: NaiveTime,
    close: NaiveTime,
    force_exit: NaiveTime,
}

impl MarketClock {
    #[must_use]
    pub const fn new(tz: Tz, open: NaiveTime, close: NaiveTime, force_exit: NaiveTime) -> Self {
        Self {
            tz,
            open,
            close,
            force_exit,
        }
    }

    /// New York session, 09:30-16:00, force exit 15:45.
    #[must_use]
    pub fn new_york() -> Self {
        Self::new(
            chrono_tz::America::New_York,
            NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap_or(NaiveTime::MIN),
            NaiveTime::from_hms_opt(15, 45, 0).unwrap_or(NaiveTime::MIN),
        )
    }

    #[must_use]
    pub const fn timezone(&self) -> Tz {
        self.tz
    }

    #[must_use]
    pub const fn open(&self) -> NaiveTime {
        self.open
    }

    #[must_use]
    pub const fn close(&self) -> NaiveTime {
        self.close
    }

    #[must_use]
    pub const fn force_exit(&self) -> NaiveTime {
        self.force_exit
    }

    #[must_use]
    pub fn with_force_exit(mut self, force_exit: NaiveTime) -> Self {
        self.force_exit = force_exit;
        self
    }

    /// Trading-day key for an instant.
    #[must_use]
    pub fn trading_day(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    #[must_use]
    pub fn local_time(&self, now: DateTime<Utc>) -> NaiveTime {
        now.with_timezone(&self.tz).time()
    }

    #[must_use]
    pub fn is_past_force_exit(&self, now: DateTime<Utc>) -> bool {
        self.local_time(now) >= self.force_exit
    }

    #[must_use]
    pub fn is_session_open(&self, now: DateTime<Utc>) -> bool {
        let t = self.local_time(now);
        self.open <= t && t <= self.close
    }

    /// Converts an exchange-local wall-clock time to UTC.
    ///
    /// On a DST fall-back the earlier instant wins.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` when the local time does not exist
    /// (spring-forward gap).
    pub fn at(&self, date: NaiveDate, time: NaiveTime) -> CoreResult<DateTime<Utc>> {
        self.tz
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| {
                CoreError::config(format!("{date} {time} does not exist in {}", self.tz))
            })
    }
}

/// Parses `HH:MM`, `HHMM` or `HH:MM:SS`.
///
/// # Errors
///
/// Returns `CoreError::Configuration` on anything else.
pub fn parse_clock_time(raw: &str) -> CoreResult<NaiveTime> {
    let raw = raw.trim();
    let parsed = if raw.len() == 4 && raw.chars().all(|c| c.is_ascii_digit()) {
        NaiveTime::parse_from_str(raw, "%H%M")
    } else if raw.matches(':').count() == 2 {
        NaiveTime::parse_from_str(raw, "%H:%M:%S")
    } else {
        NaiveTime::parse_from_str(raw, "%H:%M")
    };
    parsed.map_err(|e| CoreError::config(format!("invalid clock time {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn trading_day_uses_exchange_zone() {
        let clock = MarketClock::new_york();
        // 02:00 UTC on the 11th is still the 10th in New York.
        let day = clock.trading_day(utc(2025, 3, 11, 2, 0));
        assert_eq!(day, NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
    }

    #[test]
    fn force_exit_is_inclusive() {
        let clock = MarketClock::new_york();
        let date = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        let cutoff = clock.at(date, clock.force_exit()).unwrap();
        assert!(clock.is_past_force_exit(cutoff));
        assert!(!clock.is_past_force_exit(cutoff - chrono::Duration::minutes(1)));
    }

    #[test]
    fn local_round_trip_across_dst() {
        let clock = MarketClock::new_york();
        // Summer: EDT is UTC-4.
        let summer = clock
            .at(
                NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
                NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            )
            .unwrap();
        assert_eq!(summer, utc(2025, 7, 1, 14, 0));
        // Winter: EST is UTC-5.
        let winter = clock
            .at(
                NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
                NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            )
            .unwrap();
        assert_eq!(winter, utc(2025, 1, 2, 15, 0));
    }

    #[test]
    fn parses_clock_formats() {
        let t = NaiveTime::from_hms_opt(14, 15, 0).unwrap();
        assert_eq!(parse_clock_time("14:15").unwrap(), t);
        assert_eq!(parse_clock_time("1415").unwrap(), t);
        assert_eq!(parse_clock_time("14:15:00").unwrap(), t);
        assert!(parse_clock_time("quarter past two").is_err());
    }
}
