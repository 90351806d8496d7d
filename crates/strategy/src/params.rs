//! Typed access to a binding's loosely-typed parameter map.
//!
//! Every variant declares the keys it understands; anything else, a value of
//! the wrong type, or a value outside its range is a configuration error.

use std::str::FromStr;

use chrono::NaiveTime;
use deltadesk_core::clock::parse_clock_time;
use deltadesk_core::{CoreError, CoreResult, StrategyParams};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

pub struct ParamReader<'a> {
    strategy: &'static str,
    params: &'a StrategyParams,
}

impl<'a> ParamReader<'a> {
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` naming the first unknown key.
    pub fn new(
        strategy: &'static str,
        params: &'a StrategyParams,
        known: &[&str],
    ) -> CoreResult<Self> {
        if let Some(unknown) = params.keys().find(|k| !known.contains(&k.as_str())) {
            return Err(CoreError::config(format!(
                "{strategy}: unknown parameter '{unknown}' (expected one of {})",
                known.join(", ")
            )));
        }
        Ok(Self { strategy, params })
    }

    fn invalid(&self, key: &str, why: impl std::fmt::Display) -> CoreError {
        CoreError::config(format!("{}: parameter '{key}' {why}", self.strategy))
    }

    fn decimal_of(&self, key: &str, value: &Value) -> CoreResult<Decimal> {
        match value {
            Value::Number(n) => Decimal::from_str(&n.to_string())
                .or_else(|_| Decimal::from_scientific(&n.to_string()))
                .map_err(|e| self.invalid(key, e)),
            Value::String(s) => Decimal::from_str(s.trim()).map_err(|e| self.invalid(key, e)),
            other => Err(self.invalid(key, format!("must be a number, got {other}"))),
        }
    }

    /// Whole number `>= min`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` for fractions, negatives or values below `min`.
    pub fn count(&self, key: &str, default: u64, min: u64) -> CoreResult<u64> {
        let Some(value) = self.params.get(key) else {
            return Ok(default);
        };
        let parsed = self.decimal_of(key, value)?;
        if !parsed.fract().is_zero() {
            return Err(self.invalid(key, "must be a whole number"));
        }
        let n = parsed
            .to_u64()
            .ok_or_else(|| self.invalid(key, "must be non-negative"))?;
        if n < min {
            return Err(self.invalid(key, format!("must be >= {min}, got {n}")));
        }
        Ok(n)
    }

    /// Decimal strictly greater than zero.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` when not a positive number.
    pub fn positive_decimal(&self, key: &str, default: Decimal) -> CoreResult<Decimal> {
        let Some(value) = self.params.get(key) else {
            return Ok(default);
        };
        let parsed = self.decimal_of(key, value)?;
        if parsed <= Decimal::ZERO {
            return Err(self.invalid(key, format!("must be > 0, got {parsed}")));
        }
        Ok(parsed)
    }

    /// Ratio in the open interval (0, 1).
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` when outside the interval.
    pub fn fraction(&self, key: &str, default: f64) -> CoreResult<f64> {
        let Some(value) = self.params.get(key) else {
            return Ok(default);
        };
        let parsed = self
            .decimal_of(key, value)?
            .to_f64()
            .ok_or_else(|| self.invalid(key, "is not representable"))?;
        if parsed <= 0.0 || parsed >= 1.0 {
            return Err(self.invalid(key, format!("must be in (0, 1), got {parsed}")));
        }
        Ok(parsed)
    }

    /// # Errors
    ///
    /// Returns `CoreError::Configuration` when not a non-empty string.
    pub fn text(&self, key: &str, default: &str) -> CoreResult<String> {
        match self.params.get(key) {
            None => Ok(default.to_string()),
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            Some(other) => Err(self.invalid(key, format!("must be a non-empty string, got {other}"))),
        }
    }

    /// Upper-cased ticker symbol.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` when not a non-empty string.
    pub fn symbol(&self, key: &str, default: &str) -> CoreResult<String> {
        self.text(key, default).map(|s| s.to_uppercase())
    }

    /// Exchange-local clock time.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` when the value does not parse.
    pub fn clock_time(&self, key: &str, default: NaiveTime) -> CoreResult<NaiveTime> {
        match self.params.get(key) {
            None => Ok(default),
            Some(Value::String(s)) => parse_clock_time(s).map_err(|e| self.invalid(key, e)),
            Some(other) => Err(self.invalid(key, format!("must be a HH:MM string, got {other}"))),
        }
    }

    /// Value parsed through `FromStr`, for small enumerations.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` when the string is not recognised.
    pub fn choice<T>(&self, key: &str, default: T) -> CoreResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.params.get(key) {
            None => Ok(default),
            Some(Value::String(s)) => s.parse::<T>().map_err(|e| self.invalid(key, e)),
            Some(other) => Err(self.invalid(key, format!("must be a string, got {other}"))),
        }
    }
}
