//! Shared wiring: configuration, file-backed store and provider, runtime.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use deltadesk_agent::AgentRuntime;
use deltadesk_core::{AppConfig, CancelFlag, ConfigLoader, StrategyParams};
use deltadesk_data::{FileSnapshotProvider, JsonFileStore};
use serde::Serialize;
use serde_json::Value;

pub struct Context {
    pub config: AppConfig,
    pub runtime: AgentRuntime,
}

impl Context {
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the state file
    /// cannot be opened.
    pub fn open(config_path: &str, profile: Option<&str>) -> Result<Self> {
        let config = match profile {
            Some(p) => ConfigLoader::load_with_profile(p)?,
            None => ConfigLoader::load_from(config_path)?,
        };
        let clock = config.market.clock()?;
        let store = JsonFileStore::open(&config.storage.state_path)
            .with_context(|| format!("opening state file {}", config.storage.state_path))?;
        let provider = FileSnapshotProvider::new(&config.storage.data_dir, clock);
        let runtime = AgentRuntime::new(config.clone(), Arc::new(store), Arc::new(provider))?;
        Ok(Self { config, runtime })
    }
}

/// Cancels the flag on Ctrl-C so long runs stop at the next checkpoint.
#[must_use]
pub fn cancel_on_ctrl_c() -> CancelFlag {
    let cancel = CancelFlag::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling at next checkpoint");
            on_signal.cancel();
        }
    });
    cancel
}

/// Parses repeated `key=value` flags. Values are read as JSON when they
/// parse, otherwise kept as strings.
///
/// # Errors
///
/// Returns an error for entries without `=`.
pub fn parse_params(raw: &[String]) -> Result<StrategyParams> {
    let mut params = StrategyParams::new();
    for entry in raw {
        let (key, value) = entry
            .split_once('=')
            .with_context(|| format!("parameter '{entry}' is not key=value"))?;
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        params.insert(key.trim().to_string(), value);
    }
    Ok(params)
}

/// # Errors
///
/// Returns an error if `value` cannot be serialized.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_keep_json_types() {
        let params = parse_params(&[
            "fast=5".to_string(),
            "ticker=qqq".to_string(),
            "target_delta=0.15".to_string(),
        ])
        .unwrap();
        assert_eq!(params["fast"], json!(5));
        assert_eq!(params["ticker"], json!("qqq"));
        assert_eq!(params["target_delta"], json!(0.15));
    }

    #[test]
    fn params_need_an_equals_sign() {
        assert!(parse_params(&["fast".to_string()]).is_err());
    }
}
