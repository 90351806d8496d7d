use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration by merging TOML, `DELTADESK_` environment variables, and JSON.
    ///
    /// Nested keys use a double underscore, e.g. `DELTADESK_BROKER__TRADING_ENABLED=true`.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be parsed or a value is invalid.
    pub fn load() -> Result<AppConfig> {
        Self::load_from("config/Config.toml")
    }

    /// Loads configuration rooted at an explicit TOML path.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be parsed or a value is invalid.
    pub fn load_from(toml_path: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::from(figment::providers::Serialized::defaults(
            AppConfig::default(),
        ))
        .merge(Toml::file(toml_path))
        .merge(Env::prefixed("DELTADESK_").split("__"))
        .join(Json::file("config/Config.json"))
        .extract()?;

        config.validate()?;
        tracing::debug!(path = toml_path, "configuration loaded");
        Ok(config)
    }

    /// Loads configuration with a profile overlay (`config/Config.<profile>.toml`).
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be parsed or a value is invalid.
    pub fn load_with_profile(profile: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::from(figment::providers::Serialized::defaults(
            AppConfig::default(),
        ))
        .merge(Toml::file("config/Config.toml"))
        .merge(Toml::file(format!("config/Config.{profile}.toml")))
        .merge(Env::prefixed("DELTADESK_").split("__"))
        .join(Json::file("config/Config.json"))
        .extract()?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_fall_back_to_defaults() {
        let config = ConfigLoader::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config.market.timezone, "America/New_York");
        assert!(!config.broker.trading_enabled);
    }
}
