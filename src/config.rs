// src/config.rs
//! Runtime settings, read from JSON. Missing fields take their defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between transfer recording passes.
    pub refresh_interval_secs: u64,
    /// Run one last recording pass when the refresher is shut down.
    pub record_on_shutdown: bool,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 3600,
            record_on_shutdown: true,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.refresh_interval_secs == 0 {
            return Err(Error::Config("refresh_interval_secs must be positive".to_string()));
        }
        if self.log_level.parse::<tracing::Level>().is_err() {
            return Err(Error::Config(format!("unknown log level '{}'", self.log_level)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config = Config::from_json(r#"{"refresh_interval_secs": 60}"#).unwrap();
        assert_eq!(config.refresh_interval(), Duration::from_secs(60));
        assert!(config.record_on_shutdown);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn rejects_zero_interval_and_bad_level() {
        assert!(matches!(
            Config::from_json(r#"{"refresh_interval_secs": 0}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_json(r#"{"log_level": "loud"}"#),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(Config::from_json("{"), Err(Error::Config(_))));
    }
}
