//! Configuration management for NutriChat
//!
//! This module provides configuration loading and validation.
//! Configuration is loaded from `~/.nutrichat/config.json` with environment variable overrides.

mod types;
pub mod validate;

pub use types::*;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheKey;
use crate::error::{NutriError, Result};

impl Config {
    /// Returns the NutriChat configuration directory path (~/.nutrichat)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".nutrichat")
    }

    /// Returns the path to the config file (~/.nutrichat/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    /// Environment variables can override config values using the pattern:
    /// `NUTRICHAT_SECTION_KEY`
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables follow the pattern: NUTRICHAT_SECTION_KEY
    fn apply_env_overrides(&mut self) {
        // Agent
        if let Ok(val) = std::env::var("NUTRICHAT_AGENT_MODEL") {
            self.agent.model = val;
        }
        if let Some(v) = env_parse("NUTRICHAT_AGENT_MAX_TOKENS") {
            self.agent.max_tokens = v;
        }
        if let Some(v) = env_parse("NUTRICHAT_AGENT_TEMPERATURE") {
            self.agent.temperature = v;
        }
        if let Some(v) = env_parse("NUTRICHAT_AGENT_MAX_TOOL_ITERATIONS") {
            self.agent.max_tool_iterations = v;
        }
        if let Some(v) = env_parse("NUTRICHAT_AGENT_MINIMIZE_TOOLS") {
            self.agent.minimize_tools = v;
        }
        if let Some(v) = env_parse("NUTRICHAT_AGENT_DEFAULT_UTC_OFFSET_MINUTES") {
            self.agent.default_utc_offset_minutes = v;
        }

        // Confirmations
        if let Some(v) = env_parse("NUTRICHAT_CONFIRMATIONS_DUPLICATE_WINDOW_SECS") {
            self.confirmations.duplicate_window_secs = v;
        }

        // Store
        if let Ok(val) = std::env::var("NUTRICHAT_STORE_PATH") {
            self.store.path = if val.is_empty() { None } else { Some(val) };
        }

        // Logging
        if let Ok(val) = std::env::var("NUTRICHAT_LOGGING_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Check invariants the runtime relies on.
    pub fn validate(&self) -> Result<()> {
        for key in CacheKey::all() {
            if self.cache_ttl(key).is_zero() {
                return Err(NutriError::Config(format!(
                    "cache TTL for {} must be greater than zero",
                    key
                )));
            }
        }
        if self.confirmations.duplicate_window_secs == 0 {
            return Err(NutriError::Config(
                "confirmations.duplicate_window_secs must be greater than zero".into(),
            ));
        }
        if self.confirmations.calorie_rounding == 0 {
            return Err(NutriError::Config(
                "confirmations.calorie_rounding must be greater than zero".into(),
            ));
        }
        if self.agent.max_tool_iterations == 0 {
            return Err(NutriError::Config(
                "agent.max_tool_iterations must be at least 1".into(),
            ));
        }
        if self.agent.default_utc_offset_minutes.abs() > 14 * 60 {
            return Err(NutriError::Config(
                "agent.default_utc_offset_minutes is outside -840..=840".into(),
            ));
        }
        Ok(())
    }

    /// Time-to-live for a cache key.
    pub fn cache_ttl(&self, key: CacheKey) -> Duration {
        let secs = match key {
            CacheKey::CoreStats => self.cache.core_stats_ttl_secs,
            CacheKey::Profile => self.cache.profile_ttl_secs,
            CacheKey::Preferences => self.cache.preferences_ttl_secs,
            CacheKey::WeightTrend => self.cache.weight_trend_ttl_secs,
            CacheKey::TodayFoodLog => self.cache.today_food_log_ttl_secs,
            CacheKey::ThreadContext => self.cache.thread_context_ttl_secs,
        };
        Duration::from_secs(secs)
    }

    /// Duplicate-guard window.
    pub fn duplicate_window(&self) -> Duration {
        Duration::from_secs(self.confirmations.duplicate_window_secs)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ttls() {
        let config = Config::default();
        assert_eq!(
            config.cache_ttl(CacheKey::CoreStats),
            Duration::from_secs(300)
        );
        assert_eq!(
            config.cache_ttl(CacheKey::TodayFoodLog),
            Duration::from_secs(600)
        );
        assert_eq!(
            config.cache_ttl(CacheKey::ThreadContext),
            Duration::from_secs(120)
        );
        assert_eq!(
            config.cache_ttl(CacheKey::WeightTrend),
            Duration::from_secs(86_400)
        );
        assert_eq!(
            config.cache_ttl(CacheKey::Preferences),
            Duration::from_secs(2_592_000)
        );
        assert_eq!(
            config.cache_ttl(CacheKey::Profile),
            Duration::from_secs(604_800)
        );
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut config = Config::default();
        config.cache.today_food_log_ttl_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("todayFoodLog"));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let mut config = Config::default();
        config.agent.max_tool_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"agent":{"model":"local-model"}}"#).unwrap();
        assert_eq!(config.agent.model, "local-model");
        assert_eq!(config.agent.max_tool_iterations, 4);
        assert_eq!(config.confirmations.duplicate_window_secs, 30);
        assert!(config.store.path.is_none());
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(&dir.path().join("absent.json")).unwrap();
        assert!(config.agent.minimize_tools);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"confirmations":{"duplicate_window_secs":45},"logging":{"format":"json"}}"#,
        )
        .unwrap();
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.confirmations.duplicate_window_secs, 45);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_load_invalid_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"cache":{"core_stats_ttl_secs":0}}"#).unwrap();
        assert!(Config::load_from_path(&path).is_err());
    }
}
