//! Configuration type definitions for NutriChat
//!
//! This module defines all configuration structs used by the orchestration core.
//! All types implement serde traits for JSON serialization and have sensible defaults.

use serde::{Deserialize, Serialize};

/// Main configuration struct for NutriChat
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Agent configuration (model, tokens, tool loop, tool minimization)
    pub agent: AgentSettings,
    /// Context cache TTLs
    pub cache: CacheConfig,
    /// Confirmation and duplicate-guard settings
    pub confirmations: ConfirmationConfig,
    /// Document store settings
    pub store: StoreConfig,
    /// Logging output settings
    pub logging: LoggingConfig,
}

// ============================================================================
// Agent Configuration
// ============================================================================

/// Default agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Model identifier passed through to the LLM capability
    pub model: String,
    /// Maximum tokens for responses
    pub max_tokens: u32,
    /// Temperature for generation
    pub temperature: f32,
    /// Maximum model round-trips per turn (initial call included)
    pub max_tool_iterations: u32,
    /// Send only the tools selected from detected intents. When false the
    /// full registry is sent on every turn.
    pub minimize_tools: bool,
    /// UTC offset used for users without a stored timezone
    pub default_utc_offset_minutes: i32,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
            temperature: 0.4,
            max_tool_iterations: 4,
            minimize_tools: true,
            default_utc_offset_minutes: 0,
        }
    }
}

// ============================================================================
// Cache Configuration
// ============================================================================

/// Per-key time-to-live for context cache entries, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub core_stats_ttl_secs: u64,
    pub profile_ttl_secs: u64,
    pub preferences_ttl_secs: u64,
    pub weight_trend_ttl_secs: u64,
    pub today_food_log_ttl_secs: u64,
    pub thread_context_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            core_stats_ttl_secs: 5 * 60,
            profile_ttl_secs: 7 * 24 * 60 * 60,
            preferences_ttl_secs: 30 * 24 * 60 * 60,
            weight_trend_ttl_secs: 24 * 60 * 60,
            today_food_log_ttl_secs: 10 * 60,
            thread_context_ttl_secs: 2 * 60,
        }
    }
}

// ============================================================================
// Confirmation Configuration
// ============================================================================

/// Duplicate-commit heuristic settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Window in which a near-identical commit is treated as a duplicate
    pub duplicate_window_secs: u64,
    /// Upper bound on tracked duplicate-guard entries
    pub duplicate_max_entries: usize,
    /// Calories are rounded to this step before comparison
    pub calorie_rounding: u32,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            duplicate_window_secs: 30,
            duplicate_max_entries: 1024,
            calorie_rounding: 10,
        }
    }
}

// ============================================================================
// Store Configuration
// ============================================================================

/// Document store settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON snapshot path. `None` keeps everything in memory.
    pub path: Option<String>,
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human readable output
    Pretty,
    /// Compact single-line output, grep-friendly
    #[default]
    Component,
    /// JSON lines for log aggregators
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Optional file to append logs to (JSON format only)
    pub file: Option<String>,
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            file: None,
            level: "info".to_string(),
        }
    }
}
