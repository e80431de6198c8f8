//! Error types for NutriChat
//!
//! This module defines all error types used by the orchestration core.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.
//!
//! Internal errors never reach the end user verbatim. Every variant maps to one
//! of a handful of friendly assistant messages via [`NutriError::user_message`].

use thiserror::Error;

// ============================================================================
// User-facing fallback messages
// ============================================================================

/// Generic retry message shown when a turn fails for an internal reason.
pub const FALLBACK_RETRY: &str =
    "Sorry, something went wrong on my side. Could you send that again in a moment?";

/// Shown when a confirmed action could not be written to the log.
pub const FALLBACK_LOGGING: &str =
    "I had trouble logging that, could you repeat what you had?";

/// Shown when a commit was skipped because the same entry was just logged.
pub const FALLBACK_DUPLICATE: &str =
    "Looks like that's already in your log, so I didn't add it twice.";

/// Shown when the caller has no identity.
pub const FALLBACK_SIGN_IN: &str = "Please sign in again to keep chatting.";

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for NutriChat operations.
#[derive(Error, Debug)]
pub enum NutriError {
    /// No user identity was supplied for the turn. Fatal before any store access.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Rebuilding a context cache entry failed. Propagated, never masked.
    #[error("Cache rebuild failed for {key}: {message}")]
    CacheRebuild { key: String, message: String },

    /// A tool ran but could not complete its work.
    #[error("Tool error in {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    /// Tool arguments failed schema or range validation.
    #[error("Invalid arguments for {tool}: {message}")]
    InvalidToolCall { tool: String, message: String },

    /// The model asked for a tool that does not exist.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// A write batch precondition did not hold (concurrent modification).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Resource not found (threads, confirmations, documents).
    #[error("Not found: {0}")]
    NotFound(String),

    /// LLM capability failures.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Vision capability failures.
    #[error("Vision error: {0}")]
    Vision(String),

    /// Embedding capability failures.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Underlying store failures.
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration-related errors (invalid config, bad values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NutriError {
    /// Build a [`NutriError::CacheRebuild`] from any displayable cause.
    pub fn cache_rebuild(key: impl std::fmt::Display, cause: impl std::fmt::Display) -> Self {
        NutriError::CacheRebuild {
            key: key.to_string(),
            message: cause.to_string(),
        }
    }

    /// Build a [`NutriError::ToolExecution`].
    pub fn tool(tool: &str, message: impl Into<String>) -> Self {
        NutriError::ToolExecution {
            tool: tool.to_string(),
            message: message.into(),
        }
    }

    /// Build a [`NutriError::InvalidToolCall`].
    pub fn invalid_args(tool: &str, message: impl Into<String>) -> Self {
        NutriError::InvalidToolCall {
            tool: tool.to_string(),
            message: message.into(),
        }
    }

    /// The friendly assistant message this error collapses to.
    ///
    /// Raw error text is never returned from here.
    pub fn user_message(&self) -> &'static str {
        match self {
            NutriError::Authentication(_) => FALLBACK_SIGN_IN,
            NutriError::ToolExecution { .. } | NutriError::Conflict(_) => FALLBACK_LOGGING,
            _ => FALLBACK_RETRY,
        }
    }

    /// Whether retrying the same turn could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            NutriError::Authentication(_)
                | NutriError::InvalidToolCall { .. }
                | NutriError::UnknownTool(_)
                | NutriError::Config(_)
        )
    }
}

/// A specialized `Result` type for NutriChat operations.
pub type Result<T> = std::result::Result<T, NutriError>;
