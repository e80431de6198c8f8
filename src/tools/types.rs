//! Tool types for NutriChat
//!
//! This module defines the core types for tool execution: the `Tool` trait
//! every tool implements, the `ToolContext` passed to each invocation, and the
//! `ToolOutput` a tool hands back to the dispatcher.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::intent::ToolGroup;

use super::call::ToolCall;

/// How a tool relates to the food/weight ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Stages a pending confirmation. Never writes the ledger.
    Proposal,
    /// Writes the ledger from a staged confirmation.
    Commit,
    /// Reads state, or updates profile settings outside the ledger.
    Read,
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Proposal => write!(f, "proposal"),
            Self::Commit => write!(f, "commit"),
            Self::Read => write!(f, "read"),
        }
    }
}

/// Side effect a tool invocation had, as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolEffect {
    None,
    /// A pending confirmation was saved.
    Proposed { confirmation_id: String },
    /// A ledger entry was written and the confirmation resolved.
    Committed {
        confirmation_id: String,
        entry_id: String,
    },
    /// The write was skipped as a likely or certain repeat.
    Duplicate { confirmation_id: Option<String> },
    /// Image analysis found no food; nothing was staged.
    NoFoodDetected,
}

/// Result of a tool execution.
///
/// `for_llm` is always a JSON document the model can read back.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub for_llm: String,
    pub effect: ToolEffect,
    pub is_error: bool,
}

impl ToolOutput {
    /// Plain structured result with no side effect.
    ///
    /// # Example
    /// ```
    /// use nutrichat::tools::{ToolEffect, ToolOutput};
    /// use serde_json::json;
    ///
    /// let output = ToolOutput::json(&json!({"ok": true}));
    /// assert_eq!(output.for_llm, r#"{"ok":true}"#);
    /// assert_eq!(output.effect, ToolEffect::None);
    /// ```
    pub fn json(value: &Value) -> Self {
        Self {
            for_llm: value.to_string(),
            effect: ToolEffect::None,
            is_error: false,
        }
    }

    pub fn with_effect(value: &Value, effect: ToolEffect) -> Self {
        Self {
            for_llm: value.to_string(),
            effect,
            is_error: false,
        }
    }

    /// A tool-level error the model should see and recover from.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            for_llm: serde_json::json!({ "error": message.into() }).to_string(),
            effect: ToolEffect::None,
            is_error: true,
        }
    }
}

/// Trait that all tools implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's name (must be unique and match a [`ToolCall`] variant).
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the arguments.
    fn parameters(&self) -> Value;

    fn kind(&self) -> ToolKind;

    /// Selection group the tool belongs to.
    fn group(&self) -> ToolGroup;

    /// Execute a validated call.
    async fn execute(&self, call: ToolCall, ctx: &ToolContext) -> Result<ToolOutput>;
}

/// Per-invocation context.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub user_id: String,
    pub thread_id: String,
    pub tool_call_id: String,
    /// Image attached to the user's message
    pub image_ref: Option<String>,
    /// The user's message text, used as a hint for image analysis
    pub user_message: Option<String>,
    /// Current time in the user's offset
    pub local_now: DateTime<FixedOffset>,
}

impl ToolContext {
    pub fn new(user_id: &str, thread_id: &str, local_now: DateTime<FixedOffset>) -> Self {
        Self {
            user_id: user_id.to_string(),
            thread_id: thread_id.to_string(),
            tool_call_id: String::new(),
            image_ref: None,
            user_message: None,
            local_now,
        }
    }

    pub fn with_tool_call_id(mut self, id: &str) -> Self {
        self.tool_call_id = id.to_string();
        self
    }

    pub fn with_image(mut self, image_ref: Option<&str>) -> Self {
        self.image_ref = image_ref.map(str::to_string);
        self
    }

    pub fn with_message(mut self, message: &str) -> Self {
        if !message.trim().is_empty() {
            self.user_message = Some(message.to_string());
        }
        self
    }

    /// The user's local calendar date.
    pub fn today(&self) -> NaiveDate {
        self.local_now.date_naive()
    }

    pub fn now_utc(&self) -> DateTime<Utc> {
        self.local_now.with_timezone(&Utc)
    }
}
