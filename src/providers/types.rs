//! Capability types for NutriChat
//!
//! This module defines the traits the orchestration core consumes from its
//! model-backed collaborators, and the request/response types that cross
//! those seams:
//!
//! - [`LLMProvider`]: thread creation and text generation with tool calls
//! - [`VisionProvider`]: food recognition on an uploaded image
//! - [`EmbeddingProvider`]: text embedding and similarity search

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::FoodItem;
use crate::error::Result;

// ============================================================================
// Tool definitions and calls
// ============================================================================

/// Definition of a tool that can be called by the LLM.
///
/// Tool definitions describe the available tools, their parameters,
/// and how the LLM should invoke them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    /// The name of the tool (must be unique)
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    ///
    /// # Example
    /// ```
    /// use nutrichat::providers::ToolDefinition;
    /// use serde_json::json;
    ///
    /// let tool = ToolDefinition::new(
    ///     "log_weight",
    ///     "Log the confirmed weight reading",
    ///     json!({"type": "object", "properties": {}}),
    /// );
    /// assert_eq!(tool.name, "log_weight");
    /// ```
    pub fn new(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// A tool call made by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LLMToolCall {
    /// Unique identifier for this tool call
    pub id: String,
    /// Name of the tool to execute
    pub name: String,
    /// JSON-encoded arguments for the tool
    pub arguments: String,
}

impl LLMToolCall {
    /// Create a new tool call.
    ///
    /// # Example
    /// ```
    /// use nutrichat::providers::LLMToolCall;
    ///
    /// let call = LLMToolCall::new("call_1", "confirm_food", r#"{"description": "banana"}"#);
    /// assert_eq!(call.name, "confirm_food");
    /// ```
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }
}

/// Result of a tool call, fed back to the model on the next round-trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultMessage {
    pub tool_call_id: String,
    pub name: String,
    pub content: String,
    pub is_error: bool,
}

// ============================================================================
// Generation
// ============================================================================

/// Options for generation requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateOptions {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl GenerateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// One model invocation on a thread.
///
/// The provider owns the conversation history of `thread_id`; the core only
/// sends the new user message (first round-trip of a turn) or the results of
/// the tools the model asked for (subsequent round-trips).
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub thread_id: String,
    pub system_prompt: String,
    /// Present on the first round-trip of a turn
    pub user_message: Option<String>,
    pub tools: Vec<ToolDefinition>,
    pub tool_results: Vec<ToolResultMessage>,
    pub options: GenerateOptions,
}

/// Response from a generation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GenerateResponse {
    /// Text content of the response
    pub text: String,
    /// Tool calls made by the LLM (if any)
    pub tool_calls: Vec<LLMToolCall>,
    /// Thread the response belongs to
    pub thread_id: String,
}

impl GenerateResponse {
    /// Create a simple text response with no tool calls.
    ///
    /// # Example
    /// ```
    /// use nutrichat::providers::GenerateResponse;
    ///
    /// let response = GenerateResponse::text("thread-1", "Hello!");
    /// assert!(!response.has_tool_calls());
    /// ```
    pub fn text(thread_id: &str, text: &str) -> Self {
        Self {
            text: text.to_string(),
            tool_calls: vec![],
            thread_id: thread_id.to_string(),
        }
    }

    /// Create a response with tool calls.
    pub fn with_tools(thread_id: &str, text: &str, tool_calls: Vec<LLMToolCall>) -> Self {
        Self {
            text: text.to_string(),
            tool_calls,
            thread_id: thread_id.to_string(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Conversational model capability.
///
/// Implement this trait to connect a model backend. The core treats it as a
/// black box: given a thread, instructions, a message and a tool registry it
/// returns text plus zero or more tool invocations.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Create a new conversation thread and return its id.
    async fn create_thread(&self, user_id: &str) -> Result<String>;

    /// Run one model round-trip on a thread.
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse>;

    /// Get the provider name.
    fn name(&self) -> &str;
}

// ============================================================================
// Vision
// ============================================================================

/// Outcome of image analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VisionResult {
    /// At least one food item was recognised.
    Foods {
        foods: Vec<FoodItem>,
        total_calories: f64,
        confidence: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// The image does not show food.
    NoFood,
    /// The capability could not analyse the image.
    Error { message: String },
}

/// Image analysis capability.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Analyse an uploaded image. `context_hint` carries any text the user
    /// sent with the photo.
    async fn analyze(&self, image_ref: &str, context_hint: Option<&str>) -> Result<VisionResult>;
}

// ============================================================================
// Embeddings
// ============================================================================

/// One similarity search hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarRecord {
    pub record: serde_json::Value,
    pub score: f32,
}

/// Text embedding capability.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn search_similar(&self, vector: &[f32], limit: usize) -> Result<Vec<SimilarRecord>>;
}
