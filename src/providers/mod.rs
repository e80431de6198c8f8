//! Providers module - model-backed capabilities consumed by the core
//!
//! The orchestration core never talks to a model API directly. It depends on
//! three narrow traits, implemented outside this crate:
//!
//! - [`LLMProvider`]: `create_thread` and `generate`
//! - [`VisionProvider`]: `analyze(image_ref, hint)`
//! - [`EmbeddingProvider`]: `embed` and `search_similar`

mod types;

pub use types::{
    EmbeddingProvider, GenerateOptions, GenerateRequest, GenerateResponse, LLMProvider,
    LLMToolCall, SimilarRecord, ToolDefinition, ToolResultMessage, VisionProvider, VisionResult,
};
