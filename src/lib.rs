//! NutriChat - Conversational orchestration core for a chat-driven nutrition coach

pub mod agent;
pub mod cache;
pub mod clock;
pub mod config;
pub mod confirmations;
pub mod domain;
pub mod error;
pub mod intent;
pub mod providers;
pub mod store;
pub mod threads;
pub mod tools;
pub mod utils;

pub use agent::{TurnOrchestrator, TurnOutcome, TurnResponse};
pub use cache::{CacheEvent, CacheKey, ContextCache};
pub use config::Config;
pub use confirmations::{ConfirmationPayload, ConfirmationStatus, PendingConfirmation};
pub use error::{NutriError, Result};
pub use providers::{
    EmbeddingProvider, GenerateRequest, GenerateResponse, LLMProvider, LLMToolCall, VisionProvider,
    VisionResult,
};
pub use store::{MemoryStore, Store};
