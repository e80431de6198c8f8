//! Tools module - Tool definitions and execution for LLM function calling
//!
//! This module provides the tools the model can call during a turn and the
//! machinery that runs them.
//!
//! # Overview
//!
//! - `Tool` trait: The interface that all tools must implement
//! - `ToolCall`: Typed, validated invocation parsed from the model's raw call
//! - `ToolContext`: Execution context (user, thread, tool call id, local time)
//! - `ToolRegistry`: Central registry for managing and executing tools
//! - `ToolDispatcher`: Runs one model response's calls in order
//!
//! # Built-in Tools
//!
//! Proposal tools stage a pending confirmation and never touch the ledger:
//! `confirm_food`, `confirm_weight`, `analyze_and_confirm_photo`.
//!
//! Commit tools write the staged payload to the ledger, at most once per
//! confirmation: `log_food`, `log_weight`.
//!
//! Read and settings tools: `get_progress`, `search_foods`, `update_goals`.

pub mod call;
pub mod commit;
pub mod dispatch;
pub mod duplicate;
pub mod food;
pub mod goals;
pub mod photo;
pub mod progress;
mod registry;
pub mod search;
mod types;
pub mod weight;

#[cfg(test)]
pub(crate) mod testing;

pub use call::ToolCall;
pub use commit::{CommitOutcome, Committer, DuplicateReason};
pub use dispatch::{DispatchOutcome, ExecutedToolCall, ToolDispatcher};
pub use duplicate::{DuplicateGuard, DuplicateKey};
pub use registry::ToolRegistry;
pub use types::{Tool, ToolContext, ToolEffect, ToolKind, ToolOutput};

use std::sync::Arc;

use crate::cache::ContextCache;
use crate::confirmations::ConfirmationStore;
use crate::providers::{EmbeddingProvider, VisionProvider};
use crate::store::Store;

/// Services the built-in tools depend on.
#[derive(Clone)]
pub struct ToolServices {
    pub store: Arc<dyn Store>,
    pub cache: Arc<ContextCache>,
    pub confirmations: Arc<ConfirmationStore>,
    pub committer: Arc<Committer>,
    pub vision: Arc<dyn VisionProvider>,
    pub embeddings: Arc<dyn EmbeddingProvider>,
}

/// Registry holding every built-in tool.
pub fn default_registry(services: &ToolServices) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(food::ConfirmFoodTool::new(
        services.confirmations.clone(),
    )));
    registry.register(Box::new(food::LogFoodTool::new(
        services.confirmations.clone(),
        services.committer.clone(),
    )));
    registry.register(Box::new(weight::ConfirmWeightTool::new(
        services.confirmations.clone(),
    )));
    registry.register(Box::new(weight::LogWeightTool::new(
        services.confirmations.clone(),
        services.committer.clone(),
    )));
    registry.register(Box::new(photo::AnalyzeAndConfirmPhotoTool::new(
        services.vision.clone(),
        services.confirmations.clone(),
    )));
    registry.register(Box::new(progress::GetProgressTool::new(
        services.cache.clone(),
    )));
    registry.register(Box::new(search::SearchFoodsTool::new(
        services.embeddings.clone(),
    )));
    registry.register(Box::new(goals::UpdateGoalsTool::new(services.store.clone())));
    registry
}
