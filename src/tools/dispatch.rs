//! Tool dispatch
//!
//! Runs the tool calls of one model response in order. Each raw call is
//! parsed into a [`ToolCall`] first; unknown names and bad arguments never
//! reach a tool. Tool-level failures become error results the model can read
//! on its next round-trip. Failures of shared infrastructure (store, cache
//! rebuild) abort the turn instead.
//!
//! A commit is refused when a proposal was staged earlier in the same turn:
//! the user has not seen that proposal yet, so nothing can have confirmed it.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, warn};

use super::call::ToolCall;
use super::registry::ToolRegistry;
use super::types::{ToolContext, ToolEffect, ToolKind, ToolOutput};
use crate::error::{NutriError, Result};
use crate::providers::{LLMToolCall, ToolResultMessage};

/// What one tool call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// A confirmation was staged.
    Proposed { confirmation_id: String },
    /// The ledger was written.
    Committed {
        confirmation_id: String,
        entry_id: String,
    },
    /// A commit was skipped as a repeat.
    Duplicate { confirmation_id: Option<String> },
    /// Photo analysis found no food.
    NoFood,
    /// Read or settings tool ran.
    Read,
    /// The call was rejected or the tool failed.
    Failed { message: String },
}

/// A tool call together with what came of it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
    /// Whether the tool writes the ledger
    pub is_commit: bool,
    pub outcome: DispatchOutcome,
    #[serde(skip)]
    pub result: ToolResultMessage,
}

impl ExecutedToolCall {
    pub fn committed(&self) -> bool {
        matches!(self.outcome, DispatchOutcome::Committed { .. })
    }

    pub fn failed(&self) -> bool {
        matches!(self.outcome, DispatchOutcome::Failed { .. })
    }

    /// Whether this call alone settles the turn's outcome: a commit attempt,
    /// a staged proposal or a skipped duplicate.
    pub fn settles_turn(&self) -> bool {
        self.is_commit
            || matches!(
                self.outcome,
                DispatchOutcome::Proposed { .. }
                    | DispatchOutcome::Committed { .. }
                    | DispatchOutcome::Duplicate { .. }
            )
    }
}

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute `calls` sequentially with `ctx` as the base context.
    ///
    /// `staged_this_turn` is whether an earlier round-trip of the same turn
    /// already staged a proposal.
    pub async fn dispatch(
        &self,
        calls: &[LLMToolCall],
        ctx: &ToolContext,
        staged_this_turn: bool,
    ) -> Result<Vec<ExecutedToolCall>> {
        let mut staged = staged_this_turn;
        let mut executed = Vec::with_capacity(calls.len());
        for raw in calls {
            let call = self.dispatch_one(raw, ctx, staged).await?;
            staged |= matches!(call.outcome, DispatchOutcome::Proposed { .. });
            executed.push(call);
        }
        Ok(executed)
    }

    async fn dispatch_one(
        &self,
        raw: &LLMToolCall,
        ctx: &ToolContext,
        staged: bool,
    ) -> Result<ExecutedToolCall> {
        let is_commit = self
            .registry
            .get(&raw.name)
            .map(|t| t.kind() == ToolKind::Commit)
            .unwrap_or(false);

        if is_commit && staged {
            warn!(
                user_id = %ctx.user_id,
                thread_id = %ctx.thread_id,
                tool = %raw.name,
                "Refused commit of a proposal staged in the same turn"
            );
            let e = NutriError::tool(
                &raw.name,
                "the proposal was staged in this turn and the user has not confirmed it yet; ask them first",
            );
            return Ok(failed(raw, is_commit, &e));
        }

        let call = match ToolCall::parse(&raw.name, &raw.arguments) {
            Ok(call) => call,
            Err(e) => {
                warn!(
                    user_id = %ctx.user_id,
                    thread_id = %ctx.thread_id,
                    tool = %raw.name,
                    error = %e,
                    "Rejected tool call"
                );
                return Ok(failed(raw, is_commit, &e));
            }
        };

        let tool_ctx = ctx.clone().with_tool_call_id(&raw.id);
        match self.registry.execute_with_context(call, &tool_ctx).await {
            Ok(output) => Ok(completed(raw, is_commit, output)),
            Err(e) if aborts_turn(&e) => Err(e),
            Err(e) => {
                error!(
                    user_id = %ctx.user_id,
                    thread_id = %ctx.thread_id,
                    tool = %raw.name,
                    error = %e,
                    "Tool call failed"
                );
                Ok(failed(raw, is_commit, &e))
            }
        }
    }
}

/// Errors that must fail the whole turn rather than be shown to the model.
fn aborts_turn(e: &NutriError) -> bool {
    matches!(
        e,
        NutriError::CacheRebuild { .. } | NutriError::Authentication(_)
    )
}

fn completed(raw: &LLMToolCall, is_commit: bool, output: ToolOutput) -> ExecutedToolCall {
    let outcome = if output.is_error {
        DispatchOutcome::Failed {
            message: output.for_llm.clone(),
        }
    } else {
        match output.effect {
            ToolEffect::Proposed { confirmation_id } => DispatchOutcome::Proposed { confirmation_id },
            ToolEffect::Committed {
                confirmation_id,
                entry_id,
            } => DispatchOutcome::Committed {
                confirmation_id,
                entry_id,
            },
            ToolEffect::Duplicate { confirmation_id } => DispatchOutcome::Duplicate { confirmation_id },
            ToolEffect::NoFoodDetected => DispatchOutcome::NoFood,
            ToolEffect::None => DispatchOutcome::Read,
        }
    };
    ExecutedToolCall {
        id: raw.id.clone(),
        name: raw.name.clone(),
        arguments: raw.arguments.clone(),
        is_commit,
        outcome,
        result: ToolResultMessage {
            tool_call_id: raw.id.clone(),
            name: raw.name.clone(),
            content: output.for_llm,
            is_error: output.is_error,
        },
    }
}

fn failed(raw: &LLMToolCall, is_commit: bool, e: &NutriError) -> ExecutedToolCall {
    let output = ToolOutput::error(e.to_string());
    ExecutedToolCall {
        id: raw.id.clone(),
        name: raw.name.clone(),
        arguments: raw.arguments.clone(),
        is_commit,
        outcome: DispatchOutcome::Failed {
            message: e.to_string(),
        },
        result: ToolResultMessage {
            tool_call_id: raw.id.clone(),
            name: raw.name.clone(),
            content: output.for_llm,
            is_error: true,
        },
    }
}
