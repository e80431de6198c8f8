//! Weight tools: stage a reading, then commit it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::call::{ToolCall, CONFIRM_WEIGHT, LOG_WEIGHT};
use super::commit::{execute_commit, Committer};
use super::food::pending_response;
use super::types::{Tool, ToolContext, ToolEffect, ToolKind, ToolOutput};
use crate::confirmations::{ConfirmationPayload, ConfirmationStore};
use crate::domain::WeightProposal;
use crate::error::{NutriError, Result};
use crate::intent::ToolGroup;

pub struct ConfirmWeightTool {
    confirmations: Arc<ConfirmationStore>,
}

impl ConfirmWeightTool {
    pub fn new(confirmations: Arc<ConfirmationStore>) -> Self {
        Self { confirmations }
    }
}

#[async_trait]
impl Tool for ConfirmWeightTool {
    fn name(&self) -> &str {
        CONFIRM_WEIGHT
    }

    fn description(&self) -> &str {
        "Propose a body-weight reading for the user to confirm. Nothing is logged until log_weight is called after a yes."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "weight": {"type": "number", "description": "The reading as the user said it"},
                "unit": {"type": "string", "enum": ["kg", "lb"], "default": "kg"},
                "note": {"type": "string"}
            },
            "required": ["weight"]
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Proposal
    }

    fn group(&self) -> ToolGroup {
        ToolGroup::Weight
    }

    async fn execute(&self, call: ToolCall, ctx: &ToolContext) -> Result<ToolOutput> {
        let ToolCall::ConfirmWeight(args) = call else {
            return Err(NutriError::invalid_args(CONFIRM_WEIGHT, "mismatched call"));
        };
        let proposal = WeightProposal {
            weight_kg: args.weight_kg(),
            note: args.note.filter(|n| !n.trim().is_empty()),
        };
        let shown = serde_json::to_value(&proposal)?;
        let record = self
            .confirmations
            .save(
                &ctx.thread_id,
                &ctx.user_id,
                &ctx.tool_call_id,
                ConfirmationPayload::Weight(proposal),
            )
            .await?;
        Ok(ToolOutput::with_effect(
            &pending_response(&record.id, &shown, LOG_WEIGHT),
            ToolEffect::Proposed {
                confirmation_id: record.id,
            },
        ))
    }
}

pub struct LogWeightTool {
    confirmations: Arc<ConfirmationStore>,
    committer: Arc<Committer>,
}

impl LogWeightTool {
    pub fn new(confirmations: Arc<ConfirmationStore>, committer: Arc<Committer>) -> Self {
        Self {
            confirmations,
            committer,
        }
    }
}

#[async_trait]
impl Tool for LogWeightTool {
    fn name(&self) -> &str {
        LOG_WEIGHT
    }

    fn description(&self) -> &str {
        "Log the weight reading the user just confirmed, exactly as staged by confirm_weight."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "confirmation_id": {"type": "string"}
            }
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Commit
    }

    fn group(&self) -> ToolGroup {
        ToolGroup::Weight
    }

    async fn execute(&self, call: ToolCall, ctx: &ToolContext) -> Result<ToolOutput> {
        let ToolCall::LogWeight(args) = call else {
            return Err(NutriError::invalid_args(LOG_WEIGHT, "mismatched call"));
        };
        execute_commit(
            &self.confirmations,
            &self.committer,
            LOG_WEIGHT,
            args.confirmation_id.as_deref(),
            "weight",
            ctx,
        )
        .await
    }
}
