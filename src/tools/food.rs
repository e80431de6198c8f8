//! Food tools: stage a meal for confirmation, then commit the staged meal.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::call::{ConfirmFoodArgs, ToolCall, CONFIRM_FOOD, LOG_FOOD};
use super::commit::{execute_commit, Committer};
use super::types::{Tool, ToolContext, ToolEffect, ToolKind, ToolOutput};
use crate::confirmations::{ConfirmationPayload, ConfirmationStore};
use crate::domain::{FoodProposal, FoodSource, MealType};
use crate::error::{NutriError, Result};
use crate::intent::ToolGroup;

/// Build the proposal exactly as it will be shown and later logged.
pub(crate) fn food_proposal(args: ConfirmFoodArgs, ctx: &ToolContext) -> FoodProposal {
    let meal_type = args
        .meal_type
        .unwrap_or_else(|| MealType::from_local_time(&ctx.local_now));
    let mut proposal = FoodProposal {
        description: args.description.trim().to_string(),
        meal_type,
        items: args.items,
        total_calories: args.total_calories.unwrap_or_default(),
        protein_g: args.protein_g.unwrap_or_default(),
        carbs_g: args.carbs_g.unwrap_or_default(),
        fat_g: args.fat_g.unwrap_or_default(),
        source: FoodSource::Text,
        confidence: None,
        image_ref: None,
    };
    if !proposal.items.is_empty() {
        proposal.recompute_totals();
    }
    proposal
}

/// Response shape shared by every proposal tool.
pub(crate) fn pending_response(confirmation_id: &str, proposal: &Value, commit_tool: &str) -> Value {
    json!({
        "status": "pending_confirmation",
        "confirmation_id": confirmation_id,
        "proposal": proposal,
        "next_step": format!(
            "Show this to the user and ask them to confirm. Call {} only after they say yes.",
            commit_tool
        ),
    })
}

// ============================================================================
// confirm_food
// ============================================================================

pub struct ConfirmFoodTool {
    confirmations: Arc<ConfirmationStore>,
}

impl ConfirmFoodTool {
    pub fn new(confirmations: Arc<ConfirmationStore>) -> Self {
        Self { confirmations }
    }
}

#[async_trait]
impl Tool for ConfirmFoodTool {
    fn name(&self) -> &str {
        CONFIRM_FOOD
    }

    fn description(&self) -> &str {
        "Propose a meal for the user to confirm. Nothing is logged until the user says yes and log_food is called."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "Short description of what the user ate"
                },
                "meal_type": {
                    "type": "string",
                    "enum": ["breakfast", "lunch", "dinner", "snack"],
                    "description": "Defaults to the meal implied by the user's local time"
                },
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "quantity": {"type": "string"},
                            "calories": {"type": "number"},
                            "protein_g": {"type": "number"},
                            "carbs_g": {"type": "number"},
                            "fat_g": {"type": "number"}
                        },
                        "required": ["name", "calories"]
                    }
                },
                "total_calories": {"type": "number"},
                "protein_g": {"type": "number"},
                "carbs_g": {"type": "number"},
                "fat_g": {"type": "number"}
            },
            "required": ["description"]
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Proposal
    }

    fn group(&self) -> ToolGroup {
        ToolGroup::Food
    }

    async fn execute(&self, call: ToolCall, ctx: &ToolContext) -> Result<ToolOutput> {
        let ToolCall::ConfirmFood(args) = call else {
            return Err(NutriError::invalid_args(CONFIRM_FOOD, "mismatched call"));
        };
        let proposal = food_proposal(args, ctx);
        let shown = serde_json::to_value(&proposal)?;
        let record = self
            .confirmations
            .save(
                &ctx.thread_id,
                &ctx.user_id,
                &ctx.tool_call_id,
                ConfirmationPayload::Food(proposal),
            )
            .await?;
        Ok(ToolOutput::with_effect(
            &pending_response(&record.id, &shown, LOG_FOOD),
            ToolEffect::Proposed {
                confirmation_id: record.id,
            },
        ))
    }
}

// ============================================================================
// log_food
// ============================================================================

pub struct LogFoodTool {
    confirmations: Arc<ConfirmationStore>,
    committer: Arc<Committer>,
}

impl LogFoodTool {
    pub fn new(confirmations: Arc<ConfirmationStore>, committer: Arc<Committer>) -> Self {
        Self {
            confirmations,
            committer,
        }
    }
}

#[async_trait]
impl Tool for LogFoodTool {
    fn name(&self) -> &str {
        LOG_FOOD
    }

    fn description(&self) -> &str {
        "Log the meal the user just confirmed. Takes no nutrition data: the staged proposal is logged exactly as shown."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "confirmation_id": {
                    "type": "string",
                    "description": "Id returned by confirm_food; defaults to the thread's staged meal"
                }
            }
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Commit
    }

    fn group(&self) -> ToolGroup {
        ToolGroup::Food
    }

    async fn execute(&self, call: ToolCall, ctx: &ToolContext) -> Result<ToolOutput> {
        let ToolCall::LogFood(args) = call else {
            return Err(NutriError::invalid_args(LOG_FOOD, "mismatched call"));
        };
        execute_commit(
            &self.confirmations,
            &self.committer,
            LOG_FOOD,
            args.confirmation_id.as_deref(),
            "food",
            ctx,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::Harness;
    use crate::store::{collections, records};

    fn banana_call() -> ToolCall {
        ToolCall::parse(
            CONFIRM_FOOD,
            r#"{"description":"a banana","items":[{"name":"banana","calories":105,"protein_g":1.3,"carbs_g":27,"fat_g":0.4}]}"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_confirm_food_stages_without_logging() {
        let h = Harness::new();
        let tool = ConfirmFoodTool::new(h.confirmations.clone());
        let output = tool.execute(banana_call(), &h.ctx("call_1")).await.unwrap();

        let ToolEffect::Proposed { confirmation_id } = &output.effect else {
            panic!("expected a proposal, got {:?}", output.effect);
        };
        let parsed: Value = serde_json::from_str(&output.for_llm).unwrap();
        assert_eq!(parsed["status"], "pending_confirmation");
        assert_eq!(parsed["proposal"]["total_calories"], 105.0);
        // 15:00 UTC at offset 0 is a snack
        assert_eq!(parsed["proposal"]["meal_type"], "snack");

        let pending = h.confirmations.get_latest_pending("t1").await.unwrap().unwrap();
        assert_eq!(&pending.id, confirmation_id);
        assert_eq!(pending.tool_call_id, "call_1");
        assert_eq!(h.store.count(collections::FOOD_LOGS).await, 0);
    }

    #[tokio::test]
    async fn test_items_override_model_totals() {
        let h = Harness::new();
        let args: ConfirmFoodArgs = serde_json::from_str(
            r#"{"description":"toast","meal_type":"breakfast","total_calories":999,
                "items":[{"name":"toast","calories":80},{"name":"butter","calories":35,"fat_g":4}]}"#,
        )
        .unwrap();
        let proposal = food_proposal(args, &h.ctx("c"));
        assert_eq!(proposal.total_calories, 115.0);
        assert_eq!(proposal.fat_g, 4.0);
        assert_eq!(proposal.meal_type, MealType::Breakfast);
    }

    #[tokio::test]
    async fn test_log_food_commits_the_staged_payload() {
        let h = Harness::new();
        let confirm = ConfirmFoodTool::new(h.confirmations.clone());
        let log = LogFoodTool::new(h.confirmations.clone(), h.committer.clone());

        confirm.execute(banana_call(), &h.ctx("call_1")).await.unwrap();
        let output = log
            .execute(ToolCall::parse(LOG_FOOD, "{}").unwrap(), &h.ctx("call_2"))
            .await
            .unwrap();
        assert!(matches!(output.effect, ToolEffect::Committed { .. }));

        let entries = records::food_entries(h.store.as_ref(), "u1", h.today())
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].food.description, "a banana");
        assert_eq!(entries[0].food.total_calories, 105.0);
    }

    #[tokio::test]
    async fn test_log_food_twice_writes_once() {
        let h = Harness::new();
        let confirm = ConfirmFoodTool::new(h.confirmations.clone());
        let log = LogFoodTool::new(h.confirmations.clone(), h.committer.clone());

        confirm.execute(banana_call(), &h.ctx("call_1")).await.unwrap();
        let commit = ToolCall::parse(LOG_FOOD, "{}").unwrap();
        log.execute(commit.clone(), &h.ctx("call_2")).await.unwrap();
        let second = log.execute(commit, &h.ctx("call_3")).await.unwrap();

        assert!(matches!(second.effect, ToolEffect::Duplicate { .. }));
        let parsed: Value = serde_json::from_str(&second.for_llm).unwrap();
        assert_eq!(parsed["reason"], "already_logged");
        assert_eq!(h.store.count(collections::FOOD_LOGS).await, 1);
    }

    #[tokio::test]
    async fn test_log_food_without_proposal_is_tool_error() {
        let h = Harness::new();
        let log = LogFoodTool::new(h.confirmations.clone(), h.committer.clone());
        let output = log
            .execute(ToolCall::parse(LOG_FOOD, "{}").unwrap(), &h.ctx("call_1"))
            .await
            .unwrap();
        assert!(output.is_error);
        assert_eq!(output.effect, ToolEffect::None);
        assert_eq!(h.store.count(collections::FOOD_LOGS).await, 0);
    }

    #[tokio::test]
    async fn test_log_food_rejects_foreign_confirmation_id() {
        let h = Harness::new();
        let confirm = ConfirmFoodTool::new(h.confirmations.clone());
        let log = LogFoodTool::new(h.confirmations.clone(), h.committer.clone());

        let staged = confirm.execute(banana_call(), &h.ctx("call_1")).await.unwrap();
        let ToolEffect::Proposed { confirmation_id } = staged.effect else {
            panic!("expected a proposal");
        };
        let other_thread = ToolContext::new("u1", "t2", h.local_now()).with_tool_call_id("x");
        let args = format!(r#"{{"confirmation_id":"{}"}}"#, confirmation_id);
        let output = log
            .execute(ToolCall::parse(LOG_FOOD, &args).unwrap(), &other_thread)
            .await
            .unwrap();
        assert!(output.is_error);
        assert_eq!(h.store.count(collections::FOOD_LOGS).await, 0);
    }
}
