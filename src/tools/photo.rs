//! Photo tool: analyse an attached image and stage what it shows.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::call::{ToolCall, ANALYZE_AND_CONFIRM_PHOTO, LOG_FOOD};
use super::food::pending_response;
use super::types::{Tool, ToolContext, ToolEffect, ToolKind, ToolOutput};
use crate::confirmations::{ConfirmationPayload, ConfirmationStore};
use crate::domain::{FoodProposal, FoodSource, MealType};
use crate::error::{NutriError, Result};
use crate::intent::ToolGroup;
use crate::providers::{VisionProvider, VisionResult};

pub struct AnalyzeAndConfirmPhotoTool {
    vision: Arc<dyn VisionProvider>,
    confirmations: Arc<ConfirmationStore>,
}

impl AnalyzeAndConfirmPhotoTool {
    pub fn new(vision: Arc<dyn VisionProvider>, confirmations: Arc<ConfirmationStore>) -> Self {
        Self {
            vision,
            confirmations,
        }
    }
}

#[async_trait]
impl Tool for AnalyzeAndConfirmPhotoTool {
    fn name(&self) -> &str {
        ANALYZE_AND_CONFIRM_PHOTO
    }

    fn description(&self) -> &str {
        "Analyse the photo the user attached and propose the food it shows for confirmation. If no food is detected nothing is staged."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "image_ref": {
                    "type": "string",
                    "description": "Defaults to the image attached to the current message"
                },
                "hint": {"type": "string", "description": "What the user said about the photo"},
                "meal_type": {
                    "type": "string",
                    "enum": ["breakfast", "lunch", "dinner", "snack"]
                }
            }
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Proposal
    }

    fn group(&self) -> ToolGroup {
        ToolGroup::Food
    }

    async fn execute(&self, call: ToolCall, ctx: &ToolContext) -> Result<ToolOutput> {
        let ToolCall::AnalyzeAndConfirmPhoto(args) = call else {
            return Err(NutriError::invalid_args(ANALYZE_AND_CONFIRM_PHOTO, "mismatched call"));
        };
        let image_ref = args
            .image_ref
            .clone()
            .or_else(|| ctx.image_ref.clone())
            .ok_or_else(|| {
                NutriError::invalid_args(ANALYZE_AND_CONFIRM_PHOTO, "no image attached to this message")
            })?;
        let hint = args.hint.as_deref().or(ctx.user_message.as_deref());

        let result = self
            .vision
            .analyze(&image_ref, hint)
            .await
            .map_err(|e| match e {
                NutriError::Vision(_) => e,
                other => NutriError::Vision(other.to_string()),
            })?;

        let (foods, total_calories, confidence, description) = match result {
            VisionResult::Foods {
                foods,
                total_calories,
                confidence,
                description,
            } if !foods.is_empty() || total_calories > 0.0 => {
                (foods, total_calories, confidence, description)
            }
            VisionResult::Foods { .. } | VisionResult::NoFood => {
                info!(user_id = %ctx.user_id, image_ref = %image_ref, "No food detected in photo");
                return Ok(ToolOutput::with_effect(
                    &json!({
                        "noFoodDetected": true,
                        "message": "No food was recognised in this photo. Ask the user what they ate instead.",
                    }),
                    ToolEffect::NoFoodDetected,
                ));
            }
            VisionResult::Error { message } => {
                warn!(user_id = %ctx.user_id, image_ref = %image_ref, error = %message, "Photo analysis failed");
                return Err(NutriError::Vision(message));
            }
        };

        let description = description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| {
                foods
                    .iter()
                    .map(|f| f.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            });
        let mut proposal = FoodProposal {
            description,
            meal_type: args
                .meal_type
                .unwrap_or_else(|| MealType::from_local_time(&ctx.local_now)),
            items: foods,
            total_calories,
            protein_g: 0.0,
            carbs_g: 0.0,
            fat_g: 0.0,
            source: FoodSource::Photo,
            confidence: Some(confidence.clamp(0.0, 1.0)),
            image_ref: Some(image_ref),
        };
        if !proposal.items.is_empty() {
            proposal.recompute_totals();
        }

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FoodItem;
    use crate::tools::testing::{Harness, StaticVision};

    fn photo_tool(h: &Harness, result: VisionResult) -> AnalyzeAndConfirmPhotoTool {
        AnalyzeAndConfirmPhotoTool::new(Arc::new(StaticVision::new(result)), h.confirmations.clone())
    }

    #[tokio::test]
    async fn test_no_food_stages_nothing() {
        let h = Harness::new();
        let tool = photo_tool(&h, VisionResult::NoFood);
        let ctx = h.ctx("call_1").with_image(Some("img://desk"));
        let output = tool
            .execute(ToolCall::parse(ANALYZE_AND_CONFIRM_PHOTO, "{}").unwrap(), &ctx)
            .await
            .unwrap();

        assert_eq!(output.effect, ToolEffect::NoFoodDetected);
        let parsed: Value = serde_json::from_str(&output.for_llm).unwrap();
        assert_eq!(parsed["noFoodDetected"], true);
        assert!(h.confirmations.latest("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_foods_are_staged_as_photo_proposal() {
        let h = Harness::new();
        let tool = photo_tool(
            &h,
            VisionResult::Foods {
                foods: vec![FoodItem {
                    name: "salad".into(),
                    quantity: Some("1 bowl".into()),
                    calories: 320.0,
                    protein_g: 12.0,
                    carbs_g: 20.0,
                    fat_g: 18.0,
                }],
                total_calories: 320.0,
                confidence: 0.8,
                description: None,
            },
        );
        let ctx = h.ctx("call_1").with_image(Some("img://lunch"));
        let output = tool
            .execute(ToolCall::parse(ANALYZE_AND_CONFIRM_PHOTO, "{}").unwrap(), &ctx)
            .await
            .unwrap();
        assert!(matches!(output.effect, ToolEffect::Proposed { .. }));

        let pending = h.confirmations.get_latest_pending("t1").await.unwrap().unwrap();
        let ConfirmationPayload::Food(food) = pending.confirmation_data else {
            panic!("expected food");
        };
        assert_eq!(food.source, FoodSource::Photo);
        assert_eq!(food.description, "salad");
        assert_eq!(food.image_ref.as_deref(), Some("img://lunch"));
        assert_eq!(food.fat_g, 18.0);
    }

    #[tokio::test]
    async fn test_missing_image_is_invalid_call() {
        let h = Harness::new();
        let tool = photo_tool(&h, VisionResult::NoFood);
        let err = tool
            .execute(
                ToolCall::parse(ANALYZE_AND_CONFIRM_PHOTO, "{}").unwrap(),
                &h.ctx("call_1"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NutriError::InvalidToolCall { .. }));
    }

    #[tokio::test]
    async fn test_vision_error_propagates() {
        let h = Harness::new();
        let tool = photo_tool(
            &h,
            VisionResult::Error {
                message: "blurry".into(),
            },
        );
        let ctx = h.ctx("call_1").with_image(Some("img://blur"));
        let err = tool
            .execute(ToolCall::parse(ANALYZE_AND_CONFIRM_PHOTO, "{}").unwrap(), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, NutriError::Vision(ref m) if m == "blurry"));
    }
}
