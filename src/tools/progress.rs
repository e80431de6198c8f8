//! Read-only progress summary from the context cache.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::call::{ToolCall, GET_PROGRESS};
use super::types::{Tool, ToolContext, ToolKind, ToolOutput};
use crate::cache::ContextCache;
use crate::domain::DisplayMode;
use crate::error::{NutriError, Result};
use crate::intent::ToolGroup;

pub struct GetProgressTool {
    cache: Arc<ContextCache>,
}

impl GetProgressTool {
    pub fn new(cache: Arc<ContextCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl Tool for GetProgressTool {
    fn name(&self) -> &str {
        GET_PROGRESS
    }

    fn description(&self) -> &str {
        "Get today's intake against the daily target, what has been logged today and the recent weight trend."
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Read
    }

    fn group(&self) -> ToolGroup {
        ToolGroup::Progress
    }

    async fn execute(&self, call: ToolCall, ctx: &ToolContext) -> Result<ToolOutput> {
        if !matches!(call, ToolCall::GetProgress(_)) {
            return Err(NutriError::invalid_args(GET_PROGRESS, "mismatched call"));
        }
        let user_id = ctx.user_id.as_str();
        let stats = self.cache.core_stats(user_id).await?;
        let log = self.cache.today_food_log(user_id).await?;
        let trend = self.cache.weight_trend(user_id).await?;
        let preferences = self.cache.preferences(user_id).await?;

        let result = match preferences.display_mode {
            DisplayMode::Standard => json!({
                "display_mode": "standard",
                "today": stats,
                "food_log": log,
                "weight_trend": trend,
            }),
            DisplayMode::Stealth => {
                let on_track = match stats.calorie_target {
                    Some(target) => json!(stats.calories_consumed <= target),
                    None => Value::Null,
                };
                json!({
                    "display_mode": "stealth",
                    "entries_logged": stats.entries_logged,
                    "meals": log.lines.iter().map(|l| json!({
                        "meal_type": l.meal_type,
                        "description": l.description,
                    })).collect::<Vec<_>>(),
                    "on_track": on_track,
                    "weight_readings": trend.readings.len(),
                })
            }
        };
        Ok(ToolOutput::json(&result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEvent;
    use crate::store::{collections, records, Store};
    use crate::tools::call::{CONFIRM_FOOD, LOG_FOOD};
    use crate::tools::food::{ConfirmFoodTool, LogFoodTool};
    use crate::tools::testing::Harness;

    #[tokio::test]
    async fn test_progress_reflects_committed_food() {
        let h = Harness::new();
        let progress = GetProgressTool::new(h.cache.clone());
        let call = ToolCall::parse(GET_PROGRESS, "{}").unwrap();

        let before: Value =
            serde_json::from_str(&progress.execute(call.clone(), &h.ctx("c0")).await.unwrap().for_llm)
                .unwrap();
        assert_eq!(before["today"]["calories_consumed"], 0.0);

        ConfirmFoodTool::new(h.confirmations.clone())
            .execute(
                ToolCall::parse(CONFIRM_FOOD, r#"{"description":"apple","total_calories":95}"#).unwrap(),
                &h.ctx("c1"),
            )
            .await
            .unwrap();
        LogFoodTool::new(h.confirmations.clone(), h.committer.clone())
            .execute(ToolCall::parse(LOG_FOOD, "{}").unwrap(), &h.ctx("c2"))
            .await
            .unwrap();

        let after: Value =
            serde_json::from_str(&progress.execute(call, &h.ctx("c3")).await.unwrap().for_llm)
                .unwrap();
        assert_eq!(after["today"]["calories_consumed"], 95.0);
        assert_eq!(after["food_log"]["lines"][0]["description"], "apple");
    }

    #[tokio::test]
    async fn test_stealth_mode_hides_numbers() {
        let h = Harness::new();
        let doc = records::ensure_preferences(h.store.as_ref(), "u1").await.unwrap();
        h.store
            .patch(collections::PREFERENCES, &doc.id, json!({"display_mode": "stealth"}))
            .await
            .unwrap();
        h.cache.invalidate("u1", CacheEvent::PreferencesUpdated).await.unwrap();

        let output = GetProgressTool::new(h.cache.clone())
            .execute(ToolCall::parse(GET_PROGRESS, "{}").unwrap(), &h.ctx("c1"))
            .await
            .unwrap();
        let parsed: Value = serde_json::from_str(&output.for_llm).unwrap();
        assert_eq!(parsed["display_mode"], "stealth");
        assert!(parsed.get("today").is_none());
        assert!(!output.for_llm.contains("calories"));
    }
}
