//! Goal and display settings update.
//!
//! Settings are not ledger entries, so this tool writes directly instead of
//! staging a confirmation. The profile patch, the recomputed calorie target
//! and the cache eviction land in one batch.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::info;

use super::call::{ToolCall, UPDATE_GOALS};
use super::types::{Tool, ToolContext, ToolKind, ToolOutput};
use crate::cache::{CacheEvent, ContextCache};
use crate::domain::UserProfile;
use crate::error::{NutriError, Result};
use crate::intent::ToolGroup;
use crate::store::{collections, records, Store, WriteBatch};

pub struct UpdateGoalsTool {
    store: Arc<dyn Store>,
}

impl UpdateGoalsTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdateGoalsTool {
    fn name(&self) -> &str {
        UPDATE_GOALS
    }

    fn description(&self) -> &str {
        "Update the user's target weight, goal, activity level or display mode. The daily calorie target is recalculated."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "target_weight_kg": {"type": "number"},
                "goal": {"type": "string", "enum": ["lose", "maintain", "gain"]},
                "activity_level": {
                    "type": "string",
                    "enum": ["sedentary", "light", "moderate", "active", "very_active"]
                },
                "display_mode": {"type": "string", "enum": ["standard", "stealth"]}
            }
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Read
    }

    fn group(&self) -> ToolGroup {
        ToolGroup::Onboarding
    }

    async fn execute(&self, call: ToolCall, ctx: &ToolContext) -> Result<ToolOutput> {
        let ToolCall::UpdateGoals(args) = call else {
            return Err(NutriError::invalid_args(UPDATE_GOALS, "mismatched call"));
        };
        let user_id = ctx.user_id.as_str();
        let doc = records::ensure_profile(self.store.as_ref(), user_id).await?;
        let mut profile: UserProfile = doc.decode()?;

        let mut fields = Map::new();
        if let Some(kg) = args.target_weight_kg {
            profile.target_weight_kg = Some(kg);
            fields.insert("target_weight_kg".into(), json!(kg));
        }
        if let Some(goal) = args.goal {
            profile.goal = Some(goal);
            fields.insert("goal".into(), json!(goal));
        }
        if let Some(level) = args.activity_level {
            profile.activity_level = Some(level);
            fields.insert("activity_level".into(), json!(level));
        }
        if let Some(mode) = args.display_mode {
            profile.display_mode = Some(mode);
            fields.insert("display_mode".into(), json!(mode));
        }
        if let Some(target) = profile.compute_calorie_target() {
            profile.daily_calorie_target = Some(target);
            fields.insert("daily_calorie_target".into(), json!(target));
        }

        let mut events = vec![CacheEvent::ProfileUpdated];
        let mut batch = WriteBatch::new().patch(collections::PROFILES, &doc.id, Value::Object(fields));
        if let Some(mode) = args.display_mode {
            let prefs = records::ensure_preferences(self.store.as_ref(), user_id).await?;
            batch = batch.patch(collections::PREFERENCES, &prefs.id, json!({ "display_mode": mode }));
            events.push(CacheEvent::PreferencesUpdated);
        }
        batch = batch.extend(ContextCache::invalidation_batch(user_id, &events));
        self.store
            .apply(batch)
            .await
            .map_err(|e| NutriError::tool(UPDATE_GOALS, e.to_string()))?;

        info!(user_id = %user_id, "Updated goals");
        Ok(ToolOutput::json(&json!({
            "status": "updated",
            "target_weight_kg": profile.target_weight_kg,
            "goal": profile.goal,
            "activity_level": profile.activity_level,
            "display_mode": profile.display_mode,
            "daily_calorie_target": profile.daily_calorie_target,
        })))
    }
}
