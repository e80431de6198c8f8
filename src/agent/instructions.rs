//! Instruction builder for agent turns
//!
//! Renders the system prompt for one turn from a [`PromptContext`] snapshot,
//! the thread's staged proposal and the detected [`TurnState`]. Building is
//! pure: the same inputs always produce the same text, and nothing here reads
//! the store or the clock.
//!
//! Directive sections are appended when the turn must produce a side effect:
//!
//! - a confirmation reply with a staged proposal must call the commit tool in
//!   this response, with the staged payload
//! - an attached photo must go through `analyze_and_confirm_photo` in this
//!   response
//! - while onboarding is incomplete the prompt switches to goal collection
//!   with extraction markers

use chrono::{DateTime, FixedOffset};

use super::onboarding::{step_prompt, value_format};
use crate::confirmations::{ConfirmationPayload, PendingConfirmation};
use crate::domain::{
    CoreStats, DisplayMode, MealType, OnboardingStep, Preferences, ThreadContext, TodayFoodLog,
    UserProfile, WeightTrend,
};
use crate::intent::{Intent, IntentSet};
use crate::tools::call::{ANALYZE_AND_CONFIRM_PHOTO, CONFIRM_FOOD, CONFIRM_WEIGHT};

/// Default persona prompt
const DEFAULT_SYSTEM_PROMPT: &str = r#"You are NutriChat, a friendly nutrition coach who helps people track what they eat and how their weight changes, entirely through chat.

Keep replies short and warm. Estimate portions sensibly when the user is vague, and ask at most one clarifying question at a time.

Logging always takes two steps. First stage a proposal with confirm_food or confirm_weight and show it to the user. Only after the user confirms do you call log_food or log_weight."#;

const LOGGING_RULES: &str = r#"## Rules
- Never say that something was logged, saved or recorded unless a log_food or log_weight result in this response says it was logged.
- If a log tool reports a duplicate, tell the user it was already logged instead of logging it again.
- Never invent numbers for the user's stats; use get_progress when you need them."#;

/// Everything the builder knows about the user at the start of a turn.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub profile: UserProfile,
    pub preferences: Preferences,
    pub core_stats: Option<CoreStats>,
    pub today_food_log: Option<TodayFoodLog>,
    pub weight_trend: Option<WeightTrend>,
    pub thread: Option<ThreadContext>,
    /// Current time in the user's timezone
    pub local_now: DateTime<FixedOffset>,
}

impl PromptContext {
    /// Context for a user with nothing stored yet.
    pub fn new(local_now: DateTime<FixedOffset>) -> Self {
        Self {
            profile: UserProfile::default(),
            preferences: Preferences::default(),
            core_stats: None,
            today_food_log: None,
            weight_trend: None,
            thread: None,
            local_now,
        }
    }

    pub fn stealth(&self) -> bool {
        self.preferences.display_mode == DisplayMode::Stealth
    }
}

/// What was detected about the current message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnState {
    pub intents: IntentSet,
    pub has_image: bool,
}

impl TurnState {
    pub fn new(intents: IntentSet, has_image: bool) -> Self {
        Self { intents, has_image }
    }

    pub fn is_confirmation(&self) -> bool {
        self.intents.contains(&Intent::Confirmation)
    }
}

/// Builder for the system prompt of a turn.
///
/// # Example
///
/// ```rust
/// use chrono::{FixedOffset, TimeZone};
/// use nutrichat::agent::{InstructionBuilder, PromptContext, TurnState};
///
/// let now = FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
/// let prompt = InstructionBuilder::new().build(&PromptContext::new(now), None, &TurnState::default());
/// assert!(prompt.contains("NutriChat"));
/// ```
#[derive(Debug, Clone)]
pub struct InstructionBuilder {
    base_prompt: String,
}

impl InstructionBuilder {
    pub fn new() -> Self {
        Self {
            base_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Replace the persona prompt.
    pub fn with_base_prompt(mut self, prompt: &str) -> Self {
        self.base_prompt = prompt.to_string();
        self
    }

    /// Render the system prompt for a turn.
    pub fn build(
        &self,
        ctx: &PromptContext,
        pending: Option<&PendingConfirmation>,
        state: &TurnState,
    ) -> String {
        let mut sections = vec![self.base_prompt.clone(), render_clock(ctx)];

        if ctx.profile.onboarding_complete() {
            sections.push(render_today(ctx));
            if let Some(trend) = ctx.weight_trend.as_ref().filter(|_| !ctx.stealth()) {
                if let Some(section) = render_weight(trend) {
                    sections.push(section);
                }
            }
        } else {
            sections.push(render_onboarding(&ctx.profile));
        }

        let pending = pending.filter(|p| p.is_pending());
        match pending {
            Some(record) if state.is_confirmation() => sections.push(render_commit_now(record)),
            Some(record) => sections.push(render_staged(record)),
            None => {}
        }

        if state.has_image {
            sections.push(render_photo());
        }

        sections.push(LOGGING_RULES.to_string());
        sections.join("\n\n")
    }
}

impl Default for InstructionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Sections
// ============================================================================

fn render_clock(ctx: &PromptContext) -> String {
    let meal = MealType::from_local_time(&ctx.local_now);
    let mut lines = vec![
        "## Current Context".to_string(),
        format!(
            "- Local time: {} ({})",
            ctx.local_now.format("%A %Y-%m-%d %H:%M"),
            meal.as_str()
        ),
    ];
    if let Some(name) = &ctx.profile.name {
        lines.push(format!("- User's name: {}", name));
    }
    if let Some(thread) = &ctx.thread {
        if thread.is_new {
            lines.push("- This is the first message of a new conversation.".to_string());
        }
    }
    lines.join("\n")
}

fn render_today(ctx: &PromptContext) -> String {
    let mut lines = vec!["## Today".to_string()];
    let stealth = ctx.stealth();

    if let Some(stats) = &ctx.core_stats {
        if stealth {
            lines.push(format!("- Entries logged today: {}", stats.entries_logged));
        } else {
            lines.push(format!(
                "- Calories: {:.0} eaten{}",
                stats.calories_consumed,
                match (stats.calorie_target, stats.calories_remaining) {
                    (Some(target), Some(remaining)) => {
                        format!(" of {:.0} target, {:.0} remaining", target, remaining)
                    }
                    _ => String::new(),
                }
            ));
            lines.push(format!(
                "- Macros: {:.0}g protein, {:.0}g carbs, {:.0}g fat",
                stats.protein_g, stats.carbs_g, stats.fat_g
            ));
        }
    }

    match &ctx.today_food_log {
        Some(log) if !log.is_empty() => {
            lines.push("- Logged so far:".to_string());
            for line in &log.lines {
                if stealth {
                    lines.push(format!("  - {}: {}", line.meal_type.as_str(), line.description));
                } else {
                    lines.push(format!(
                        "  - {}: {} ({:.0} kcal)",
                        line.meal_type.as_str(),
                        line.description,
                        line.calories
                    ));
                }
            }
        }
        _ => lines.push("- Nothing logged yet today.".to_string()),
    }

    if stealth {
        lines.push(
            "The user prefers not to see numbers. Never mention calories, macros or weights; give qualitative encouragement instead."
                .to_string(),
        );
    }
    lines.join("\n")
}

fn render_weight(trend: &WeightTrend) -> Option<String> {
    let latest = trend.latest_kg?;
    let mut line = format!("## Weight\n- Latest: {:.1} kg", latest);
    if let Some(change) = trend.change_kg {
        line.push_str(&format!(
            " ({:+.1} kg over the last {} readings)",
            change,
            trend.readings.len()
        ));
    }
    Some(line)
}

fn render_onboarding(profile: &UserProfile) -> String {
    let current = profile.onboarding_step;
    // The welcome step ends with this reply, so the first answer is the name.
    let marker_step = match current {
        OnboardingStep::Welcome => OnboardingStep::Name,
        step => step,
    };
    let sequence = OnboardingStep::SEQUENCE
        .iter()
        .filter(|s| !matches!(s, OnboardingStep::Welcome | OnboardingStep::Complete))
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(" -> ");

    let mut lines = vec![
        "## Getting Started".to_string(),
        "The user is new. Before anything else, collect their goals one step at a time, in this order:"
            .to_string(),
        sequence,
        format!("Current step: {}. {}", current.as_str(), step_prompt(current)),
        format!(
            "When the user answers step {}, end your reply with this marker on its own line:",
            marker_step.as_str()
        ),
        format!(
            "<<extract step=\"{}\" value=\"...\">>  (value: {})",
            marker_step.as_str(),
            value_format(marker_step)
        ),
        "Never emit a marker for any other step and never skip a step. If the answer is unclear, ask again without a marker. The marker is hidden from the user.".to_string(),
        "If the user logs food or weight meanwhile, help them with it and then return to the current step.".to_string(),
    ];

    let collected = collected_answers(profile);
    if !collected.is_empty() {
        lines.push(format!("Already collected: {}", collected.join(", ")));
    }
    lines.join("\n")
}

fn collected_answers(profile: &UserProfile) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(name) = &profile.name {
        out.push(format!("name={}", name));
    }
    if let Some(kg) = profile.current_weight_kg {
        out.push(format!("current_weight={:.1} kg", kg));
    }
    if let Some(kg) = profile.target_weight_kg {
        out.push(format!("target_weight={:.1} kg", kg));
    }
    if let (Some(height), Some(age)) = (profile.height_cm, profile.age) {
        out.push(format!("height={:.0} cm, age={}", height, age));
    }
    out
}

fn render_staged(record: &PendingConfirmation) -> String {
    let (noun, propose_tool) = match &record.confirmation_data {
        ConfirmationPayload::Food(_) => ("food", CONFIRM_FOOD),
        ConfirmationPayload::Weight(_) => ("weight", CONFIRM_WEIGHT),
    };
    format!(
        "## Awaiting Confirmation\nA {} proposal (confirmation_id \"{}\") is waiting for the user's answer:\n{}\nIf the user confirms, call {}. If they correct it, call {} again with the corrected values. If they decline, acknowledge it and log nothing.",
        noun,
        record.id,
        payload_json(record),
        record.confirmation_data.commit_tool(),
        propose_tool
    )
}

fn render_commit_now(record: &PendingConfirmation) -> String {
    let commit_tool = record.confirmation_data.commit_tool();
    format!(
        "## Action Required\nThe user has just confirmed the staged proposal. In this response you MUST call {} with confirmation_id \"{}\". It commits exactly this stored payload:\n{}\nDo not re-estimate or change the values and do not stage a new proposal. Reply only after the tool result comes back.",
        commit_tool,
        record.id,
        payload_json(record)
    )
}

fn render_photo() -> String {
    format!(
        "## Photo Attached\nThe user attached a photo. In this response call {} first; it analyses the image and stages the result as a proposal in one step. Then show what was found and ask the user to confirm. If the result has noFoodDetected, ask the user what they would like to log instead.",
        ANALYZE_AND_CONFIRM_PHOTO
    )
}

fn payload_json(record: &PendingConfirmation) -> String {
    serde_json::to_string_pretty(&record.confirmation_data).unwrap_or_default()
}
