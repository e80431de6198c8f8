//! Classify and instructions command handlers.
//!
//! Both run entirely offline: no store, no model.

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde_json::json;

use nutrichat::agent::{InstructionBuilder, PromptContext, TurnState};
use nutrichat::clock::{offset_from_minutes, Clock, SystemClock};
use nutrichat::config::Config;
use nutrichat::confirmations::{ConfirmationPayload, ConfirmationStatus, PendingConfirmation};
use nutrichat::domain::{
    DisplayMode, FoodProposal, FoodSource, MealType, OnboardingStep, UserProfile, WeightProposal,
};
use nutrichat::intent::{format_intents, select_tools, Classifier, Intent, RegexClassifier};

use super::PendingKind;

pub(crate) fn cmd_classify(message: &str, pending: bool) -> Result<()> {
    let intents = RegexClassifier::new().detect_intents(message);
    let selection = select_tools(&intents, pending);
    println!("Intents: {}", format_intents(&intents));
    println!("{}", serde_json::to_string_pretty(&json!({ "tool_selection": selection }))?);
    Ok(())
}

pub(crate) struct InstructionsArgs {
    pub message: String,
    pub step: String,
    pub pending: Option<PendingKind>,
    pub image: bool,
    pub stealth: bool,
}

pub(crate) fn cmd_instructions(args: InstructionsArgs) -> Result<()> {
    let step = OnboardingStep::parse(&args.step).ok_or_else(|| {
        let known: Vec<&str> = OnboardingStep::SEQUENCE.iter().map(|s| s.as_str()).collect();
        anyhow!("unknown onboarding step '{}' (expected one of: {})", args.step, known.join(", "))
    })?;

    let config = Config::load().unwrap_or_default();
    let offset = offset_from_minutes(config.agent.default_utc_offset_minutes);
    let local_now = SystemClock.now().with_timezone(&offset);

    let mut ctx = PromptContext::new(local_now);
    ctx.profile = UserProfile {
        name: Some("Sam".into()),
        onboarding_step: step,
        ..Default::default()
    };
    if args.stealth {
        ctx.preferences.display_mode = DisplayMode::Stealth;
    }

    let pending = args.pending.map(|kind| sample_pending(kind, MealType::from_local_time(&local_now)));

    let mut intents = RegexClassifier::new().detect_intents(&args.message);
    if args.image {
        intents.insert(Intent::Photo);
    }
    let state = TurnState::new(intents, args.image);

    println!(
        "{}",
        InstructionBuilder::new().build(&ctx, pending.as_ref(), &state)
    );
    Ok(())
}

fn sample_pending(kind: PendingKind, meal_type: MealType) -> PendingConfirmation {
    let confirmation_data = match kind {
        PendingKind::Food => ConfirmationPayload::Food(FoodProposal {
            description: "banana".into(),
            meal_type,
            items: vec![],
            total_calories: 105.0,
            protein_g: 1.3,
            carbs_g: 27.0,
            fat_g: 0.4,
            source: FoodSource::Text,
            confidence: None,
            image_ref: None,
        }),
        PendingKind::Weight => ConfirmationPayload::Weight(WeightProposal {
            weight_kg: 72.5,
            note: None,
        }),
    };
    PendingConfirmation {
        id: "preview".into(),
        thread_id: "preview-thread".into(),
        user_id: "preview-user".into(),
        tool_call_id: "preview-call".into(),
        confirmation_data,
        status: ConfirmationStatus::Pending,
        created_at: Utc::now(),
        resolved_at: None,
    }
}
