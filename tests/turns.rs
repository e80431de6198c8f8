//! End-to-end turn scenarios against scripted model capabilities.

mod common;

use chrono::{NaiveDate, TimeZone, Utc};

use common::{call, onboard, reply, setup, setup_with, Step, BANANA};
use nutrichat::agent::TurnOutcome;
use nutrichat::cache::CacheEvent;
use nutrichat::clock::Clock;
use nutrichat::config::Config;
use nutrichat::confirmations::{ConfirmationPayload, ConfirmationStatus, ConfirmationStore};
use nutrichat::domain::{FoodItem, FoodSource, MealType, OnboardingStep};
use nutrichat::error::{FALLBACK_DUPLICATE, FALLBACK_LOGGING, FALLBACK_RETRY};
use nutrichat::providers::VisionResult;
use nutrichat::store::{collections, records, Store};
use nutrichat::tools::{CommitOutcome, DispatchOutcome, DuplicateReason};
use nutrichat::NutriError;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
}

fn tool_names(request: &nutrichat::GenerateRequest) -> Vec<String> {
    request.tools.iter().map(|t| t.name.clone()).collect()
}

/// Stage a banana proposal and return its confirmation id.
async fn stage_banana(s: &common::Setup) -> String {
    s.llm.push([
        call("confirm_food", BANANA),
        reply("A banana, about 105 kcal. Shall I log it?"),
    ]);
    let response = s
        .orchestrator
        .send_turn("u1", "I had a banana", None)
        .await
        .unwrap();
    match response.outcome {
        TurnOutcome::AwaitingConfirmation { confirmation_id } => confirmation_id,
        other => panic!("expected a staged proposal, got {:?}", other),
    }
}

#[tokio::test]
async fn test_banana_then_yes_logs_exact_payload_once() {
    let s = setup();
    onboard(&s.store, "u1").await;

    let confirmation_id = stage_banana(&s).await;
    let thread_id = "thread-1";
    let pending = s
        .orchestrator
        .get_pending_confirmation(thread_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.id, confirmation_id);
    assert_eq!(pending.status, ConfirmationStatus::Pending);
    let ConfirmationPayload::Food(staged) = &pending.confirmation_data else {
        panic!("expected a food proposal");
    };
    assert_eq!(staged.meal_type, MealType::Lunch);
    assert_eq!(staged.total_calories, 105.0);
    assert_eq!(s.store.count(collections::FOOD_LOGS).await, 0);

    // Warm the cache before the commit.
    let before = s.orchestrator.cache().today_food_log("u1").await.unwrap();
    assert!(before.is_empty());

    s.llm.push([call("log_food", "{}"), reply("Logged your banana!")]);
    let response = s.orchestrator.send_turn("u1", "yes", None).await.unwrap();
    assert_eq!(response.outcome, TurnOutcome::Logged);
    assert_eq!(response.text, "Logged your banana!");
    assert_eq!(response.thread_id.as_deref(), Some(thread_id));
    assert!(response.tool_calls[0].committed());

    let first = s.llm.last_turn_request();
    assert!(first.system_prompt.contains("MUST call log_food"));
    assert!(tool_names(&first).contains(&"log_food".to_string()));

    let entries = records::food_entries(s.store.as_ref(), "u1", today())
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].food, *staged);
    assert_eq!(entries[0].confirmation_id, confirmation_id);

    let confirmations = ConfirmationStore::new(s.store.clone(), s.clock.clone());
    let record = confirmations.get(&confirmation_id).await.unwrap().unwrap();
    assert_eq!(record.status, ConfirmationStatus::Confirmed);
    assert!(s
        .orchestrator
        .get_pending_confirmation(thread_id)
        .await
        .unwrap()
        .is_none());

    let after = s.orchestrator.cache().today_food_log("u1").await.unwrap();
    assert_eq!(after.lines.len(), 1);
    assert_eq!(after.total_calories, 105.0);
    let stats = s.orchestrator.cache().core_stats("u1").await.unwrap();
    assert_eq!(stats.calories_consumed, 105.0);
}

#[tokio::test]
async fn test_yes_delivered_twice_logs_once() {
    let s = setup();
    onboard(&s.store, "u1").await;
    stage_banana(&s).await;

    s.llm.push([
        call("log_food", "{}"),
        reply("Logged!"),
        call("log_food", "{}"),
        reply("Logged again!"),
    ]);
    let (a, b) = tokio::join!(
        s.orchestrator.send_turn("u1", "yes", None),
        s.orchestrator.send_turn("u1", "yes", None),
    );
    let mut outcomes = vec![a.unwrap(), b.unwrap()];
    outcomes.sort_by_key(|r| r.outcome != TurnOutcome::Logged);

    assert_eq!(outcomes[0].outcome, TurnOutcome::Logged);
    assert_eq!(outcomes[1].outcome, TurnOutcome::Duplicate);
    assert_eq!(outcomes[1].text, FALLBACK_DUPLICATE);
    assert!(matches!(
        outcomes[1].tool_calls[0].outcome,
        DispatchOutcome::Duplicate { .. }
    ));
    assert_eq!(s.store.count(collections::FOOD_LOGS).await, 1);
}

#[tokio::test]
async fn test_confirmation_without_commit_is_replaced() {
    let s = setup();
    onboard(&s.store, "u1").await;
    let confirmation_id = stage_banana(&s).await;

    s.llm.push([reply("Great, I've logged your banana!")]);
    let response = s.orchestrator.send_turn("u1", "yes", None).await.unwrap();

    assert_eq!(response.text, FALLBACK_LOGGING);
    assert_eq!(response.outcome, TurnOutcome::ConfirmationWithoutCommit);
    assert!(response.tool_calls.is_empty());
    assert_eq!(s.store.count(collections::FOOD_LOGS).await, 0);

    let pending = s
        .orchestrator
        .get_pending_confirmation("thread-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.id, confirmation_id);
}

#[tokio::test]
async fn test_commit_in_the_staging_turn_is_refused() {
    let s = setup();
    onboard(&s.store, "u1").await;

    s.llm.push([
        Step::Calls(vec![
            ("confirm_food".into(), BANANA.into()),
            ("log_food".into(), "{}".into()),
        ]),
        reply("Logged a banana!"),
    ]);
    let response = s
        .orchestrator
        .send_turn("u1", "I had a banana", None)
        .await
        .unwrap();

    assert!(matches!(
        response.outcome,
        TurnOutcome::AwaitingConfirmation { .. }
    ));
    assert!(response.tool_calls[1].failed());
    assert_eq!(s.store.count(collections::FOOD_LOGS).await, 0);
}

#[tokio::test]
async fn test_photo_without_food_stages_nothing() {
    let s = setup();
    onboard(&s.store, "u1").await;

    s.llm.push([
        call("analyze_and_confirm_photo", "{}"),
        reply("I couldn't spot any food there. What did you have?"),
    ]);
    let response = s
        .orchestrator
        .send_turn("u1", "", Some("uploads/img-1.jpg"))
        .await
        .unwrap();

    assert_eq!(response.outcome, TurnOutcome::Replied);
    assert_eq!(response.tool_calls[0].outcome, DispatchOutcome::NoFood);
    assert!(s
        .orchestrator
        .get_pending_confirmation("thread-1")
        .await
        .unwrap()
        .is_none());

    let first = s.llm.last_turn_request();
    assert!(first.system_prompt.contains("Photo Attached"));
    assert!(tool_names(&first).contains(&"analyze_and_confirm_photo".to_string()));
}

#[tokio::test]
async fn test_photo_with_food_is_staged_in_one_turn() {
    let vision = VisionResult::Foods {
        foods: vec![FoodItem {
            name: "oatmeal".into(),
            quantity: Some("1 bowl".into()),
            calories: 300.0,
            protein_g: 10.0,
            carbs_g: 54.0,
            fat_g: 5.0,
        }],
        total_calories: 300.0,
        confidence: 0.8,
        description: Some("bowl of oatmeal".into()),
    };
    let s = setup_with(Config::default(), vision);
    onboard(&s.store, "u1").await;

    s.llm.push([
        call("analyze_and_confirm_photo", "{}"),
        reply("Looks like a bowl of oatmeal, about 300 kcal. Log it?"),
    ]);
    let response = s
        .orchestrator
        .send_turn("u1", "breakfast", Some("uploads/img-2.jpg"))
        .await
        .unwrap();

    assert!(matches!(
        response.outcome,
        TurnOutcome::AwaitingConfirmation { .. }
    ));
    let pending = s
        .orchestrator
        .get_pending_confirmation("thread-1")
        .await
        .unwrap()
        .unwrap();
    let ConfirmationPayload::Food(food) = pending.confirmation_data else {
        panic!("expected a food proposal");
    };
    assert_eq!(food.source, FoodSource::Photo);
    assert_eq!(food.total_calories, 300.0);
    assert_eq!(food.image_ref.as_deref(), Some("uploads/img-2.jpg"));
    assert_eq!(s.store.count(collections::FOOD_LOGS).await, 0);
}

#[tokio::test]
async fn test_weight_flow_updates_profile() {
    let s = setup();
    onboard(&s.store, "u1").await;

    s.llm.push([
        call("confirm_weight", r#"{"weight":160,"unit":"lb"}"#),
        reply("160 lb is 72.6 kg. Log it?"),
    ]);
    s.orchestrator
        .send_turn("u1", "I weigh 160 lbs today", None)
        .await
        .unwrap();

    s.llm.push([call("log_weight", "{}"), reply("Saved!")]);
    let response = s.orchestrator.send_turn("u1", "yep", None).await.unwrap();
    assert_eq!(response.outcome, TurnOutcome::Logged);
    assert!(s
        .llm
        .last_turn_request()
        .system_prompt
        .contains("MUST call log_weight"));

    let profile = s.orchestrator.cache().profile("u1").await.unwrap();
    assert_eq!(profile.current_weight_kg, Some(72.6));
    let trend = s.orchestrator.cache().weight_trend("u1").await.unwrap();
    assert_eq!(trend.latest_kg, Some(72.6));
}

#[tokio::test]
async fn test_full_tool_set_when_minimization_disabled() {
    let mut config = Config::default();
    config.agent.minimize_tools = false;
    let s = setup_with(config, VisionResult::NoFood);
    onboard(&s.store, "u1").await;

    s.llm.push([reply("Hi Sam!")]);
    s.orchestrator.send_turn("u1", "hello", None).await.unwrap();
    assert_eq!(s.llm.last_turn_request().tools.len(), 8);

    stage_banana(&s).await;
    s.llm.push([call("log_food", "{}"), reply("Logged!")]);
    let response = s.orchestrator.send_turn("u1", "yes", None).await.unwrap();
    assert_eq!(response.outcome, TurnOutcome::Logged);
    assert_eq!(s.store.count(collections::FOOD_LOGS).await, 1);
}

#[tokio::test]
async fn test_minimized_selection_for_greeting() {
    let s = setup();
    onboard(&s.store, "u1").await;

    s.llm.push([reply("Hi Sam!")]);
    s.orchestrator.send_turn("u1", "hello", None).await.unwrap();
    assert!(s.llm.last_turn_request().tools.len() < 8);
}

#[tokio::test]
async fn test_confirm_pending_from_card() {
    let s = setup();
    onboard(&s.store, "u1").await;
    let confirmation_id = stage_banana(&s).await;

    let outcome = s
        .orchestrator
        .confirm_pending(&confirmation_id)
        .await
        .unwrap();
    assert!(matches!(outcome, CommitOutcome::Committed { .. }));

    let again = s
        .orchestrator
        .confirm_pending(&confirmation_id)
        .await
        .unwrap();
    assert_eq!(
        again,
        CommitOutcome::Duplicate {
            confirmation_id: confirmation_id.clone(),
            reason: DuplicateReason::AlreadyConfirmed,
        }
    );
    assert_eq!(s.store.count(collections::FOOD_LOGS).await, 1);
}

#[tokio::test]
async fn test_reject_pending_from_card() {
    let s = setup();
    onboard(&s.store, "u1").await;
    let confirmation_id = stage_banana(&s).await;

    let rejected = s
        .orchestrator
        .reject_pending(&confirmation_id)
        .await
        .unwrap();
    assert_eq!(rejected.status, ConfirmationStatus::Rejected);
    assert!(s
        .orchestrator
        .get_pending_confirmation("thread-1")
        .await
        .unwrap()
        .is_none());
    assert!(s.orchestrator.confirm_pending(&confirmation_id).await.is_err());
    assert!(matches!(
        s.orchestrator.confirm_pending("no-such-id").await,
        Err(NutriError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_start_new_thread_leaves_old_pending_behind() {
    let s = setup();
    onboard(&s.store, "u1").await;
    stage_banana(&s).await;

    let new_thread = s.orchestrator.start_new_thread("u1").await.unwrap();
    assert_eq!(new_thread, "thread-2");

    s.llm.push([reply("Hello again!")]);
    let response = s.orchestrator.send_turn("u1", "hi", None).await.unwrap();
    assert_eq!(response.thread_id.as_deref(), Some("thread-2"));
    assert!(s
        .orchestrator
        .get_pending_confirmation("thread-2")
        .await
        .unwrap()
        .is_none());
    assert!(s
        .orchestrator
        .get_pending_confirmation("thread-1")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_next_day_gets_a_new_thread() {
    let s = setup();
    onboard(&s.store, "u1").await;

    s.llm.push([reply("Hi!")]);
    let first = s.orchestrator.send_turn("u1", "hi", None).await.unwrap();
    s.clock.advance(chrono::Duration::days(1));
    s.llm.push([reply("Morning!")]);
    let second = s.orchestrator.send_turn("u1", "hi", None).await.unwrap();

    assert_eq!(first.thread_id.as_deref(), Some("thread-1"));
    assert_eq!(second.thread_id.as_deref(), Some("thread-2"));
}

#[tokio::test]
async fn test_external_write_invalidation() {
    let s = setup();
    onboard(&s.store, "u1").await;
    let before = s.orchestrator.cache().today_food_log("u1").await.unwrap();
    assert!(before.is_empty());

    // A manual-entry form writes the ledger directly.
    let entry = serde_json::json!({
        "user_id": "u1",
        "date": "2026-03-01",
        "logged_at": s.clock.now(),
        "confirmation_id": "manual",
        "description": "apple",
        "meal_type": "snack",
        "items": [],
        "total_calories": 95.0,
        "protein_g": 0.5,
        "carbs_g": 25.0,
        "fat_g": 0.3,
        "source": "text"
    });
    s.store
        .insert(
            collections::FOOD_LOGS,
            "u1",
            &records::date_key(today()),
            entry,
        )
        .await
        .unwrap();

    s.orchestrator
        .invalidate("u1", CacheEvent::FoodLogged)
        .await
        .unwrap();
    let after = s.orchestrator.cache().today_food_log("u1").await.unwrap();
    assert_eq!(after.lines.len(), 1);
}

#[tokio::test]
async fn test_model_failure_returns_fallback() {
    let s = setup();
    onboard(&s.store, "u1").await;

    s.llm.push([Step::Fail]);
    let response = s
        .orchestrator
        .send_turn("u1", "I had a banana", None)
        .await
        .unwrap();
    assert_eq!(response.outcome, TurnOutcome::Failed);
    assert_eq!(response.text, FALLBACK_RETRY);
    assert_eq!(response.thread_id.as_deref(), Some("thread-1"));
}

#[tokio::test]
async fn test_model_failure_after_commit_reports_the_commit() {
    let s = setup();
    onboard(&s.store, "u1").await;
    stage_banana(&s).await;

    s.llm.push([call("log_food", "{}"), Step::Fail]);
    let response = s.orchestrator.send_turn("u1", "yes", None).await.unwrap();

    assert_eq!(response.outcome, TurnOutcome::Logged);
    assert_eq!(response.text, "Done, that's in your log.");
    assert_eq!(response.tool_calls.len(), 1);
    assert!(response.tool_calls[0].committed());
    assert_eq!(s.store.count(collections::FOOD_LOGS).await, 1);
}

#[tokio::test]
async fn test_model_failure_after_read_only_tools_returns_fallback() {
    let s = setup();
    onboard(&s.store, "u1").await;

    s.llm.push([call("get_progress", "{}"), Step::Fail]);
    let response = s
        .orchestrator
        .send_turn("u1", "how am I doing?", None)
        .await
        .unwrap();
    assert_eq!(response.outcome, TurnOutcome::Failed);
    assert_eq!(response.text, FALLBACK_RETRY);
}

#[tokio::test]
async fn test_negative_reply_to_pending_proposal_is_not_a_confirmation() {
    let s = setup();
    onboard(&s.store, "u1").await;
    let confirmation_id = stage_banana(&s).await;

    for message in ["no, that's not correct", "ok but it was two bananas", "is pizza ok?"] {
        s.llm.push([reply("Sorry! What did you have?")]);
        let response = s.orchestrator.send_turn("u1", message, None).await.unwrap();
        assert_eq!(response.outcome, TurnOutcome::Replied, "{}", message);
        assert_eq!(response.text, "Sorry! What did you have?");
        assert!(
            !s.llm.last_turn_request().system_prompt.contains("MUST call log_food"),
            "{}",
            message
        );
    }

    let pending = s
        .orchestrator
        .get_pending_confirmation("thread-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.id, confirmation_id);
    assert!(pending.is_pending());
    assert_eq!(s.store.count(collections::FOOD_LOGS).await, 0);
}

#[tokio::test]
async fn test_food_log_rolls_over_at_midnight() {
    let s = setup();
    onboard(&s.store, "u1").await;
    s.clock.set(Utc.with_ymd_and_hms(2026, 3, 1, 23, 55, 0).unwrap());

    stage_banana(&s).await;
    s.llm.push([call("log_food", "{}"), reply("Logged!")]);
    s.orchestrator.send_turn("u1", "yes", None).await.unwrap();
    let before = s.orchestrator.cache().today_food_log("u1").await.unwrap();
    assert_eq!(before.lines.len(), 1);

    // Inside the entry's TTL, but the next local day.
    s.clock.advance(chrono::Duration::minutes(8));
    let after = s.orchestrator.cache().today_food_log("u1").await.unwrap();
    assert_eq!(after.date, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
    assert!(after.is_empty());

    s.llm.push([reply("Good morning!")]);
    s.orchestrator.send_turn("u1", "hi", None).await.unwrap();
    let prompt = s.llm.last_turn_request().system_prompt;
    assert!(prompt.contains("Nothing logged yet today."));
}

#[tokio::test]
async fn test_missing_identity_is_rejected_before_store_access() {
    let s = setup();
    let err = s.orchestrator.send_turn("  ", "hi", None).await.unwrap_err();
    assert!(matches!(err, NutriError::Authentication(_)));
    assert_eq!(s.store.count(collections::THREADS).await, 0);
    assert!(s.llm.requests().is_empty());
}

#[tokio::test]
async fn test_turns_for_different_users_are_isolated() {
    let s = setup();
    onboard(&s.store, "u1").await;
    onboard(&s.store, "u2").await;
    stage_banana(&s).await;

    s.llm.push([reply("Hi!")]);
    let response = s.orchestrator.send_turn("u2", "yes", None).await.unwrap();
    // u2 has nothing staged, so "yes" is an ordinary reply.
    assert_eq!(response.outcome, TurnOutcome::Replied);
    assert_eq!(s.store.count(collections::FOOD_LOGS).await, 0);
}

#[tokio::test]
async fn test_onboarding_advances_one_step_at_a_time() {
    let s = setup();

    s.llm.push([reply("Welcome to NutriChat! What should I call you?")]);
    let response = s.orchestrator.send_turn("u3", "hi", None).await.unwrap();
    assert_eq!(response.outcome, TurnOutcome::Replied);
    assert!(tool_names(&s.llm.last_turn_request()).contains(&"update_goals".to_string()));
    let profile = s.orchestrator.cache().profile("u3").await.unwrap();
    assert_eq!(profile.onboarding_step, OnboardingStep::Name);

    s.llm.push([reply(
        "Nice to meet you, Alex! What do you weigh right now? \
         <<extract step=\"name\" value=\"Alex\">> <<extract step=\"goal\" value=\"lose\">>",
    )]);
    let response = s.orchestrator.send_turn("u3", "I'm Alex", None).await.unwrap();
    assert!(s
        .llm
        .last_turn_request()
        .system_prompt
        .contains("<<extract step=\"name\""));
    assert!(!response.text.contains("<<"));
    assert!(response.text.starts_with("Nice to meet you, Alex!"));

    let profile = s.orchestrator.cache().profile("u3").await.unwrap();
    assert_eq!(profile.name.as_deref(), Some("Alex"));
    assert_eq!(profile.onboarding_step, OnboardingStep::CurrentWeight);
    assert_eq!(profile.goal, None);
}

#[tokio::test]
async fn test_markers_are_stripped_after_onboarding() {
    let s = setup();
    onboard(&s.store, "u1").await;

    s.llm.push([reply("Sure thing. <<extract step=\"name\" value=\"Bob\">>")]);
    let response = s.orchestrator.send_turn("u1", "call me Bob", None).await.unwrap();
    assert_eq!(response.text, "Sure thing.");
    let profile = s.orchestrator.cache().profile("u1").await.unwrap();
    assert_eq!(profile.name.as_deref(), Some("Sam"));
}
