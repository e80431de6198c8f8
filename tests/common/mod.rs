//! Scripted capabilities and wiring shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::json;

use nutrichat::clock::ManualClock;
use nutrichat::config::Config;
use nutrichat::domain::{ActivityLevel, Gender, Goal, OnboardingStep, UserProfile};
use nutrichat::providers::{
    EmbeddingProvider, GenerateRequest, GenerateResponse, LLMProvider, LLMToolCall,
    SimilarRecord, VisionProvider, VisionResult,
};
use nutrichat::store::{collections, records, MemoryStore, Store};
use nutrichat::{NutriError, Result, TurnOrchestrator};

/// One scripted model round-trip.
pub enum Step {
    Reply(String),
    Calls(Vec<(String, String)>),
    Fail,
}

pub fn reply(text: &str) -> Step {
    Step::Reply(text.to_string())
}

pub fn call(name: &str, arguments: &str) -> Step {
    Step::Calls(vec![(name.to_string(), arguments.to_string())])
}

/// LLM that replays a script and records every request.
#[derive(Default)]
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<GenerateRequest>>,
    threads: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, steps: impl IntoIterator<Item = Step>) {
        self.script.lock().unwrap().extend(steps);
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> GenerateRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }

    /// First request of the most recent turn.
    pub fn last_turn_request(&self) -> GenerateRequest {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.user_message.is_some())
            .cloned()
            .unwrap()
    }
}

#[async_trait]
impl LLMProvider for ScriptedLlm {
    async fn create_thread(&self, _user_id: &str) -> Result<String> {
        let n = self.threads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("thread-{}", n))
    }

    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        let thread_id = request.thread_id.clone();
        self.requests.lock().unwrap().push(request);
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(text)) => Ok(GenerateResponse::text(&thread_id, &text)),
            Some(Step::Calls(calls)) => {
                let tool_calls = calls
                    .iter()
                    .map(|(name, args)| {
                        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                        LLMToolCall::new(&format!("call-{}", n), name, args)
                    })
                    .collect();
                Ok(GenerateResponse::with_tools(&thread_id, "", tool_calls))
            }
            Some(Step::Fail) => Err(NutriError::Provider("upstream timeout".into())),
            None => Ok(GenerateResponse::text(&thread_id, "ok")),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub struct FixedVision(pub VisionResult);

#[async_trait]
impl VisionProvider for FixedVision {
    async fn analyze(&self, _image_ref: &str, _context_hint: Option<&str>) -> Result<VisionResult> {
        Ok(self.0.clone())
    }
}

pub struct FixedEmbeddings;

#[async_trait]
impl EmbeddingProvider for FixedEmbeddings {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }

    async fn search_similar(&self, _vector: &[f32], limit: usize) -> Result<Vec<SimilarRecord>> {
        let hits = vec![
            SimilarRecord {
                record: json!({"name": "banana", "calories": 105}),
                score: 0.93,
            },
            SimilarRecord {
                record: json!({"name": "plantain", "calories": 218}),
                score: 0.71,
            },
        ];
        Ok(hits.into_iter().take(limit).collect())
    }
}

pub struct Setup {
    pub orchestrator: TurnOrchestrator,
    pub llm: Arc<ScriptedLlm>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

/// Orchestrator at 2026-03-01 12:30 UTC (lunch for offset 0).
pub fn setup_with(config: Config, vision: VisionResult) -> Setup {
    let llm = Arc::new(ScriptedLlm::new());
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap(),
    ));
    let orchestrator = TurnOrchestrator::new(
        config,
        store.clone(),
        llm.clone(),
        Arc::new(FixedVision(vision)),
        Arc::new(FixedEmbeddings),
        clock.clone(),
    );
    Setup {
        orchestrator,
        llm,
        store,
        clock,
    }
}

pub fn setup() -> Setup {
    setup_with(Config::default(), VisionResult::NoFood)
}

/// Store a fully onboarded profile for `user_id`.
pub async fn onboard(store: &MemoryStore, user_id: &str) {
    let profile = UserProfile {
        name: Some("Sam".into()),
        current_weight_kg: Some(80.0),
        target_weight_kg: Some(75.0),
        height_cm: Some(180.0),
        age: Some(30),
        gender: Some(Gender::Male),
        activity_level: Some(ActivityLevel::Moderate),
        goal: Some(Goal::Lose),
        daily_calorie_target: Some(2259.0),
        onboarding_step: OnboardingStep::Complete,
        ..Default::default()
    };
    store
        .insert(
            collections::PROFILES,
            user_id,
            records::PROFILE_KEY,
            serde_json::to_value(profile).unwrap(),
        )
        .await
        .unwrap();
}

pub const BANANA: &str =
    r#"{"description":"banana","total_calories":105,"protein_g":1.3,"carbs_g":27,"fat_g":0.4}"#;
