//! Onboarding step machine and extraction markers.
//!
//! While onboarding is incomplete the model ends each reply with a marker
//! for the answer it just collected:
//!
//! ```text
//! <<extract step="current_weight" value="72 kg">>
//! ```
//!
//! Markers are stripped from the text the user sees. A marker is applied only
//! when it names the current step and its value validates; the profile then
//! moves to the next step. Anything else leaves the step where it is.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::cache::{CacheEvent, ContextCache};
use crate::domain::{ActivityLevel, DisplayMode, Gender, Goal, OnboardingStep, UserProfile};
use crate::error::Result;
use crate::store::{collections, records, Store, WriteBatch};

static MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<<\s*extract\s+step\s*=\s*"([^"]*)"\s+value\s*=\s*"([^"]*)"\s*>>"#).unwrap()
});

static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());

const LB_TO_KG: f64 = 0.453_592_37;

/// One parsed marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub step: String,
    pub value: String,
}

/// What applying one marker did.
#[derive(Debug, Clone, PartialEq)]
pub enum OnboardingOutcome {
    Advanced {
        from: OnboardingStep,
        to: OnboardingStep,
    },
    /// The marker named a step other than the current one.
    OutOfOrder {
        expected: OnboardingStep,
        got: String,
    },
    /// The value did not validate for the current step.
    Invalid {
        step: OnboardingStep,
        value: String,
    },
}

/// Result of processing one model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct OnboardingReport {
    /// Reply text with markers removed
    pub text: String,
    pub outcomes: Vec<OnboardingOutcome>,
    pub step: OnboardingStep,
}

pub fn parse_markers(text: &str) -> Vec<Extraction> {
    MARKER_RE
        .captures_iter(text)
        .map(|c| Extraction {
            step: c[1].trim().to_string(),
            value: c[2].trim().to_string(),
        })
        .collect()
}

pub fn strip_markers(text: &str) -> String {
    let stripped = MARKER_RE.replace_all(text, "");
    BLANK_LINES_RE
        .replace_all(stripped.trim(), "\n\n")
        .into_owned()
}

/// The question the model should be asking at `step`.
pub fn step_prompt(step: OnboardingStep) -> &'static str {
    match step {
        OnboardingStep::Welcome => {
            "Greet the user, say in one sentence that you help track food and weight by chat, and ask for their name."
        }
        OnboardingStep::Name => "Ask what name they would like you to use.",
        OnboardingStep::CurrentWeight => "Ask for their current weight (kg or lb).",
        OnboardingStep::TargetWeight => "Ask for the weight they would like to reach (kg or lb).",
        OnboardingStep::HeightAge => "Ask for their height in centimetres and their age.",
        OnboardingStep::Gender => {
            "Ask which sex to use for calorie estimates: male, female or other."
        }
        OnboardingStep::ActivityLevel => {
            "Ask how active they are: sedentary, light, moderate, active or very_active."
        }
        OnboardingStep::Goal => "Ask whether they want to lose, maintain or gain weight.",
        OnboardingStep::DisplayMode => {
            "Ask whether they want to see calorie numbers (standard) or prefer encouragement without numbers (stealth)."
        }
        OnboardingStep::Complete => "Onboarding is complete.",
    }
}

/// Expected marker value format for `step`.
pub fn value_format(step: OnboardingStep) -> &'static str {
    match step {
        OnboardingStep::Name => "the name",
        OnboardingStep::CurrentWeight | OnboardingStep::TargetWeight => "number and unit, e.g. 72 kg or 160 lb",
        OnboardingStep::HeightAge => "height_cm,age e.g. 175,34",
        OnboardingStep::Gender => "male | female | other",
        OnboardingStep::ActivityLevel => "sedentary | light | moderate | active | very_active",
        OnboardingStep::Goal => "lose | maintain | gain",
        OnboardingStep::DisplayMode => "standard | stealth",
        OnboardingStep::Welcome | OnboardingStep::Complete => "",
    }
}

/// Apply one marker to `profile`.
pub fn apply_extraction(profile: &mut UserProfile, extraction: &Extraction) -> OnboardingOutcome {
    let current = profile.onboarding_step;
    if OnboardingStep::parse(&extraction.step) != Some(current) || current.is_complete() {
        return OnboardingOutcome::OutOfOrder {
            expected: current,
            got: extraction.step.clone(),
        };
    }

    let value = extraction.value.as_str();
    let applied = match current {
        OnboardingStep::Name => {
            let name = value.trim();
            (!name.is_empty() && name.chars().count() <= 50).then(|| {
                profile.name = Some(name.to_string());
            })
        }
        OnboardingStep::CurrentWeight => parse_weight_kg(value).map(|kg| {
            profile.current_weight_kg = Some(kg);
        }),
        OnboardingStep::TargetWeight => parse_weight_kg(value).map(|kg| {
            profile.target_weight_kg = Some(kg);
        }),
        OnboardingStep::HeightAge => parse_height_age(value).map(|(height, age)| {
            profile.height_cm = Some(height);
            profile.age = Some(age);
        }),
        OnboardingStep::Gender => parse_enum::<Gender>(value).map(|g| {
            profile.gender = Some(g);
        }),
        OnboardingStep::ActivityLevel => parse_enum::<ActivityLevel>(value).map(|a| {
            profile.activity_level = Some(a);
        }),
        OnboardingStep::Goal => parse_enum::<Goal>(value).map(|g| {
            profile.goal = Some(g);
        }),
        OnboardingStep::DisplayMode => parse_enum::<DisplayMode>(value).map(|d| {
            profile.display_mode = Some(d);
        }),
        OnboardingStep::Welcome | OnboardingStep::Complete => None,
    };

    if applied.is_none() {
        return OnboardingOutcome::Invalid {
            step: current,
            value: value.to_string(),
        };
    }

    let next = current.next();
    profile.onboarding_step = next;
    if next.is_complete() {
        profile.daily_calorie_target = profile.compute_calorie_target();
    }
    OnboardingOutcome::Advanced {
        from: current,
        to: next,
    }
}

/// Apply every marker in `text`, in order. The welcome step ends with the
/// first reply whether or not it carried a marker.
pub fn advance(profile: &mut UserProfile, text: &str) -> OnboardingReport {
    let mut outcomes = Vec::new();
    if profile.onboarding_step == OnboardingStep::Welcome {
        profile.onboarding_step = OnboardingStep::Name;
        outcomes.push(OnboardingOutcome::Advanced {
            from: OnboardingStep::Welcome,
            to: OnboardingStep::Name,
        });
    }
    for extraction in parse_markers(text) {
        outcomes.push(apply_extraction(profile, &extraction));
    }
    OnboardingReport {
        text: strip_markers(text),
        outcomes,
        step: profile.onboarding_step,
    }
}

/// Persists onboarding progress from model replies.
pub struct OnboardingRecorder {
    store: Arc<dyn Store>,
}

impl OnboardingRecorder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Process a reply for `user_id` and persist any progress.
    pub async fn record(&self, user_id: &str, text: &str) -> Result<OnboardingReport> {
        let doc = records::ensure_profile(self.store.as_ref(), user_id).await?;
        let mut profile: UserProfile = doc.decode()?;
        if profile.onboarding_complete() {
            return Ok(OnboardingReport {
                text: strip_markers(text),
                outcomes: Vec::new(),
                step: profile.onboarding_step,
            });
        }

        let display_before = profile.display_mode;
        let report = advance(&mut profile, text);
        for outcome in &report.outcomes {
            match outcome {
                OnboardingOutcome::Advanced { from, to } => {
                    info!(user_id = %user_id, from = %from, to = %to, "Onboarding advanced");
                }
                OnboardingOutcome::OutOfOrder { expected, got } => {
                    warn!(user_id = %user_id, expected = %expected, got = %got, "Ignoring out-of-order onboarding marker");
                }
                OnboardingOutcome::Invalid { step, value } => {
                    warn!(user_id = %user_id, step = %step, value = %value, "Ignoring invalid onboarding value");
                }
            }
        }

        let changed = report
            .outcomes
            .iter()
            .any(|o| matches!(o, OnboardingOutcome::Advanced { .. }));
        if !changed {
            return Ok(report);
        }

        let mut events = vec![CacheEvent::OnboardingUpdated, CacheEvent::ProfileUpdated];
        let mut batch =
            WriteBatch::new().patch(collections::PROFILES, &doc.id, records::to_fields(&profile)?);
        // The display mode answer also drives the preferences record.
        if let Some(mode) = profile.display_mode.filter(|m| display_before != Some(*m)) {
            let prefs = records::ensure_preferences(self.store.as_ref(), user_id).await?;
            batch = batch.patch(
                collections::PREFERENCES,
                &prefs.id,
                serde_json::json!({ "display_mode": mode }),
            );
            events.push(CacheEvent::PreferencesUpdated);
        }
        self.store
            .apply(batch.extend(ContextCache::invalidation_batch(user_id, &events)))
            .await?;
        Ok(report)
    }
}

fn parse_weight_kg(value: &str) -> Option<f64> {
    let lower = value.to_ascii_lowercase();
    let number: f64 = NUMBER_RE.find(&lower)?.as_str().parse().ok()?;
    let kg = if lower.contains("lb") || lower.contains("pound") {
        number * LB_TO_KG
    } else {
        number
    };
    let kg = (kg * 10.0).round() / 10.0;
    (20.0..=400.0).contains(&kg).then_some(kg)
}

fn parse_height_age(value: &str) -> Option<(f64, u32)> {
    let numbers: Vec<f64> = NUMBER_RE
        .find_iter(value)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    let [height, age] = numbers.as_slice() else {
        return None;
    };
    let age = age.round();
    if !(100.0..=250.0).contains(height) || !(13.0..=120.0).contains(&age) {
        return None;
    }
    Some((*height, age as u32))
}

fn parse_enum<T: serde::de::DeserializeOwned>(value: &str) -> Option<T> {
    let normalized = value.trim().to_ascii_lowercase().replace([' ', '-'], "_");
    serde_json::from_value(serde_json::Value::String(normalized)).ok()
}
