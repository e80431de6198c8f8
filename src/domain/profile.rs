//! User profile, goals and preferences.

use serde::{Deserialize, Serialize};

/// Linear onboarding sequence. `Complete` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    #[default]
    Welcome,
    Name,
    CurrentWeight,
    TargetWeight,
    HeightAge,
    Gender,
    ActivityLevel,
    Goal,
    DisplayMode,
    Complete,
}

impl OnboardingStep {
    /// Steps in order.
    pub const SEQUENCE: [OnboardingStep; 10] = [
        OnboardingStep::Welcome,
        OnboardingStep::Name,
        OnboardingStep::CurrentWeight,
        OnboardingStep::TargetWeight,
        OnboardingStep::HeightAge,
        OnboardingStep::Gender,
        OnboardingStep::ActivityLevel,
        OnboardingStep::Goal,
        OnboardingStep::DisplayMode,
        OnboardingStep::Complete,
    ];

    /// The step after this one. `Complete` stays `Complete`.
    pub fn next(self) -> Self {
        let idx = Self::SEQUENCE
            .iter()
            .position(|s| *s == self)
            .unwrap_or(Self::SEQUENCE.len() - 1);
        Self::SEQUENCE[(idx + 1).min(Self::SEQUENCE.len() - 1)]
    }

    pub fn is_complete(self) -> bool {
        self == OnboardingStep::Complete
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OnboardingStep::Welcome => "welcome",
            OnboardingStep::Name => "name",
            OnboardingStep::CurrentWeight => "current_weight",
            OnboardingStep::TargetWeight => "target_weight",
            OnboardingStep::HeightAge => "height_age",
            OnboardingStep::Gender => "gender",
            OnboardingStep::ActivityLevel => "activity_level",
            OnboardingStep::Goal => "goal",
            OnboardingStep::DisplayMode => "display_mode",
            OnboardingStep::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::SEQUENCE
            .iter()
            .copied()
            .find(|step| step.as_str() == s.trim().to_ascii_lowercase())
    }
}

impl std::fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Active,
    VeryActive,
}

impl ActivityLevel {
    /// TDEE multiplier applied to basal metabolic rate.
    pub fn multiplier(self) -> f64 {
        match self {
            ActivityLevel::Sedentary => 1.2,
            ActivityLevel::Light => 1.375,
            ActivityLevel::Moderate => 1.55,
            ActivityLevel::Active => 1.725,
            ActivityLevel::VeryActive => 1.9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    Lose,
    Maintain,
    Gain,
}

/// How numbers are shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    /// Calories and macros shown
    #[default]
    Standard,
    /// Numbers hidden; qualitative feedback only
    Stealth,
}

/// Persisted user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct UserProfile {
    pub name: Option<String>,
    pub current_weight_kg: Option<f64>,
    pub target_weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub activity_level: Option<ActivityLevel>,
    pub goal: Option<Goal>,
    pub display_mode: Option<DisplayMode>,
    pub daily_calorie_target: Option<f64>,
    pub utc_offset_minutes: Option<i32>,
    pub onboarding_step: OnboardingStep,
}

impl UserProfile {
    pub fn onboarding_complete(&self) -> bool {
        self.onboarding_step.is_complete()
    }

    /// Daily calorie target from Mifflin-St Jeor BMR, activity multiplier and
    /// goal adjustment. `None` until every input is known.
    pub fn compute_calorie_target(&self) -> Option<f64> {
        let weight = self.current_weight_kg?;
        let height = self.height_cm?;
        let age = self.age? as f64;
        let base = 10.0 * weight + 6.25 * height - 5.0 * age;
        let bmr = match self.gender? {
            Gender::Male => base + 5.0,
            Gender::Female => base - 161.0,
            Gender::Other => base - 78.0,
        };
        let tdee = bmr * self.activity_level?.multiplier();
        let target = match self.goal? {
            Goal::Lose => tdee - 500.0,
            Goal::Maintain => tdee,
            Goal::Gain => tdee + 500.0,
        };
        Some(target.max(1200.0).round())
    }
}

/// Persisted presentation preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Preferences {
    pub display_mode: DisplayMode,
    /// Show weights in pounds instead of kilograms
    pub imperial_units: bool,
}
