//! Domain records shared by the cache, tools and orchestrator.

pub mod food;
pub mod profile;
pub mod stats;

pub use food::{
    round_to_step, FoodEntry, FoodItem, FoodProposal, FoodSource, MealType, WeightEntry,
    WeightProposal,
};
pub use profile::{
    ActivityLevel, DisplayMode, Gender, Goal, OnboardingStep, Preferences, UserProfile,
};
pub use stats::{CoreStats, FoodLogLine, ThreadContext, TodayFoodLog, WeightReading, WeightTrend};
