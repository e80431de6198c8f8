//! Food and weight records: proposals staged for confirmation and the ledger
//! entries written once the user confirms.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Which meal a food entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl MealType {
    /// Meal type implied by the user's local hour of day.
    ///
    /// 05-10 breakfast, 11-14 lunch, 15-16 snack, 17-21 dinner, otherwise snack.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=10 => MealType::Breakfast,
            11..=14 => MealType::Lunch,
            15..=16 => MealType::Snack,
            17..=21 => MealType::Dinner,
            _ => MealType::Snack,
        }
    }

    /// Meal type for a local timestamp.
    pub fn from_local_time<T: Timelike>(time: &T) -> Self {
        Self::from_hour(time.hour())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MealType::Breakfast => "breakfast",
            MealType::Lunch => "lunch",
            MealType::Dinner => "dinner",
            MealType::Snack => "snack",
        }
    }
}

impl std::fmt::Display for MealType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a food proposal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FoodSource {
    #[default]
    Text,
    Photo,
}

/// One recognised item inside a meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<String>,
    pub calories: f64,
    #[serde(default)]
    pub protein_g: f64,
    #[serde(default)]
    pub carbs_g: f64,
    #[serde(default)]
    pub fat_g: f64,
}

/// A meal staged for confirmation. This exact payload is what gets logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodProposal {
    pub description: String,
    pub meal_type: MealType,
    pub items: Vec<FoodItem>,
    pub total_calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    #[serde(default)]
    pub source: FoodSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

impl FoodProposal {
    /// Recompute totals from the item list.
    pub fn recompute_totals(&mut self) {
        self.total_calories = self.items.iter().map(|i| i.calories).sum();
        self.protein_g = self.items.iter().map(|i| i.protein_g).sum();
        self.carbs_g = self.items.iter().map(|i| i.carbs_g).sum();
        self.fat_g = self.items.iter().map(|i| i.fat_g).sum();
    }

    /// Calories rounded to the nearest `step`.
    pub fn rounded_calories(&self, step: u32) -> i64 {
        round_to_step(self.total_calories, step)
    }
}

/// A body-weight reading staged for confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightProposal {
    pub weight_kg: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Ledger row for a confirmed meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodEntry {
    pub user_id: String,
    pub date: NaiveDate,
    pub logged_at: DateTime<Utc>,
    pub confirmation_id: String,
    #[serde(flatten)]
    pub food: FoodProposal,
}

/// Ledger row for a confirmed weight reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightEntry {
    pub user_id: String,
    pub date: NaiveDate,
    pub logged_at: DateTime<Utc>,
    pub confirmation_id: String,
    pub weight_kg: f64,
}

/// Round to the nearest multiple of `step` (half away from zero).
pub fn round_to_step(value: f64, step: u32) -> i64 {
    let step = step.max(1) as f64;
    ((value / step).round() * step) as i64
}
