//! Derived views over the ledger, used as context cache payloads.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::food::{FoodEntry, MealType, WeightEntry};
use super::profile::UserProfile;

/// Today's totals against the user's target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreStats {
    pub date: NaiveDate,
    pub calories_consumed: f64,
    pub calorie_target: Option<f64>,
    pub calories_remaining: Option<f64>,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    pub entries_logged: usize,
    pub current_weight_kg: Option<f64>,
}

impl CoreStats {
    pub fn compute(date: NaiveDate, entries: &[FoodEntry], profile: &UserProfile) -> Self {
        let consumed: f64 = entries.iter().map(|e| e.food.total_calories).sum();
        let target = profile.daily_calorie_target;
        Self {
            date,
            calories_consumed: consumed,
            calorie_target: target,
            calories_remaining: target.map(|t| t - consumed),
            protein_g: entries.iter().map(|e| e.food.protein_g).sum(),
            carbs_g: entries.iter().map(|e| e.food.carbs_g).sum(),
            fat_g: entries.iter().map(|e| e.food.fat_g).sum(),
            entries_logged: entries.len(),
            current_weight_kg: profile.current_weight_kg,
        }
    }
}

/// One line of today's food log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodLogLine {
    pub meal_type: MealType,
    pub description: String,
    pub calories: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodayFoodLog {
    pub date: NaiveDate,
    pub lines: Vec<FoodLogLine>,
    pub total_calories: f64,
}

impl TodayFoodLog {
    pub fn compute(date: NaiveDate, entries: &[FoodEntry]) -> Self {
        let lines: Vec<FoodLogLine> = entries
            .iter()
            .map(|e| FoodLogLine {
                meal_type: e.food.meal_type,
                description: e.food.description.clone(),
                calories: e.food.total_calories,
            })
            .collect();
        let total_calories = lines.iter().map(|l| l.calories).sum();
        Self {
            date,
            lines,
            total_calories,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightReading {
    pub date: NaiveDate,
    pub weight_kg: f64,
}

/// Recent weight readings, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WeightTrend {
    pub readings: Vec<WeightReading>,
    pub latest_kg: Option<f64>,
    /// Latest minus earliest reading in the window
    pub change_kg: Option<f64>,
}

impl WeightTrend {
    /// Build from ledger entries, keeping the most recent `limit` readings.
    pub fn compute(entries: &[WeightEntry], limit: usize) -> Self {
        let mut sorted: Vec<&WeightEntry> = entries.iter().collect();
        sorted.sort_by_key(|e| e.logged_at);
        let start = sorted.len().saturating_sub(limit);
        let readings: Vec<WeightReading> = sorted[start..]
            .iter()
            .map(|e| WeightReading {
                date: e.date,
                weight_kg: e.weight_kg,
            })
            .collect();

        let latest_kg = readings.last().map(|r| r.weight_kg);
        let change_kg = match (readings.first(), readings.last()) {
            (Some(first), Some(last)) if readings.len() > 1 => {
                Some(((last.weight_kg - first.weight_kg) * 10.0).round() / 10.0)
            }
            _ => None,
        };
        Self {
            readings,
            latest_kg,
            change_kg,
        }
    }
}

/// Conversation metadata for the current thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadContext {
    pub thread_id: String,
    pub created_date: NaiveDate,
    pub message_count: u64,
    pub is_new: bool,
}
