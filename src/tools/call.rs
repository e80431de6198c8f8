//! Typed tool calls.
//!
//! The model sends a tool name and a JSON argument string. [`ToolCall::parse`]
//! turns that into one variant per tool, rejecting unknown names, malformed
//! JSON and out-of-range values before anything executes.
//!
//! Commit calls carry no payload. Whatever the model puts in their arguments
//! is ignored apart from an optional confirmation id; the ledger is written
//! from the staged confirmation only.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::{ActivityLevel, DisplayMode, FoodItem, Goal, MealType};
use crate::error::{NutriError, Result};

pub const CONFIRM_FOOD: &str = "confirm_food";
pub const LOG_FOOD: &str = "log_food";
pub const CONFIRM_WEIGHT: &str = "confirm_weight";
pub const LOG_WEIGHT: &str = "log_weight";
pub const ANALYZE_AND_CONFIRM_PHOTO: &str = "analyze_and_confirm_photo";
pub const GET_PROGRESS: &str = "get_progress";
pub const SEARCH_FOODS: &str = "search_foods";
pub const UPDATE_GOALS: &str = "update_goals";

/// Every tool name the core understands.
pub const ALL_TOOLS: [&str; 8] = [
    CONFIRM_FOOD,
    LOG_FOOD,
    CONFIRM_WEIGHT,
    LOG_WEIGHT,
    ANALYZE_AND_CONFIRM_PHOTO,
    GET_PROGRESS,
    SEARCH_FOODS,
    UPDATE_GOALS,
];

const MAX_MEAL_CALORIES: f64 = 10_000.0;
const MIN_WEIGHT_KG: f64 = 20.0;
const MAX_WEIGHT_KG: f64 = 400.0;
const LB_TO_KG: f64 = 0.453_592_37;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ConfirmFoodArgs {
    pub description: String,
    #[serde(default)]
    pub meal_type: Option<MealType>,
    #[serde(default)]
    pub items: Vec<FoodItem>,
    #[serde(default)]
    pub total_calories: Option<f64>,
    #[serde(default)]
    pub protein_g: Option<f64>,
    #[serde(default)]
    pub carbs_g: Option<f64>,
    #[serde(default)]
    pub fat_g: Option<f64>,
}

/// Arguments of a commit tool.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct CommitArgs {
    #[serde(default)]
    pub confirmation_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    #[default]
    Kg,
    #[serde(alias = "lbs")]
    Lb,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ConfirmWeightArgs {
    pub weight: f64,
    #[serde(default)]
    pub unit: WeightUnit,
    #[serde(default)]
    pub note: Option<String>,
}

impl ConfirmWeightArgs {
    pub fn weight_kg(&self) -> f64 {
        let kg = match self.unit {
            WeightUnit::Kg => self.weight,
            WeightUnit::Lb => self.weight * LB_TO_KG,
        };
        (kg * 10.0).round() / 10.0
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct PhotoArgs {
    #[serde(default)]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub meal_type: Option<MealType>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ProgressArgs {}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SearchArgs {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SearchArgs {
    pub const DEFAULT_LIMIT: usize = 5;
    pub const MAX_LIMIT: usize = 20;

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct UpdateGoalsArgs {
    #[serde(default)]
    pub target_weight_kg: Option<f64>,
    #[serde(default)]
    pub goal: Option<Goal>,
    #[serde(default)]
    pub activity_level: Option<ActivityLevel>,
    #[serde(default)]
    pub display_mode: Option<DisplayMode>,
}

impl UpdateGoalsArgs {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A validated tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    ConfirmFood(ConfirmFoodArgs),
    LogFood(CommitArgs),
    ConfirmWeight(ConfirmWeightArgs),
    LogWeight(CommitArgs),
    AnalyzeAndConfirmPhoto(PhotoArgs),
    GetProgress(ProgressArgs),
    SearchFoods(SearchArgs),
    UpdateGoals(UpdateGoalsArgs),
}

impl ToolCall {
    /// Parse and validate a call from the model.
    ///
    /// # Example
    /// ```
    /// use nutrichat::tools::ToolCall;
    ///
    /// let call = ToolCall::parse("confirm_weight", r#"{"weight": 72.4}"#).unwrap();
    /// assert_eq!(call.name(), "confirm_weight");
    /// assert!(ToolCall::parse("delete_everything", "{}").is_err());
    /// ```
    pub fn parse(name: &str, arguments: &str) -> Result<Self> {
        let call = match name {
            CONFIRM_FOOD => ToolCall::ConfirmFood(decode(name, arguments)?),
            LOG_FOOD => ToolCall::LogFood(decode(name, arguments)?),
            CONFIRM_WEIGHT => ToolCall::ConfirmWeight(decode(name, arguments)?),
            LOG_WEIGHT => ToolCall::LogWeight(decode(name, arguments)?),
            ANALYZE_AND_CONFIRM_PHOTO => ToolCall::AnalyzeAndConfirmPhoto(decode(name, arguments)?),
            GET_PROGRESS => ToolCall::GetProgress(ProgressArgs {}),
            SEARCH_FOODS => ToolCall::SearchFoods(decode(name, arguments)?),
            UPDATE_GOALS => ToolCall::UpdateGoals(decode(name, arguments)?),
            other => return Err(NutriError::UnknownTool(other.to_string())),
        };
        call.validate()?;
        Ok(call)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::ConfirmFood(_) => CONFIRM_FOOD,
            ToolCall::LogFood(_) => LOG_FOOD,
            ToolCall::ConfirmWeight(_) => CONFIRM_WEIGHT,
            ToolCall::LogWeight(_) => LOG_WEIGHT,
            ToolCall::AnalyzeAndConfirmPhoto(_) => ANALYZE_AND_CONFIRM_PHOTO,
            ToolCall::GetProgress(_) => GET_PROGRESS,
            ToolCall::SearchFoods(_) => SEARCH_FOODS,
            ToolCall::UpdateGoals(_) => UPDATE_GOALS,
        }
    }

    pub fn is_commit(&self) -> bool {
        matches!(self, ToolCall::LogFood(_) | ToolCall::LogWeight(_))
    }

    fn validate(&self) -> Result<()> {
        let name = self.name();
        match self {
            ToolCall::ConfirmFood(args) => {
                if args.description.trim().is_empty() {
                    return Err(NutriError::invalid_args(name, "description is required"));
                }
                if args.items.is_empty() && args.total_calories.is_none() {
                    return Err(NutriError::invalid_args(
                        name,
                        "either items or total_calories is required",
                    ));
                }
                for item in &args.items {
                    check_amount(name, &item.name, item.calories, MAX_MEAL_CALORIES)?;
                    check_amount(name, "protein_g", item.protein_g, MAX_MEAL_CALORIES)?;
                    check_amount(name, "carbs_g", item.carbs_g, MAX_MEAL_CALORIES)?;
                    check_amount(name, "fat_g", item.fat_g, MAX_MEAL_CALORIES)?;
                }
                for (field, value) in [
                    ("total_calories", args.total_calories),
                    ("protein_g", args.protein_g),
                    ("carbs_g", args.carbs_g),
                    ("fat_g", args.fat_g),
                ] {
                    if let Some(v) = value {
                        check_amount(name, field, v, MAX_MEAL_CALORIES)?;
                    }
                }
                Ok(())
            }
            ToolCall::ConfirmWeight(args) => {
                let kg = args.weight_kg();
                if !kg.is_finite() || !(MIN_WEIGHT_KG..=MAX_WEIGHT_KG).contains(&kg) {
                    return Err(NutriError::invalid_args(
                        name,
                        format!("weight {} is outside {}-{} kg", kg, MIN_WEIGHT_KG, MAX_WEIGHT_KG),
                    ));
                }
                Ok(())
            }
            ToolCall::SearchFoods(args) => {
                if args.query.trim().is_empty() {
                    return Err(NutriError::invalid_args(name, "query is required"));
                }
                if !(1..=SearchArgs::MAX_LIMIT).contains(&args.limit()) {
                    return Err(NutriError::invalid_args(
                        name,
                        format!("limit must be between 1 and {}", SearchArgs::MAX_LIMIT),
                    ));
                }
                Ok(())
            }
            ToolCall::UpdateGoals(args) => {
                if args.is_empty() {
                    return Err(NutriError::invalid_args(name, "no goal fields supplied"));
                }
                if let Some(kg) = args.target_weight_kg {
                    if !kg.is_finite() || !(MIN_WEIGHT_KG..=MAX_WEIGHT_KG).contains(&kg) {
                        return Err(NutriError::invalid_args(
                            name,
                            "target_weight_kg is out of range",
                        ));
                    }
                }
                Ok(())
            }
            ToolCall::LogFood(_)
            | ToolCall::LogWeight(_)
            | ToolCall::AnalyzeAndConfirmPhoto(_)
            | ToolCall::GetProgress(_) => Ok(()),
        }
    }
}

fn decode<T: DeserializeOwned>(name: &str, arguments: &str) -> Result<T> {
    let raw = if arguments.trim().is_empty() {
        "{}"
    } else {
        arguments
    };
    serde_json::from_str(raw).map_err(|e| NutriError::invalid_args(name, e.to_string()))
}

fn check_amount(tool: &str, field: &str, value: f64, max: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 || value > max {
        return Err(NutriError::invalid_args(
            tool,
            format!("{} has invalid value {}", field, value),
        ));
    }
    Ok(())
}
