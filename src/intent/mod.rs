//! Intent detection and tool selection
//!
//! A [`Classifier`] turns a raw user message into a small set of [`Intent`]
//! tags. [`select_tools`] maps those tags to the tool groups sent to the model
//! for the turn. Selection only bounds the number of tool schemas per call;
//! every group still behaves correctly when the full set is sent.

mod patterns;

pub use patterns::RegexClassifier;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// What a message is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Food,
    Weight,
    Progress,
    Photo,
    Greeting,
    Confirmation,
    Search,
    Query,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Food => "food",
            Intent::Weight => "weight",
            Intent::Progress => "progress",
            Intent::Photo => "photo",
            Intent::Greeting => "greeting",
            Intent::Confirmation => "confirmation",
            Intent::Search => "search",
            Intent::Query => "query",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type IntentSet = BTreeSet<Intent>;

/// Comma-separated intent names, for logs.
pub fn format_intents(intents: &IntentSet) -> String {
    if intents.is_empty() {
        return "none".to_string();
    }
    intents
        .iter()
        .map(Intent::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Message classifier. Swappable for a model-based implementation.
pub trait Classifier: Send + Sync {
    fn detect_intents(&self, message: &str) -> IntentSet;
}

/// Groups of tools that are selected together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolGroup {
    Food,
    Weight,
    Progress,
    Search,
    Onboarding,
}

/// Which tool groups a turn needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ToolSelection {
    pub needs_food_tools: bool,
    pub needs_weight_tool: bool,
    pub needs_progress_tool: bool,
    pub needs_search_tool: bool,
    pub needs_onboarding_tool: bool,
}

impl ToolSelection {
    /// Every group.
    pub fn full() -> Self {
        Self {
            needs_food_tools: true,
            needs_weight_tool: true,
            needs_progress_tool: true,
            needs_search_tool: true,
            needs_onboarding_tool: true,
        }
    }

    pub fn includes(&self, group: ToolGroup) -> bool {
        match group {
            ToolGroup::Food => self.needs_food_tools,
            ToolGroup::Weight => self.needs_weight_tool,
            ToolGroup::Progress => self.needs_progress_tool,
            ToolGroup::Search => self.needs_search_tool,
            ToolGroup::Onboarding => self.needs_onboarding_tool,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Derive the tool groups for a turn.
///
/// A confirmation reply with a staged proposal always gets the commit tools,
/// whatever else the message matched. An empty intent set fails open to the
/// full set.
pub fn select_tools(intents: &IntentSet, has_pending_confirmation: bool) -> ToolSelection {
    if intents.is_empty() {
        return ToolSelection::full();
    }

    let mut selection = ToolSelection {
        needs_food_tools: intents.contains(&Intent::Food) || intents.contains(&Intent::Photo),
        needs_weight_tool: intents.contains(&Intent::Weight),
        needs_progress_tool: intents.contains(&Intent::Progress)
            || intents.contains(&Intent::Query),
        needs_search_tool: intents.contains(&Intent::Search),
        needs_onboarding_tool: false,
    };

    if intents.contains(&Intent::Confirmation) && has_pending_confirmation {
        selection.needs_food_tools = true;
        // The staged payload may be a weight reading.
        selection.needs_weight_tool = true;
    }

    selection
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[Intent]) -> IntentSet {
        items.iter().copied().collect()
    }

    #[test]
    fn test_empty_fails_open() {
        assert_eq!(select_tools(&IntentSet::new(), false), ToolSelection::full());
    }

    #[test]
    fn test_confirmation_with_pending_forces_food_tools() {
        let selection = select_tools(&set(&[Intent::Confirmation]), true);
        assert!(selection.needs_food_tools);
        assert!(selection.needs_weight_tool);
        assert!(!selection.needs_search_tool);
    }

    #[test]
    fn test_confirmation_without_pending_selects_nothing() {
        let selection = select_tools(&set(&[Intent::Confirmation]), false);
        assert!(selection.is_empty());
    }

    #[test]
    fn test_confirmation_overrides_other_intents() {
        let selection = select_tools(&set(&[Intent::Confirmation, Intent::Progress]), true);
        assert!(selection.needs_food_tools);
        assert!(selection.needs_progress_tool);
    }

    #[test]
    fn test_query_selects_progress_not_food() {
        let selection = select_tools(&set(&[Intent::Query, Intent::Progress]), false);
        assert!(selection.needs_progress_tool);
        assert!(!selection.needs_food_tools);
    }

    #[test]
    fn test_photo_selects_food_tools() {
        assert!(select_tools(&set(&[Intent::Photo]), false).needs_food_tools);
    }

    #[test]
    fn test_greeting_needs_no_tools() {
        assert!(select_tools(&set(&[Intent::Greeting]), false).is_empty());
    }

    #[test]
    fn test_includes() {
        let selection = ToolSelection {
            needs_search_tool: true,
            ..Default::default()
        };
        assert!(selection.includes(ToolGroup::Search));
        assert!(!selection.includes(ToolGroup::Food));
        assert!(ToolSelection::full().includes(ToolGroup::Onboarding));
    }

    #[test]
    fn test_format_intents() {
        assert_eq!(format_intents(&IntentSet::new()), "none");
        assert_eq!(
            format_intents(&set(&[Intent::Query, Intent::Progress])),
            "progress,query"
        );
    }
}
