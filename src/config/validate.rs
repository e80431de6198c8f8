//! Configuration diagnostics for `nutrichat config check`.
//!
//! Works on the raw JSON so that unknown or misspelt fields are reported
//! instead of being silently dropped by `#[serde(default)]`.

use std::collections::HashSet;

use serde_json::{Map, Value};

use super::Config;

/// Known fields per section.
const SECTIONS: &[(&str, &[&str])] = &[
    (
        "agent",
        &[
            "model",
            "max_tokens",
            "temperature",
            "max_tool_iterations",
            "minimize_tools",
            "default_utc_offset_minutes",
        ],
    ),
    (
        "cache",
        &[
            "core_stats_ttl_secs",
            "profile_ttl_secs",
            "preferences_ttl_secs",
            "weight_trend_ttl_secs",
            "today_food_log_ttl_secs",
            "thread_context_ttl_secs",
        ],
    ),
    (
        "confirmations",
        &[
            "duplicate_window_secs",
            "duplicate_max_entries",
            "calorie_rounding",
        ],
    ),
    ("store", &["path"]),
    ("logging", &["format", "file", "level"]),
];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Edit distance between two field names.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut row = vec![i + 1; b_chars.len() + 1];
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            row[j + 1] = (prev[j + 1] + 1).min(row[j] + 1).min(prev[j] + cost);
        }
        prev = row;
    }
    prev[b_chars.len()]
}

/// The closest known name within three edits.
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| k.to_string())
}

fn unknown_fields(obj: &Map<String, Value>, known: &[&str], prefix: &str) -> Vec<Diagnostic> {
    let known_set: HashSet<&str> = known.iter().copied().collect();
    obj.keys()
        .filter(|key| !known_set.contains(key.as_str()))
        .map(|key| {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };
            let message = match suggest_field(key, known) {
                Some(s) => format!("Unknown field '{}', did you mean '{}'?", key, s),
                None => format!("Unknown field '{}'", key),
            };
            Diagnostic::new(DiagnosticLevel::Error, path, message)
        })
        .collect()
}

/// Check a raw JSON config for unknown fields, type errors and values the
/// runtime rejects.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let Some(obj) = raw.as_object() else {
        return vec![Diagnostic::new(
            DiagnosticLevel::Error,
            "",
            "Config must be a JSON object",
        )];
    };
    let mut diagnostics = vec![Diagnostic::new(DiagnosticLevel::Ok, "", "Valid JSON")];

    let section_names: Vec<&str> = SECTIONS.iter().map(|(name, _)| *name).collect();
    let mut unknown = unknown_fields(obj, &section_names, "");
    for (name, fields) in SECTIONS {
        if let Some(section) = obj.get(*name).and_then(Value::as_object) {
            unknown.extend(unknown_fields(section, fields, name));
        }
    }
    if unknown.is_empty() {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Ok,
            "",
            "All fields recognized",
        ));
    }
    diagnostics.extend(unknown);

    let config: Config = match serde_json::from_value(raw.clone()) {
        Ok(config) => config,
        Err(e) => {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                "",
                format!("Does not match the config schema: {}", e),
            ));
            return diagnostics;
        }
    };
    if let Err(e) = config.validate() {
        diagnostics.push(Diagnostic::new(DiagnosticLevel::Error, "", e.to_string()));
    }

    if config.agent.max_tool_iterations == 1 {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Warn,
            "agent.max_tool_iterations",
            "1 leaves the model no round-trip to reply after a tool call",
        ));
    }
    if !config.agent.minimize_tools {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Warn,
            "agent.minimize_tools",
            "false sends every tool schema on every turn",
        ));
    }
    diagnostics
}
