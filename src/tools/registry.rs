//! Tool registry
//!
//! Name-keyed set of the tools a turn may offer. Definitions handed to the
//! model are filtered by the turn's [`ToolSelection`] and sorted by name so
//! prompts are stable across turns.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{error, info};

use crate::error::{NutriError, Result};
use crate::intent::ToolSelection;
use crate::providers::ToolDefinition;

use super::call::ToolCall;
use super::types::{Tool, ToolContext, ToolOutput};

/// Tools keyed by the name the model calls them with.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// An empty registry.
    ///
    /// # Example
    /// ```
    /// use nutrichat::tools::ToolRegistry;
    ///
    /// let registry = ToolRegistry::new();
    /// assert_eq!(registry.names().len(), 0);
    /// ```
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Add `tool`, replacing any tool registered under the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        info!(tool = %name, kind = %tool.kind(), "Registering tool");
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Execute a validated call with a specific context.
    ///
    /// An unregistered tool is reported as [`NutriError::UnknownTool`].
    pub async fn execute_with_context(&self, call: ToolCall, ctx: &ToolContext) -> Result<ToolOutput> {
        let name = call.name();
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| NutriError::UnknownTool(name.to_string()))?;

        let start = Instant::now();

        match tool.execute(call, ctx).await {
            Ok(output) => {
                info!(
                    tool = name,
                    user_id = %ctx.user_id,
                    thread_id = %ctx.thread_id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool call finished"
                );
                Ok(output)
            }
            Err(e) => {
                error!(
                    tool = name,
                    user_id = %ctx.user_id,
                    thread_id = %ctx.thread_id,
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool execution failed"
                );
                Err(e)
            }
        }
    }

    /// Every definition, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.collect_definitions(|_| true)
    }

    /// Definitions of the tools whose group is in `selection`, sorted by name.
    pub fn definitions_for(&self, selection: &ToolSelection) -> Vec<ToolDefinition> {
        self.collect_definitions(|tool| selection.includes(tool.group()))
    }

    fn collect_definitions(&self, keep: impl Fn(&dyn Tool) -> bool) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self
            .tools
            .values()
            .filter(|t| keep(t.as_ref()))
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.parameters()))
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Registered tool names, unordered.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
