//! Tool trait and the concurrent tool registry.
//!
//! The registry is the single place the agent loop goes through to run a
//! tool.  [`ToolRegistry::dispatch`] never fails: unknown names, arguments
//! that violate the tool's schema and execution errors all come back as
//! `"Error: ..."` text so the model can read them and recover.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

use crate::error::Result;
use crate::llm::types::ToolDefinition;

/// A named capability the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description and JSON Schema describing the arguments.
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with already-validated arguments.
    async fn execute(&self, arguments: Value) -> Result<String>;
}

/// The outcome of dispatching a tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    fn ok(content: String) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    fn error(detail: impl std::fmt::Display) -> Self {
        Self {
            content: format!("Error: {detail}"),
            is_error: true,
        }
    }
}

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    definition: ToolDefinition,
    validator: Option<Arc<JSONSchema>>,
}

impl RegisteredTool {
    fn new(tool: Arc<dyn Tool>) -> Self {
        let definition = tool.definition();
        let validator = match JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&definition.input_schema)
        {
            Ok(schema) => Some(Arc::new(schema)),
            Err(e) => {
                tracing::warn!(
                    tool = %definition.name,
                    error = %e,
                    "tool input schema does not compile, argument validation disabled"
                );
                None
            }
        };
        Self {
            tool,
            definition,
            validator,
        }
    }
}

/// Name-keyed set of tools, shared by every concurrent invocation.
///
/// Cloning is cheap and every clone sees the same tools.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<DashMap<String, RegisteredTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any tool with the same name.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let entry = RegisteredTool::new(tool);
        let name = entry.definition.name.clone();
        if self.tools.insert(name.clone(), entry).is_some() {
            tracing::debug!(tool = %name, "replaced existing tool");
        } else {
            tracing::debug!(tool = %name, "registered tool");
        }
    }

    /// Remove a tool by name.  Returns `true` if it was present.
    pub fn unregister(&self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    /// Replace the entire tool set.
    pub fn set_tools(&self, tools: Vec<Arc<dyn Tool>>) {
        self.tools.clear();
        for tool in tools {
            self.register(tool);
        }
    }

    /// Registered tool names, sorted.
    pub fn list_tools(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Definitions advertised to the model, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.iter().map(|e| e.definition.clone()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run the named tool.  Every failure is folded into error text.
    pub async fn dispatch(&self, name: &str, arguments: Value) -> ToolOutput {
        // Clone out of the map so no shard lock is held across the await.
        let (tool, validator) = match self.tools.get(name) {
            Some(entry) => (Arc::clone(&entry.tool), entry.validator.clone()),
            None => return ToolOutput::error(format!("unknown tool `{name}`")),
        };

        if let Some(schema) = validator
            && let Err(errors) = schema.validate(&arguments)
        {
            let detail: Vec<String> = errors.map(|e| e.to_string()).collect();
            return ToolOutput::error(format!(
                "invalid arguments for `{name}`: {}",
                detail.join("; ")
            ));
        }

        match tool.execute(arguments).await {
            Ok(content) => ToolOutput::ok(content),
            Err(e) => ToolOutput::error(e),
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.list_tools())
            .finish()
    }
}
