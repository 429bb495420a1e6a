//! Local tool registry.
//!
//! A local tool is anything dispatched synchronously within a step —
//! as opposed to `spawn_worker`, which always suspends the run and is
//! handled directly by [`crate::engine`]. Concrete tool implementations
//! (exec, HTTP fetch, ...) live outside this crate; this module only
//! defines the trait and the name-keyed registry the engine dispatches
//! through, mirroring the reference gateway's `LocalTool`/
//! `ToolDestination` split in `nodes/router.rs`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use foreman_domain::envelope::ToolOutcome;
use foreman_domain::tool::ToolDefinition;

#[async_trait::async_trait]
pub trait LocalTool: Send + Sync {
    async fn call(&self, arguments: Value) -> ToolOutcome;
}

struct Registered {
    definition: ToolDefinition,
    tool: Arc<dyn LocalTool>,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Registered>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: ToolDefinition, tool: Arc<dyn LocalTool>) {
        self.tools.insert(definition.name.clone(), Registered { definition, tool });
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn LocalTool>> {
        self.tools.get(name).map(|r| r.tool.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool definitions to offer the LLM, in addition to `spawn_worker`
    /// which the engine appends itself.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|r| r.definition.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait::async_trait]
    impl LocalTool for Echo {
        async fn call(&self, arguments: Value) -> ToolOutcome {
            ToolOutcome::ok(arguments)
        }
    }

    fn echo_definition() -> ToolDefinition {
        ToolDefinition {
            name: "echo".to_string(),
            description: "echoes its arguments back".to_string(),
            parameters: json!({"type": "object"}),
        }
    }

    #[tokio::test]
    async fn registered_tool_is_dispatched() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_definition(), Arc::new(Echo));
        let tool = registry.get("echo").expect("registered");
        let outcome = tool.call(json!({"x": 1})).await;
        assert!(outcome.is_ok());
    }

    #[test]
    fn definitions_lists_registered_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_definition(), Arc::new(Echo));
        assert_eq!(registry.definitions().len(), 1);
    }

    #[test]
    fn unknown_tool_is_none() {
        let registry = ToolRegistry::new();
        assert!(registry.get("nope").is_none());
    }
}
