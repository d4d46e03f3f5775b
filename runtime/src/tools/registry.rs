use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ToolError;

use super::{Tool, ToolCallContent, ToolCallContext, ToolSpec};

/// Registry of callable tools, keyed by name. Holds the fixed built-in table plus
/// any world-configured external tools.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        ToolRegistry::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn list(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub async fn call(
        &self,
        name: &str,
        args: serde_json::Value,
        ctx: &ToolCallContext,
    ) -> Result<ToolCallContent, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.call(args, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "echo".into(),
                description: None,
                input_schema: serde_json::json!({}),
            }
        }
        async fn call(&self, args: serde_json::Value, _ctx: &ToolCallContext) -> Result<ToolCallContent, ToolError> {
            Ok(ToolCallContent::text(args["text"].as_str().unwrap_or("").to_string()))
        }
    }

    #[test]
    fn register_and_list_returns_spec() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        assert_eq!(registry.list().len(), 1);
        assert!(registry.contains("echo"));
    }

    #[test]
    fn call_unknown_tool_errors() {
        let registry = ToolRegistry::new();
        assert!(registry.tools.get("missing").is_none());
    }
}
