use std::collections::HashMap;
use std::sync::Arc;

use kairos_errors::KairosResult;
use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;

use crate::Tool;

#[derive(Debug, Error)]
pub enum ToolRegistrationError {
    #[error("a tool named '{0}' is already registered")]
    Duplicate(String),
}

/// Uniform registry over local functions, MCP-backed tools, and skill
/// activations, dispatching calls by name regardless of origin (§4.6).
#[derive(Default)]
pub struct ToolAdapter {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), ToolRegistrationError> {
        let mut tools = self.tools.write();
        let name = tool.name().to_owned();
        if tools.contains_key(&name) {
            return Err(ToolRegistrationError::Duplicate(name));
        }
        tools.insert(name, tool);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    /// Declarations suitable for handing to an LLM's tool-calling surface:
    /// `(name, description, schema)` triples, sorted by name for a
    /// deterministic prompt.
    pub fn declarations(&self) -> Vec<(String, String, Value)> {
        let tools = self.tools.read();
        let mut decls: Vec<_> = tools
            .values()
            .map(|t| (t.name().to_owned(), t.description().to_owned(), t.schema()))
            .collect();
        decls.sort_by(|a, b| a.0.cmp(&b.0));
        decls
    }

    pub async fn call(&self, name: &str, args: HashMap<String, Value>) -> KairosResult<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| kairos_errors::KairosError::not_found(format!("no tool registered named '{name}'")))?;
        tool.call(args).await
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::{LocalTool, LocalToolFn};
    use serde_json::json;

    fn echo_tool(name: &str) -> Arc<dyn Tool> {
        let func: LocalToolFn = Arc::new(|args| Box::pin(async move { Ok(Value::Object(args.into_iter().collect())) }));
        Arc::new(LocalTool::new(name, "echoes its args", json!({"type": "object"}), func))
    }

    #[test]
    fn register_rejects_duplicate_names() {
        let adapter = ToolAdapter::new();
        adapter.register(echo_tool("echo")).unwrap();
        let err = adapter.register(echo_tool("echo")).unwrap_err();
        assert!(matches!(err, ToolRegistrationError::Duplicate(name) if name == "echo"));
    }

    #[tokio::test]
    async fn call_dispatches_by_name() {
        let adapter = ToolAdapter::new();
        adapter.register(echo_tool("echo")).unwrap();
        let mut args = HashMap::new();
        args.insert("x".to_owned(), json!(1));
        let result = adapter.call("echo", args).await.unwrap();
        assert_eq!(result, json!({"x": 1}));
    }

    #[tokio::test]
    async fn call_unknown_tool_fails() {
        let adapter = ToolAdapter::new();
        let result = adapter.call("missing", HashMap::new()).await;
        assert!(result.is_err());
    }

    #[test]
    fn declarations_are_sorted_by_name() {
        let adapter = ToolAdapter::new();
        adapter.register(echo_tool("zeta")).unwrap();
        adapter.register(echo_tool("alpha")).unwrap();
        let names: Vec<_> = adapter.declarations().into_iter().map(|(n, _, _)| n).collect();
        assert_eq!(names, vec!["alpha".to_owned(), "zeta".to_owned()]);
    }

    #[test]
    fn unregister_removes_tool() {
        let adapter = ToolAdapter::new();
        adapter.register(echo_tool("echo")).unwrap();
        assert!(adapter.unregister("echo").is_some());
        assert!(adapter.get("echo").is_none());
    }
}
