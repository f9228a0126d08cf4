use std::collections::HashMap;

use async_trait::async_trait;
use kairos_errors::{KairosError, KairosResult};
use kairos_protocol::{Node, PlannerState};
use kairos_tools::ToolAdapter;
use serde_json::Value;
use std::sync::Arc;

/// Executes a single node's work and returns its output value (§4.7).
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn handle(&self, node: &Node, state: &PlannerState) -> KairosResult<Value>;
}

/// Preserves `state.last` unchanged — the `decision`/`noop` node types.
pub struct PassthroughHandler;

#[async_trait]
impl NodeHandler for PassthroughHandler {
    async fn handle(&self, _node: &Node, state: &PlannerState) -> KairosResult<Value> {
        Ok(state.last.clone().unwrap_or(Value::Null))
    }
}

/// Invokes `node.tool` through the shared tool adapter, the `tool` node type.
pub struct ToolHandler {
    adapter: Arc<ToolAdapter>,
}

impl ToolHandler {
    pub fn new(adapter: Arc<ToolAdapter>) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl NodeHandler for ToolHandler {
    async fn handle(&self, node: &Node, _state: &PlannerState) -> KairosResult<Value> {
        let tool_name = node
            .tool
            .as_deref()
            .ok_or_else(|| KairosError::invalid_input(format!("node {} has no tool configured", node.id)))?;
        let args = input_as_args(node.input.as_ref());
        self.adapter.call(tool_name, args).await
    }
}

/// A bounded ReAct-loop invocation scoped to one `agent`-type node. Defined
/// here and implemented by the agent crate so the planner never depends on
/// it directly — planner and agent would otherwise form a cycle through
/// `agent`-type nodes (§9 "cycles across subsystems").
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(&self, node: &Node, state: &PlannerState) -> KairosResult<Value>;
}

pub struct AgentHandler {
    invoker: Arc<dyn AgentInvoker>,
}

impl AgentHandler {
    pub fn new(invoker: Arc<dyn AgentInvoker>) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl NodeHandler for AgentHandler {
    async fn handle(&self, node: &Node, state: &PlannerState) -> KairosResult<Value> {
        self.invoker.invoke(node, state).await
    }
}

/// A single LLM call without tool calling, the `llm` node type. Distinct
/// from [`AgentInvoker`] since it never loops or dispatches tools.
#[async_trait]
pub trait LlmInvoker: Send + Sync {
    async fn invoke(&self, node: &Node, state: &PlannerState) -> KairosResult<Value>;
}

pub struct LlmHandler {
    invoker: Arc<dyn LlmInvoker>,
}

impl LlmHandler {
    pub fn new(invoker: Arc<dyn LlmInvoker>) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl NodeHandler for LlmHandler {
    async fn handle(&self, node: &Node, state: &PlannerState) -> KairosResult<Value> {
        self.invoker.invoke(node, state).await
    }
}

fn input_as_args(input: Option<&Value>) -> HashMap<String, Value> {
    match input {
        Some(Value::Object(map)) => map.clone().into_iter().collect(),
        _ => HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_protocol::NodeId;
    use serde_json::json;

    fn node(node_type: &str, tool: Option<&str>, input: Option<Value>) -> Node {
        Node {
            id: NodeId::from_string("n1"),
            node_type: node_type.to_owned(),
            tool: tool.map(str::to_owned),
            input,
            metadata: Value::Null,
        }
    }

    #[tokio::test]
    async fn passthrough_handler_preserves_last() {
        let mut state = PlannerState::new();
        state.set_output(NodeId::from_string("prev"), json!("carry"));
        let handler = PassthroughHandler;
        let output = handler.handle(&node("noop", None, None), &state).await.unwrap();
        assert_eq!(output, json!("carry"));
    }

    #[tokio::test]
    async fn tool_handler_requires_tool_field() {
        let adapter = Arc::new(ToolAdapter::new());
        let handler = ToolHandler::new(adapter);
        let state = PlannerState::new();
        let result = handler.handle(&node("tool", None, None), &state).await;
        assert!(result.is_err());
    }
}
