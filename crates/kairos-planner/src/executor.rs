use std::collections::HashMap;
use std::sync::Arc;

use kairos_errors::{KairosError, KairosResult};
use kairos_protocol::{Graph, GraphId, Node, NodeId, PlannerState, RunId};
use kairos_telemetry::record_error;
use kairos_tools::ToolAdapter;
use tracing::info_span;

use crate::audit::{AuditFilter, AuditRecord, AuditStore};
use crate::condition::Condition;
use crate::handler::{AgentHandler, AgentInvoker, LlmHandler, LlmInvoker, NodeHandler, PassthroughHandler, ToolHandler};

/// Runs `Executor::execute(graph, state)` (§4.7): resolves a handler per
/// node (id override, then type, then implicit tool-name match), follows
/// the first truthy outgoing edge, and guards against cycles via a visited
/// set on `PlannerState`.
pub struct Executor {
    handlers_by_type: HashMap<String, Arc<dyn NodeHandler>>,
    handlers_by_node: HashMap<NodeId, Arc<dyn NodeHandler>>,
    tool_adapter: Option<Arc<ToolAdapter>>,
    audit: Arc<dyn AuditStore>,
}

impl Executor {
    pub fn new(audit: Arc<dyn AuditStore>) -> Self {
        let passthrough: Arc<dyn NodeHandler> = Arc::new(PassthroughHandler);
        let mut handlers_by_type: HashMap<String, Arc<dyn NodeHandler>> = HashMap::new();
        handlers_by_type.insert("decision".to_owned(), passthrough.clone());
        handlers_by_type.insert("noop".to_owned(), passthrough);

        Self {
            handlers_by_type,
            handlers_by_node: HashMap::new(),
            tool_adapter: None,
            audit,
        }
    }

    pub fn with_tool_adapter(mut self, adapter: Arc<ToolAdapter>) -> Self {
        self.handlers_by_type
            .insert("tool".to_owned(), Arc::new(ToolHandler::new(adapter.clone())));
        self.tool_adapter = Some(adapter);
        self
    }

    pub fn with_agent_invoker(mut self, invoker: Arc<dyn AgentInvoker>) -> Self {
        self.handlers_by_type.insert("agent".to_owned(), Arc::new(AgentHandler::new(invoker)));
        self
    }

    pub fn with_llm_invoker(mut self, invoker: Arc<dyn LlmInvoker>) -> Self {
        self.handlers_by_type.insert("llm".to_owned(), Arc::new(LlmHandler::new(invoker)));
        self
    }

    pub fn register_handler(&mut self, node_type: impl Into<String>, handler: Arc<dyn NodeHandler>) {
        self.handlers_by_type.insert(node_type.into(), handler);
    }

    pub fn register_node_override(&mut self, node_id: NodeId, handler: Arc<dyn NodeHandler>) {
        self.handlers_by_node.insert(node_id, handler);
    }

    fn resolve_handler(&self, node: &Node) -> KairosResult<ResolvedHandler> {
        if let Some(handler) = self.handlers_by_node.get(&node.id) {
            return Ok(ResolvedHandler::Registered(handler.clone()));
        }
        if let Some(handler) = self.handlers_by_type.get(&node.node_type) {
            return Ok(ResolvedHandler::Registered(handler.clone()));
        }
        if let Some(adapter) = &self.tool_adapter
            && adapter.get(&node.node_type).is_some()
        {
            return Ok(ResolvedHandler::ImplicitTool(node.node_type.clone()));
        }
        Err(KairosError::invalid_input(format!(
            "no handler registered for node {} of type '{}'",
            node.id, node.node_type
        )))
    }

    pub async fn execute(&self, graph: &Graph, run_id: RunId, mut state: PlannerState) -> KairosResult<PlannerState> {
        graph.validate().map_err(|e| KairosError::invalid_input(e.to_string()))?;
        let mut current = graph.resolve_start().map_err(|e| KairosError::invalid_input(e.to_string()))?;

        loop {
            if !state.record_visit(current.clone()) {
                return Err(KairosError::invalid_input(format!("cycle detected revisiting node {current}")));
            }

            let node = graph.nodes.get(&current).expect("node existence validated above");
            let span = info_span!(
                "planner.node",
                planner.id = %graph.id,
                run.id = %run_id,
                node.id = %node.id,
                node.type = %node.node_type,
            );
            let _enter = span.enter();

            let started = AuditRecord::started(graph.id.clone(), run_id.clone(), node.id.clone(), node.node_type.clone());
            self.audit.record(started.clone()).await?;

            let outcome = match self.resolve_handler(node)? {
                ResolvedHandler::Registered(handler) => handler.handle(node, &state).await,
                ResolvedHandler::ImplicitTool(tool_name) => {
                    let adapter = self.tool_adapter.as_ref().expect("implicit tool resolution requires adapter");
                    let args = match node.input.clone() {
                        Some(serde_json::Value::Object(map)) => map.into_iter().collect(),
                        _ => HashMap::new(),
                    };
                    adapter.call(&tool_name, args).await
                }
            };

            match outcome {
                Ok(output) => {
                    state.set_output(current.clone(), output.clone());
                    self.audit
                        .record(
                            AuditRecord::started(graph.id.clone(), run_id.clone(), node.id.clone(), node.node_type.clone())
                                .complete(output),
                        )
                        .await?;
                }
                Err(err) => {
                    record_error(&span, "planner", &err);
                    self.audit
                        .record(
                            AuditRecord::started(graph.id.clone(), run_id.clone(), node.id.clone(), node.node_type.clone())
                                .fail(err.message.clone()),
                        )
                        .await?;
                    return Err(err);
                }
            }

            match select_next(graph, &current, &state)? {
                Some(next) => current = next,
                None => break,
            }
        }

        Ok(state)
    }

    pub async fn audit_events(&self, filter: &AuditFilter) -> KairosResult<Vec<AuditRecord>> {
        self.audit.list(filter).await
    }
}

enum ResolvedHandler {
    Registered(Arc<dyn NodeHandler>),
    ImplicitTool(String),
}

/// First truthy non-default edge wins; otherwise the first
/// empty/`default`/`always` edge is the fallback; no match terminates (§4.7).
fn select_next(graph: &Graph, from: &NodeId, state: &PlannerState) -> KairosResult<Option<NodeId>> {
    let edges = graph.outgoing_edges(from);
    let mut fallback: Option<NodeId> = None;

    for edge in &edges {
        let condition = Condition::parse(edge.condition.as_deref()).map_err(|e| KairosError::invalid_input(e.to_string()))?;
        if condition.is_always() {
            if fallback.is_none() {
                fallback = Some(edge.to.clone());
            }
            continue;
        }
        if condition.evaluate(state) {
            return Ok(Some(edge.to.clone()));
        }
    }

    Ok(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditStore;
    use kairos_protocol::{Edge, GraphId};
    use serde_json::json;
    use std::collections::HashMap as StdHashMap;

    fn node(id: &str, node_type: &str, tool: Option<&str>) -> Node {
        Node {
            id: NodeId::from_string(id),
            node_type: node_type.to_owned(),
            tool: tool.map(str::to_owned),
            input: None,
            metadata: json!(null),
        }
    }

    #[tokio::test]
    async fn executes_linear_graph_via_default_edges() {
        let mut nodes = StdHashMap::new();
        nodes.insert(NodeId::from_string("a"), node("a", "noop", None));
        nodes.insert(NodeId::from_string("b"), node("b", "noop", None));
        let graph = Graph {
            id: GraphId::default(),
            start_node_id: Some(NodeId::from_string("a")),
            nodes,
            edges: vec![Edge {
                from: NodeId::from_string("a"),
                to: NodeId::from_string("b"),
                condition: None,
            }],
        };

        let executor = Executor::new(Arc::new(InMemoryAuditStore::new()));
        let result = executor.execute(&graph, RunId::default(), PlannerState::new()).await.unwrap();
        assert!(result.outputs.contains_key(&NodeId::from_string("b")));
    }

    #[tokio::test]
    async fn cycle_is_rejected_before_second_visit() {
        let mut nodes = StdHashMap::new();
        nodes.insert(NodeId::from_string("a"), node("a", "noop", None));
        nodes.insert(NodeId::from_string("b"), node("b", "noop", None));
        let graph = Graph {
            id: GraphId::default(),
            start_node_id: Some(NodeId::from_string("a")),
            nodes,
            edges: vec![
                Edge {
                    from: NodeId::from_string("a"),
                    to: NodeId::from_string("b"),
                    condition: None,
                },
                Edge {
                    from: NodeId::from_string("b"),
                    to: NodeId::from_string("a"),
                    condition: None,
                },
            ],
        };

        let executor = Executor::new(Arc::new(InMemoryAuditStore::new()));
        let result = executor.execute(&graph, RunId::default(), PlannerState::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn conditional_edge_selects_among_branches() {
        let mut nodes = StdHashMap::new();
        nodes.insert(NodeId::from_string("a"), node("a", "noop", None));
        nodes.insert(NodeId::from_string("yes"), node("yes", "noop", None));
        nodes.insert(NodeId::from_string("no"), node("no", "noop", None));
        let graph = Graph {
            id: GraphId::default(),
            start_node_id: Some(NodeId::from_string("a")),
            nodes,
            edges: vec![
                Edge {
                    from: NodeId::from_string("a"),
                    to: NodeId::from_string("yes"),
                    condition: Some("last==go".to_owned()),
                },
                Edge {
                    from: NodeId::from_string("a"),
                    to: NodeId::from_string("no"),
                    condition: Some("default".to_owned()),
                },
            ],
        };

        let mut state = PlannerState::new();
        state.set_output(NodeId::from_string("seed"), json!("go"));
        let executor = Executor::new(Arc::new(InMemoryAuditStore::new()));
        let result = executor.execute(&graph, RunId::default(), state).await.unwrap();
        assert!(result.outputs.contains_key(&NodeId::from_string("yes")));
        assert!(!result.outputs.contains_key(&NodeId::from_string("no")));
    }

    #[tokio::test]
    async fn missing_handler_is_a_fatal_error() {
        let mut nodes = StdHashMap::new();
        nodes.insert(NodeId::from_string("a"), node("a", "mystery", None));
        let graph = Graph {
            id: GraphId::default(),
            start_node_id: Some(NodeId::from_string("a")),
            nodes,
            edges: vec![],
        };

        let executor = Executor::new(Arc::new(InMemoryAuditStore::new()));
        let result = executor.execute(&graph, RunId::default(), PlannerState::new()).await;
        assert!(result.is_err());
    }
}
