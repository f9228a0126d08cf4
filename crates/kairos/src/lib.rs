//! The Kairos facade: a single front door composing governance, guardrails,
//! memory, tools, the planner, the agent loop, and the A2A protocol surface
//! into one running agent (§2, §4). Grounded in the teacher's
//! `KernelBuilder`/`AiosKernel` split: a builder collects overrides with
//! sensible defaults, `build()` wires the collaborators once and hands back
//! an immutable handle.

use std::sync::Arc;
use std::time::Duration;

use kairos_agent::{Agent, AgentConfig as LoopAgentConfig, LlmClient};
use kairos_a2a::{A2aHandler, InMemoryTaskStore, TaskStore};
use kairos_config::{AgentConfig as AgentSectionConfig, KairosConfig};
use kairos_errors::KairosResult;
use kairos_governance::{
    ApprovalHook, ApprovalStore, InMemoryApprovalStore, OrderedRulePolicyEngine, PolicyEngine,
    ApprovalSweeper,
};
use kairos_memory::{ConversationStore, InProcessConversationStore, TruncationStrategy, VectorMemory};
use kairos_planner::Executor as PlannerExecutor;
use kairos_protocol::{AgentCapabilities, AgentCard, AgentSkillSummary, Graph};
use kairos_tools::{Tool, ToolAdapter};

pub use kairos_agent::RunOutcome;
pub use kairos_a2a::{http_router as a2a_http_router, A2aGrpcService};

/// Collects collaborators with defaults, then wires them into a [`Kairos`]
/// handle. Every setter consumes and returns `self`, so callers chain only
/// the overrides they need (§2 "the root entity is an Agent").
pub struct KairosBuilder {
    name: String,
    llm: Arc<dyn LlmClient>,
    config: KairosConfig,
    system_preamble: Option<String>,
    policy: Option<Arc<dyn PolicyEngine>>,
    approval_store: Option<Arc<dyn ApprovalStore>>,
    approval_hook: Option<Arc<dyn ApprovalHook>>,
    task_store: Option<Arc<dyn TaskStore>>,
    conversation_store: Option<Arc<dyn ConversationStore>>,
    truncation: Option<Arc<dyn TruncationStrategy>>,
    semantic_memory: Option<Arc<VectorMemory>>,
    tools: Vec<Arc<dyn Tool>>,
    agent_card: Option<AgentCard>,
    graph: Option<(Arc<Graph>, Arc<PlannerExecutor>)>,
}

impl KairosBuilder {
    pub fn new(name: impl Into<String>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            name: name.into(),
            llm,
            config: KairosConfig::default(),
            system_preamble: None,
            policy: None,
            approval_store: None,
            approval_hook: None,
            task_store: None,
            conversation_store: None,
            truncation: None,
            semantic_memory: None,
            tools: Vec::new(),
            agent_card: None,
            graph: None,
        }
    }

    /// Applies a resolved configuration snapshot (§4.12). Overrides the
    /// agent's action-fallback tunables and seeds the policy engine from
    /// `governance.policies` unless a policy engine was already supplied
    /// explicitly.
    pub fn with_config(mut self, config: KairosConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_system_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.system_preamble = Some(preamble.into());
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn PolicyEngine>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_approval_store(mut self, store: Arc<dyn ApprovalStore>) -> Self {
        self.approval_store = Some(store);
        self
    }

    pub fn with_approval_hook(mut self, hook: Arc<dyn ApprovalHook>) -> Self {
        self.approval_hook = Some(hook);
        self
    }

    pub fn with_task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.task_store = Some(store);
        self
    }

    pub fn with_conversation_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.conversation_store = Some(store);
        self
    }

    pub fn with_truncation(mut self, strategy: Arc<dyn TruncationStrategy>) -> Self {
        self.truncation = Some(strategy);
        self
    }

    pub fn with_semantic_memory(mut self, memory: Arc<VectorMemory>) -> Self {
        self.semantic_memory = Some(memory);
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn with_agent_card(mut self, card: AgentCard) -> Self {
        self.agent_card = Some(card);
        self
    }

    /// Configures a deterministic planner graph for the agent to run
    /// instead of the ReAct loop (§4.7, §4.8). The executor is supplied
    /// fully wired (tool adapter, any `agent`/`llm` invokers, node-type
    /// overrides) since it may need collaborators — like a bounded
    /// sub-agent — this builder has no way to construct on the caller's
    /// behalf.
    pub fn with_graph(mut self, graph: Arc<Graph>, executor: Arc<PlannerExecutor>) -> Self {
        self.graph = Some((graph, executor));
        self
    }

    /// Wires every collaborator and returns the running handle. Registration
    /// errors (a duplicate tool name) are the only fallible step.
    pub fn build(self) -> KairosResult<Kairos> {
        let agent_section = self.agent_section();

        let mut loop_config = LoopAgentConfig::new(self.name.clone());
        if let Some(preamble) = &self.system_preamble {
            loop_config.system_preamble = preamble.clone();
        }
        loop_config.action_fallback.disabled = agent_section.disable_action_fallback;
        loop_config.action_fallback.warn_on_use = agent_section.warn_on_action_fallback;

        let tools = Arc::new(ToolAdapter::new());
        for tool in self.tools {
            tools.register(tool).map_err(|err| {
                kairos_errors::KairosError::invalid_input(err.to_string())
            })?;
        }

        let policy = self
            .policy
            .unwrap_or_else(|| Arc::new(OrderedRulePolicyEngine::new(self.config.governance.policies.clone())));
        let approval_store = self
            .approval_store
            .unwrap_or_else(|| Arc::new(InMemoryApprovalStore::new()));
        let task_store = self.task_store.unwrap_or_else(|| Arc::new(InMemoryTaskStore::new()));
        let conversation_store = self
            .conversation_store
            .unwrap_or_else(|| Arc::new(InProcessConversationStore::new()));

        let approval_ttl = Some(chrono::Duration::seconds(
            self.config.governance.approval_timeout_seconds as i64,
        ));

        let mut agent = Agent::new(
            loop_config,
            self.llm,
            tools.clone(),
            policy.clone(),
            approval_store.clone(),
            conversation_store,
        )
        .with_approval_ttl(approval_ttl);
        if let Some(hook) = self.approval_hook {
            agent = agent.with_approval_hook(hook);
        }
        if let Some(truncation) = self.truncation {
            agent = agent.with_truncation(truncation);
        }
        if let Some(memory) = self.semantic_memory {
            agent = agent.with_semantic_memory(memory);
        }
        if let Some((graph, executor)) = self.graph {
            agent = agent.with_graph(graph, executor);
        }
        let agent = Arc::new(agent);

        let agent_card = self.agent_card.unwrap_or_else(|| default_agent_card(&self.name, &tools));

        let a2a = Arc::new(
            A2aHandler::new(agent.clone(), policy, approval_store.clone(), task_store, agent_card)
                .with_approval_ttl(approval_ttl),
        );

        Ok(Kairos {
            agent,
            a2a,
            tools,
            approval_store,
        })
    }

    fn agent_section(&self) -> AgentSectionConfig {
        self.config
            .agents
            .get(&self.name)
            .map(|over| AgentSectionConfig {
                disable_action_fallback: over
                    .disable_action_fallback
                    .unwrap_or(self.config.agent.disable_action_fallback),
                warn_on_action_fallback: over
                    .warn_on_action_fallback
                    .unwrap_or(self.config.agent.warn_on_action_fallback),
            })
            .unwrap_or_else(|| self.config.agent.clone())
    }
}

fn default_agent_card(name: &str, tools: &ToolAdapter) -> AgentCard {
    let skills = tools
        .declarations()
        .into_iter()
        .map(|(name, description, _schema)| AgentSkillSummary {
            id: name.clone(),
            name,
            description,
        })
        .collect();

    AgentCard {
        name: name.to_owned(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
        description: format!("{name}: a Kairos agent"),
        skills,
        endpoints: Vec::new(),
        capabilities: AgentCapabilities {
            streaming: true,
            push_notifications: true,
            mcp: false,
        },
    }
}

/// A fully wired agent, ready to run turns directly or be served behind the
/// A2A HTTP/gRPC bindings (§4.9, §4.10).
pub struct Kairos {
    agent: Arc<Agent>,
    a2a: Arc<A2aHandler>,
    tools: Arc<ToolAdapter>,
    approval_store: Arc<dyn ApprovalStore>,
}

impl Kairos {
    pub fn agent(&self) -> Arc<Agent> {
        self.agent.clone()
    }

    pub fn a2a(&self) -> Arc<A2aHandler> {
        self.a2a.clone()
    }

    pub fn tools(&self) -> Arc<ToolAdapter> {
        self.tools.clone()
    }

    /// Starts the background sweep of stale pending approvals (§4.3). A
    /// zero interval disables the sweeper, matching
    /// [`ApprovalSweeper::spawn`]'s own convention.
    pub fn spawn_approval_sweeper(&self, interval: Duration, timeout: Duration) -> Option<ApprovalSweeper> {
        ApprovalSweeper::spawn(self.approval_store.clone(), interval, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kairos_agent::{LlmCallOptions, LlmMessage, LlmResponse, ToolDeclaration};

    struct EchoLlm;

    #[async_trait]
    impl LlmClient for EchoLlm {
        async fn complete(
            &self,
            messages: &[LlmMessage],
            _tools: &[ToolDeclaration],
            _options: &LlmCallOptions,
        ) -> KairosResult<LlmResponse> {
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(LlmResponse {
                content: Some(format!("echo: {last}")),
                tool_calls: Vec::new(),
            })
        }
    }

    #[test]
    fn builder_produces_an_agent_card_with_registered_tools() {
        struct NoopTool;

        #[async_trait]
        impl Tool for NoopTool {
            fn name(&self) -> &str {
                "noop"
            }

            fn description(&self) -> &str {
                "does nothing"
            }

            fn schema(&self) -> serde_json::Value {
                serde_json::json!({"type": "object"})
            }

            async fn call(&self, _args: std::collections::HashMap<String, serde_json::Value>) -> KairosResult<serde_json::Value> {
                Ok(serde_json::Value::Null)
            }
        }

        let kairos = KairosBuilder::new("demo", Arc::new(EchoLlm))
            .with_tool(Arc::new(NoopTool))
            .build()
            .expect("build succeeds");

        let card = kairos.a2a().agent_card();
        assert_eq!(card.name, "demo");
        assert_eq!(card.skills.len(), 1);
        assert_eq!(card.skills[0].id, "noop");
    }

    #[test]
    fn per_agent_override_disables_action_fallback_for_one_name() {
        let mut config = KairosConfig::default();
        config.agent.disable_action_fallback = false;
        config.agents.insert(
            "careful".to_owned(),
            kairos_config::AgentOverride {
                disable_action_fallback: Some(true),
                warn_on_action_fallback: None,
            },
        );

        let kairos = KairosBuilder::new("careful", Arc::new(EchoLlm))
            .with_config(config)
            .build()
            .expect("build succeeds");

        assert_eq!(kairos.agent().name(), "careful");
    }

    #[tokio::test]
    async fn configured_graph_runs_through_send_message_instead_of_the_react_loop() {
        use kairos_planner::InMemoryAuditStore;
        use kairos_protocol::{Node, NodeId};
        use std::collections::HashMap;

        let mut nodes = HashMap::new();
        nodes.insert(
            NodeId::from_string("only"),
            Node {
                id: NodeId::from_string("only"),
                node_type: "noop".to_owned(),
                tool: None,
                input: None,
                metadata: serde_json::Value::Null,
            },
        );
        let graph = Arc::new(Graph {
            id: kairos_protocol::GraphId::default(),
            start_node_id: Some(NodeId::from_string("only")),
            nodes,
            edges: Vec::new(),
        });
        let executor = Arc::new(PlannerExecutor::new(Arc::new(InMemoryAuditStore::new())));

        let kairos = KairosBuilder::new("planned", Arc::new(EchoLlm))
            .with_graph(graph, executor)
            .build()
            .expect("build succeeds");

        let task = kairos
            .a2a()
            .send_message(None, None, kairos_protocol::SessionId::default(), "hi".to_owned())
            .await
            .expect("send_message succeeds");
        assert_eq!(task.state, kairos_protocol::TaskState::Completed);
    }
}
