use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use kairos_errors::{CancellationToken, KairosError, KairosResult};
use kairos_planner::handler::{AgentInvoker, LlmInvoker};
use kairos_protocol::{ContextId, Node, PlannerState, SessionId, Task};
use serde_json::Value;

use crate::llm::{LlmCallOptions, LlmClient, LlmMessage};
use crate::loop_::{Agent, RunOutcome};

fn node_prompt(node: &Node, state: &PlannerState) -> String {
    match &node.input {
        Some(Value::Object(map)) => match map.get("prompt").or_else(|| map.get("text")) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => state.last.clone().unwrap_or(Value::Null).to_string(),
        },
        Some(other) => other.to_string(),
        None => state.last.clone().unwrap_or(Value::Null).to_string(),
    }
}

/// Plugs a bounded `Agent` into the planner's `agent`-type node (§4.7, §9
/// "cycles across subsystems"). Each invocation is a self-contained turn:
/// a fresh task and session scoped to the node, not the caller's own task.
/// A governance-pending tool call inside a planner-driven sub-agent has
/// nowhere to suspend to (the planner has no notion of `AUTH_REQUIRED`), so
/// it surfaces as an error rather than a `RunOutcome::Pending`.
pub struct PlannerAgentInvoker {
    agent: Arc<Agent>,
}

impl PlannerAgentInvoker {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl AgentInvoker for PlannerAgentInvoker {
    async fn invoke(&self, node: &Node, state: &PlannerState) -> KairosResult<Value> {
        let prompt = node_prompt(node, state);
        let mut task = Task::new(ContextId::default(), Utc::now());
        let session_id = SessionId::default();
        let input = kairos_protocol::Message::text(
            task.id.clone(),
            task.context_id.clone(),
            kairos_protocol::Role::User,
            prompt,
        );
        let cancel = CancellationToken::new();

        match self.agent.run_turn(&mut task, &session_id, &input, &cancel).await? {
            RunOutcome::Completed { message } => {
                Ok(Value::String(message.as_text().unwrap_or_default()))
            }
            RunOutcome::Pending { approval_id } => Err(KairosError::internal(format!(
                "sub-agent node {} suspended on approval {approval_id}, which planner execution cannot resume",
                node.id
            ))),
            RunOutcome::Rejected => Err(KairosError::internal(format!(
                "sub-agent node {} was rejected by governance",
                node.id
            ))),
        }
    }
}

/// Plugs a bare LLM call into the planner's `llm`-type node: no tool
/// calling, no memory, no governance — just a single completion (§4.7).
pub struct PlannerLlmInvoker {
    llm: Arc<dyn LlmClient>,
    system_preamble: Option<String>,
}

impl PlannerLlmInvoker {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            system_preamble: None,
        }
    }

    pub fn with_system_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.system_preamble = Some(preamble.into());
        self
    }
}

#[async_trait]
impl LlmInvoker for PlannerLlmInvoker {
    async fn invoke(&self, node: &Node, state: &PlannerState) -> KairosResult<Value> {
        let prompt = node_prompt(node, state);
        let mut messages = Vec::new();
        if let Some(preamble) = &self.system_preamble {
            messages.push(LlmMessage::system(preamble.clone()));
        }
        messages.push(LlmMessage::user(prompt));

        let response = self
            .llm
            .complete(&messages, &[], &LlmCallOptions::default())
            .await?;
        Ok(Value::String(response.content.unwrap_or_default()))
    }
}
