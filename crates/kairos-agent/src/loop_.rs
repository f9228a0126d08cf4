use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use kairos_errors::{CancellationToken, KairosError, KairosResult};
use kairos_governance::{ApprovalHook, ApprovalStore, HookDecision, PolicyEngine};
use kairos_guardrails::{InputPipeline, OutputPipeline};
use kairos_memory::{ConversationStore, TruncationStrategy, VectorMemory};
use kairos_planner::Executor;
use kairos_protocol::{
    Action, ApprovalId, ApprovalRecord, ConversationMessage, ConversationRole, Effect, Graph,
    Message, PlannerState, Role, RunId, SessionId, Task, TaskState, ToolCallId,
};
use kairos_tools::ToolAdapter;
use serde_json::Value;
use tracing::{info_span, instrument, warn};

use crate::action_fallback::parse_action_line;
use crate::config::AgentConfig;
use crate::llm::{LlmCallOptions, LlmClient, LlmMessage, LlmRole, ToolCallRequest, ToolDeclaration};
use crate::pending::{LoopSnapshot, PendingRunStore};

/// What a ReAct turn ends in (§4.8, §4.9 "SendMessage"). `Pending` maps to
/// an `AUTH_REQUIRED` task state at the A2A layer; `Rejected` maps to the
/// task's terminal `REJECTED` state.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed { message: Message },
    Pending { approval_id: ApprovalId },
    Rejected,
}

fn conversation_to_llm(message: &ConversationMessage) -> LlmMessage {
    let role = match message.role {
        ConversationRole::User => LlmRole::User,
        ConversationRole::Assistant => LlmRole::Assistant,
        ConversationRole::System => LlmRole::System,
        ConversationRole::Tool => LlmRole::Tool,
    };
    LlmMessage {
        role,
        content: message.content.clone(),
        tool_call_id: message.tool_call_id.as_ref().map(|id| id.to_string()),
        tool_calls: Vec::new(),
    }
}

/// Bounded iterative reasoner: alternates LLM turns and tool executions,
/// honoring governance and guardrails at every tool call (§4.8).
pub struct Agent {
    config: AgentConfig,
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolAdapter>,
    policy: Arc<dyn PolicyEngine>,
    approval_hook: Option<Arc<dyn ApprovalHook>>,
    approval_store: Arc<dyn ApprovalStore>,
    approval_ttl: Option<chrono::Duration>,
    conversation: Arc<dyn ConversationStore>,
    truncation: Option<Arc<dyn TruncationStrategy>>,
    semantic_memory: Option<Arc<VectorMemory>>,
    input_pipeline: InputPipeline,
    output_pipeline: OutputPipeline,
    pending_runs: Arc<PendingRunStore>,
    graph: Option<(Arc<Graph>, Arc<Executor>)>,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolAdapter>,
        policy: Arc<dyn PolicyEngine>,
        approval_store: Arc<dyn ApprovalStore>,
        conversation: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            config,
            llm,
            tools,
            policy,
            approval_hook: None,
            approval_store,
            approval_ttl: Some(chrono::Duration::minutes(30)),
            conversation,
            truncation: None,
            semantic_memory: None,
            input_pipeline: InputPipeline::new(),
            output_pipeline: OutputPipeline::new(),
            pending_runs: Arc::new(PendingRunStore::new()),
            graph: None,
        }
    }

    pub fn with_approval_hook(mut self, hook: Arc<dyn ApprovalHook>) -> Self {
        self.approval_hook = Some(hook);
        self
    }

    pub fn with_approval_ttl(mut self, ttl: Option<chrono::Duration>) -> Self {
        self.approval_ttl = ttl;
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

    pub fn with_input_pipeline(mut self, pipeline: InputPipeline) -> Self {
        self.input_pipeline = pipeline;
        self
    }

    pub fn with_output_pipeline(mut self, pipeline: OutputPipeline) -> Self {
        self.output_pipeline = pipeline;
        self
    }

    /// Configures a deterministic planner graph that `run_turn` dispatches
    /// to instead of the ReAct loop (§4.8 "If a graph is configured on the
    /// agent, Run dispatches to §4.7"). The executor is the caller's
    /// responsibility to wire (tool adapter, sub-agent/LLM invokers,
    /// node-type handlers) — this only decides which code path `run_turn`
    /// takes.
    pub fn with_graph(mut self, graph: Arc<Graph>, executor: Arc<Executor>) -> Self {
        self.graph = Some((graph, executor));
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn pending_runs(&self) -> Arc<PendingRunStore> {
        self.pending_runs.clone()
    }

    async fn build_initial_messages(
        &self,
        session_id: &SessionId,
        input_text: &str,
    ) -> KairosResult<Vec<LlmMessage>> {
        let mut messages = vec![LlmMessage::system(self.config.system_preamble.clone())];

        if let Some(memory) = &self.semantic_memory {
            let recalled = memory
                .recall(input_text, self.config.memory_recall_k, None)
                .await?;
            if !recalled.is_empty() {
                let joined = recalled
                    .iter()
                    .map(|r| r.point.payload.to_string())
                    .collect::<Vec<_>>()
                    .join("\n");
                messages.push(LlmMessage::system(format!("Relevant memory:\n{joined}")));
            }
        }

        let history = self
            .conversation
            .list_last_n(session_id, self.config.history_limit)
            .await?;
        let history = match &self.truncation {
            Some(strategy) => strategy.apply(history).await,
            None => history,
        };
        for message in &history {
            messages.push(conversation_to_llm(message));
        }

        self.conversation
            .append(ConversationMessage::new(
                session_id.clone(),
                ConversationRole::User,
                input_text.to_owned(),
                Utc::now(),
            ))
            .await?;
        messages.push(LlmMessage::user(input_text));

        Ok(messages)
    }

    async fn call_llm(
        &self,
        messages: &[LlmMessage],
        tools: &[ToolDeclaration],
        options: &LlmCallOptions,
        cancel: &CancellationToken,
    ) -> KairosResult<crate::llm::LlmResponse> {
        let span = info_span!("agent.llm_call", agent = %self.config.name);
        let _enter = span.enter();

        let result = kairos_errors::retry(&self.config.llm_retry, cancel, |_attempt| {
            let llm = self.llm.clone();
            let messages = messages.to_vec();
            let tools = tools.to_vec();
            let options = options.clone();
            let deadline = self.config.llm_call_timeout;
            async move {
                kairos_errors::timeout(deadline, llm.complete(&messages, &tools, &options))
                    .await
                    .map_err(|err| {
                        if err.kind == kairos_errors::ErrorKind::Timeout {
                            err
                        } else {
                            KairosError::llm_error(err.message.clone())
                                .recoverable(true)
                                .with_context("original_kind", err.kind.to_string())
                        }
                    })
            }
        })
        .await;

        if let Err(err) = &result {
            kairos_telemetry::record_error(&span, "agent-loop-llm", err);
        }
        result
    }

    async fn invoke_tool(&self, call: &ToolCallRequest, cancel: &CancellationToken) -> KairosResult<Value> {
        let args_map: HashMap<String, Value> = match &call.arguments {
            Value::Object(map) => map.clone().into_iter().collect(),
            _ => HashMap::new(),
        };
        let span = info_span!("agent.tool_call", tool = %call.name);
        let _enter = span.enter();

        let result = kairos_errors::retry(&self.config.tool_retry, cancel, |_attempt| {
            let tools = self.tools.clone();
            let name = call.name.clone();
            let args = args_map.clone();
            let deadline = self.config.tool_call_timeout;
            async move {
                kairos_errors::timeout(deadline, tools.call(&name, args))
                    .await
                    .map_err(|err| {
                        if err.kind == kairos_errors::ErrorKind::Timeout {
                            err
                        } else {
                            KairosError::tool_failure(err.message.clone())
                                .recoverable(true)
                                .with_context("tool", name.clone())
                        }
                    })
            }
        })
        .await;

        if let Err(err) = &result {
            kairos_telemetry::record_error(&span, "agent-loop-tool", err);
        }
        result
    }

    fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools
            .declarations()
            .into_iter()
            .map(|(name, description, schema)| ToolDeclaration {
                name,
                description,
                schema,
            })
            .collect()
    }

    /// Entry point for a fresh turn (§4.8). Builds the initial message list
    /// (system preamble, optional memory recall, optional truncated
    /// history, then the user message) and iterates.
    #[instrument(skip(self, task, session_id, input, cancel), fields(agent = %self.config.name, task = %task.id))]
    pub async fn run_turn(
        &self,
        task: &mut Task,
        session_id: &SessionId,
        input: &Message,
        cancel: &CancellationToken,
    ) -> KairosResult<RunOutcome> {
        if let Some((graph, executor)) = &self.graph {
            return self.run_graph_turn(session_id, input, graph, executor).await;
        }
        let input_text = input.as_text().unwrap_or_default();
        let messages = self.build_initial_messages(session_id, &input_text).await?;
        self.iterate(task, session_id, messages, 1, cancel).await
    }

    /// Runs the configured planner graph for one turn instead of the ReAct
    /// loop (§4.7, §4.8): seeds `PlannerState::last` with the user input,
    /// executes the graph to completion, and folds the final `last` value
    /// into the turn's reply. Tasks never suspend into `AUTH_REQUIRED` from
    /// this path — governance gating, if any, lives inside the node
    /// handlers the caller wired into the executor.
    async fn run_graph_turn(
        &self,
        session_id: &SessionId,
        input: &Message,
        graph: &Graph,
        executor: &Executor,
    ) -> KairosResult<RunOutcome> {
        let input_text = input.as_text().unwrap_or_default();
        self.conversation
            .append(ConversationMessage::new(
                session_id.clone(),
                ConversationRole::User,
                input_text.clone(),
                Utc::now(),
            ))
            .await?;

        let mut state = PlannerState::new();
        state.last = Some(Value::String(input_text));
        let state = executor.execute(graph, RunId::default(), state).await?;

        let output_text = match state.last {
            Some(Value::String(text)) => text,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let (filtered, _redactions) = self.output_pipeline.run(&output_text).await;
        self.conversation
            .append(ConversationMessage::new(
                session_id.clone(),
                ConversationRole::Assistant,
                filtered.clone(),
                Utc::now(),
            ))
            .await?;

        let message = Message::text(input.task_id.clone(), input.context_id.clone(), Role::Agent, filtered);
        Ok(RunOutcome::Completed { message })
    }

    /// Resumes a turn suspended on a governance-pending tool call (§4.8,
    /// §8 "pending approval"). On reject, terminates with `REJECTED`; on
    /// approve, invokes the pending tool call, then resumes gating the rest
    /// of that turn's tool-call batch (it may itself suspend again on a
    /// later call) before continuing to the next LLM turn.
    pub async fn resume(
        &self,
        approval_id: &ApprovalId,
        approved: bool,
        task: &mut Task,
        cancel: &CancellationToken,
    ) -> KairosResult<RunOutcome> {
        let snapshot = self
            .pending_runs
            .take(approval_id)
            .ok_or_else(|| KairosError::not_found(format!("no pending run for approval {approval_id}")))?;

        if !approved {
            let _ = task.transition(TaskState::Rejected, Utc::now());
            return Ok(RunOutcome::Rejected);
        }

        let mut messages = snapshot.messages;
        let outcome = self.invoke_tool(&snapshot.pending_call, cancel).await;
        let observation = match outcome {
            Ok(value) => value.to_string(),
            Err(err) if err.recoverable => format!("error: {}", err.message),
            Err(err) => return Err(err),
        };
        messages.push(LlmMessage::tool_result(snapshot.pending_call.id.clone(), observation.clone()));
        self.conversation
            .append(
                ConversationMessage::new(
                    snapshot.session_id.clone(),
                    ConversationRole::Tool,
                    observation,
                    Utc::now(),
                )
                .with_tool_call_id(ToolCallId::from_string(snapshot.pending_call.id.clone())),
            )
            .await?;

        if let Some(approval_id) = self
            .process_tool_calls(task, &snapshot.session_id, &mut messages, &snapshot.remaining_calls, snapshot.iteration, cancel)
            .await?
        {
            return Ok(RunOutcome::Pending { approval_id });
        }

        let _ = task.transition(TaskState::Working, Utc::now());
        self.iterate(task, &snapshot.session_id, messages, snapshot.iteration + 1, cancel)
            .await
    }

    /// Gates and executes one LLM turn's tool-call batch in order (§4.8).
    /// Stops at the first `Pending` governance decision, stashing the calls
    /// after it in the suspended snapshot so `resume` picks the batch back
    /// up instead of abandoning them. Returns the approval id it suspended
    /// on, or `None` once every call in `calls` has been resolved.
    async fn process_tool_calls(
        &self,
        task: &mut Task,
        session_id: &SessionId,
        messages: &mut Vec<LlmMessage>,
        calls: &[ToolCallRequest],
        iteration: u32,
        cancel: &CancellationToken,
    ) -> KairosResult<Option<ApprovalId>> {
        for (index, call) in calls.iter().enumerate() {
            let action = Action {
                action_type: kairos_protocol::ActionType::Tool,
                name: call.name.clone(),
                metadata: call.arguments.clone(),
            };
            let mut decision = self.policy.evaluate(&action).await;

            if decision.status == Effect::Pending
                && let Some(hook) = &self.approval_hook
            {
                let (hook_decision, rationale) = hook.resolve(&action, &decision.reason).await;
                decision = match hook_decision {
                    HookDecision::Allow => kairos_protocol::Decision::allow(rationale, decision.rule_id.clone()),
                    HookDecision::Deny => kairos_protocol::Decision::deny(rationale, decision.rule_id.clone()),
                };
            }

            match decision.status {
                Effect::Deny => {
                    self.append_tool_observation(session_id, call, &format!("denied: {}", decision.reason))
                        .await?;
                    messages.push(LlmMessage::tool_result(
                        call.id.clone(),
                        format!("denied: {}", decision.reason),
                    ));
                }
                Effect::Pending => {
                    let now = Utc::now();
                    let record = ApprovalRecord::new(
                        task.id.clone(),
                        task.context_id.clone(),
                        call.name.clone(),
                        self.config.name.clone(),
                        decision.reason.clone(),
                        now,
                        self.approval_ttl,
                    );
                    self.approval_store.put(record.clone()).await?;
                    self.pending_runs.insert(
                        record.id.clone(),
                        LoopSnapshot {
                            task_id: task.id.clone(),
                            session_id: session_id.clone(),
                            messages: messages.clone(),
                            iteration,
                            pending_call: call.clone(),
                            remaining_calls: calls[index + 1..].to_vec(),
                        },
                    );
                    let _ = task.transition(TaskState::AuthRequired, now);
                    return Ok(Some(record.id));
                }
                Effect::Allow => {
                    let args_repr = serde_json::to_string(&call.arguments).unwrap_or_default();
                    let check = self.input_pipeline.run(&args_repr, cancel).await;
                    if check.is_blocking() {
                        let reason = match &check {
                            kairos_guardrails::CheckOutcome::Block { reason } => reason.clone(),
                            kairos_guardrails::CheckOutcome::Pass => String::new(),
                        };
                        self.append_tool_observation(session_id, call, &format!("blocked: {reason}"))
                            .await?;
                        messages.push(LlmMessage::tool_result(call.id.clone(), format!("blocked: {reason}")));
                        continue;
                    }

                    match self.invoke_tool(call, cancel).await {
                        Ok(value) => {
                            let observation = value.to_string();
                            self.append_tool_observation(session_id, call, &observation).await?;
                            messages.push(LlmMessage::tool_result(call.id.clone(), observation));
                        }
                        Err(err) if err.recoverable => {
                            let observation = format!("error: {}", err.message);
                            self.append_tool_observation(session_id, call, &observation).await?;
                            messages.push(LlmMessage::tool_result(call.id.clone(), observation));
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
        }

        Ok(None)
    }

    async fn iterate(
        &self,
        task: &mut Task,
        session_id: &SessionId,
        mut messages: Vec<LlmMessage>,
        start_iteration: u32,
        cancel: &CancellationToken,
    ) -> KairosResult<RunOutcome> {
        let declarations = self.declarations();

        for iteration in start_iteration..=self.config.max_iterations {
            if cancel.is_cancelled() {
                return Err(KairosError::context_lost("cancelled during agent loop")
                    .with_context("iteration", iteration));
            }

            let options = LlmCallOptions {
                native_tool_calling: true,
                ..LlmCallOptions::default()
            };
            let response = self.call_llm(&messages, &declarations, &options, cancel).await?;

            let mut tool_calls = response.tool_calls.clone();
            if tool_calls.is_empty() && !self.config.action_fallback.disabled {
                if let Some(call) = response.content.as_deref().and_then(parse_action_line) {
                    if self.config.action_fallback.warn_on_use {
                        warn!(agent = %self.config.name, tool = %call.name, "using textual Action: fallback parser");
                    }
                    tool_calls.push(call);
                }
            }

            if !tool_calls.is_empty() {
                messages.push(LlmMessage::assistant_tool_calls(tool_calls.clone()));
                self.conversation
                    .append(ConversationMessage::new(
                        session_id.clone(),
                        ConversationRole::Assistant,
                        serde_json::to_string(&tool_calls).unwrap_or_default(),
                        Utc::now(),
                    ))
                    .await?;

                if let Some(approval_id) = self
                    .process_tool_calls(task, session_id, &mut messages, &tool_calls, iteration, cancel)
                    .await?
                {
                    return Ok(RunOutcome::Pending { approval_id });
                }

                continue;
            }

            let content = response.content.unwrap_or_default();
            let (filtered, _redactions) = self.output_pipeline.run(&content).await;
            self.conversation
                .append(ConversationMessage::new(
                    session_id.clone(),
                    ConversationRole::Assistant,
                    filtered.clone(),
                    Utc::now(),
                ))
                .await?;

            let message = Message::text(task.id.clone(), task.context_id.clone(), Role::Agent, filtered);
            return Ok(RunOutcome::Completed { message });
        }

        Err(KairosError::internal("agent loop exceeded max iterations")
            .with_context("max_iterations", self.config.max_iterations))
    }

    async fn append_tool_observation(
        &self,
        session_id: &SessionId,
        call: &ToolCallRequest,
        observation: &str,
    ) -> KairosResult<()> {
        self.conversation
            .append(
                ConversationMessage::new(session_id.clone(), ConversationRole::Tool, observation.to_owned(), Utc::now())
                    .with_tool_call_id(ToolCallId::from_string(call.id.clone())),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmResponse;
    use async_trait::async_trait;
    use kairos_governance::{InMemoryApprovalStore, OrderedRulePolicyEngine};
    use kairos_memory::InProcessConversationStore;
    use kairos_planner::InMemoryAuditStore;
    use kairos_protocol::{
        ActionType, ContextId, Edge, Effect as ProtoEffect, GraphId, Node, NodeId, PolicyRule,
    };
    use kairos_tools::{LocalTool, LocalToolFn};
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex as StdMutex;

    struct ScriptedLlm {
        responses: StdMutex<std::collections::VecDeque<LlmResponse>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<LlmResponse>) -> Self {
            Self {
                responses: StdMutex::new(responses.into_iter().collect()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(
            &self,
            _messages: &[LlmMessage],
            _tools: &[ToolDeclaration],
            _options: &LlmCallOptions,
        ) -> KairosResult<LlmResponse> {
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| LlmResponse {
                    content: Some("done".to_owned()),
                    tool_calls: Vec::new(),
                }))
        }
    }

    fn echo_tool() -> Arc<dyn kairos_tools::Tool> {
        let func: LocalToolFn = Arc::new(|args| {
            Box::pin(async move { Ok(Value::Object(args.into_iter().collect())) })
        });
        Arc::new(LocalTool::new(
            "echo",
            "echoes its arguments",
            serde_json::json!({"type": "object"}),
            func,
        ))
    }

    fn build_agent(config: AgentConfig, llm: Arc<dyn LlmClient>, rules: Vec<PolicyRule>) -> Agent {
        let tools = Arc::new(ToolAdapter::new());
        tools.register(echo_tool()).unwrap();
        Agent::new(
            config,
            llm,
            tools,
            Arc::new(OrderedRulePolicyEngine::new(rules)),
            Arc::new(InMemoryApprovalStore::new()),
            Arc::new(InProcessConversationStore::new()),
        )
    }

    fn sample_task() -> Task {
        Task::new(ContextId::default(), Utc::now())
    }

    #[tokio::test]
    async fn completes_without_tool_calls() {
        let llm = Arc::new(ScriptedLlm::new(vec![LlmResponse {
            content: Some("hello there".to_owned()),
            tool_calls: Vec::new(),
        }]));
        let agent = build_agent(AgentConfig::new("assistant"), llm, Vec::new());
        let mut task = sample_task();
        let session_id = SessionId::default();
        let input = Message::text(task.id.clone(), task.context_id.clone(), Role::User, "hi");
        let cancel = CancellationToken::new();

        let outcome = agent.run_turn(&mut task, &session_id, &input, &cancel).await.unwrap();
        match outcome {
            RunOutcome::Completed { message } => {
                assert_eq!(message.as_text().as_deref(), Some("hello there"));
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn allowed_tool_call_is_executed_then_final_answer_returned() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            LlmResponse {
                content: None,
                tool_calls: vec![ToolCallRequest {
                    id: "call-1".to_owned(),
                    name: "echo".to_owned(),
                    arguments: serde_json::json!({"x": 1}),
                }],
            },
            LlmResponse {
                content: Some("final answer".to_owned()),
                tool_calls: Vec::new(),
            },
        ]));
        let agent = build_agent(AgentConfig::new("assistant"), llm, Vec::new());
        let mut task = sample_task();
        let session_id = SessionId::default();
        let input = Message::text(task.id.clone(), task.context_id.clone(), Role::User, "use the tool");
        let cancel = CancellationToken::new();

        let outcome = agent.run_turn(&mut task, &session_id, &input, &cancel).await.unwrap();
        match outcome {
            RunOutcome::Completed { message } => {
                assert_eq!(message.as_text().as_deref(), Some("final answer"));
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pending_tool_call_suspends_and_resume_completes_the_turn() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            LlmResponse {
                content: None,
                tool_calls: vec![ToolCallRequest {
                    id: "call-1".to_owned(),
                    name: "echo".to_owned(),
                    arguments: serde_json::json!({"x": 1}),
                }],
            },
            LlmResponse {
                content: Some("resumed answer".to_owned()),
                tool_calls: Vec::new(),
            },
        ]));
        let rules = vec![PolicyRule {
            id: "require-approval".to_owned(),
            effect: ProtoEffect::Pending,
            action_type: Some(ActionType::Tool),
            name_pattern: "echo".to_owned(),
            reason: "echo requires approval".to_owned(),
        }];
        let agent = build_agent(AgentConfig::new("assistant"), llm, rules);
        let mut task = sample_task();
        let session_id = SessionId::default();
        let input = Message::text(task.id.clone(), task.context_id.clone(), Role::User, "use the tool");
        let cancel = CancellationToken::new();

        let approval_id = match agent.run_turn(&mut task, &session_id, &input, &cancel).await.unwrap() {
            RunOutcome::Pending { approval_id } => approval_id,
            other => panic!("expected Pending, got {other:?}"),
        };
        assert_eq!(task.state, TaskState::AuthRequired);

        let outcome = agent.resume(&approval_id, true, &mut task, &cancel).await.unwrap();
        match outcome {
            RunOutcome::Completed { message } => {
                assert_eq!(message.as_text().as_deref(), Some("resumed answer"));
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pending_mid_batch_preserves_later_calls_until_resume() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            LlmResponse {
                content: None,
                tool_calls: vec![
                    ToolCallRequest {
                        id: "call-1".to_owned(),
                        name: "echo".to_owned(),
                        arguments: serde_json::json!({"x": 1}),
                    },
                    ToolCallRequest {
                        id: "call-2".to_owned(),
                        name: "sensitive".to_owned(),
                        arguments: serde_json::json!({"y": 2}),
                    },
                    ToolCallRequest {
                        id: "call-3".to_owned(),
                        name: "echo".to_owned(),
                        arguments: serde_json::json!({"z": 3}),
                    },
                ],
            },
            LlmResponse {
                content: Some("all done".to_owned()),
                tool_calls: Vec::new(),
            },
        ]));
        let rules = vec![PolicyRule {
            id: "require-approval".to_owned(),
            effect: ProtoEffect::Pending,
            action_type: Some(ActionType::Tool),
            name_pattern: "sensitive".to_owned(),
            reason: "needs a human".to_owned(),
        }];

        let tools = Arc::new(ToolAdapter::new());
        tools.register(echo_tool()).unwrap();
        let sensitive_func: LocalToolFn =
            Arc::new(|args| Box::pin(async move { Ok(Value::Object(args.into_iter().collect())) }));
        tools
            .register(Arc::new(LocalTool::new(
                "sensitive",
                "a gated tool",
                serde_json::json!({"type": "object"}),
                sensitive_func,
            )))
            .unwrap();

        let conversation = Arc::new(InProcessConversationStore::new());
        let agent = Agent::new(
            AgentConfig::new("assistant"),
            llm,
            tools,
            Arc::new(OrderedRulePolicyEngine::new(rules)),
            Arc::new(InMemoryApprovalStore::new()),
            conversation.clone(),
        );

        let mut task = sample_task();
        let session_id = SessionId::default();
        let input = Message::text(task.id.clone(), task.context_id.clone(), Role::User, "use the tools");
        let cancel = CancellationToken::new();

        let approval_id = match agent.run_turn(&mut task, &session_id, &input, &cancel).await.unwrap() {
            RunOutcome::Pending { approval_id } => approval_id,
            other => panic!("expected Pending, got {other:?}"),
        };

        let outcome = agent.resume(&approval_id, true, &mut task, &cancel).await.unwrap();
        match outcome {
            RunOutcome::Completed { message } => {
                assert_eq!(message.as_text().as_deref(), Some("all done"));
            }
            other => panic!("expected Completed, got {other:?}"),
        }

        let history = conversation.list(&session_id).await.unwrap();
        let tool_call_ids: Vec<String> = history
            .iter()
            .filter(|m| m.role == ConversationRole::Tool)
            .filter_map(|m| m.tool_call_id.as_ref().map(|id| id.to_string()))
            .collect();
        assert!(tool_call_ids.contains(&"call-1".to_owned()));
        assert!(tool_call_ids.contains(&"call-2".to_owned()));
        assert!(
            tool_call_ids.contains(&"call-3".to_owned()),
            "call-3 (after the pending call in the same batch) must still run on resume, got {tool_call_ids:?}"
        );
    }

    #[tokio::test]
    async fn rejecting_a_pending_approval_terminates_the_task() {
        let llm = Arc::new(ScriptedLlm::new(vec![LlmResponse {
            content: None,
            tool_calls: vec![ToolCallRequest {
                id: "call-1".to_owned(),
                name: "echo".to_owned(),
                arguments: serde_json::json!({}),
            }],
        }]));
        let rules = vec![PolicyRule {
            id: "require-approval".to_owned(),
            effect: ProtoEffect::Pending,
            action_type: Some(ActionType::Tool),
            name_pattern: "echo".to_owned(),
            reason: "needs a human".to_owned(),
        }];
        let agent = build_agent(AgentConfig::new("assistant"), llm, rules);
        let mut task = sample_task();
        let session_id = SessionId::default();
        let input = Message::text(task.id.clone(), task.context_id.clone(), Role::User, "use the tool");
        let cancel = CancellationToken::new();

        let approval_id = match agent.run_turn(&mut task, &session_id, &input, &cancel).await.unwrap() {
            RunOutcome::Pending { approval_id } => approval_id,
            other => panic!("expected Pending, got {other:?}"),
        };

        let outcome = agent.resume(&approval_id, false, &mut task, &cancel).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Rejected));
        assert_eq!(task.state, TaskState::Rejected);
    }

    #[tokio::test]
    async fn denied_tool_call_is_reported_back_without_executing() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            LlmResponse {
                content: None,
                tool_calls: vec![ToolCallRequest {
                    id: "call-1".to_owned(),
                    name: "echo".to_owned(),
                    arguments: serde_json::json!({}),
                }],
            },
            LlmResponse {
                content: Some("i could not use the tool".to_owned()),
                tool_calls: Vec::new(),
            },
        ]));
        let rules = vec![PolicyRule {
            id: "block-echo".to_owned(),
            effect: ProtoEffect::Deny,
            action_type: Some(ActionType::Tool),
            name_pattern: "echo".to_owned(),
            reason: "echo is forbidden".to_owned(),
        }];
        let agent = build_agent(AgentConfig::new("assistant"), llm, rules);
        let mut task = sample_task();
        let session_id = SessionId::default();
        let input = Message::text(task.id.clone(), task.context_id.clone(), Role::User, "use the tool");
        let cancel = CancellationToken::new();

        let outcome = agent.run_turn(&mut task, &session_id, &input, &cancel).await.unwrap();
        match outcome {
            RunOutcome::Completed { message } => {
                assert_eq!(message.as_text().as_deref(), Some("i could not use the tool"));
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exceeding_max_iterations_fails() {
        let responses = (0..5)
            .map(|i| LlmResponse {
                content: None,
                tool_calls: vec![ToolCallRequest {
                    id: format!("call-{i}"),
                    name: "echo".to_owned(),
                    arguments: serde_json::json!({}),
                }],
            })
            .collect();
        let llm = Arc::new(ScriptedLlm::new(responses));
        let mut config = AgentConfig::new("assistant");
        config.max_iterations = 2;
        let agent = build_agent(config, llm, Vec::new());
        let mut task = sample_task();
        let session_id = SessionId::default();
        let input = Message::text(task.id.clone(), task.context_id.clone(), Role::User, "loop forever");
        let cancel = CancellationToken::new();

        let result = agent.run_turn(&mut task, &session_id, &input, &cancel).await;
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind, kairos_errors::ErrorKind::Internal);
    }

    #[tokio::test]
    async fn configured_graph_is_run_instead_of_the_react_loop() {
        let llm = Arc::new(ScriptedLlm::new(vec![LlmResponse {
            content: Some("the ReAct loop must not run".to_owned()),
            tool_calls: Vec::new(),
        }]));

        let tools = Arc::new(ToolAdapter::new());
        tools.register(echo_tool()).unwrap();

        let mut nodes = StdHashMap::new();
        nodes.insert(
            NodeId::from_string("classify"),
            Node {
                id: NodeId::from_string("classify"),
                node_type: "echo".to_owned(),
                tool: None,
                input: Some(serde_json::json!({"category": "billing"})),
                metadata: Value::Null,
            },
        );
        let graph = Arc::new(kairos_protocol::Graph {
            id: GraphId::default(),
            start_node_id: Some(NodeId::from_string("classify")),
            nodes,
            edges: Vec::new(),
        });

        let executor = Arc::new(
            kairos_planner::Executor::new(Arc::new(InMemoryAuditStore::new())).with_tool_adapter(tools.clone()),
        );

        let conversation = Arc::new(InProcessConversationStore::new());
        let agent = Agent::new(
            AgentConfig::new("planned"),
            llm,
            tools,
            Arc::new(OrderedRulePolicyEngine::new(Vec::new())),
            Arc::new(InMemoryApprovalStore::new()),
            conversation.clone(),
        )
        .with_graph(graph, executor);

        let mut task = sample_task();
        let session_id = SessionId::default();
        let input = Message::text(task.id.clone(), task.context_id.clone(), Role::User, "classify this");
        let cancel = CancellationToken::new();

        let outcome = agent.run_turn(&mut task, &session_id, &input, &cancel).await.unwrap();
        match outcome {
            RunOutcome::Completed { message } => {
                let text = message.as_text().unwrap();
                assert!(text.contains("billing"), "expected graph output, got {text:?}");
            }
            other => panic!("expected Completed, got {other:?}"),
        }

        let history = conversation.list(&session_id).await.unwrap();
        assert!(history.iter().any(|m| m.role == ConversationRole::User));
        assert!(history.iter().any(|m| m.role == ConversationRole::Assistant));
    }
}
