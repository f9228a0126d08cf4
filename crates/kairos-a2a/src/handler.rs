use std::sync::Arc;

use chrono::Utc;
use kairos_agent::{Agent, RunOutcome};
use kairos_errors::{CancellationToken, KairosError, KairosResult};
use kairos_governance::{ApprovalFilter, ApprovalStore, PolicyEngine};
use kairos_protocol::{
    Action, AgentCard, ApprovalId, ApprovalRecord, ApprovalStatus, ContextId, Effect, Message,
    Role, SessionId, StreamResponse, Task, TaskId, TaskState,
};
use tracing::instrument;

use crate::cancellation_registry::CancellationRegistry;
use crate::push_notifications;
use crate::streams::StreamHub;
use crate::task_store::{TaskFilter, TaskPage, TaskStore};

/// Narrows an approval list call (§4.9 "Approval operations").
#[derive(Debug, Clone, Default)]
pub struct ApprovalListFilter {
    pub task_id: Option<TaskId>,
    pub context_id: Option<ContextId>,
    pub status: Option<ApprovalStatus>,
    pub expiring_before: Option<chrono::DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl From<ApprovalListFilter> for ApprovalFilter {
    fn from(value: ApprovalListFilter) -> Self {
        ApprovalFilter {
            task_id: value.task_id,
            context_id: value.context_id,
            status: value.status,
            expiring_before: value.expiring_before,
            limit: value.limit,
        }
    }
}

/// The A2A task handler (§4.9): task lifecycle, send/stream message,
/// cancel, subscribe, agent card publication, push-notification configs,
/// and the operator-facing approval operations. Bindings in `http.rs` and
/// `grpc.rs` are thin transcodings over this one implementation — no
/// protocol-specific logic lives in the handler itself.
pub struct A2aHandler {
    agent: Arc<Agent>,
    policy: Arc<dyn PolicyEngine>,
    approval_store: Arc<dyn ApprovalStore>,
    approval_ttl: Option<chrono::Duration>,
    task_store: Arc<dyn TaskStore>,
    streams: Arc<StreamHub>,
    cancellations: Arc<CancellationRegistry>,
    agent_card: AgentCard,
}

impl A2aHandler {
    pub fn new(
        agent: Arc<Agent>,
        policy: Arc<dyn PolicyEngine>,
        approval_store: Arc<dyn ApprovalStore>,
        task_store: Arc<dyn TaskStore>,
        agent_card: AgentCard,
    ) -> Self {
        Self {
            agent,
            policy,
            approval_store,
            approval_ttl: Some(chrono::Duration::minutes(30)),
            task_store,
            streams: Arc::new(StreamHub::new()),
            cancellations: Arc::new(CancellationRegistry::new()),
            agent_card,
        }
    }

    pub fn with_approval_ttl(mut self, ttl: Option<chrono::Duration>) -> Self {
        self.approval_ttl = ttl;
        self
    }

    pub fn agent_card(&self) -> &AgentCard {
        &self.agent_card
    }

    pub fn streams(&self) -> Arc<StreamHub> {
        self.streams.clone()
    }

    async fn resolve_or_create_task(&self, task_id: Option<TaskId>, context_id: Option<ContextId>) -> KairosResult<Task> {
        match task_id {
            Some(id) => self
                .task_store
                .get(&id)
                .await?
                .ok_or_else(|| KairosError::not_found(format!("no task {id}"))),
            None => Ok(Task::new(context_id.unwrap_or_default(), Utc::now())),
        }
    }

    /// Evaluates the `ActionAgent` policy ahead of any side effect (§5). On
    /// `pending`, persists an approval record and moves the task to
    /// `AUTH_REQUIRED` without ever invoking the agent core.
    async fn gate_on_agent_policy(&self, task: &mut Task) -> KairosResult<Option<Task>> {
        let decision = self.policy.evaluate(&Action::agent(self.agent.name())).await;
        match decision.status {
            Effect::Allow => Ok(None),
            Effect::Deny => Err(KairosError::unauthorized(decision.reason)),
            Effect::Pending => {
                let now = Utc::now();
                let record = ApprovalRecord::new(
                    task.id.clone(),
                    task.context_id.clone(),
                    format!("agent:{}", self.agent.name()),
                    "a2a-caller",
                    decision.reason,
                    now,
                    self.approval_ttl,
                );
                self.approval_store.put(record).await?;
                task.transition(TaskState::AuthRequired, now)
                    .map_err(KairosError::invalid_input)?;
                self.task_store.put(task.clone()).await?;
                Ok(Some(task.clone()))
            }
        }
    }

    /// `SendMessage` (§4.9): resolve or create the task, evaluate policy,
    /// dispatch into the agent core, and return the task in its resulting
    /// state.
    #[instrument(skip(self, text), fields(task = tracing::field::Empty))]
    pub async fn send_message(
        &self,
        task_id: Option<TaskId>,
        context_id: Option<ContextId>,
        session_id: SessionId,
        text: String,
    ) -> KairosResult<Task> {
        let mut task = self.resolve_or_create_task(task_id, context_id).await?;
        tracing::Span::current().record("task", tracing::field::display(&task.id));

        if let Some(pending_task) = self.gate_on_agent_policy(&mut task).await? {
            return Ok(pending_task);
        }

        task.transition(TaskState::Working, Utc::now())
            .map_err(KairosError::invalid_input)?;
        let input = Message::text(task.id.clone(), task.context_id.clone(), Role::User, text);
        task.push_message(input.clone());
        self.task_store.put(task.clone()).await?;

        let cancel = self.cancellations.register(task.id.clone());
        let outcome = self.agent.run_turn(&mut task, &session_id, &input, &cancel).await;
        self.cancellations.remove(&task.id);
        self.finish_turn(&mut task, outcome).await?;
        Ok(task)
    }

    /// Folds a `RunOutcome` (or its error) into the task's terminal/pending
    /// state and persists it.
    async fn finish_turn(&self, task: &mut Task, outcome: KairosResult<RunOutcome>) -> KairosResult<()> {
        match outcome {
            Ok(RunOutcome::Completed { message }) => {
                task.push_message(message);
                task.transition(TaskState::Completed, Utc::now())
                    .map_err(KairosError::invalid_input)?;
            }
            // `run_turn` already transitioned the task to AUTH_REQUIRED.
            Ok(RunOutcome::Pending { .. }) => {}
            // Only reachable from `resume`; `run_turn` never returns it directly.
            Ok(RunOutcome::Rejected) => {}
            Err(err) => {
                let _ = task.transition(TaskState::Failed, Utc::now());
                self.task_store.put(task.clone()).await?;
                return Err(err);
            }
        }
        self.task_store.put(task.clone()).await?;
        Ok(())
    }

    /// Resolves or creates and persists a task without running a turn, so
    /// a streaming caller can subscribe to its channel before the run
    /// starts publishing to it (§4.9, §4.10 "message:stream").
    pub async fn ensure_task_for_stream(&self, task_id: Option<TaskId>, context_id: Option<ContextId>) -> KairosResult<Task> {
        let task = self.resolve_or_create_task(task_id, context_id).await?;
        self.task_store.put(task.clone()).await?;
        Ok(task)
    }

    /// `SendStreamingMessage` (§4.9): pushes semantic progress events to
    /// the task's stream as the agent runs, finishing with exactly one
    /// terminal event with `final=true`.
    pub async fn send_streaming_message(
        &self,
        task_id: Option<TaskId>,
        context_id: Option<ContextId>,
        session_id: SessionId,
        text: String,
    ) -> KairosResult<Task> {
        let mut task = self.resolve_or_create_task(task_id, context_id).await?;

        if let Some(pending_task) = self.gate_on_agent_policy(&mut task).await? {
            self.streams.publish(
                &pending_task.id,
                StreamResponse::terminal(pending_task.id.clone(), TaskState::AuthRequired),
            );
            return Ok(pending_task);
        }

        task.transition(TaskState::Working, Utc::now())
            .map_err(KairosError::invalid_input)?;
        self.streams.publish(&task.id, StreamResponse::working(task.id.clone()));

        let input = Message::text(task.id.clone(), task.context_id.clone(), Role::User, text);
        task.push_message(input.clone());
        self.task_store.put(task.clone()).await?;

        self.streams
            .publish(&task.id, StreamResponse::semantic(task.id.clone(), "thinking", "reasoning about the request"));

        let cancel = self.cancellations.register(task.id.clone());
        let outcome = self.agent.run_turn(&mut task, &session_id, &input, &cancel).await;
        self.cancellations.remove(&task.id);

        let terminal_state = match &outcome {
            Ok(RunOutcome::Completed { .. }) => Some(TaskState::Completed),
            Ok(RunOutcome::Pending { .. }) => Some(TaskState::AuthRequired),
            Ok(RunOutcome::Rejected) => Some(TaskState::Rejected),
            Err(_) => Some(TaskState::Failed),
        };

        self.finish_turn(&mut task, outcome).await?;

        if let Some(state) = terminal_state {
            self.streams.publish(&task.id, StreamResponse::terminal(task.id.clone(), state));
        }
        Ok(task)
    }

    pub async fn get_task(&self, id: &TaskId) -> KairosResult<Task> {
        self.task_store
            .get(id)
            .await?
            .ok_or_else(|| KairosError::not_found(format!("no task {id}")))
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> KairosResult<TaskPage> {
        self.task_store.list(filter).await
    }

    /// `CancelTask` (§4.9): non-terminal tasks transition to `CANCELLED`,
    /// the underlying execution is cancelled, and a terminal stream event
    /// is published.
    pub async fn cancel_task(&self, id: &TaskId) -> KairosResult<Task> {
        let mut task = self.get_task(id).await?;
        if task.state.is_terminal() {
            return Err(KairosError::invalid_input(format!("task {id} is already terminal")));
        }
        self.cancellations.cancel(id);
        task.transition(TaskState::Cancelled, Utc::now())
            .map_err(KairosError::invalid_input)?;
        self.task_store.put(task.clone()).await?;
        self.streams.publish(id, StreamResponse::terminal(id.clone(), TaskState::Cancelled));
        Ok(task)
    }

    /// `SubscribeToTask` (§4.9): attaches to the task's stream, replaying
    /// the last known status first; callers close when a final event
    /// arrives.
    pub async fn subscribe_to_task(
        &self,
        id: &TaskId,
    ) -> KairosResult<(StreamResponse, tokio::sync::broadcast::Receiver<StreamResponse>)> {
        let task = self.get_task(id).await?;
        let replay = if task.state.is_terminal() {
            StreamResponse::terminal(id.clone(), task.state)
        } else {
            StreamResponse::semantic(id.clone(), "status", format!("{:?}", task.state))
        };
        Ok((replay, self.streams.subscribe(id)))
    }

    pub fn get_extended_agent_card(&self) -> &AgentCard {
        &self.agent_card
    }

    pub async fn create_push_notification_config(
        &self,
        task_id: &TaskId,
        url: String,
        token: Option<String>,
    ) -> KairosResult<kairos_protocol::PushNotificationConfig> {
        let mut task = self.get_task(task_id).await?;
        let config = push_notifications::create(&mut task, url, token);
        self.task_store.put(task).await?;
        Ok(config)
    }

    pub async fn list_push_notification_configs(
        &self,
        task_id: &TaskId,
    ) -> KairosResult<Vec<kairos_protocol::PushNotificationConfig>> {
        let task = self.get_task(task_id).await?;
        Ok(push_notifications::list(&task).to_vec())
    }

    pub async fn get_push_notification_config(
        &self,
        task_id: &TaskId,
        config_id: &str,
    ) -> KairosResult<kairos_protocol::PushNotificationConfig> {
        let task = self.get_task(task_id).await?;
        push_notifications::get(&task, config_id)
            .cloned()
            .ok_or_else(|| KairosError::not_found(format!("no push notification config {config_id}")))
    }

    pub async fn delete_push_notification_config(&self, task_id: &TaskId, config_id: &str) -> KairosResult<()> {
        let mut task = self.get_task(task_id).await?;
        push_notifications::delete(&mut task, config_id)?;
        self.task_store.put(task).await?;
        Ok(())
    }

    // --- Operator-facing approval operations (§4.9, §4.11) ---

    pub async fn get_approval(&self, id: &ApprovalId) -> KairosResult<ApprovalRecord> {
        self.approval_store
            .get(id)
            .await?
            .ok_or_else(|| KairosError::not_found(format!("no approval record {id}")))
    }

    pub async fn list_approvals(&self, filter: ApprovalListFilter) -> KairosResult<Vec<ApprovalRecord>> {
        self.approval_store.list(&filter.into()).await
    }

    /// Approves a pending record with a human rationale and resumes the
    /// suspended turn (§4.9, §8 "pending approval"). Overwrites the
    /// record's stored `reason` with the rationale so the audit trail
    /// reflects why the human decided as they did, not just the original
    /// trigger.
    pub async fn approve(&self, id: &ApprovalId, rationale: String) -> KairosResult<Task> {
        let mut record = self.get_approval(id).await?;
        record.reason = rationale;
        record
            .decide(ApprovalStatus::Approved, Utc::now())
            .map_err(KairosError::invalid_input)?;
        self.approval_store.update(record.clone()).await?;

        let mut task = self.get_task(&record.task_id).await?;
        let cancel = CancellationToken::new();
        let outcome = self.agent.resume(id, true, &mut task, &cancel).await;
        self.finish_turn(&mut task, outcome).await?;
        Ok(task)
    }

    /// Rejects a pending record, terminating the task with `REJECTED`
    /// (§4.9).
    pub async fn reject(&self, id: &ApprovalId, rationale: String) -> KairosResult<Task> {
        let mut record = self.get_approval(id).await?;
        record.reason = rationale;
        record
            .decide(ApprovalStatus::Rejected, Utc::now())
            .map_err(KairosError::invalid_input)?;
        self.approval_store.update(record.clone()).await?;

        let mut task = self.get_task(&record.task_id).await?;
        let cancel = CancellationToken::new();
        let outcome = self.agent.resume(id, false, &mut task, &cancel).await;
        self.finish_turn(&mut task, outcome).await?;
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kairos_agent::{AgentConfig, LlmCallOptions, LlmClient, LlmMessage, LlmResponse, ToolDeclaration};
    use kairos_governance::{InMemoryApprovalStore, OrderedRulePolicyEngine};
    use kairos_memory::InProcessConversationStore;
    use kairos_protocol::{ActionType, PolicyRule};
    use kairos_tools::ToolAdapter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::task_store::InMemoryTaskStore;

    struct StaticLlm {
        responses: Vec<&'static str>,
        call_count: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for StaticLlm {
        async fn complete(
            &self,
            _messages: &[LlmMessage],
            _tools: &[ToolDeclaration],
            _options: &LlmCallOptions,
        ) -> KairosResult<LlmResponse> {
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            Ok(LlmResponse {
                content: Some(self.responses[idx.min(self.responses.len() - 1)].to_owned()),
                tool_calls: Vec::new(),
            })
        }
    }

    fn sample_card() -> AgentCard {
        AgentCard {
            name: "test-agent".to_owned(),
            version: "0.1.0".to_owned(),
            description: "a test agent".to_owned(),
            skills: vec![],
            endpoints: vec![],
            capabilities: Default::default(),
        }
    }

    fn build_handler(policy_rules: Vec<PolicyRule>) -> A2aHandler {
        let llm: Arc<dyn LlmClient> = Arc::new(StaticLlm {
            responses: vec!["final answer"],
            call_count: AtomicUsize::new(0),
        });
        let tools = Arc::new(ToolAdapter::new());
        let policy = Arc::new(OrderedRulePolicyEngine::new(policy_rules));
        let approval_store = Arc::new(InMemoryApprovalStore::new());
        let conversation = Arc::new(InProcessConversationStore::new());
        let agent = Arc::new(Agent::new(
            AgentConfig::new("test-agent"),
            llm,
            tools,
            policy.clone(),
            approval_store.clone(),
            conversation,
        ));
        let task_store = Arc::new(InMemoryTaskStore::new());
        A2aHandler::new(agent, policy, approval_store, task_store, sample_card())
    }

    #[tokio::test]
    async fn send_message_completes_with_allow_policy() {
        let handler = build_handler(vec![]);
        let task = handler
            .send_message(None, None, SessionId::default(), "hello".to_owned())
            .await
            .unwrap();
        assert_eq!(task.state, TaskState::Completed);
        assert_eq!(task.history.last().unwrap().as_text().unwrap(), "final answer");
    }

    #[tokio::test]
    async fn send_message_denied_by_agent_policy_errors() {
        let handler = build_handler(vec![PolicyRule {
            id: "deny-agent".to_owned(),
            effect: Effect::Deny,
            action_type: Some(ActionType::Agent),
            name_pattern: "*".to_owned(),
            reason: "agent disabled".to_owned(),
        }]);
        let result = handler
            .send_message(None, None, SessionId::default(), "hello".to_owned())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn send_message_pending_agent_policy_sets_auth_required() {
        let handler = build_handler(vec![PolicyRule {
            id: "pending-agent".to_owned(),
            effect: Effect::Pending,
            action_type: Some(ActionType::Agent),
            name_pattern: "*".to_owned(),
            reason: "needs review".to_owned(),
        }]);
        let task = handler
            .send_message(None, None, SessionId::default(), "hello".to_owned())
            .await
            .unwrap();
        assert_eq!(task.state, TaskState::AuthRequired);
    }

    #[tokio::test]
    async fn cancel_task_transitions_non_terminal_task() {
        let handler = build_handler(vec![PolicyRule {
            id: "pending-agent".to_owned(),
            effect: Effect::Pending,
            action_type: Some(ActionType::Agent),
            name_pattern: "*".to_owned(),
            reason: "needs review".to_owned(),
        }]);
        let task = handler
            .send_message(None, None, SessionId::default(), "hello".to_owned())
            .await
            .unwrap();
        let cancelled = handler.cancel_task(&task.id).await.unwrap();
        assert_eq!(cancelled.state, TaskState::Cancelled);
    }

    #[tokio::test]
    async fn cancel_task_rejects_already_terminal_task() {
        let handler = build_handler(vec![]);
        let task = handler
            .send_message(None, None, SessionId::default(), "hello".to_owned())
            .await
            .unwrap();
        assert!(handler.cancel_task(&task.id).await.is_err());
    }

    #[tokio::test]
    async fn push_notification_config_crud_round_trips() {
        let handler = build_handler(vec![]);
        let task = handler
            .send_message(None, None, SessionId::default(), "hello".to_owned())
            .await
            .unwrap();
        let config = handler
            .create_push_notification_config(&task.id, "https://example.com".to_owned(), None)
            .await
            .unwrap();
        assert_eq!(handler.list_push_notification_configs(&task.id).await.unwrap().len(), 1);
        handler.delete_push_notification_config(&task.id, &config.id).await.unwrap();
        assert!(handler.list_push_notification_configs(&task.id).await.unwrap().is_empty());
    }
}
