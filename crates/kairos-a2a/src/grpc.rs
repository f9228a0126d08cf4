use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use kairos_errors::KairosError;
use kairos_protocol::{
    Artifact, ContextId, Message, PushNotificationConfig, Role, SessionId, StreamResponse as DomainStreamResponse,
    Task, TaskId, TaskState,
};
use tonic::{Request, Response, Status};

use crate::error_mapping::to_grpc_status;
use crate::handler::A2aHandler;
use crate::proto;
use crate::task_store::TaskFilter;

/// Thin tonic transcoding over [`A2aHandler`] (§4.9, §4.10). Holds no state
/// of its own; every RPC maps its proto request to domain types, calls the
/// handler, and maps the result (or error, via [`to_grpc_status`]) back.
pub struct A2aGrpcService {
    handler: Arc<A2aHandler>,
}

impl A2aGrpcService {
    pub fn new(handler: Arc<A2aHandler>) -> Self {
        Self { handler }
    }
}

fn proto_role(role: Role) -> proto::Role {
    match role {
        Role::User => proto::Role::User,
        Role::Agent => proto::Role::Agent,
        Role::System => proto::Role::System,
    }
}

fn proto_message(message: &Message) -> proto::Message {
    proto::Message {
        id: message.id.to_string(),
        task_id: message.task_id.to_string(),
        context_id: message.context_id.to_string(),
        role: proto_role(message.role) as i32,
        text: message.as_text().unwrap_or_default(),
    }
}

fn proto_artifact(artifact: &Artifact) -> proto::Artifact {
    proto::Artifact {
        id: artifact.id.to_string(),
        task_id: artifact.task_id.to_string(),
        name: artifact.name.clone(),
        mime_type: artifact.mime_type.clone(),
        content_json: artifact.content.to_string(),
    }
}

fn proto_push_config(config: &PushNotificationConfig) -> proto::PushNotificationConfig {
    proto::PushNotificationConfig {
        id: config.id.clone(),
        url: config.url.clone(),
        token: config.token.clone(),
    }
}

fn proto_task_state(state: TaskState) -> proto::TaskState {
    match state {
        TaskState::Submitted => proto::TaskState::Submitted,
        TaskState::Working => proto::TaskState::Working,
        TaskState::InputRequired => proto::TaskState::InputRequired,
        TaskState::AuthRequired => proto::TaskState::AuthRequired,
        TaskState::Completed => proto::TaskState::Completed,
        TaskState::Failed => proto::TaskState::Failed,
        TaskState::Cancelled => proto::TaskState::Cancelled,
        TaskState::Rejected => proto::TaskState::Rejected,
    }
}

fn domain_task_state(state: i32) -> Option<TaskState> {
    Some(match proto::TaskState::try_from(state).ok()? {
        proto::TaskState::Submitted => TaskState::Submitted,
        proto::TaskState::Working => TaskState::Working,
        proto::TaskState::InputRequired => TaskState::InputRequired,
        proto::TaskState::AuthRequired => TaskState::AuthRequired,
        proto::TaskState::Completed => TaskState::Completed,
        proto::TaskState::Failed => TaskState::Failed,
        proto::TaskState::Cancelled => TaskState::Cancelled,
        proto::TaskState::Rejected => TaskState::Rejected,
        proto::TaskState::Unspecified => return None,
    })
}

fn proto_task(task: &Task) -> proto::Task {
    proto::Task {
        id: task.id.to_string(),
        context_id: task.context_id.to_string(),
        state: proto_task_state(task.state) as i32,
        history: task.history.iter().map(proto_message).collect(),
        artifacts: task.artifacts.iter().map(proto_artifact).collect(),
        created_at: task.created_at.to_rfc3339(),
        updated_at: task.updated_at.to_rfc3339(),
        push_notification_configs: task.push_notification_configs.iter().map(proto_push_config).collect(),
    }
}

fn proto_stream_response(event: &DomainStreamResponse) -> proto::StreamResponse {
    match event {
        DomainStreamResponse::Status {
            task_id,
            state,
            message,
            event_type,
            r#final,
        } => proto::StreamResponse {
            task_id: task_id.to_string(),
            state: proto_task_state(*state) as i32,
            event_type: event_type.clone(),
            message: message.clone(),
            r#final: *r#final,
            artifact: None,
            data: None,
        },
        DomainStreamResponse::Artifact { task_id, artifact } => proto::StreamResponse {
            task_id: task_id.to_string(),
            state: proto::TaskState::Working as i32,
            event_type: "artifact".to_owned(),
            message: None,
            r#final: false,
            artifact: Some(proto_artifact(artifact)),
            data: None,
        },
        DomainStreamResponse::Completion { task_id, state, data } => proto::StreamResponse {
            task_id: task_id.to_string(),
            state: proto_task_state(*state) as i32,
            event_type: "completion".to_owned(),
            message: None,
            r#final: true,
            artifact: None,
            data: Some(data.to_string()),
        },
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, Status> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Status::invalid_argument(format!("invalid timestamp: {e}")))
}

type BoxStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send + 'static>>;

#[tonic::async_trait]
impl proto::a2a_service_server::A2aService for A2aGrpcService {
    async fn send_message(
        &self,
        request: Request<proto::SendMessageRequest>,
    ) -> Result<Response<proto::SendMessageResponse>, Status> {
        let req = request.into_inner();
        let task = self
            .handler
            .send_message(
                req.task_id.map(TaskId::from_string),
                req.context_id.map(ContextId::from_string),
                SessionId::from_string(req.session_id),
                req.text,
            )
            .await
            .map_err(|e: KairosError| to_grpc_status(&e))?;
        Ok(Response::new(proto::SendMessageResponse {
            task: Some(proto_task(&task)),
        }))
    }

    type SendStreamingMessageStream = BoxStream<proto::StreamResponse>;

    async fn send_streaming_message(
        &self,
        request: Request<proto::SendMessageRequest>,
    ) -> Result<Response<Self::SendStreamingMessageStream>, Status> {
        let req = request.into_inner();
        let task = self
            .handler
            .ensure_task_for_stream(
                req.task_id.map(TaskId::from_string),
                req.context_id.map(ContextId::from_string),
            )
            .await
            .map_err(|e| to_grpc_status(&e))?;
        let task_id = task.id.clone();
        let mut rx = self.handler.streams().subscribe(&task_id);

        let handler = self.handler.clone();
        let session_id = SessionId::from_string(req.session_id);
        tokio::spawn(async move {
            let _ = handler.send_streaming_message(Some(task_id), None, session_id, req.text).await;
        });

        let stream = async_stream::stream! {
            while let Ok(event) = rx.recv().await {
                let is_final = event.is_final();
                yield Ok(proto_stream_response(&event));
                if is_final {
                    break;
                }
            }
        };
        Ok(Response::new(Box::pin(stream)))
    }

    async fn get_task(&self, request: Request<proto::GetTaskRequest>) -> Result<Response<proto::Task>, Status> {
        let task = self
            .handler
            .get_task(&TaskId::from_string(request.into_inner().task_id))
            .await
            .map_err(|e| to_grpc_status(&e))?;
        Ok(Response::new(proto_task(&task)))
    }

    async fn list_tasks(
        &self,
        request: Request<proto::ListTasksRequest>,
    ) -> Result<Response<proto::ListTasksResponse>, Status> {
        let req = request.into_inner();
        let updated_after = req.updated_after.as_deref().map(parse_timestamp).transpose()?;
        let filter = TaskFilter {
            context_id: req.context_id.map(ContextId::from_string),
            status: req.status.and_then(domain_task_state),
            updated_after,
            page_token: req.page_token,
            page_size: req.page_size.map(|n| n as usize),
        };
        let page = self.handler.list_tasks(&filter).await.map_err(|e| to_grpc_status(&e))?;
        Ok(Response::new(proto::ListTasksResponse {
            tasks: page.tasks.iter().map(proto_task).collect(),
            next_page_token: page.next_page_token,
        }))
    }

    async fn cancel_task(&self, request: Request<proto::CancelTaskRequest>) -> Result<Response<proto::Task>, Status> {
        let task = self
            .handler
            .cancel_task(&TaskId::from_string(request.into_inner().task_id))
            .await
            .map_err(|e| to_grpc_status(&e))?;
        Ok(Response::new(proto_task(&task)))
    }

    type SubscribeToTaskStream = BoxStream<proto::StreamResponse>;

    async fn subscribe_to_task(
        &self,
        request: Request<proto::SubscribeToTaskRequest>,
    ) -> Result<Response<Self::SubscribeToTaskStream>, Status> {
        let task_id = TaskId::from_string(request.into_inner().task_id);
        let (replay, mut rx) = self.handler.subscribe_to_task(&task_id).await.map_err(|e| to_grpc_status(&e))?;

        let stream = async_stream::stream! {
            let replay_final = replay.is_final();
            yield Ok(proto_stream_response(&replay));
            if replay_final {
                return;
            }
            while let Ok(event) = rx.recv().await {
                let is_final = event.is_final();
                yield Ok(proto_stream_response(&event));
                if is_final {
                    break;
                }
            }
        };
        Ok(Response::new(Box::pin(stream)))
    }

    async fn get_extended_agent_card(
        &self,
        _request: Request<proto::GetExtendedAgentCardRequest>,
    ) -> Result<Response<proto::AgentCard>, Status> {
        let card = self.handler.get_extended_agent_card();
        Ok(Response::new(proto::AgentCard {
            name: card.name.clone(),
            version: card.version.clone(),
            description: card.description.clone(),
            skills: card
                .skills
                .iter()
                .map(|s| proto::AgentSkillSummary {
                    id: s.id.clone(),
                    name: s.name.clone(),
                    description: s.description.clone(),
                })
                .collect(),
            endpoints: card.endpoints.clone(),
            capabilities: Some(proto::AgentCapabilities {
                streaming: card.capabilities.streaming,
                push_notifications: card.capabilities.push_notifications,
                mcp: card.capabilities.mcp,
            }),
        }))
    }

    async fn create_push_notification_config(
        &self,
        request: Request<proto::CreatePushNotificationConfigRequest>,
    ) -> Result<Response<proto::PushNotificationConfig>, Status> {
        let req = request.into_inner();
        let config = self
            .handler
            .create_push_notification_config(&TaskId::from_string(req.task_id), req.url, req.token)
            .await
            .map_err(|e| to_grpc_status(&e))?;
        Ok(Response::new(proto_push_config(&config)))
    }

    async fn list_push_notification_configs(
        &self,
        request: Request<proto::ListPushNotificationConfigsRequest>,
    ) -> Result<Response<proto::ListPushNotificationConfigsResponse>, Status> {
        let configs = self
            .handler
            .list_push_notification_configs(&TaskId::from_string(request.into_inner().task_id))
            .await
            .map_err(|e| to_grpc_status(&e))?;
        Ok(Response::new(proto::ListPushNotificationConfigsResponse {
            configs: configs.iter().map(proto_push_config).collect(),
        }))
    }

    async fn get_push_notification_config(
        &self,
        request: Request<proto::GetPushNotificationConfigRequest>,
    ) -> Result<Response<proto::PushNotificationConfig>, Status> {
        let req = request.into_inner();
        let config = self
            .handler
            .get_push_notification_config(&TaskId::from_string(req.task_id), &req.config_id)
            .await
            .map_err(|e| to_grpc_status(&e))?;
        Ok(Response::new(proto_push_config(&config)))
    }

    async fn delete_push_notification_config(
        &self,
        request: Request<proto::DeletePushNotificationConfigRequest>,
    ) -> Result<Response<proto::DeletePushNotificationConfigResponse>, Status> {
        let req = request.into_inner();
        self.handler
            .delete_push_notification_config(&TaskId::from_string(req.task_id), &req.config_id)
            .await
            .map_err(|e| to_grpc_status(&e))?;
        Ok(Response::new(proto::DeletePushNotificationConfigResponse {}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kairos_agent::{Agent, AgentConfig, LlmCallOptions, LlmClient, LlmMessage, LlmResponse, ToolDeclaration};
    use kairos_errors::KairosResult;
    use kairos_governance::{InMemoryApprovalStore, OrderedRulePolicyEngine};
    use kairos_memory::InProcessConversationStore;
    use kairos_protocol::AgentCard;
    use kairos_tools::ToolAdapter;
    use proto::a2a_service_server::A2aService as _;

    use crate::task_store::InMemoryTaskStore;

    struct EchoLlm;
    #[async_trait]
    impl LlmClient for EchoLlm {
        async fn complete(
            &self,
            _messages: &[LlmMessage],
            _tools: &[ToolDeclaration],
            _options: &LlmCallOptions,
        ) -> KairosResult<LlmResponse> {
            Ok(LlmResponse {
                content: Some("ack".to_owned()),
                tool_calls: Vec::new(),
            })
        }
    }

    fn test_service() -> A2aGrpcService {
        let agent = Arc::new(Agent::new(
            AgentConfig::new("grpc-test-agent"),
            Arc::new(EchoLlm),
            Arc::new(ToolAdapter::new()),
            Arc::new(OrderedRulePolicyEngine::new(vec![])),
            Arc::new(InMemoryApprovalStore::new()),
            Arc::new(InProcessConversationStore::new()),
        ));
        let handler = Arc::new(A2aHandler::new(
            agent,
            Arc::new(OrderedRulePolicyEngine::new(vec![])),
            Arc::new(InMemoryApprovalStore::new()),
            Arc::new(InMemoryTaskStore::new()),
            AgentCard {
                name: "grpc-test-agent".to_owned(),
                version: "0.1.0".to_owned(),
                description: "test".to_owned(),
                skills: vec![],
                endpoints: vec![],
                capabilities: Default::default(),
            },
        ));
        A2aGrpcService::new(handler)
    }

    #[tokio::test]
    async fn send_message_round_trips_through_proto() {
        let service = test_service();
        let response = service
            .send_message(Request::new(proto::SendMessageRequest {
                task_id: None,
                context_id: None,
                session_id: "s1".to_owned(),
                text: "hello".to_owned(),
            }))
            .await
            .unwrap()
            .into_inner();
        let task = response.task.unwrap();
        assert_eq!(task.state, proto::TaskState::Completed as i32);
    }

    #[tokio::test]
    async fn get_unknown_task_maps_to_not_found_status() {
        let service = test_service();
        let err = service
            .get_task(Request::new(proto::GetTaskRequest {
                task_id: "missing".to_owned(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::NotFound);
    }
}
