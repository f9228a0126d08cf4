use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use futures_util::Stream;
use kairos_errors::KairosError;
use kairos_protocol::{ApprovalId, ContextId, SessionId, TaskId, TaskState};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::error_mapping::to_problem_details;
use crate::handler::{A2aHandler, ApprovalListFilter};
use crate::task_store::TaskFilter;

#[derive(Clone)]
pub struct HttpState {
    pub handler: Arc<A2aHandler>,
}

struct ApiError(KairosError);

impl From<KairosError> for ApiError {
    fn from(value: KairosError) -> Self {
        Self(value)
    }
}

/// Errors serialize as `application/problem+json` with the fixed status
/// mapping (§4.1, §4.10), including the 409 carve-out for pending approvals.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let details = to_problem_details(&self.0);
        let status = StatusCode::from_u16(details.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(details)).into_response();
        response
            .headers_mut()
            .insert("content-type", "application/problem+json".parse().unwrap());
        response
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    #[serde(rename = "taskId")]
    task_id: Option<TaskId>,
    #[serde(rename = "contextId")]
    context_id: Option<ContextId>,
    #[serde(rename = "sessionId")]
    session_id: Option<SessionId>,
    text: String,
}

/// Query parameters translate to request fields with the fixed names
/// listed in §4.10.
#[derive(Debug, Deserialize, Default)]
struct ListTasksQuery {
    #[serde(rename = "contextId")]
    context_id: Option<ContextId>,
    status: Option<TaskState>,
    #[serde(rename = "lastUpdatedAfter")]
    last_updated_after: Option<DateTime<Utc>>,
    #[serde(rename = "pageToken")]
    page_token: Option<String>,
    #[serde(rename = "pageSize")]
    page_size: Option<usize>,
}

impl From<ListTasksQuery> for TaskFilter {
    fn from(value: ListTasksQuery) -> Self {
        TaskFilter {
            context_id: value.context_id,
            status: value.status,
            updated_after: value.last_updated_after,
            page_token: value.page_token,
            page_size: value.page_size,
        }
    }
}

#[derive(Debug, Serialize)]
struct TaskListResponse {
    tasks: Vec<kairos_protocol::Task>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

pub fn router(handler: Arc<A2aHandler>) -> Router {
    let state = HttpState { handler };
    Router::new()
        .route("/message:send", post(message_send))
        .route("/message:stream", post(message_stream))
        .route("/tasks", get(list_tasks))
        .route("/tasks/{id}", get(get_task))
        .route("/tasks/{id}:cancel", post(cancel_task))
        .route("/tasks/{id}:subscribe", get(subscribe_task))
        .route("/tasks/{id}/pushNotificationConfigs", post(create_push_config).get(list_push_configs))
        .route(
            "/tasks/{id}/pushNotificationConfigs/{config_id}",
            get(get_push_config).delete(delete_push_config),
        )
        .route("/.well-known/agent-card.json", get(agent_card))
        .route("/extendedAgentCard", get(extended_agent_card))
        .route("/approvals/{id}", get(get_approval))
        .route("/approvals", get(list_approvals))
        .route("/approvals/{id}:approve", post(approve_approval))
        .route("/approvals/{id}:reject", post(reject_approval))
        .route("/healthz", get(healthz))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "kairos-a2a" }))
}

async fn message_send(
    State(state): State<HttpState>,
    Json(request): Json<SendMessageRequest>,
) -> ApiResult<Json<kairos_protocol::Task>> {
    let task = state
        .handler
        .send_message(
            request.task_id,
            request.context_id,
            request.session_id.unwrap_or_default(),
            request.text,
        )
        .await?;
    Ok(Json(task))
}

/// `POST /message:stream` (§4.10): Server-Sent Events, one `data:` frame
/// per `StreamResponse`.
async fn message_stream(
    State(state): State<HttpState>,
    Json(request): Json<SendMessageRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let handler = state.handler.clone();
    let session_id = request.session_id.unwrap_or_default();

    // Resolve (or create) the task id up front so the subscriber can attach
    // to the right channel before the run begins publishing to it.
    let task = handler
        .ensure_task_for_stream(request.task_id.clone(), request.context_id.clone())
        .await?;
    let task_id = task.id.clone();
    let mut rx = handler.streams().subscribe(&task_id);

    let run_handler = handler.clone();
    tokio::spawn(async move {
        let _ = run_handler
            .send_streaming_message(Some(task_id), None, session_id, request.text)
            .await;
    });

    let sse_stream = stream! {
        while let Ok(event) = rx.recv().await {
            let is_final = event.is_final();
            yield Ok(Event::default().data(serde_json::to_string(&event).unwrap_or_default()));
            if is_final {
                break;
            }
        }
    };

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

async fn list_tasks(
    State(state): State<HttpState>,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<Json<TaskListResponse>> {
    let filter: TaskFilter = query.into();
    let page = state.handler.list_tasks(&filter).await?;
    Ok(Json(TaskListResponse {
        tasks: page.tasks,
        next_page_token: page.next_page_token,
    }))
}

async fn get_task(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> ApiResult<Json<kairos_protocol::Task>> {
    let task = state.handler.get_task(&TaskId::from_string(id)).await?;
    Ok(Json(task))
}

async fn cancel_task(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> ApiResult<Json<kairos_protocol::Task>> {
    let task = state.handler.cancel_task(&TaskId::from_string(id)).await?;
    Ok(Json(task))
}

/// `GET /tasks/{id}:subscribe` (§4.10): SSE, replaying the last known
/// status first.
async fn subscribe_task(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let task_id = TaskId::from_string(id);
    let (replay, mut rx) = state.handler.subscribe_to_task(&task_id).await?;

    let sse_stream = stream! {
        let replay_final = replay.is_final();
        yield Ok(Event::default().data(serde_json::to_string(&replay).unwrap_or_default()));
        if replay_final {
            return;
        }
        while let Ok(event) = rx.recv().await {
            let is_final = event.is_final();
            yield Ok(Event::default().data(serde_json::to_string(&event).unwrap_or_default()));
            if is_final {
                break;
            }
        }
    };

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

#[derive(Debug, Deserialize)]
struct PushConfigRequest {
    url: String,
    token: Option<String>,
}

async fn create_push_config(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    Json(request): Json<PushConfigRequest>,
) -> ApiResult<Json<kairos_protocol::PushNotificationConfig>> {
    let config = state
        .handler
        .create_push_notification_config(&TaskId::from_string(id), request.url, request.token)
        .await?;
    Ok(Json(config))
}

async fn list_push_configs(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<kairos_protocol::PushNotificationConfig>>> {
    let configs = state
        .handler
        .list_push_notification_configs(&TaskId::from_string(id))
        .await?;
    Ok(Json(configs))
}

async fn get_push_config(
    State(state): State<HttpState>,
    Path((id, config_id)): Path<(String, String)>,
) -> ApiResult<Json<kairos_protocol::PushNotificationConfig>> {
    let config = state
        .handler
        .get_push_notification_config(&TaskId::from_string(id), &config_id)
        .await?;
    Ok(Json(config))
}

async fn delete_push_config(
    State(state): State<HttpState>,
    Path((id, config_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state
        .handler
        .delete_push_notification_config(&TaskId::from_string(id), &config_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /.well-known/agent-card.json` (§4.10, §6): media type
/// `application/a2a+json`.
async fn agent_card(State(state): State<HttpState>) -> Response {
    let mut response = Json(state.handler.agent_card()).into_response();
    response
        .headers_mut()
        .insert("content-type", "application/a2a+json".parse().unwrap());
    response
}

async fn extended_agent_card(State(state): State<HttpState>) -> Json<kairos_protocol::AgentCard> {
    Json(state.handler.get_extended_agent_card().clone())
}

#[derive(Debug, Deserialize, Default)]
struct ListApprovalsQuery {
    #[serde(rename = "taskId")]
    task_id: Option<TaskId>,
    #[serde(rename = "contextId")]
    context_id: Option<ContextId>,
    status: Option<kairos_protocol::ApprovalStatus>,
    #[serde(rename = "expiringBefore")]
    expiring_before: Option<DateTime<Utc>>,
    limit: Option<usize>,
}

async fn get_approval(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> ApiResult<Json<kairos_protocol::ApprovalRecord>> {
    let record = state.handler.get_approval(&ApprovalId::from_string(id)).await?;
    Ok(Json(record))
}

async fn list_approvals(
    State(state): State<HttpState>,
    Query(query): Query<ListApprovalsQuery>,
) -> ApiResult<Json<Vec<kairos_protocol::ApprovalRecord>>> {
    let filter = ApprovalListFilter {
        task_id: query.task_id,
        context_id: query.context_id,
        status: query.status,
        expiring_before: query.expiring_before,
        limit: query.limit,
    };
    let records = state.handler.list_approvals(filter).await?;
    Ok(Json(records))
}

#[derive(Debug, Deserialize)]
struct ApprovalDecisionRequest {
    rationale: String,
}

async fn approve_approval(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    Json(request): Json<ApprovalDecisionRequest>,
) -> ApiResult<Json<kairos_protocol::Task>> {
    let task = state
        .handler
        .approve(&ApprovalId::from_string(id), request.rationale)
        .await?;
    Ok(Json(task))
}

async fn reject_approval(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    Json(request): Json<ApprovalDecisionRequest>,
) -> ApiResult<Json<kairos_protocol::Task>> {
    let task = state
        .handler
        .reject(&ApprovalId::from_string(id), request.rationale)
        .await?;
    Ok(Json(task))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::handler::A2aHandler;
    use crate::task_store::InMemoryTaskStore;
    use async_trait::async_trait;
    use kairos_agent::{Agent, AgentConfig, LlmCallOptions, LlmClient, LlmMessage, LlmResponse, ToolDeclaration};
    use kairos_errors::KairosResult;
    use kairos_governance::{InMemoryApprovalStore, OrderedRulePolicyEngine};
    use kairos_memory::InProcessConversationStore;
    use kairos_protocol::AgentCard;
    use kairos_tools::ToolAdapter;

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

    fn test_router() -> Router {
        let agent = Arc::new(Agent::new(
            AgentConfig::new("http-test-agent"),
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
                name: "http-test-agent".to_owned(),
                version: "0.1.0".to_owned(),
                description: "test".to_owned(),
                skills: vec![],
                endpoints: vec![],
                capabilities: Default::default(),
            },
        ));
        router(handler)
    }

    #[tokio::test]
    async fn agent_card_route_serves_a2a_json_media_type() {
        let app = test_router();
        let response = app
            .oneshot(Request::builder().uri("/.well-known/agent-card.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/a2a+json"
        );
    }

    #[tokio::test]
    async fn message_send_creates_and_completes_a_task() {
        let app = test_router();
        let body = Body::from(serde_json::to_vec(&json!({ "text": "hi" })).unwrap());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/message:send")
                    .header("content-type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn get_unknown_task_returns_problem_json_404() {
        let app = test_router();
        let response = app
            .oneshot(Request::builder().uri("/tasks/does-not-exist").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }
}
