use kairos_errors::{ErrorKind, KairosError};
use serde::Serialize;
use serde_json::json;
use tonic::Status;

/// Maps the fixed error taxonomy to gRPC status codes (§4.10). Kinds with no
/// precise gRPC counterpart fall through to `INTERNAL`.
pub fn to_grpc_status(err: &KairosError) -> Status {
    let code = match err.kind {
        ErrorKind::NotFound => tonic::Code::NotFound,
        ErrorKind::Unauthorized => tonic::Code::Unauthenticated,
        ErrorKind::InvalidInput => tonic::Code::InvalidArgument,
        ErrorKind::Timeout => tonic::Code::DeadlineExceeded,
        ErrorKind::RateLimited => tonic::Code::ResourceExhausted,
        ErrorKind::ContextLost => tonic::Code::Cancelled,
        _ => tonic::Code::Internal,
    };
    Status::new(code, err.message.clone())
}

/// An `application/problem+json` body (RFC 7807, §4.10).
#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub detail: String,
    pub status: u16,
}

/// A governance decision stuck `pending` maps to 409 rather than the
/// error's own status code, since it is not really a failure: the caller is
/// expected to poll `GetTask` until a human resolves the approval (§4.11).
pub fn to_problem_details(err: &KairosError) -> ProblemDetails {
    let status = if err.kind == ErrorKind::Internal && err.context.contains_key("pending_approval") {
        409
    } else {
        err.status_code()
    };
    ProblemDetails {
        problem_type: format!("https://kairos.dev/errors/{}", err.kind.to_string().to_lowercase()),
        title: err.kind.to_string(),
        detail: err.message.clone(),
        status,
    }
}

pub fn pending_approval_error(approval_id: impl std::fmt::Display) -> KairosError {
    KairosError::internal(format!("task is awaiting approval {approval_id}"))
        .recoverable(false)
        .with_context("pending_approval", json!(true))
        .with_context("approval_id", json!(approval_id.to_string()))
}
