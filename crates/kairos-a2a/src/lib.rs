//! The A2A task handler and its HTTP+JSON+SSE and gRPC bindings (§4.9,
//! §4.10).

mod cancellation_registry;
mod discovery;
mod error_mapping;
mod grpc;
mod handler;
mod http;
mod push_notifications;
mod streams;
mod task_store;

pub use cancellation_registry::CancellationRegistry;
pub use discovery::{
    AgentEndpoint, ConfigDiscoveryProvider, DiscoveryProvider, RegistryDiscoveryProvider, Resolver,
    WellKnownDiscoveryProvider,
};
pub use error_mapping::{to_grpc_status, to_problem_details, pending_approval_error, ProblemDetails};
pub use handler::{A2aHandler, ApprovalListFilter};
pub use http::router as http_router;
pub use streams::StreamHub;
pub use task_store::{InMemoryTaskStore, TaskFilter, TaskPage, TaskStore};

pub mod proto {
    tonic::include_proto!("kairos.a2a.v1");
}

pub use grpc::A2aGrpcService;
