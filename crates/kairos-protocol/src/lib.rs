//! The Kairos wire and domain data model (§3).
//!
//! Intentionally dependency-light: no runtime deps like tokio or axum live
//! here, only `serde`/`uuid`/`chrono`. Every other crate in the workspace
//! depends on this one; it must never depend back on them.

mod agent_card;
mod approval;
mod artifact;
mod graph;
mod health;
mod ids;
mod memory;
mod message;
mod policy;
mod stream;
mod task;

pub use agent_card::{AgentCapabilities, AgentCard, AgentSkillSummary};
pub use approval::{ApprovalRecord, ApprovalStatus};
pub use artifact::Artifact;
pub use graph::{ConditionError, Edge, Graph, GraphError, Node, PlannerState};
pub use health::{BreakerSnapshot, BreakerStateKind, HealthState, HealthStatus};
pub use ids::{
    ApprovalId, ArtifactId, ContextId, GraphId, MessageId, NodeId, RunId, SessionId, TaskId,
    ToolCallId,
};
pub use memory::{ConversationMessage, ConversationRole, SearchResult, VectorPoint};
pub use message::{Message, Part, Role};
pub use policy::{Action, ActionType, Decision, Effect, PolicyRule};
pub use stream::StreamResponse;
pub use task::{PushNotificationConfig, Task, TaskState};
