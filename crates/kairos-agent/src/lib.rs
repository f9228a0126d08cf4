//! The bounded ReAct agent loop: alternates LLM calls and governed tool
//! execution, backed by conversation and semantic memory (§4.8).

mod action_fallback;
mod agent_invoker;
mod config;
mod llm;
mod loop_;
mod pending;

pub use agent_invoker::{PlannerAgentInvoker, PlannerLlmInvoker};
pub use config::{ActionFallbackConfig, AgentConfig};
pub use llm::{LlmCallOptions, LlmClient, LlmMessage, LlmResponse, LlmRole, ToolCallRequest, ToolDeclaration};
pub use loop_::{Agent, RunOutcome};
pub use pending::{LoopSnapshot, PendingRunStore};
