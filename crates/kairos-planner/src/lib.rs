//! Graph validation, DAG execution, condition grammar, and audit stores
//! (§4.7). `handler` is public so downstream crates can implement
//! [`handler::AgentInvoker`] and [`handler::LlmInvoker`] without this crate
//! depending on them back.

pub mod handler;

mod audit;
mod condition;
mod executor;

pub use audit::{AuditFilter, AuditRecord, AuditStatus, AuditStore, InMemoryAuditStore, SqliteAuditStore};
pub use condition::{Condition, ConditionError};
pub use executor::Executor;
