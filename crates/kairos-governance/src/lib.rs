//! Governance: policy evaluation, approval hooks, and the approval
//! store/sweeper (§4.3).

mod approval_hook;
mod approval_store;
mod engine;
mod sweeper;

pub use approval_hook::{ApprovalHook, ConsoleApprovalHook, HookDecision};
pub use approval_store::{
    ApprovalFilter, ApprovalStore, InMemoryApprovalStore, SqliteApprovalStore,
};
pub use engine::{OrderedRulePolicyEngine, PolicyEngine};
pub use sweeper::ApprovalSweeper;
