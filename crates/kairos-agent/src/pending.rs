use std::collections::HashMap;

use kairos_protocol::{ApprovalId, SessionId, TaskId};
use parking_lot::Mutex;

use crate::llm::{LlmMessage, ToolCallRequest};

/// Everything needed to resume a ReAct turn after a human decides a
/// governance-pending tool call (§4.8, §9 "exact replay semantics ... is
/// implementation-defined"). Kairos resolves that open question by
/// continuing from the suspended point rather than replaying the whole
/// loop: the messages accumulated so far are kept verbatim and only the one
/// pending tool call is (on approval) finally invoked, so no tool runs
/// twice for one approval. `remaining_calls` holds the rest of the same
/// LLM turn's tool-call batch — the calls the assistant message already
/// declared but that hadn't been gated yet when `pending_call` suspended
/// the batch — so resuming processes them instead of silently dropping
/// them.
#[derive(Debug, Clone)]
pub struct LoopSnapshot {
    pub task_id: TaskId,
    pub session_id: SessionId,
    pub messages: Vec<LlmMessage>,
    pub iteration: u32,
    pub pending_call: ToolCallRequest,
    pub remaining_calls: Vec<ToolCallRequest>,
}

/// In-process registry of suspended loop snapshots keyed by the approval
/// record that is blocking them. Owned by whoever drives the loop (the A2A
/// handler, typically); not persisted, since a process restart with
/// in-flight approvals is out of scope for the core runtime (the approval
/// *record* itself is durable via `ApprovalStore`; only the in-memory
/// continuation is not).
#[derive(Default)]
pub struct PendingRunStore {
    snapshots: Mutex<HashMap<ApprovalId, LoopSnapshot>>,
}

impl PendingRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, approval_id: ApprovalId, snapshot: LoopSnapshot) {
        self.snapshots.lock().insert(approval_id, snapshot);
    }

    pub fn take(&self, approval_id: &ApprovalId) -> Option<LoopSnapshot> {
        self.snapshots.lock().remove(approval_id)
    }
}
