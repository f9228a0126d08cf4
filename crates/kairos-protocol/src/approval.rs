use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ApprovalId, ContextId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl ApprovalStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }
}

/// Once non-pending, terminal (§3, §8 "approval terminal").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: ApprovalId,
    pub task_id: TaskId,
    pub context_id: ContextId,
    pub action: String,
    pub status: ApprovalStatus,
    pub requester: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ApprovalRecord {
    pub fn new(
        task_id: TaskId,
        context_id: ContextId,
        action: impl Into<String>,
        requester: impl Into<String>,
        reason: impl Into<String>,
        now: DateTime<Utc>,
        ttl: Option<chrono::Duration>,
    ) -> Self {
        Self {
            id: ApprovalId::default(),
            task_id,
            context_id,
            action: action.into(),
            status: ApprovalStatus::Pending,
            requester: requester.into(),
            reason: reason.into(),
            created_at: now,
            decided_at: None,
            expires_at: ttl.map(|d| now + d),
        }
    }

    /// Transitions a pending record to a terminal status. Returns an error
    /// if already terminal.
    pub fn decide(&mut self, status: ApprovalStatus, now: DateTime<Utc>) -> Result<(), String> {
        if self.status.is_terminal() {
            return Err(format!(
                "approval {} is already terminal ({:?})",
                self.id, self.status
            ));
        }
        self.status = status;
        self.decided_at = Some(now);
        Ok(())
    }
}
