use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::ids::{ContextId, TaskId};
use crate::message::Message;

/// Monotonic lifecycle: `Submitted → Working → {Completed | Failed |
/// Cancelled | Rejected}`; `InputRequired` and `AuthRequired` are legal
/// intermediate states. Terminal states have no successor (§3, §8 "task
/// monotonicity").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    AuthRequired,
    Completed,
    Failed,
    Cancelled,
    Rejected,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled | TaskState::Rejected
        )
    }

    /// Whether transitioning from `self` to `next` is a legal forward move.
    /// Terminal states accept no successor; non-terminal states may move to
    /// any other non-equal state (the handler is the sole mutator and is
    /// trusted to only propose sensible transitions; this guards the
    /// invariant that terminal is final).
    pub fn can_transition_to(self, next: TaskState) -> bool {
        if self.is_terminal() {
            return false;
        }
        self != next
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushNotificationConfig {
    pub id: String,
    pub url: String,
    pub token: Option<String>,
}

/// Unit of work (§3). Created on first inbound message; mutated only by the
/// A2A handler; retained per store policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub context_id: ContextId,
    pub state: TaskState,
    pub history: Vec<Message>,
    pub artifacts: Vec<Artifact>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub push_notification_configs: Vec<PushNotificationConfig>,
}

impl Task {
    pub fn new(context_id: ContextId, now: DateTime<Utc>) -> Self {
        Self {
            id: TaskId::default(),
            context_id,
            state: TaskState::Submitted,
            history: Vec::new(),
            artifacts: Vec::new(),
            created_at: now,
            updated_at: now,
            push_notification_configs: Vec::new(),
        }
    }

    /// Applies a state transition, enforcing monotonicity. Returns the
    /// previous state on success.
    pub fn transition(&mut self, next: TaskState, now: DateTime<Utc>) -> Result<TaskState, String> {
        if !self.state.can_transition_to(next) {
            return Err(format!(
                "illegal transition from terminal or identical state {:?} -> {:?}",
                self.state, next
            ));
        }
        let previous = self.state;
        self.state = next;
        self.updated_at = now;
        Ok(previous)
    }

    pub fn push_message(&mut self, message: Message) {
        self.history.push(message);
    }

    pub fn push_artifact(&mut self, artifact: Artifact) {
        self.artifacts.push(artifact);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_reject_further_transitions() {
        let mut task = Task::new(ContextId::default(), Utc::now());
        task.transition(TaskState::Working, Utc::now()).unwrap();
        task.transition(TaskState::Completed, Utc::now()).unwrap();
        assert!(task.transition(TaskState::Working, Utc::now()).is_err());
    }

    #[test]
    fn non_terminal_states_accept_forward_transitions() {
        let mut task = Task::new(ContextId::default(), Utc::now());
        assert!(task.transition(TaskState::Working, Utc::now()).is_ok());
        assert!(task.transition(TaskState::InputRequired, Utc::now()).is_ok());
        assert!(task.transition(TaskState::Completed, Utc::now()).is_ok());
    }
}
