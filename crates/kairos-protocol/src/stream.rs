use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::artifact::Artifact;
use crate::ids::TaskId;
use crate::task::TaskState;

/// Pushed to streaming subscribers of a task (§3, §4.9). Status updates
/// carry semantic event-type metadata (`thinking`, `tool.started`, ...);
/// the terminal event sets `final=true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamResponse {
    Status {
        task_id: TaskId,
        state: TaskState,
        message: Option<String>,
        event_type: String,
        #[serde(default)]
        r#final: bool,
    },
    Artifact {
        task_id: TaskId,
        artifact: Artifact,
    },
    Completion {
        task_id: TaskId,
        state: TaskState,
        data: Value,
    },
}

impl StreamResponse {
    pub fn working(task_id: TaskId) -> Self {
        StreamResponse::Status {
            task_id,
            state: TaskState::Working,
            message: None,
            event_type: "working".to_owned(),
            r#final: false,
        }
    }

    pub fn semantic(task_id: TaskId, event_type: impl Into<String>, message: impl Into<String>) -> Self {
        StreamResponse::Status {
            task_id,
            state: TaskState::Working,
            message: Some(message.into()),
            event_type: event_type.into(),
            r#final: false,
        }
    }

    pub fn terminal(task_id: TaskId, state: TaskState) -> Self {
        StreamResponse::Status {
            task_id,
            state,
            message: None,
            event_type: if state == TaskState::Completed {
                "completed".to_owned()
            } else {
                "failed".to_owned()
            },
            r#final: true,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, StreamResponse::Status { r#final: true, .. } | StreamResponse::Completion { .. })
    }
}
