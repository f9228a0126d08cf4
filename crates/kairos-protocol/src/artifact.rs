use serde::{Deserialize, Serialize};

use crate::ids::{ArtifactId, TaskId};

/// Named payload produced by the agent; addressable within a task (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub task_id: TaskId,
    pub name: String,
    pub mime_type: String,
    pub content: serde_json::Value,
}

impl Artifact {
    pub fn new(
        task_id: TaskId,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        content: serde_json::Value,
    ) -> Self {
        Self {
            id: ArtifactId::default(),
            task_id,
            name: name.into(),
            mime_type: mime_type.into(),
            content,
        }
    }
}
