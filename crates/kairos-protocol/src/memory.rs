use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{SessionId, ToolCallId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationRole {
    User,
    Assistant,
    System,
    Tool,
}

/// `(id, sessionId, role, content, toolCallId?, metadata, createdAt)`,
/// ordered by `createdAt` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub session_id: SessionId,
    pub role: ConversationRole,
    pub content: String,
    pub tool_call_id: Option<ToolCallId>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(
        session_id: SessionId,
        role: ConversationRole,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id,
            role,
            content: content.into(),
            tool_call_id: None,
            metadata: serde_json::Value::Null,
            created_at: now,
        }
    }

    pub fn with_tool_call_id(mut self, tool_call_id: ToolCallId) -> Self {
        self.tool_call_id = Some(tool_call_id);
        self
    }

    /// Approximate token count used by the token-budget truncation strategy
    /// (§4.5, §9 "pluggable, default is not a contract").
    pub fn approx_tokens(&self) -> usize {
        self.content.len() / 4
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub score: f32,
    pub point: VectorPoint,
}
