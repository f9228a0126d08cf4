use async_trait::async_trait;
use kairos_errors::KairosResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message in an LLM conversation turn. Distinct from
/// `kairos_protocol::Message`, which is the wire/task model; this is the
/// narrower shape an LLM provider actually consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: LlmRole,
    pub content: String,
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmRole {
    System,
    User,
    Assistant,
    Tool,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::System,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::User,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: LlmRole::Assistant,
            content: String::new(),
            tool_call_id: None,
            tool_calls,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: Vec::new(),
        }
    }
}

/// A tool call the LLM wants executed, whether surfaced via the provider's
/// native tool-calling or parsed from the textual fallback path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// `(name, description, schema)` handed to the provider's tool-calling
/// surface, sourced from `ToolAdapter::declarations()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub schema: Value,
}

#[derive(Debug, Clone, Default)]
pub struct LlmCallOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Whether the provider is asked to use native tool calling. When
    /// `false`, callers rely on the textual `Action:` fallback parser
    /// instead (§4.8, disabled by default).
    pub native_tool_calling: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl LlmResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// The provider-agnostic seam the agent loop calls through (§1 Non-goals:
/// "a specific LLM backend implementation" is out of scope; only this
/// contract is).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[LlmMessage],
        tools: &[ToolDeclaration],
        options: &LlmCallOptions,
    ) -> KairosResult<LlmResponse>;
}
