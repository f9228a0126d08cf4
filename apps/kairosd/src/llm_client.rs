//! The daemon's default `LlmClient` (§4.8, §6 `llm.*`). A specific LLM
//! backend is a spec non-goal, so this is a minimal OpenAI-chat-completions-
//! compatible caller — enough to make `kairosd` runnable out of the box
//! against any provider that speaks that wire format (most do). Embedders
//! wanting a richer integration implement `kairos_agent::LlmClient`
//! themselves and hand it to `KairosBuilder::new` instead.

use async_trait::async_trait;
use kairos_agent::{LlmCallOptions, LlmClient, LlmMessage, LlmResponse, LlmRole, ToolCallRequest, ToolDeclaration};
use kairos_errors::{KairosError, KairosResult};
use serde_json::{Value, json};
use tracing::instrument;

pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

fn role_str(role: LlmRole) -> &'static str {
    match role {
        LlmRole::System => "system",
        LlmRole::User => "user",
        LlmRole::Assistant => "assistant",
        LlmRole::Tool => "tool",
    }
}

fn request_body(messages: &[LlmMessage], tools: &[ToolDeclaration], options: &LlmCallOptions, model: &str) -> Value {
    let messages: Vec<Value> = messages
        .iter()
        .map(|m| {
            let mut entry = json!({
                "role": role_str(m.role),
                "content": m.content,
            });
            if let Some(id) = &m.tool_call_id {
                entry["tool_call_id"] = json!(id);
            }
            if !m.tool_calls.is_empty() {
                entry["tool_calls"] = json!(
                    m.tool_calls
                        .iter()
                        .map(|call| json!({
                            "id": call.id,
                            "type": "function",
                            "function": { "name": call.name, "arguments": call.arguments.to_string() },
                        }))
                        .collect::<Vec<_>>()
                );
            }
            entry
        })
        .collect();

    let mut body = json!({
        "model": model,
        "messages": messages,
    });
    if let Some(temperature) = options.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = options.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if options.native_tool_calling && !tools.is_empty() {
        body["tools"] = json!(
            tools
                .iter()
                .map(|tool| json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.schema,
                    },
                }))
                .collect::<Vec<_>>()
        );
    }
    body
}

fn parse_response(body: Value) -> KairosResult<LlmResponse> {
    let choice = body
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or_else(|| KairosError::llm_error("provider response carried no choices"))?;

    let message = choice
        .get("message")
        .ok_or_else(|| KairosError::llm_error("provider response choice carried no message"))?;

    let content = message.get("content").and_then(Value::as_str).map(str::to_owned);

    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .filter_map(|call| {
                    let id = call.get("id")?.as_str()?.to_owned();
                    let function = call.get("function")?;
                    let name = function.get("name")?.as_str()?.to_owned();
                    let raw_args = function.get("arguments").and_then(Value::as_str).unwrap_or("{}");
                    let arguments = serde_json::from_str(raw_args).unwrap_or(Value::Null);
                    Some(ToolCallRequest { id, name, arguments })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(LlmResponse { content, tool_calls })
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    #[instrument(skip(self, messages, tools), fields(model = %self.model))]
    async fn complete(
        &self,
        messages: &[LlmMessage],
        tools: &[ToolDeclaration],
        options: &LlmCallOptions,
    ) -> KairosResult<LlmResponse> {
        let mut request = self
            .client
            .post(self.endpoint())
            .json(&request_body(messages, tools, options, &self.model));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| KairosError::llm_error(format!("provider request failed: {e}")).recoverable(true))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| KairosError::llm_error(format!("provider response was not valid JSON: {e}")))?;

        if !status.is_success() {
            let message = body
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("provider returned an error")
                .to_owned();
            return Err(KairosError::llm_error(message).recoverable(status.as_u16() >= 500));
        }

        parse_response(body)
    }
}

/// Default responder when no `llm.base_url` is configured — keeps the
/// daemon runnable without a configured provider (demos, smoke tests).
pub struct EchoLlmClient;

#[async_trait]
impl LlmClient for EchoLlmClient {
    async fn complete(
        &self,
        messages: &[LlmMessage],
        _tools: &[ToolDeclaration],
        _options: &LlmCallOptions,
    ) -> KairosResult<LlmResponse> {
        let last = messages
            .iter()
            .rev()
            .find(|m| m.role == LlmRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(LlmResponse {
            content: Some(format!("no llm.base_url configured; echoing input: {last}")),
            tool_calls: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_tool_declarations_only_when_native_tool_calling_is_on() {
        let messages = vec![LlmMessage::user("hi")];
        let tools = vec![ToolDeclaration {
            name: "sum".into(),
            description: "adds numbers".into(),
            schema: json!({"type": "object"}),
        }];

        let without = request_body(&messages, &tools, &LlmCallOptions::default(), "gpt-4o");
        assert!(without.get("tools").is_none());

        let options = LlmCallOptions {
            native_tool_calling: true,
            ..Default::default()
        };
        let with = request_body(&messages, &tools, &options, "gpt-4o");
        assert_eq!(with["tools"][0]["function"]["name"], "sum");
    }

    #[test]
    fn parse_response_extracts_content_and_tool_calls() {
        let body = json!({
            "choices": [{
                "message": {
                    "content": "hello",
                    "tool_calls": [{
                        "id": "call_1",
                        "function": { "name": "sum", "arguments": "{\"a\":1,\"b\":2}" }
                    }]
                }
            }]
        });

        let response = parse_response(body).unwrap();
        assert_eq!(response.content.as_deref(), Some("hello"));
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "sum");
        assert_eq!(response.tool_calls[0].arguments, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn parse_response_rejects_a_body_with_no_choices() {
        let err = parse_response(json!({"choices": []})).unwrap_err();
        assert_eq!(err.kind, kairos_errors::ErrorKind::LlmError);
    }
}
