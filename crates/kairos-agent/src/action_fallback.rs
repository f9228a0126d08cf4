use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::llm::ToolCallRequest;

/// Matches lines of the shape `Action: tool_name({"a": 1})`. The secondary
/// tool-call path for providers without native tool calling (§4.8);
/// disabled by default and only consulted when the caller re-enables it.
fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^Action:\s*([A-Za-z0-9_.\-]+)\((\{.*\})?\)\s*$").expect("static pattern is valid")
    })
}

/// Parses the first `Action:` line out of `text`, if any. Returns `None`
/// when the text carries no such line, leaving the caller to treat the
/// response as a final answer.
pub fn parse_action_line(text: &str) -> Option<ToolCallRequest> {
    let captures = pattern().captures(text)?;
    let name = captures.get(1)?.as_str().to_owned();
    let arguments = match captures.get(2) {
        Some(m) => serde_json::from_str::<Value>(m.as_str()).unwrap_or(Value::Null),
        None => Value::Null,
    };
    Some(ToolCallRequest {
        id: format!("fallback-{name}"),
        name,
        arguments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_action_line_with_json_args() {
        let text = "I should call a tool.\nAction: sum({\"a\": 2, \"b\": 3})\n";
        let call = parse_action_line(text).unwrap();
        assert_eq!(call.name, "sum");
        assert_eq!(call.arguments, serde_json::json!({"a": 2, "b": 3}));
    }

    #[test]
    fn parses_action_line_without_args() {
        let text = "Action: ping()";
        let call = parse_action_line(text).unwrap();
        assert_eq!(call.name, "ping");
        assert_eq!(call.arguments, Value::Null);
    }

    #[test]
    fn returns_none_when_no_action_line_present() {
        assert!(parse_action_line("just a final answer").is_none());
    }
}
