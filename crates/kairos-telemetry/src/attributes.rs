use std::collections::HashMap;

/// Free-text span fields are truncated to 500 chars.
pub const FREE_TEXT_TRUNCATE: usize = 500;
/// Planner node input/output fields are truncated to 200 chars.
pub const PLANNER_IO_TRUNCATE: usize = 200;

/// Truncates `s` to at most `max_chars` characters (not bytes), appending
/// nothing — callers that want an ellipsis marker add it themselves.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_owned()
    } else {
        s.chars().take(max_chars).collect()
    }
}

/// The fixed attribute vocabulary (§4.2): agent, session, memory, tool,
/// toolset, LLM, skill, policy, task, planner, guardrails, event.
#[derive(Debug, Default, Clone)]
pub struct SpanAttributes {
    values: HashMap<&'static str, String>,
}

impl SpanAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(mut self, key: &'static str, value: impl Into<String>, max_chars: usize) -> Self {
        self.values.insert(key, truncate(&value.into(), max_chars));
        self
    }

    pub fn agent(self, value: impl Into<String>) -> Self {
        self.set("agent", value, FREE_TEXT_TRUNCATE)
    }

    pub fn session(self, value: impl Into<String>) -> Self {
        self.set("session", value, FREE_TEXT_TRUNCATE)
    }

    pub fn memory(self, value: impl Into<String>) -> Self {
        self.set("memory", value, FREE_TEXT_TRUNCATE)
    }

    pub fn tool(self, value: impl Into<String>) -> Self {
        self.set("tool", value, FREE_TEXT_TRUNCATE)
    }

    pub fn toolset(self, value: impl Into<String>) -> Self {
        self.set("toolset", value, FREE_TEXT_TRUNCATE)
    }

    pub fn llm(self, value: impl Into<String>) -> Self {
        self.set("llm", value, FREE_TEXT_TRUNCATE)
    }

    pub fn skill(self, value: impl Into<String>) -> Self {
        self.set("skill", value, FREE_TEXT_TRUNCATE)
    }

    pub fn policy(self, value: impl Into<String>) -> Self {
        self.set("policy", value, FREE_TEXT_TRUNCATE)
    }

    pub fn task(self, value: impl Into<String>) -> Self {
        self.set("task", value, FREE_TEXT_TRUNCATE)
    }

    pub fn planner(self, value: impl Into<String>) -> Self {
        self.set("planner", value, PLANNER_IO_TRUNCATE)
    }

    pub fn guardrails(self, value: impl Into<String>) -> Self {
        self.set("guardrails", value, FREE_TEXT_TRUNCATE)
    }

    pub fn event(self, value: impl Into<String>) -> Self {
        self.set("event", value, FREE_TEXT_TRUNCATE)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }
}
