use std::time::Duration;

use kairos_errors::RetryConfig;

/// `agent.{disable_action_fallback,warn_on_action_fallback}` (§6), with
/// per-agent-id overrides layered in by `kairos-config`.
#[derive(Debug, Clone)]
pub struct ActionFallbackConfig {
    pub disabled: bool,
    pub warn_on_use: bool,
}

impl Default for ActionFallbackConfig {
    fn default() -> Self {
        Self {
            disabled: true,
            warn_on_use: true,
        }
    }
}

/// Tunables for one `Agent`'s ReAct loop (§4.8).
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub system_preamble: String,
    pub max_iterations: u32,
    pub llm_call_timeout: Duration,
    pub tool_call_timeout: Duration,
    pub tool_retry: RetryConfig,
    pub llm_retry: RetryConfig,
    pub memory_recall_k: usize,
    pub history_limit: usize,
    pub action_fallback: ActionFallbackConfig,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_preamble: "You are a helpful agent.".to_owned(),
            max_iterations: 10,
            llm_call_timeout: Duration::from_secs(30),
            tool_call_timeout: Duration::from_secs(20),
            tool_retry: RetryConfig::default(),
            llm_retry: RetryConfig::default(),
            memory_recall_k: 5,
            history_limit: 20,
            action_fallback: ActionFallbackConfig::default(),
        }
    }
}
