use std::collections::HashMap;

use kairos_protocol::PolicyRule;
use serde::{Deserialize, Serialize};

/// The recognized configuration surface (spec §6 "Configuration surface").
/// Every field has a default so an empty configuration is always valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KairosConfig {
    pub log: LogConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    #[serde(default)]
    pub agents: HashMap<String, AgentOverride>,
    pub memory: MemoryConfig,
    pub mcp: McpConfig,
    pub discovery: DiscoveryConfig,
    pub telemetry: TelemetryConfig,
    pub runtime: RuntimeConfig,
    pub governance: GovernanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "text".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

/// `agent.{disable_action_fallback,warn_on_action_fallback}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub disable_action_fallback: bool,
    pub warn_on_action_fallback: bool,
}

/// Per-agent-id override at `agents.<id>`, layered on top of `agent.*`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentOverride {
    pub disable_action_fallback: Option<bool>,
    pub warn_on_action_fallback: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
    pub provider: String,
    pub qdrant_addr: Option<String>,
    pub embedder_provider: Option<String>,
    pub embedder_base_url: Option<String>,
    pub embedder_model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct McpConfig {
    pub servers: HashMap<String, McpServerEntry>,
}

/// `mcp.servers.<name>.*`. `type` is a compatibility alias for `transport`,
/// resolved by [`crate::compat::apply`] before this struct is populated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct McpServerEntry {
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    pub transport: String,
    pub url: Option<String>,
    pub protocol_version: Option<String>,
    pub timeout_seconds: u64,
    pub retry_count: u32,
    pub retry_backoff_ms: u64,
    pub cache_ttl_seconds: u64,
}

impl Default for McpServerEntry {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            transport: "stdio".to_owned(),
            url: None,
            protocol_version: None,
            timeout_seconds: 30,
            retry_count: 2,
            retry_backoff_ms: 200,
            cache_ttl_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub order: Vec<String>,
    pub registry_url: Option<String>,
    pub registry_token: Option<String>,
    pub auto_register: bool,
    pub heartbeat_seconds: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            order: vec!["config".to_owned(), "well-known".to_owned(), "registry".to_owned()],
            registry_url: None,
            registry_token: None,
            auto_register: false,
            heartbeat_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryExporter {
    #[default]
    Stdout,
    Otlp,
    None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    pub exporter: TelemetryExporter,
    pub otlp_endpoint: Option<String>,
    pub otlp_insecure: bool,
    pub otlp_timeout_seconds: u64,
    pub otlp_headers: HashMap<String, String>,
    pub otlp_user: Option<String>,
    pub otlp_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub approval_sweep_interval_seconds: u64,
    pub approval_sweep_timeout_seconds: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            approval_sweep_interval_seconds: 30,
            approval_sweep_timeout_seconds: 1800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub policies: Vec<PolicyRule>,
    pub approval_timeout_seconds: u64,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            policies: Vec::new(),
            approval_timeout_seconds: 1800,
        }
    }
}
