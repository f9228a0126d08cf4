//! Layered configuration resolution, hot reload, and the reloadable wrapper
//! (§4.12).

mod cli;
mod compat;
mod loader;
mod model;
mod watch;

pub use cli::{parse_overrides, ConfigArgs};
pub use loader::ConfigResolver;
pub use model::{
    AgentConfig, AgentOverride, DiscoveryConfig, GovernanceConfig, KairosConfig, LlmConfig, LogConfig, McpConfig,
    McpServerEntry, MemoryConfig, RuntimeConfig, TelemetryConfig, TelemetryExporter,
};
pub use watch::{load, ConfigWatcher, ReloadableConfig};
