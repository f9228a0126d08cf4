//! The uniform tool surface over local functions, MCP-exposed tools, and
//! skill activations (§4.6).

mod adapter;
mod local;
mod mcp;
mod skill_tool;

pub use adapter::{ToolAdapter, ToolRegistrationError};
pub use local::{LocalTool, LocalToolFn};
pub use mcp::{McpCatalog, McpClient, McpServerConfig, McpTool, McpToolDescriptor, McpTransport, RmcpClient};
pub use skill_tool::SkillToolAdapter;

use async_trait::async_trait;
use kairos_errors::KairosResult;
use serde_json::Value;
use std::collections::HashMap;

/// A callable tool with a name, description, JSON schema, and a call
/// function mapping `map<string, value>` arguments to a structured result
/// (§4.6).
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> Value;
    async fn call(&self, args: HashMap<String, Value>) -> KairosResult<Value>;
}
