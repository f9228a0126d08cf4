use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use kairos_errors::{CancellationToken, KairosError, KairosResult, RetryConfig, retry, timeout};
use parking_lot::Mutex;
use rmcp::ServiceExt;
use rmcp::model::CallToolRequestParam;
use rmcp::transport::{ConfigureCommandExt, SseClientTransport, TokioChildProcess};
use serde_json::Value;
use tracing::instrument;

use crate::Tool;

/// `mcp.servers.<name>` configuration (§6).
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    pub name: String,
    pub transport: McpTransport,
    pub protocol_version: Option<String>,
    pub timeout: Duration,
    pub retry_count: u32,
    pub retry_backoff: Duration,
    pub cache_ttl: Duration,
}

#[derive(Debug, Clone)]
pub enum McpTransport {
    Stdio { command: String, args: Vec<String> },
    Http { url: String },
}

impl McpServerConfig {
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            transport: McpTransport::Stdio {
                command: command.into(),
                args,
            },
            protocol_version: None,
            timeout: Duration::from_secs(30),
            retry_count: 2,
            retry_backoff: Duration::from_millis(200),
            cache_ttl: Duration::from_secs(300),
        }
    }

    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: McpTransport::Http { url: url.into() },
            protocol_version: None,
            timeout: Duration::from_secs(30),
            retry_count: 2,
            retry_backoff: Duration::from_millis(200),
            cache_ttl: Duration::from_secs(300),
        }
    }
}

/// Discovers tool catalogs and invokes tools over stdio or HTTP transports
/// (§4.6, §6).
#[async_trait]
pub trait McpClient: Send + Sync {
    async fn list_tools(&self) -> KairosResult<Vec<McpToolDescriptor>>;
    async fn call_tool(&self, name: &str, args: HashMap<String, Value>) -> KairosResult<Value>;
}

#[derive(Debug, Clone)]
pub struct McpToolDescriptor {
    pub name: String,
    pub description: String,
    pub schema: Value,
}

/// rmcp-backed client talking to a single configured MCP server.
pub struct RmcpClient {
    config: McpServerConfig,
    service: Arc<rmcp::service::RunningService<rmcp::RoleClient, ()>>,
}

impl RmcpClient {
    pub async fn connect(config: McpServerConfig) -> KairosResult<Self> {
        let service = match &config.transport {
            McpTransport::Stdio { command, args } => {
                let child = TokioChildProcess::new(tokio::process::Command::new(command).configure(|cmd| {
                    cmd.args(args);
                }))
                .map_err(|e| KairosError::internal("failed spawning MCP server process").with_cause(e))?;
                ().serve(child)
                    .await
                    .map_err(|e| KairosError::internal("failed establishing MCP stdio session").with_cause(e))?
            }
            McpTransport::Http { url } => {
                let transport = SseClientTransport::start(url.clone())
                    .await
                    .map_err(|e| KairosError::internal("failed establishing MCP SSE session").with_cause(e))?;
                ().serve(transport)
                    .await
                    .map_err(|e| KairosError::internal("failed establishing MCP SSE session").with_cause(e))?
            }
        };

        Ok(Self {
            config,
            service: Arc::new(service),
        })
    }
}

#[async_trait]
impl McpClient for RmcpClient {
    #[instrument(skip(self), fields(mcp.server = %self.config.name))]
    async fn list_tools(&self) -> KairosResult<Vec<McpToolDescriptor>> {
        let result = timeout(self.config.timeout, async {
            self.service
                .peer()
                .list_all_tools()
                .await
                .map_err(|e| KairosError::internal("failed listing MCP tools").with_cause(e))
        })
        .await?;

        Ok(result
            .into_iter()
            .map(|tool| McpToolDescriptor {
                name: tool.name.to_string(),
                description: tool.description.map(|d| d.to_string()).unwrap_or_default(),
                schema: serde_json::to_value(&tool.input_schema).unwrap_or(Value::Null),
            })
            .collect())
    }

    #[instrument(skip(self, args), fields(mcp.server = %self.config.name, mcp.tool = %name))]
    async fn call_tool(&self, name: &str, args: HashMap<String, Value>) -> KairosResult<Value> {
        let cancel = CancellationToken::new();
        let retry_config = RetryConfig {
            max_attempts: self.config.retry_count.max(1),
            initial_delay: self.config.retry_backoff,
            max_delay: self.config.retry_backoff * 10,
            multiplier: 2.0,
            jitter: 0.1,
        };

        let name = name.to_owned();
        let service = self.service.clone();
        let call_timeout = self.config.timeout;

        retry(&retry_config, &cancel, move |_attempt| {
            let name = name.clone();
            let args = args.clone();
            let service = service.clone();
            async move {
                timeout(call_timeout, async move {
                    let arguments = match serde_json::Value::Object(args.into_iter().collect()) {
                        Value::Object(map) => Some(map),
                        _ => None,
                    };
                    let result = service
                        .peer()
                        .call_tool(CallToolRequestParam {
                            name: name.clone().into(),
                            arguments,
                        })
                        .await
                        .map_err(|e| KairosError::tool_failure(format!("MCP call_tool '{name}' failed")).with_cause(e))?;
                    serde_json::to_value(&result.content)
                        .map_err(|e| KairosError::internal("failed serializing MCP tool result").with_cause(e))
                })
                .await
            }
        })
        .await
    }
}

/// Wraps a single MCP-catalog tool entry as a uniform `Tool`, validating
/// required arguments against the declared JSON schema before invocation
/// (§4.6).
pub struct McpTool {
    descriptor: McpToolDescriptor,
    client: Arc<dyn McpClient>,
}

impl McpTool {
    pub fn new(descriptor: McpToolDescriptor, client: Arc<dyn McpClient>) -> Self {
        Self { descriptor, client }
    }

    fn required_fields(&self) -> Vec<String> {
        self.descriptor
            .schema
            .get("required")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn description(&self) -> &str {
        &self.descriptor.description
    }

    fn schema(&self) -> Value {
        self.descriptor.schema.clone()
    }

    async fn call(&self, args: HashMap<String, Value>) -> KairosResult<Value> {
        for field in self.required_fields() {
            if !args.contains_key(&field) {
                return Err(KairosError::invalid_input(format!(
                    "missing required argument '{field}' for tool '{}'",
                    self.descriptor.name
                )));
            }
        }
        self.client.call_tool(&self.descriptor.name, args).await
    }
}

struct CacheEntry {
    tools: Vec<McpToolDescriptor>,
    fetched_at: Instant,
}

/// Caches a client's tool catalog with a configurable TTL (§4.6, §6).
pub struct McpCatalog {
    client: Arc<dyn McpClient>,
    ttl: Duration,
    cache: Mutex<Option<CacheEntry>>,
}

impl McpCatalog {
    pub fn new(client: Arc<dyn McpClient>, ttl: Duration) -> Self {
        Self {
            client,
            ttl,
            cache: Mutex::new(None),
        }
    }

    pub async fn tools(&self) -> KairosResult<Vec<McpToolDescriptor>> {
        {
            let cache = self.cache.lock();
            if let Some(entry) = cache.as_ref()
                && entry.fetched_at.elapsed() < self.ttl
            {
                return Ok(entry.tools.clone());
            }
        }

        let tools = self.client.list_tools().await?;
        *self.cache.lock() = Some(CacheEntry {
            tools: tools.clone(),
            fetched_at: Instant::now(),
        });
        Ok(tools)
    }

    pub fn client(&self) -> Arc<dyn McpClient> {
        self.client.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubClient {
        calls: AtomicU32,
    }

    #[async_trait]
    impl McpClient for StubClient {
        async fn list_tools(&self) -> KairosResult<Vec<McpToolDescriptor>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![McpToolDescriptor {
                name: "echo".into(),
                description: "echoes input".into(),
                schema: json!({"type": "object", "required": ["text"]}),
            }])
        }

        async fn call_tool(&self, _name: &str, args: HashMap<String, Value>) -> KairosResult<Value> {
            Ok(json!(args.get("text").cloned().unwrap_or(Value::Null)))
        }
    }

    #[tokio::test]
    async fn catalog_caches_within_ttl() {
        let client = Arc::new(StubClient { calls: AtomicU32::new(0) });
        let catalog = McpCatalog::new(client.clone(), Duration::from_secs(60));
        catalog.tools().await.unwrap();
        catalog.tools().await.unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mcp_tool_rejects_missing_required_argument() {
        let client: Arc<dyn McpClient> = Arc::new(StubClient { calls: AtomicU32::new(0) });
        let descriptor = McpToolDescriptor {
            name: "echo".into(),
            description: "echoes input".into(),
            schema: json!({"type": "object", "required": ["text"]}),
        };
        let tool = McpTool::new(descriptor, client);
        let result = tool.call(HashMap::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn mcp_tool_calls_through_when_required_args_present() {
        let client: Arc<dyn McpClient> = Arc::new(StubClient { calls: AtomicU32::new(0) });
        let descriptor = McpToolDescriptor {
            name: "echo".into(),
            description: "echoes input".into(),
            schema: json!({"type": "object", "required": ["text"]}),
        };
        let tool = McpTool::new(descriptor, client);
        let mut args = HashMap::new();
        args.insert("text".to_owned(), json!("hi"));
        let result = tool.call(args).await.unwrap();
        assert_eq!(result, json!("hi"));
    }
}
