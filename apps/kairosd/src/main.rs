mod cli;
mod llm_client;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use kairos::{A2aGrpcService, KairosBuilder};
use kairos_a2a::a2a_http_router;
use kairos_agent::LlmClient;
use kairos_config::ConfigResolver;
use kairos_governance::ConsoleApprovalHook;
use kairos_skills::{SkillLoader, SkillTool};
use kairos_tools::{McpCatalog, McpClient, McpServerConfig, McpTool, McpTransport, RmcpClient, SkillToolAdapter, Tool};
use tracing::{info, warn};

use crate::llm_client::{EchoLlmClient, OpenAiCompatClient};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    let mut resolver = ConfigResolver::new().with_cli_overrides(cli.config.set.clone());
    if let Some(path) = &cli.config.config {
        resolver = resolver.with_base_path(path.as_str());
    }
    if let Some(profile) = &cli.config.profile {
        resolver = resolver.with_profile(profile.as_str());
    }
    let config = resolver.resolve().context("resolving configuration")?;

    init_telemetry(&config)?;

    let _config_watcher = if cli.watch_config
        && let Some(path) = &cli.config.config
    {
        let reloadable = kairos_config::ReloadableConfig::new(config.clone());
        let watcher = kairos_config::ConfigWatcher::spawn(
            resolver.clone(),
            std::path::PathBuf::from(path.as_str()),
            Duration::from_secs(5),
            reloadable,
        );
        info!(%path, "watching configuration file for changes");
        Some(watcher)
    } else {
        None
    };

    let llm = build_llm_client(&config.llm);

    let mut builder = KairosBuilder::new(cli.agent_name.clone(), llm).with_config(config.clone());
    if let Some(preamble) = &cli.system_preamble {
        builder = builder.with_system_preamble(preamble.clone());
    }
    if cli.console_approval {
        builder = builder.with_approval_hook(Arc::new(ConsoleApprovalHook::default()));
    }

    if let Some(dir) = &cli.skills_dir {
        for skill in SkillLoader::load_dir(dir).await.context("loading skills directory")? {
            let name = skill.frontmatter.name.clone();
            let tool: Arc<dyn Tool> = Arc::new(SkillToolAdapter::new(SkillTool::new(skill)));
            builder = builder.with_tool(tool);
            info!(skill = %name, "loaded skill");
        }
    }

    for tool in mcp_tools(&config.mcp).await {
        builder = builder.with_tool(tool);
    }

    let kairos = builder.build().context("wiring the Kairos agent")?;

    let sweeper = kairos.spawn_approval_sweeper(
        Duration::from_secs(config.runtime.approval_sweep_interval_seconds),
        Duration::from_secs(config.runtime.approval_sweep_timeout_seconds),
    );

    let http_app = a2a_http_router(kairos.a2a());
    let http_listener = tokio::net::TcpListener::bind(cli.http_listen)
        .await
        .with_context(|| format!("binding HTTP listener on {}", cli.http_listen))?;
    info!(listen = %cli.http_listen, "kairosd HTTP+SSE listening");

    let grpc_service = A2aGrpcService::new(kairos.a2a());
    let grpc_server = tonic::transport::Server::builder()
        .add_service(kairos_a2a::proto::a2a_service_server::A2aServiceServer::new(grpc_service))
        .serve_with_shutdown(cli.grpc_listen, shutdown_signal());
    info!(listen = %cli.grpc_listen, "kairosd gRPC listening");

    let http_server = axum::serve(http_listener, http_app).with_graceful_shutdown(shutdown_signal());

    let (http_result, grpc_result) = tokio::join!(http_server, grpc_server);
    http_result.context("HTTP server failed")?;
    grpc_result.context("gRPC server failed")?;

    if let Some(sweeper) = sweeper {
        sweeper.shutdown();
    }

    Ok(())
}

fn init_telemetry(config: &kairos_config::KairosConfig) -> Result<()> {
    let exporter = match config.telemetry.exporter {
        kairos_config::TelemetryExporter::Stdout => kairos_telemetry::TelemetryExporter::Stdout,
        kairos_config::TelemetryExporter::Otlp => kairos_telemetry::TelemetryExporter::Otlp,
        kairos_config::TelemetryExporter::None => kairos_telemetry::TelemetryExporter::None,
    };
    kairos_telemetry::init_telemetry(&kairos_telemetry::TelemetryConfig {
        service_name: "kairosd".to_owned(),
        exporter,
        otlp_endpoint: config.telemetry.otlp_endpoint.clone(),
        otlp_insecure: config.telemetry.otlp_insecure,
        json: config.log.format == "json",
    })
}

fn build_llm_client(config: &kairos_config::LlmConfig) -> Arc<dyn LlmClient> {
    match &config.base_url {
        Some(base_url) => Arc::new(OpenAiCompatClient::new(base_url.clone(), config.api_key.clone(), config.model.clone())),
        None => {
            warn!("llm.base_url is not configured; kairosd will echo input instead of calling a provider");
            Arc::new(EchoLlmClient)
        }
    }
}

async fn mcp_tools(config: &kairos_config::McpConfig) -> Vec<Arc<dyn Tool>> {
    let mut tools = Vec::new();
    for (name, entry) in &config.servers {
        let transport = match entry.transport.as_str() {
            "http" | "sse" => McpTransport::Http {
                url: entry.url.clone().unwrap_or_default(),
            },
            _ => McpTransport::Stdio {
                command: entry.command.clone().unwrap_or_default(),
                args: entry.args.clone(),
            },
        };
        let server_config = McpServerConfig {
            name: name.clone(),
            transport,
            protocol_version: entry.protocol_version.clone(),
            timeout: Duration::from_secs(entry.timeout_seconds),
            retry_count: entry.retry_count,
            retry_backoff: Duration::from_millis(entry.retry_backoff_ms),
            cache_ttl: Duration::from_secs(entry.cache_ttl_seconds),
        };

        let client = match RmcpClient::connect(server_config.clone()).await {
            Ok(client) => Arc::new(client) as Arc<dyn McpClient>,
            Err(err) => {
                warn!(server = %name, %err, "failed to connect MCP server, skipping");
                continue;
            }
        };

        let catalog = McpCatalog::new(client.clone(), server_config.cache_ttl);
        match catalog.tools().await {
            Ok(descriptors) => {
                for descriptor in descriptors {
                    let tool: Arc<dyn Tool> = Arc::new(McpTool::new(descriptor, client.clone()));
                    tools.push(tool);
                }
            }
            Err(err) => warn!(server = %name, %err, "failed to list MCP tools, skipping"),
        }
    }
    tools
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(error) => {
                    tracing::error!(%error, "failed to install SIGTERM handler");
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}
