use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use kairos_config::ConfigArgs;

#[derive(Debug, Parser)]
#[command(name = "kairosd", about = "Kairos agent daemon — serves the A2A protocol over HTTP+SSE and gRPC")]
pub struct Cli {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// HTTP+JSON+SSE listen address (§4.10).
    #[arg(long, env = "KAIROS_HTTP_LISTEN", default_value = "0.0.0.0:8080")]
    pub http_listen: SocketAddr,

    /// gRPC listen address (§4.10).
    #[arg(long, env = "KAIROS_GRPC_LISTEN", default_value = "0.0.0.0:8081")]
    pub grpc_listen: SocketAddr,

    /// Name this agent publishes in its `AgentCard` and uses for
    /// `agents.<id>` config overrides (§4.12).
    #[arg(long, env = "KAIROS_AGENT_NAME", default_value = "kairos")]
    pub agent_name: String,

    /// System preamble prefixed to every ReAct turn (§4.8 step 1).
    #[arg(long, env = "KAIROS_SYSTEM_PREAMBLE")]
    pub system_preamble: Option<String>,

    /// Directory of `<name>/SKILL.md` skill directories to load (§4.6).
    #[arg(long, env = "KAIROS_SKILLS_DIR")]
    pub skills_dir: Option<PathBuf>,

    /// Poll the base config file for changes and hot-reload (§4.12).
    #[arg(long)]
    pub watch_config: bool,

    /// Attach a console approval hook that resolves pending governance
    /// decisions on this process's stdin/stdout, instead of leaving them
    /// for an operator to resolve over the A2A approval endpoints (§4.3).
    #[arg(long)]
    pub console_approval: bool,
}
