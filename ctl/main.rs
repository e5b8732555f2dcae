#![forbid(unsafe_code)]

//! `acp-engine-client`: drive an ACP agent for one prompt turn.
//!
//! Spawns the agent (or connects to a WebSocket agent), runs
//! `initialize` → `session/new` → `session/prompt`, prints the agent's
//! message chunks to stdout, and exits with a code describing how the turn
//! ended.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

use acp_engine::client::{AutoApprove, ClientService, LocalFileSystem, ProcessTerminal};
use acp_engine::protocol::schema::{
    ClientCapabilities, FileSystemCapability, Implementation, InitializeRequest,
    NewSessionRequest, PromptRequest,
};
use acp_engine::protocol::{ContentBlock, SessionUpdate, PROTOCOL_VERSION};
use acp_engine::transport::{
    ProcessConfig, ProcessTransport, Transport, WsClientConfig, WsClientTransport,
};
use acp_engine::{AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "acp-engine-client",
    about = "Run one prompt turn against an ACP agent",
    version,
    long_about = None
)]
struct Cli {
    /// Agent binary to spawn.
    #[arg(long, conflicts_with = "url")]
    agent: Option<String>,

    /// Argument for the spawned agent; repeat for more.
    #[arg(long = "agent-arg", allow_hyphen_values = true)]
    agent_args: Vec<String>,

    /// WebSocket agent to connect to instead of spawning one.
    #[arg(long)]
    url: Option<String>,

    /// Session working directory and file-access root.
    #[arg(long, default_value = ".")]
    cwd: PathBuf,

    /// Grant permission requests instead of rejecting them.
    #[arg(long)]
    approve: bool,

    /// Let the agent run commands through `terminal/*`.
    #[arg(long)]
    allow_terminal: bool,

    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Prompt text.
    prompt: String,
}

fn main() {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        std::process::exit(err.exit_code());
    }

    let outcome = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))
        .and_then(|runtime| runtime.block_on(run(args)));

    if let Err(err) = outcome {
        eprintln!("Error: {err}");
        std::process::exit(err.exit_code());
    }
}

async fn run(args: Cli) -> Result<()> {
    let config = match args.config {
        Some(ref path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    let cwd = args
        .cwd
        .canonicalize()
        .map_err(|err| AppError::Config(format!("invalid --cwd: {err}")))?;

    let transport: Arc<dyn Transport> = match (args.url.or(config.transport.url.clone()), args.agent) {
        (_, Some(program)) => {
            let mut process = ProcessConfig::new(program, args.agent_args);
            process.cwd = Some(cwd.clone());
            process.max_in_flight = config.transport.max_in_flight;
            Arc::new(ProcessTransport::new(process))
        }
        (Some(url), None) => {
            let mut ws = WsClientConfig::new(url);
            ws.retry = config.transport.retry_policy();
            ws.heartbeat = config.transport.heartbeat();
            ws.max_in_flight = config.transport.max_in_flight;
            Arc::new(WsClientTransport::new(ws))
        }
        (None, None) => return Err(AppError::Config("either --agent or --url is required".into())),
    };

    let mut builder = ClientService::builder(transport)
        .with_timeout(config.client.request_timeout())
        .with_permission_handler(Arc::new(AutoApprove {
            approve: args.approve,
        }))
        .with_file_system(Arc::new(LocalFileSystem::new(cwd.clone())))
        .on_session_update(|notification| match notification.update {
            SessionUpdate::AgentMessageChunk {
                content: ContentBlock::Text(text),
            } => {
                let mut stdout = std::io::stdout().lock();
                let _ = writeln!(stdout, "{}", text.text);
            }
            other => debug!(kind = other.kind(), "session update"),
        });
    if args.allow_terminal {
        builder = builder.with_terminal(Arc::new(ProcessTerminal::new(cwd.clone())));
    }
    let client = builder.connect().await?;

    let init = client
        .initialize(&InitializeRequest {
            protocol_version: PROTOCOL_VERSION,
            client_capabilities: ClientCapabilities {
                fs: FileSystemCapability {
                    read_text_file: true,
                    write_text_file: true,
                },
                terminal: args.allow_terminal,
            },
            client_info: Some(Implementation {
                name: env!("CARGO_PKG_NAME").into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
            }),
        })
        .await?;
    info!(protocol_version = init.protocol_version, "agent initialized");

    let session = client
        .new_session(&NewSessionRequest {
            cwd: cwd.to_string_lossy().into_owned(),
            mcp_servers: Vec::new(),
        })
        .await?;
    info!(session_id = %session.session_id, "session created");

    let response = client
        .prompt(&PromptRequest {
            session_id: session.session_id,
            prompt: vec![ContentBlock::text(args.prompt)],
        })
        .await?;
    info!(stop_reason = ?response.stop_reason, "prompt finished");

    client.close().await
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
