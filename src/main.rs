#![forbid(unsafe_code)]

//! `acp-engine`: Agent Client Protocol agent binary.
//!
//! Serves the Agent Service with the built-in echo executor over this
//! process's stdio or a multiplexing WebSocket listener. Logs go to stderr
//! so they never mix with the stdio JSON-RPC stream.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use acp_engine::agent::{AgentServer, EchoExecutor};
use acp_engine::transport::{StdioTransport, Transport, WsServerConfig, WsServerTransport};
use acp_engine::{AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum TransportKind {
    /// Newline-delimited JSON on stdin / stdout.
    Stdio,
    /// WebSocket listener accepting many clients.
    Ws,
}

#[derive(Debug, Parser)]
#[command(name = "acp-engine", about = "Agent Client Protocol agent", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Transport to serve on.
    #[arg(long, value_enum, default_value_t = TransportKind::Stdio)]
    transport: TransportKind,

    /// WebSocket listen address; overrides `transport.bind`.
    #[arg(long)]
    bind: Option<String>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
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
        error!(%err, "acp-engine failed");
        std::process::exit(err.exit_code());
    }
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match args.config {
        Some(ref path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.transport.bind = bind;
    }
    info!(transport = ?args.transport, "configuration loaded");

    // ── Build transport ─────────────────────────────────
    let transport: Arc<dyn Transport> = match args.transport {
        TransportKind::Stdio => Arc::new(StdioTransport::stdio(config.transport.max_in_flight)),
        TransportKind::Ws => Arc::new(WsServerTransport::new(WsServerConfig {
            bind: config.transport.bind.clone(),
            max_in_flight: config.transport.max_in_flight,
        })),
    };

    // ── Serve until disconnect or signal ────────────────
    let server = AgentServer::new(transport, config.agent, Arc::new(EchoExecutor));
    tokio::select! {
        outcome = server.run() => outcome?,
        () = shutdown_signal() => info!("shutdown signal received"),
    }
    info!("acp-engine shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
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
