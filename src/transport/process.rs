//! Child-process transport.
//!
//! Spawns an agent binary and speaks line-framed JSON-RPC over its stdin and
//! stdout. The child:
//! - starts from `env_clear()` plus [`ALLOWED_ENV_VARS`] and any explicitly
//!   configured variables, so client secrets never reach the agent;
//! - has `kill_on_drop(true)`, so dropping the transport reaps it;
//! - has its stderr drained line by line into `debug` logs.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use super::stdio::StdioTransport;
use super::{Transport, TransportFuture};
use crate::rpc::Message;
use crate::sync::BackpressureGate;
use crate::{AppError, Result};

/// Environment variables inherited by the spawned agent.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    "LANG",
    "TERM",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// How long [`ProcessTransport::close`] waits for a clean exit before killing.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Configuration for spawning an agent process.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Agent binary.
    pub program: String,
    /// Arguments passed to the binary.
    pub args: Vec<String>,
    /// Working directory of the child; inherited when `None`.
    pub cwd: Option<PathBuf>,
    /// Variables set on top of the allowlist.
    pub env: Vec<(String, String)>,
    /// Bound on concurrent writers.
    pub max_in_flight: usize,
}

impl ProcessConfig {
    /// Spawn `program` with `args` and default settings.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
            env: Vec::new(),
            max_in_flight: super::stdio::DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

/// Transport to a spawned agent process.
pub struct ProcessTransport {
    config: ProcessConfig,
    pipes: OnceCell<StdioTransport<ChildStdout, ChildStdin>>,
    child: Mutex<Option<Child>>,
}

impl ProcessTransport {
    /// Create a transport; the process is spawned on [`Transport::connect`].
    #[must_use]
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            config,
            pipes: OnceCell::new(),
            child: Mutex::new(None),
        }
    }

    /// OS process id of the running agent.
    pub async fn pid(&self) -> Option<u32> {
        self.child.lock().await.as_ref().and_then(Child::id)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args);

        // Strip inherited environment, then inject only the safe allowlist.
        cmd.env_clear();
        for &key in ALLOWED_ENV_VARS {
            if let Ok(val) = std::env::var(key) {
                cmd.env(key, val);
            }
        }
        for (key, val) in &self.config.env {
            cmd.env(key, val);
        }

        if let Some(ref cwd) = self.config.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn spawn(&self) -> Result<StdioTransport<ChildStdout, ChildStdin>> {
        let mut child = self.command().spawn().map_err(|err| {
            AppError::Transport(format!(
                "failed to spawn agent {}: {err}",
                self.config.program
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Transport("failed to capture agent stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Transport("failed to capture agent stdout".into()))?;
        if let Some(stderr) = child.stderr.take() {
            let program = self.config.program.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(program = %program, line = %line, "agent stderr");
                }
            });
        }

        info!(program = %self.config.program, pid = ?child.id(), "spawned agent process");
        *self.child.lock().await = Some(child);

        Ok(StdioTransport::with_gate(
            stdout,
            stdin,
            BackpressureGate::new(self.config.max_in_flight),
        ))
    }

    fn pipes(&self) -> Result<&StdioTransport<ChildStdout, ChildStdin>> {
        self.pipes.get().ok_or(AppError::NotConnected)
    }

    async fn connect_inner(&self) -> Result<()> {
        let pipes = self.pipes.get_or_try_init(|| self.spawn()).await?;
        pipes.connect().await
    }

    async fn close_inner(&self) -> Result<()> {
        if let Some(pipes) = self.pipes.get() {
            pipes.close().await?;
        }
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };
        match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                info!(program = %self.config.program, code = ?status.code(), "agent process exited");
            }
            Ok(Err(err)) => {
                warn!(program = %self.config.program, %err, "error waiting for agent process");
            }
            Err(_elapsed) => {
                warn!(program = %self.config.program, "agent did not exit in time; killing");
                child.kill().await?;
            }
        }
        Ok(())
    }
}

impl Transport for ProcessTransport {
    fn connect(&self) -> TransportFuture<'_, ()> {
        Box::pin(self.connect_inner())
    }

    fn send(&self, message: Message) -> TransportFuture<'_, ()> {
        Box::pin(async move { self.pipes()?.send(message).await })
    }

    fn receive(&self) -> TransportFuture<'_, Option<Message>> {
        Box::pin(async move { self.pipes()?.receive().await })
    }

    fn close(&self) -> TransportFuture<'_, ()> {
        Box::pin(self.close_inner())
    }
}
