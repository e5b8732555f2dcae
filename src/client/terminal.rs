//! Command execution served to the agent through `terminal/*`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::handlers::ClientFuture;
use super::path_safety::resolve_in_root;
use crate::protocol::client::{
    CreateTerminalRequest, CreateTerminalResponse, TerminalExitStatus, TerminalOutputResponse,
    TerminalRequest,
};
use crate::protocol::Empty;
use crate::{AppError, Result};

/// Output retained when a request sets no limit.
pub const DEFAULT_OUTPUT_BYTE_LIMIT: usize = 1024 * 1024;

/// Backs the five `terminal/*` methods.
pub trait TerminalRuntime: Send + Sync {
    /// Start a command.
    fn create(&self, request: CreateTerminalRequest) -> ClientFuture<'_, CreateTerminalResponse>;

    /// Output captured so far.
    fn output(&self, request: TerminalRequest) -> ClientFuture<'_, TerminalOutputResponse>;

    /// Wait for the command to finish.
    fn wait_for_exit(&self, request: TerminalRequest) -> ClientFuture<'_, TerminalExitStatus>;

    /// Kill the command; the terminal stays readable.
    fn kill(&self, request: TerminalRequest) -> ClientFuture<'_, Empty>;

    /// Kill the command if needed and forget the terminal.
    fn release(&self, request: TerminalRequest) -> ClientFuture<'_, Empty>;
}

/// Combined stdout/stderr bounded to a byte limit; the oldest output goes
/// first.
#[derive(Debug)]
pub struct OutputBuffer {
    text: String,
    limit: usize,
    truncated: bool,
}

impl OutputBuffer {
    /// Empty buffer keeping at most `limit` bytes.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
            truncated: false,
        }
    }

    /// Append `chunk`, dropping old output past the limit.
    pub fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        if self.text.len() <= self.limit {
            return;
        }
        let mut cut = self.text.len() - self.limit;
        while !self.text.is_char_boundary(cut) {
            cut += 1;
        }
        self.text.drain(..cut);
        self.truncated = true;
    }

    /// Retained output.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether anything was dropped.
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

struct Terminal {
    output: Arc<Mutex<OutputBuffer>>,
    exit: watch::Receiver<Option<TerminalExitStatus>>,
    kill: CancellationToken,
}

/// Runs commands as local child processes, confined to a workspace root.
pub struct ProcessTerminal {
    root: PathBuf,
    next_id: AtomicU64,
    terminals: Mutex<HashMap<String, Arc<Terminal>>>,
}

fn exit_status(status: ExitStatus) -> TerminalExitStatus {
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal().as_ref().map(ToString::to_string)
    };
    #[cfg(not(unix))]
    let signal = None;
    TerminalExitStatus {
        exit_code: status.code(),
        signal,
    }
}

async fn capture<R: AsyncRead + Unpin>(stream: R, output: Arc<Mutex<OutputBuffer>>) {
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => return,
            Ok(_) => output
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(&String::from_utf8_lossy(&line)),
            Err(err) => {
                debug!(%err, "terminal output read failed");
                return;
            }
        }
    }
}

impl ProcessTerminal {
    /// Run commands with working directories under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            next_id: AtomicU64::new(0),
            terminals: Mutex::new(HashMap::new()),
        }
    }

    /// Number of terminals not yet released.
    #[must_use]
    pub fn len(&self) -> usize {
        self.terminals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether every terminal has been released.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, terminal_id: &str) -> Result<Arc<Terminal>> {
        self.terminals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(terminal_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("unknown terminal {terminal_id}")))
    }

    fn spawn(&self, request: CreateTerminalRequest) -> Result<CreateTerminalResponse> {
        let cwd = match request.cwd {
            Some(ref cwd) => resolve_in_root(&self.root, cwd)?,
            None => self.root.clone(),
        };
        let limit = request
            .output_byte_limit
            .map_or(DEFAULT_OUTPUT_BYTE_LIMIT, |n| {
                usize::try_from(n).unwrap_or(usize::MAX)
            });

        let mut child = Command::new(&request.command)
            .args(&request.args)
            .envs(request.env.iter().map(|var| (&var.name, &var.value)))
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| AppError::Io(format!("failed to spawn {}: {err}", request.command)))?;

        let output = Arc::new(Mutex::new(OutputBuffer::new(limit)));
        let readers: Vec<_> = [
            child
                .stdout
                .take()
                .map(|out| tokio::spawn(capture(out, Arc::clone(&output)))),
            child
                .stderr
                .take()
                .map(|err| tokio::spawn(capture(err, Arc::clone(&output)))),
        ]
        .into_iter()
        .flatten()
        .collect();

        let (exit_tx, exit_rx) = watch::channel(None);
        let kill = CancellationToken::new();
        let id = format!("term_{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);

        let token = kill.clone();
        let terminal_id = id.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                () = token.cancelled() => {
                    if let Err(err) = child.kill().await {
                        warn!(terminal_id = %terminal_id, %err, "kill failed");
                    }
                    child.wait().await
                }
            };
            for reader in readers {
                let _ = reader.await;
            }
            let status = match status {
                Ok(status) => exit_status(status),
                Err(err) => {
                    warn!(terminal_id = %terminal_id, %err, "wait failed");
                    TerminalExitStatus {
                        exit_code: None,
                        signal: None,
                    }
                }
            };
            debug!(terminal_id = %terminal_id, ?status, "terminal exited");
            let _ = exit_tx.send(Some(status));
        });

        info!(terminal_id = %id, command = %request.command, "terminal created");
        self.terminals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id.clone(),
                Arc::new(Terminal {
                    output,
                    exit: exit_rx,
                    kill,
                }),
            );
        Ok(CreateTerminalResponse { terminal_id: id })
    }
}

impl TerminalRuntime for ProcessTerminal {
    fn create(&self, request: CreateTerminalRequest) -> ClientFuture<'_, CreateTerminalResponse> {
        Box::pin(async move { self.spawn(request) })
    }

    fn output(&self, request: TerminalRequest) -> ClientFuture<'_, TerminalOutputResponse> {
        Box::pin(async move {
            let terminal = self.get(&request.terminal_id)?;
            let exit_status = terminal.exit.borrow().clone();
            let buffer = terminal
                .output
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Ok(TerminalOutputResponse {
                output: buffer.text().to_owned(),
                truncated: buffer.truncated(),
                exit_status,
            })
        })
    }

    fn wait_for_exit(&self, request: TerminalRequest) -> ClientFuture<'_, TerminalExitStatus> {
        Box::pin(async move {
            let terminal = self.get(&request.terminal_id)?;
            let mut exit = terminal.exit.clone();
            let status = exit
                .wait_for(Option::is_some)
                .await
                .map_err(|_| AppError::Io("terminal exit status lost".into()))?;
            status
                .clone()
                .ok_or_else(|| AppError::Io("terminal exit status lost".into()))
        })
    }

    fn kill(&self, request: TerminalRequest) -> ClientFuture<'_, Empty> {
        Box::pin(async move {
            self.get(&request.terminal_id)?.kill.cancel();
            Ok(Empty {})
        })
    }

    fn release(&self, request: TerminalRequest) -> ClientFuture<'_, Empty> {
        Box::pin(async move {
            let removed = self
                .terminals
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&request.terminal_id)
                .ok_or_else(|| {
                    AppError::NotFound(format!("unknown terminal {}", request.terminal_id))
                })?;
            removed.kill.cancel();
            debug!(terminal_id = %request.terminal_id, "terminal released");
            Ok(Empty {})
        })
    }
}

/// Stand-in for platforms or embeddings without command execution.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedTerminal;

fn unsupported<T>() -> Result<T> {
    Err(AppError::Unsupported("terminals are not available".into()))
}

impl TerminalRuntime for UnsupportedTerminal {
    fn create(&self, _request: CreateTerminalRequest) -> ClientFuture<'_, CreateTerminalResponse> {
        Box::pin(async { unsupported() })
    }

    fn output(&self, _request: TerminalRequest) -> ClientFuture<'_, TerminalOutputResponse> {
        Box::pin(async { unsupported() })
    }

    fn wait_for_exit(&self, _request: TerminalRequest) -> ClientFuture<'_, TerminalExitStatus> {
        Box::pin(async { unsupported() })
    }

    fn kill(&self, _request: TerminalRequest) -> ClientFuture<'_, Empty> {
        Box::pin(async { unsupported() })
    }

    fn release(&self, _request: TerminalRequest) -> ClientFuture<'_, Empty> {
        Box::pin(async { unsupported() })
    }
}
