//! Error types shared across the engine.

use std::fmt::{Display, Formatter};

use crate::rpc::RpcError;

/// Shared engine result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Engine error enumeration covering all domain failure modes.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or process I/O failure.
    Io(String),
    /// Malformed JSON or an invalid JSON-RPC envelope.
    Codec(String),
    /// Transport-level failure (disconnect, write error, routing failure).
    Transport(String),
    /// The transport was never connected or has entered a failed state.
    NotConnected,
    /// Error object carried on the wire by the remote peer.
    Rpc(RpcError),
    /// A local deadline elapsed before the operation resolved.
    Timeout(String),
    /// The operation was cancelled locally.
    Cancelled(String),
    /// Parameters failed schema or semantic validation.
    InvalidParams(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// File system path failed validation against the workspace root.
    PathViolation(String),
    /// The requested capability is not available.
    Unsupported(String),
}

impl AppError {
    /// Process exit code for this error category.
    ///
    /// Local timeouts, wire-carried RPC errors, and transport failures map to
    /// distinct codes so callers can triage without parsing messages.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Timeout(_) => 3,
            Self::Rpc(_) => 4,
            Self::Transport(_) | Self::NotConnected | Self::Codec(_) => 5,
            Self::Cancelled(_) => 6,
            Self::Io(_)
            | Self::InvalidParams(_)
            | Self::NotFound(_)
            | Self::PathViolation(_)
            | Self::Unsupported(_) => 1,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Codec(msg) => write!(f, "codec: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::NotConnected => write!(f, "transport: not connected"),
            Self::Rpc(err) => write!(f, "rpc: {} ({})", err.message, err.code),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
            Self::InvalidParams(msg) => write!(f, "invalid params: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::PathViolation(msg) => write!(f, "path violation: {msg}"),
            Self::Unsupported(msg) => write!(f, "unsupported: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(format!("malformed json: {err}"))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(format!("websocket: {err}"))
    }
}

impl From<RpcError> for AppError {
    fn from(err: RpcError) -> Self {
        Self::Rpc(err)
    }
}
