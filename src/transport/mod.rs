//! Message transports.
//!
//! Every transport speaks [`Message`] and is otherwise interchangeable:
//!
//! - `stdio`: newline-delimited JSON over any `AsyncRead` / `AsyncWrite`
//!   pair (the process's own stdin/stdout, or an in-memory duplex).
//! - `process`: spawns an agent binary and talks to it over its pipes.
//! - `ws_client`: a WebSocket client with reconnect and ping heartbeat.
//! - `ws_server`: a WebSocket server multiplexing many connections behind
//!   one logical peer; `routing` holds its pure routing table.
//!
//! `receive` yields `Ok(None)` on a clean end of stream. Any I/O or decode
//! failure moves the transport into [`ConnectionState::Failed`], after which
//! `send` and `receive` return [`AppError::NotConnected`].

pub mod process;
pub mod routing;
pub mod stdio;
pub mod ws_client;
pub mod ws_server;

use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use crate::rpc::Message;
use crate::{AppError, Result};

pub use process::{ProcessConfig, ProcessTransport};
pub use stdio::StdioTransport;
pub use ws_client::{WsClientConfig, WsClientTransport};
pub use ws_server::{WsServerConfig, WsServerTransport};

/// Boxed future returned by [`Transport`] methods.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Bidirectional message channel between two protocol peers.
///
/// Methods take `&self` so one task can block in [`receive`](Self::receive)
/// while others [`send`](Self::send) concurrently.
pub trait Transport: Send + Sync {
    /// Establish the underlying connection. Idempotent once connected.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] or [`AppError::Io`] if the connection
    /// cannot be established, and [`AppError::NotConnected`] if the
    /// transport has already failed or been closed.
    fn connect(&self) -> TransportFuture<'_, ()>;

    /// Write one message.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotConnected`] when not connected, and
    /// [`AppError::Transport`] when the write fails.
    fn send(&self, message: Message) -> TransportFuture<'_, ()>;

    /// Read the next message; `Ok(None)` on a clean end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotConnected`] when not connected, and
    /// [`AppError::Codec`] / [`AppError::Transport`] on a read failure.
    fn receive(&self) -> TransportFuture<'_, Option<Message>>;

    /// Shut the transport down. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing or process teardown fails.
    fn close(&self) -> TransportFuture<'_, ()>;
}

/// Lifecycle of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// `connect` has not been called yet.
    #[default]
    Idle,
    /// Ready for traffic.
    Connected,
    /// A read or write failed; the transport refuses further traffic.
    Failed,
    /// Closed locally or by the peer.
    Closed,
}

/// Shared connection state with the failure discipline common to all
/// transports.
#[derive(Debug, Default)]
pub(crate) struct StateCell(Mutex<ConnectionState>);

impl StateCell {
    pub(crate) fn get(&self) -> ConnectionState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// `Ok` only while connected.
    pub(crate) fn ensure_connected(&self) -> Result<()> {
        match self.get() {
            ConnectionState::Connected => Ok(()),
            _ => Err(AppError::NotConnected),
        }
    }

    /// Record `err` as fatal and hand it back.
    pub(crate) fn fail(&self, err: AppError) -> AppError {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != ConnectionState::Closed {
            *state = ConnectionState::Failed;
        }
        err
    }

    /// Move to `Connected` unless the transport already failed or closed.
    pub(crate) fn open(&self) -> Result<()> {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            ConnectionState::Idle | ConnectionState::Connected => {
                *state = ConnectionState::Connected;
                Ok(())
            }
            ConnectionState::Failed | ConnectionState::Closed => Err(AppError::NotConnected),
        }
    }
}
