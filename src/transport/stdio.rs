//! Newline-delimited JSON transport over an async byte stream pair.
//!
//! Used directly for the agent's own stdin/stdout, wrapped by
//! [`ProcessTransport`](super::ProcessTransport) for child pipes, and over
//! [`tokio::io::duplex`] halves in tests.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

use super::{ConnectionState, StateCell, Transport, TransportFuture};
use crate::rpc::{LineCodec, Message};
use crate::sync::BackpressureGate;
use crate::{AppError, Result};

/// Default bound on concurrent writers.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// Line-framed transport over a reader / writer pair.
pub struct StdioTransport<R, W> {
    reader: Mutex<FramedRead<R, LineCodec>>,
    writer: Mutex<FramedWrite<W, LineCodec>>,
    gate: BackpressureGate,
    state: StateCell,
}

impl StdioTransport<tokio::io::Stdin, tokio::io::Stdout> {
    /// Transport over this process's stdin and stdout.
    #[must_use]
    pub fn stdio(max_in_flight: usize) -> Self {
        Self::with_gate(
            tokio::io::stdin(),
            tokio::io::stdout(),
            BackpressureGate::new(max_in_flight),
        )
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Transport over `reader` / `writer` with the default send bound.
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_gate(reader, writer, BackpressureGate::new(DEFAULT_MAX_IN_FLIGHT))
    }

    /// Transport over `reader` / `writer` sharing `gate`.
    pub fn with_gate(reader: R, writer: W, gate: BackpressureGate) -> Self {
        Self {
            reader: Mutex::new(FramedRead::new(reader, LineCodec::new())),
            writer: Mutex::new(FramedWrite::new(writer, LineCodec::new())),
            gate,
            state: StateCell::default(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn send_inner(&self, message: Message) -> Result<()> {
        self.state.ensure_connected()?;
        let _permit = self.gate.acquire().await?;
        let mut writer = self.writer.lock().await;
        if let Err(err) = writer.send(message).await {
            warn!(error = %err, "stdio transport: write failed");
            return Err(self.state.fail(AppError::Transport(format!("write failed: {err}"))));
        }
        Ok(())
    }

    async fn receive_inner(&self) -> Result<Option<Message>> {
        self.state.ensure_connected()?;
        let mut reader = self.reader.lock().await;
        match reader.next().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(err)) => {
                warn!(error = %err, "stdio transport: read failed");
                Err(self.state.fail(err))
            }
            None => {
                debug!("stdio transport: end of stream");
                self.state.set(ConnectionState::Closed);
                Ok(None)
            }
        }
    }

    async fn close_inner(&self) -> Result<()> {
        if self.state.get() == ConnectionState::Closed {
            return Ok(());
        }
        self.state.set(ConnectionState::Closed);
        self.gate.close();
        let mut writer = self.writer.lock().await;
        writer.get_mut().shutdown().await?;
        Ok(())
    }
}

impl<R, W> Transport for StdioTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn connect(&self) -> TransportFuture<'_, ()> {
        Box::pin(async move { self.state.open() })
    }

    fn send(&self, message: Message) -> TransportFuture<'_, ()> {
        Box::pin(self.send_inner(message))
    }

    fn receive(&self) -> TransportFuture<'_, Option<Message>> {
        Box::pin(self.receive_inner())
    }

    fn close(&self) -> TransportFuture<'_, ()> {
        Box::pin(self.close_inner())
    }
}
