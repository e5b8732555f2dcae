//! Multiplexing WebSocket server transport.
//!
//! Accepts any number of client connections on one axum listener and presents
//! them to the agent as a single peer. Every inbound message passes through
//! the [`RoutingTable`] before it reaches [`Transport::receive`], and every
//! outbound message is routed back to the connection that owns it.
//!
//! Routes:
//! - `GET /` upgrades to a WebSocket carrying JSON-RPC text frames.
//! - `GET /health` returns `ok`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::routing::{ConnectionId, Route, RoutingTable};
use super::{ConnectionState, StateCell, Transport, TransportFuture};
use crate::rpc::{codec, Message};
use crate::sync::BackpressureGate;
use crate::{AppError, Result};

/// How long a closing connection may take to flush queued frames.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

/// Server transport settings.
#[derive(Debug, Clone)]
pub struct WsServerConfig {
    /// Listen address, e.g. `127.0.0.1:7878`; port 0 picks a free port.
    pub bind: String,
    /// Bound on concurrent outbound sends.
    pub max_in_flight: usize,
}

impl WsServerConfig {
    /// Settings for `bind` with the default send bound.
    pub fn new(bind: impl Into<String>) -> Self {
        Self {
            bind: bind.into(),
            max_in_flight: super::stdio::DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

struct Hub {
    config: WsServerConfig,
    gate: BackpressureGate,
    state: StateCell,
    table: StdMutex<RoutingTable>,
    peers: StdMutex<HashMap<ConnectionId, mpsc::UnboundedSender<String>>>,
    inbound_tx: mpsc::UnboundedSender<Message>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<Message>>,
    local_addr: StdMutex<Option<SocketAddr>>,
    server: StdMutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

/// WebSocket server presenting many connections as one peer.
pub struct WsServerTransport {
    hub: Arc<Hub>,
}

impl WsServerTransport {
    /// Create a transport; the listener is bound on [`Transport::connect`].
    #[must_use]
    pub fn new(config: WsServerConfig) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            hub: Arc::new(Hub {
                gate: BackpressureGate::new(config.max_in_flight),
                config,
                state: StateCell::default(),
                table: StdMutex::new(RoutingTable::new()),
                peers: StdMutex::new(HashMap::new()),
                inbound_tx,
                inbound_rx: Mutex::new(inbound_rx),
                local_addr: StdMutex::new(None),
                server: StdMutex::new(None),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Address actually bound, once connected.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self
            .hub
            .local_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live client connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.hub.table().connection_count()
    }
}

async fn upgrade(ws: WebSocketUpgrade, State(hub): State<Arc<Hub>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| hub.serve_connection(socket))
}

async fn health() -> &'static str {
    "ok"
}

impl Hub {
    fn table(&self) -> std::sync::MutexGuard<'_, RoutingTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn listen(self: &Arc<Self>) -> Result<()> {
        match self.state.get() {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Failed | ConnectionState::Closed => {
                return Err(AppError::NotConnected)
            }
            ConnectionState::Idle => {}
        }

        let bind = self.config.bind.as_str();
        let listener = tokio::net::TcpListener::bind(bind)
            .await
            .map_err(|err| AppError::Transport(format!("failed to bind {bind}: {err}")))?;
        let addr = listener.local_addr()?;
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner) = Some(addr);

        let router = Router::new()
            .route("/", get(upgrade))
            .route("/health", get(health))
            .with_state(Arc::clone(self));

        info!(%addr, "starting websocket transport");
        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                warn!(%err, "websocket server error");
            }
            info!("websocket transport shut down");
        });
        *self.server.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);

        self.state.open()
    }

    async fn serve_connection(self: Arc<Self>, socket: WebSocket) {
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let connection = self.table().open();
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(connection, outbound_tx);

        let span = info_span!("ws_connection", connection_id = %connection);
        async move {
            info!("client connected");
            let (mut sink, mut stream) = socket.split();

            let writer = tokio::spawn(async move {
                while let Some(text) = outbound_rx.recv().await {
                    if sink.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                let _ = sink.send(WsMessage::Close(None)).await;
            });

            loop {
                let frame = tokio::select! {
                    biased;
                    () = self.shutdown.cancelled() => break,
                    frame = stream.next() => frame,
                };
                let text = match frame {
                    Some(Ok(WsMessage::Text(text))) => text.as_str().to_owned(),
                    Some(Ok(WsMessage::Binary(data))) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => text,
                        Err(err) => {
                            warn!(%err, "binary frame is not utf-8; dropping connection");
                            break;
                        }
                    },
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        debug!(%err, "websocket read failed");
                        break;
                    }
                };

                let message = match codec::decode(&text) {
                    Ok(message) => message,
                    Err(err) => {
                        warn!(%err, "undecodable frame; dropping connection");
                        if let Ok(reply) = codec::rejection(&text, &err) {
                            self.deliver(connection, reply);
                        }
                        break;
                    }
                };
                let routed = self.table().inbound(connection, message);
                if let Some(message) = routed {
                    if self.inbound_tx.send(message).is_err() {
                        break;
                    }
                }
            }

            self.peers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&connection);
            let synthetic = self.table().close(connection);
            for message in synthetic {
                let _ = self.inbound_tx.send(message);
            }
            // The peer's sender is gone, so the writer ends once its queue is flushed.
            let stuck = writer.abort_handle();
            if tokio::time::timeout(WRITER_DRAIN, writer).await.is_err() {
                stuck.abort();
            }
            info!("client disconnected");
        }
        .instrument(span)
        .await;
    }

    fn deliver(&self, connection: ConnectionId, text: String) -> bool {
        let peers = self.peers.lock().unwrap_or_else(PoisonError::into_inner);
        peers
            .get(&connection)
            .is_some_and(|peer| peer.send(text).is_ok())
    }

    async fn send(&self, message: Message) -> Result<()> {
        self.state.ensure_connected()?;
        let _permit = self.gate.acquire().await?;

        let route = self.table().outbound(message)?;
        match route {
            Route::To(connection, message) => {
                let is_request = matches!(message, Message::Request(_));
                let text = codec::encode(&message)?;
                if !self.deliver(connection, text) {
                    if is_request {
                        return Err(AppError::Transport(format!("{connection} is gone")));
                    }
                    debug!(%connection, "dropping message for closed connection");
                }
            }
            Route::Broadcast(message) => {
                let text = codec::encode(&message)?;
                let peers = self.peers.lock().unwrap_or_else(PoisonError::into_inner);
                for peer in peers.values() {
                    let _ = peer.send(text.clone());
                }
            }
            Route::Drop => {}
        }
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Message>> {
        self.state.ensure_connected()?;
        let mut inbound = self.inbound_rx.lock().await;
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Ok(None),
            next = inbound.recv() => Ok(next),
        }
    }

    async fn close(&self) -> Result<()> {
        self.shutdown.cancel();
        self.state.set(ConnectionState::Closed);
        self.gate.close();
        let task = self
            .server
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!(%err, "websocket server task failed");
            }
        }
        Ok(())
    }
}

impl Transport for WsServerTransport {
    fn connect(&self) -> TransportFuture<'_, ()> {
        Box::pin(self.hub.listen())
    }

    fn send(&self, message: Message) -> TransportFuture<'_, ()> {
        Box::pin(self.hub.send(message))
    }

    fn receive(&self) -> TransportFuture<'_, Option<Message>> {
        Box::pin(self.hub.receive())
    }

    fn close(&self) -> TransportFuture<'_, ()> {
        Box::pin(self.hub.close())
    }
}

impl Drop for WsServerTransport {
    fn drop(&mut self) {
        self.hub.shutdown.cancel();
    }
}
