//! WebSocket client transport with reconnect and heartbeat.
//!
//! Each live socket is a *link*: the write half plus a pump task that decodes
//! frames from the read half into a shared inbound channel. When a link
//! breaks (read error, failed write, or failed ping) the transport redials
//! under its [`RetryPolicy`]; a write that triggered the redial is sent again
//! on the new link. Requests already written on a broken link cannot be
//! answered any more; each one gets a synthetic internal-error response so
//! its waiter completes. Once retries are exhausted the transport fails and
//! every later call returns [`AppError::NotConnected`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ConnectionState, StateCell, Transport, TransportFuture};
use crate::rpc::{codec, Message, RequestId, RpcError};
use crate::sync::{BackpressureGate, RetryPolicy};
use crate::{AppError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type Inbound = Result<Option<Message>>;

/// Client transport settings.
#[derive(Debug, Clone)]
pub struct WsClientConfig {
    /// `ws://` or `wss://` endpoint.
    pub url: String,
    /// Backoff for redials and failed pings.
    pub retry: RetryPolicy,
    /// Ping interval; `None` disables the heartbeat.
    pub heartbeat: Option<Duration>,
    /// Bound on concurrent writers.
    pub max_in_flight: usize,
}

impl WsClientConfig {
    /// Settings for `url` with default retry and no heartbeat.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            retry: RetryPolicy::default(),
            heartbeat: None,
            max_in_flight: super::stdio::DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

struct Link {
    generation: u64,
    sink: WsSink,
    pump: JoinHandle<()>,
}

struct Inner {
    config: WsClientConfig,
    gate: BackpressureGate,
    state: StateCell,
    link: Mutex<Option<Link>>,
    generation: AtomicU64,
    /// Requests written and not yet answered, keyed to the link they went out on.
    unanswered: std::sync::Mutex<HashMap<RequestId, u64>>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<Inbound>>,
    heartbeat: std::sync::Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

/// WebSocket client speaking JSON-RPC text frames.
pub struct WsClientTransport {
    inner: Arc<Inner>,
}

impl WsClientTransport {
    /// Create a transport; the socket is opened on [`Transport::connect`].
    #[must_use]
    pub fn new(config: WsClientConfig) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                gate: BackpressureGate::new(config.max_in_flight),
                config,
                state: StateCell::default(),
                link: Mutex::new(None),
                generation: AtomicU64::new(0),
                unanswered: std::sync::Mutex::new(HashMap::new()),
                inbound_tx,
                inbound_rx: Mutex::new(inbound_rx),
                heartbeat: std::sync::Mutex::new(None),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }
}

impl Inner {
    fn unanswered_ids(&self) -> std::sync::MutexGuard<'_, HashMap<RequestId, u64>> {
        self.unanswered.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remember that `message` is about to go out on link `generation`.
    fn track(&self, message: &Message, generation: u64) {
        if let Message::Request(request) = message {
            self.unanswered_ids().insert(request.id.clone(), generation);
        }
    }

    fn untrack(&self, message: &Message) {
        if let Message::Request(request) = message {
            self.unanswered_ids().remove(&request.id);
        }
    }

    /// Answer every request still waiting on link `generation` with an error.
    fn reset_link(&self, generation: u64) {
        let lost: Vec<RequestId> = {
            let mut unanswered = self.unanswered_ids();
            let lost = unanswered
                .iter()
                .filter(|(_, sent_on)| **sent_on == generation)
                .map(|(id, _)| id.clone())
                .collect();
            unanswered.retain(|_, sent_on| *sent_on != generation);
            lost
        };
        for id in lost {
            debug!(generation, %id, "request lost with its link");
            let reply = Message::error(
                id,
                RpcError::internal("connection reset before a response arrived"),
            );
            let _ = self.inbound_tx.send(Ok(Some(reply)));
        }
    }

    async fn dial(self: &Arc<Self>) -> Result<Link> {
        let (socket, _response) = connect_async(self.config.url.as_str()).await?;
        let (sink, stream) = socket.split();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let pump = tokio::spawn(Arc::clone(self).pump(generation, stream));
        debug!(url = %self.config.url, generation, "websocket link established");
        Ok(Link {
            generation,
            sink,
            pump,
        })
    }

    async fn connect(self: &Arc<Self>) -> Result<()> {
        let mut link = self.link.lock().await;
        if link.is_some() {
            return self.state.ensure_connected();
        }
        if matches!(
            self.state.get(),
            ConnectionState::Failed | ConnectionState::Closed
        ) {
            return Err(AppError::NotConnected);
        }

        *link = Some(self.dial().await?);
        self.state.open()?;
        info!(url = %self.config.url, "websocket client connected");

        if let Some(period) = self.config.heartbeat {
            let task = tokio::spawn(Arc::clone(self).heartbeat(period));
            *self.heartbeat.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        }
        Ok(())
    }

    /// Decode frames from one link into the inbound channel.
    async fn pump(self: Arc<Self>, generation: u64, mut stream: SplitStream<WsStream>) {
        loop {
            let frame = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return,
                frame = stream.next() => frame,
            };

            let text = match frame {
                Some(Ok(WsMessage::Text(text))) => text.as_str().to_owned(),
                Some(Ok(WsMessage::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => text,
                    Err(err) => {
                        let _ = self
                            .inbound_tx
                            .send(Err(AppError::Codec(format!("binary frame is not utf-8: {err}"))));
                        return;
                    }
                },
                Some(Ok(WsMessage::Close(_))) => {
                    debug!(generation, "websocket closed by peer");
                    let _ = self.inbound_tx.send(Ok(None));
                    return;
                }
                Some(Ok(_)) => continue,
                Some(Err(err)) => {
                    warn!(generation, %err, "websocket read failed");
                    tokio::spawn(Arc::clone(&self).recover(generation));
                    return;
                }
                None => {
                    warn!(generation, "websocket stream ended without close frame");
                    tokio::spawn(Arc::clone(&self).recover(generation));
                    return;
                }
            };

            let decoded = codec::decode(&text);
            if let Ok(Message::Response(response)) = &decoded {
                self.unanswered_ids().remove(&response.id);
            }
            let fatal = decoded.is_err();
            let _ = self.inbound_tx.send(decoded.map(Some));
            if fatal {
                return;
            }
        }
    }

    /// Redial after link `generation` broke.
    ///
    /// A no-op when another caller already replaced that link.
    fn recover(self: Arc<Self>, generation: u64) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        Box::pin(async move {
            let mut link = self.link.lock().await;
            if self.shutdown.is_cancelled() {
                return Err(AppError::NotConnected);
            }
            match link.as_ref() {
                Some(current) if current.generation != generation => return Ok(()),
                None => return Err(AppError::NotConnected),
                Some(_) => {}
            }
            if let Some(old) = link.take() {
                old.pump.abort();
            }
            self.reset_link(generation);

            let mut attempt = 0;
            while let Some(delay) = self.config.retry.delay_for(attempt + 1) {
                attempt += 1;
                tokio::select! {
                    biased;
                    () = self.shutdown.cancelled() => return Err(AppError::NotConnected),
                    () = tokio::time::sleep(delay) => {}
                }
                match self.dial().await {
                    Ok(fresh) => {
                        info!(url = %self.config.url, attempt, "websocket reconnected");
                        *link = Some(fresh);
                        return Ok(());
                    }
                    Err(err) => {
                        warn!(url = %self.config.url, attempt, %err, "websocket reconnect failed");
                    }
                }
            }

            let err = AppError::Transport(format!(
                "connection lost; gave up after {attempt} reconnect attempts"
            ));
            let _ = self.inbound_tx.send(Err(err.clone()));
            Err(self.state.fail(err))
        })
    }

    async fn send(self: &Arc<Self>, message: Message) -> Result<()> {
        self.state.ensure_connected()?;
        let _permit = self.gate.acquire().await?;
        let text = codec::encode(&message)?;

        let generation = {
            let mut link = self.link.lock().await;
            let link = link.as_mut().ok_or(AppError::NotConnected)?;
            self.track(&message, link.generation);
            match link.sink.send(WsMessage::text(text.clone())).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(generation = link.generation, %err, "websocket write failed");
                    self.untrack(&message);
                    link.generation
                }
            }
        };

        Arc::clone(self).recover(generation).await?;

        let mut link = self.link.lock().await;
        let link = link.as_mut().ok_or(AppError::NotConnected)?;
        self.track(&message, link.generation);
        if let Err(err) = link.sink.send(WsMessage::text(text)).await {
            self.untrack(&message);
            return Err(self
                .state
                .fail(AppError::Transport(format!("resend failed: {err}"))));
        }
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Message>> {
        self.state.ensure_connected()?;
        let mut inbound = self.inbound_rx.lock().await;
        let next = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => return Ok(None),
            next = inbound.recv() => next,
        };
        match next {
            Some(Ok(Some(message))) => Ok(Some(message)),
            Some(Ok(None)) | None => {
                self.state.set(ConnectionState::Closed);
                Ok(None)
            }
            Some(Err(err)) => Err(self.state.fail(err)),
        }
    }

    async fn heartbeat(self: Arc<Self>, period: Duration) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let failed = {
                let mut link = self.link.lock().await;
                let Some(link) = link.as_mut() else { return };
                match link.sink.send(WsMessage::Ping(Bytes::new())).await {
                    Ok(()) => None,
                    Err(err) => {
                        warn!(generation = link.generation, %err, "websocket ping failed");
                        Some(link.generation)
                    }
                }
            };

            if let Some(generation) = failed {
                if Arc::clone(&self).recover(generation).await.is_err() {
                    return;
                }
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.shutdown.cancel();
        self.state.set(ConnectionState::Closed);
        self.gate.close();
        if let Some(task) = self
            .heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        if let Some(mut link) = self.link.lock().await.take() {
            link.pump.abort();
            if let Err(err) = link.sink.send(WsMessage::Close(None)).await {
                debug!(%err, "websocket close frame not delivered");
            }
            let _ = link.sink.close().await;
        }
        Ok(())
    }
}

impl Transport for WsClientTransport {
    fn connect(&self) -> TransportFuture<'_, ()> {
        Box::pin(self.inner.connect())
    }

    fn send(&self, message: Message) -> TransportFuture<'_, ()> {
        Box::pin(self.inner.send(message))
    }

    fn receive(&self) -> TransportFuture<'_, Option<Message>> {
        Box::pin(self.inner.receive())
    }

    fn close(&self) -> TransportFuture<'_, ()> {
        Box::pin(self.inner.close())
    }
}

impl Drop for WsClientTransport {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}
