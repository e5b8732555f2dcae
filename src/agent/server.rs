//! Agent-side connection loop.
//!
//! Binds an [`AgentService`] to a [`Transport`]: one reader loop dispatches
//! inbound messages, each request runs on its own task, and a single writer
//! task owns every outbound send.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::runtime::ExecutorFactory;
use super::service::AgentService;
use crate::config::AgentConfig;
use crate::permission::{OutboundSender, PermissionBridge};
use crate::rpc::Message;
use crate::transport::Transport;
use crate::{AppError, Result};

/// Agent service bound to one transport.
pub struct AgentServer {
    transport: Arc<dyn Transport>,
    service: Arc<AgentService>,
    bridge: Option<Arc<PermissionBridge>>,
    outbound_tx: mpsc::UnboundedSender<Message>,
    outbound_rx: mpsc::UnboundedReceiver<Message>,
}

impl AgentServer {
    /// Server for `transport` using `executors` for new sessions.
    ///
    /// A permission bridge is attached when `config.require_permission` is set.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        config: AgentConfig,
        executors: Arc<dyn ExecutorFactory>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let sender: OutboundSender = {
            let tx = outbound_tx.clone();
            Arc::new(move |message| {
                tx.send(message)
                    .map_err(|_| AppError::Transport("outbound channel closed".into()))
            })
        };

        let bridge = config
            .require_permission
            .then(|| Arc::new(PermissionBridge::new(Arc::clone(&sender), config.permission_timeout())));

        let mut service = AgentService::new(config, sender).with_executor_factory(executors);
        if let Some(ref bridge) = bridge {
            service = service.with_permission_bridge(Arc::clone(bridge));
        }

        Self {
            transport,
            service: Arc::new(service),
            bridge,
            outbound_tx,
            outbound_rx,
        }
    }

    /// The wrapped service.
    #[must_use]
    pub fn service(&self) -> &Arc<AgentService> {
        &self.service
    }

    /// Serve until the peer disconnects.
    ///
    /// On exit every outstanding permission request is failed, running
    /// prompts are cancelled, in-flight requests are answered if the
    /// transport still accepts writes, and the transport is closed.
    ///
    /// # Errors
    ///
    /// Returns the connect failure, or the receive error that ended the
    /// session.
    pub async fn run(self) -> Result<()> {
        let Self {
            transport,
            service,
            bridge,
            outbound_tx,
            outbound_rx,
        } = self;

        transport.connect().await?;
        info!("agent server connected");

        let done = CancellationToken::new();
        let writer = tokio::spawn(write_loop(
            Arc::clone(&transport),
            outbound_rx,
            bridge.clone(),
            done.clone(),
        ));

        let mut tasks = JoinSet::new();
        let outcome = loop {
            tokio::select! {
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(err) = joined {
                        warn!(%err, "request task failed");
                    }
                }
                received = transport.receive() => match received {
                    Ok(Some(Message::Request(request))) => {
                        let service = Arc::clone(&service);
                        let tx = outbound_tx.clone();
                        tasks.spawn(async move {
                            let reply = service.handle_request(request).await;
                            let _ = tx.send(reply);
                        });
                    }
                    Ok(Some(Message::Notification(notification))) => {
                        service.handle_notification(notification).await;
                    }
                    Ok(Some(Message::Response(response))) => match bridge {
                        Some(ref bridge) => {
                            bridge.resolve(response);
                        }
                        None => debug!(request_id = %response.id, "unexpected response ignored"),
                    },
                    Ok(None) => {
                        info!("peer disconnected");
                        break Ok(());
                    }
                    Err(err) => {
                        warn!(%err, "receive failed");
                        break Err(err);
                    }
                },
            }
        };

        // ── Teardown ─────────────────────────────────────────
        let closed = match outcome {
            Ok(()) => AppError::Transport("peer disconnected".into()),
            Err(ref err) => err.clone(),
        };
        if let Some(ref bridge) = bridge {
            bridge.fail_all(&closed);
        }
        service.cancel_all();
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!(%err, "request task failed");
            }
        }
        done.cancel();
        if let Err(err) = writer.await {
            warn!(%err, "writer task failed");
        }
        if let Err(err) = transport.close().await {
            debug!(%err, "transport close failed");
        }
        outcome
    }
}

async fn write_loop(
    transport: Arc<dyn Transport>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    bridge: Option<Arc<PermissionBridge>>,
    done: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            next = outbound.recv() => match next {
                Some(message) => message,
                None => return,
            },
            () = done.cancelled() => return,
        };

        let request_id = match message {
            Message::Request(ref request) => Some(request.id.clone()),
            _ => None,
        };
        match transport.send(message).await {
            Ok(()) => {}
            Err(AppError::NotConnected) => {
                debug!("transport gone; writer stopping");
                if let (Some(bridge), Some(id)) = (&bridge, request_id) {
                    bridge.fail(&id, AppError::NotConnected);
                }
                return;
            }
            Err(err) => {
                warn!(%err, "send failed");
                if let (Some(bridge), Some(id)) = (&bridge, request_id) {
                    bridge.fail(&id, err);
                }
            }
        }
    }
}
