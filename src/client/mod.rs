//! Client side of the protocol.
//!
//! [`ClientService`] owns one transport. Outbound calls get integer ids and
//! wait on [`PendingCalls`]; a single reader task demultiplexes everything
//! the agent sends:
//!
//! - responses settle the matching waiter;
//! - notifications go to the registered notification handlers;
//! - requests run on their own task through the handler registered for
//!   their method, and `$/cancelRequest` aborts such a task.
//!
//! When the transport fails or closes, every outstanding call is settled
//! with that failure.

pub mod fs;
pub mod handlers;
pub mod path_safety;
pub mod terminal;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

pub use fs::{FileSystemRuntime, LocalFileSystem, UnsupportedFileSystem};
pub use handlers::{typed, AutoApprove, ClientFuture, PermissionHandler, RequestHandler};
pub use terminal::{ProcessTerminal, TerminalRuntime, UnsupportedTerminal};

use crate::protocol::schema::{
    CancelRequestParams, InitializeRequest, InitializeResponse, NewSessionRequest,
    NewSessionResponse, PromptRequest, PromptResponse, SessionIdParams,
};
use crate::protocol::{methods, SessionNotification};
use crate::rpc::{Message, Notification, PendingCalls, Request, RequestId, RpcError};
use crate::transport::Transport;
use crate::{AppError, Result};

/// Callback for agent notifications.
pub type NotificationHandler = Arc<dyn Fn(&Notification) + Send + Sync>;

struct Inner {
    transport: Arc<dyn Transport>,
    calls: PendingCalls,
    timeout: Option<Duration>,
    handlers: HashMap<String, Arc<dyn RequestHandler>>,
    listeners: Vec<NotificationHandler>,
    running: Mutex<HashMap<RequestId, AbortHandle>>,
    closed: AtomicBool,
}

/// Configures a [`ClientService`] before it connects.
pub struct ClientBuilder {
    transport: Arc<dyn Transport>,
    timeout: Option<Duration>,
    handlers: HashMap<String, Arc<dyn RequestHandler>>,
    listeners: Vec<NotificationHandler>,
}

/// Connected client.
pub struct ClientService {
    inner: Arc<Inner>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl ClientBuilder {
    /// Per-call deadline; `None` waits forever.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Answer `method` with `handler`, replacing any earlier registration.
    #[must_use]
    pub fn register(mut self, method: &str, handler: Arc<dyn RequestHandler>) -> Self {
        self.handlers.insert(method.to_owned(), handler);
        self
    }

    /// Answer `session/requestPermission` with `handler`.
    #[must_use]
    pub fn with_permission_handler(self, handler: Arc<dyn PermissionHandler>) -> Self {
        self.register(
            methods::SESSION_REQUEST_PERMISSION,
            Arc::new(typed(move |req| {
                let handler = Arc::clone(&handler);
                async move { handler.decide(req).await }
            })),
        )
    }

    /// Serve `fs/*` from `runtime`.
    #[must_use]
    pub fn with_file_system(self, runtime: Arc<dyn FileSystemRuntime>) -> Self {
        let read = Arc::clone(&runtime);
        self.register(
            methods::FS_READ_TEXT_FILE,
            Arc::new(typed(move |req| {
                let fs = Arc::clone(&read);
                async move { fs.read_text_file(req).await }
            })),
        )
        .register(
            methods::FS_WRITE_TEXT_FILE,
            Arc::new(typed(move |req| {
                let fs = Arc::clone(&runtime);
                async move { fs.write_text_file(req).await }
            })),
        )
    }

    /// Serve `terminal/*` from `runtime`.
    #[must_use]
    pub fn with_terminal(self, runtime: Arc<dyn TerminalRuntime>) -> Self {
        let create = Arc::clone(&runtime);
        let output = Arc::clone(&runtime);
        let wait = Arc::clone(&runtime);
        let kill = Arc::clone(&runtime);
        self.register(
            methods::TERMINAL_CREATE,
            Arc::new(typed(move |req| {
                let rt = Arc::clone(&create);
                async move { rt.create(req).await }
            })),
        )
        .register(
            methods::TERMINAL_OUTPUT,
            Arc::new(typed(move |req| {
                let rt = Arc::clone(&output);
                async move { rt.output(req).await }
            })),
        )
        .register(
            methods::TERMINAL_WAIT_FOR_EXIT,
            Arc::new(typed(move |req| {
                let rt = Arc::clone(&wait);
                async move { rt.wait_for_exit(req).await }
            })),
        )
        .register(
            methods::TERMINAL_KILL,
            Arc::new(typed(move |req| {
                let rt = Arc::clone(&kill);
                async move { rt.kill(req).await }
            })),
        )
        .register(
            methods::TERMINAL_RELEASE,
            Arc::new(typed(move |req| {
                let rt = Arc::clone(&runtime);
                async move { rt.release(req).await }
            })),
        )
    }

    /// Call `listener` for every notification from the agent.
    #[must_use]
    pub fn on_notification(mut self, listener: impl Fn(&Notification) + Send + Sync + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Call `listener` for every well-formed `session/update`.
    #[must_use]
    pub fn on_session_update(
        self,
        listener: impl Fn(SessionNotification) + Send + Sync + 'static,
    ) -> Self {
        self.on_notification(move |notification| {
            if notification.method != methods::SESSION_UPDATE {
                return;
            }
            let params = notification.params.clone().unwrap_or_default();
            match serde_json::from_value::<SessionNotification>(params) {
                Ok(update) => listener(update),
                Err(err) => debug!(%err, "malformed session update ignored"),
            }
        })
    }

    /// Connect the transport and start the reader task.
    ///
    /// # Errors
    ///
    /// Returns the transport's connect error.
    pub async fn connect(self) -> Result<ClientService> {
        self.transport.connect().await?;
        let inner = Arc::new(Inner {
            transport: self.transport,
            calls: PendingCalls::new("request"),
            timeout: self.timeout,
            handlers: self.handlers,
            listeners: self.listeners,
            running: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });
        let reader = tokio::spawn(Arc::clone(&inner).read_loop());
        info!("client connected");
        Ok(ClientService {
            inner,
            reader: Mutex::new(Some(reader)),
        })
    }
}

impl Inner {
    async fn read_loop(self: Arc<Self>) {
        let failure = loop {
            match self.transport.receive().await {
                Ok(Some(Message::Response(response))) => {
                    let id = response.id.clone();
                    if !self.calls.resolve(response) {
                        debug!(request_id = %id, "response for unknown request ignored");
                    }
                }
                Ok(Some(Message::Notification(notification))) => {
                    if notification.method == methods::CANCEL_REQUEST {
                        self.cancel_inbound(notification.params);
                    } else {
                        for listener in &self.listeners {
                            listener(&notification);
                        }
                    }
                }
                Ok(Some(Message::Request(request))) => self.spawn_handler(request),
                Ok(None) => break AppError::Transport("connection closed by agent".into()),
                Err(err) => break err,
            }
        };

        debug!(%failure, "client reader stopped");
        self.closed.store(true, Ordering::SeqCst);
        self.calls.fail_all(&failure);
        let running: Vec<AbortHandle> = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        for handle in running {
            handle.abort();
        }
    }

    fn spawn_handler(self: &Arc<Self>, request: Request) {
        let Request { id, method, params } = request;
        let handler = self.handlers.get(&method).cloned();
        let inner = Arc::clone(self);
        let task_id = id.clone();

        // Hold the lock across spawn so the task cannot deregister first.
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        let task = tokio::spawn(async move {
            let reply = match handler {
                Some(handler) => match handler.handle(params).await {
                    Ok(result) => Message::ok(task_id.clone(), result),
                    Err(err) => {
                        debug!(method = %method, %err, "request handler failed");
                        Message::error(task_id.clone(), RpcError::from(err))
                    }
                },
                None => Message::error(task_id.clone(), RpcError::method_not_found(&method)),
            };
            inner
                .running
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&task_id);
            inner.reply(reply).await;
        });
        running.insert(id, task.abort_handle());
    }

    fn cancel_inbound(self: &Arc<Self>, params: Option<Value>) {
        let params = match serde_json::from_value::<CancelRequestParams>(params.unwrap_or_default()) {
            Ok(params) => params,
            Err(err) => {
                debug!(%err, "malformed cancel ignored");
                return;
            }
        };
        let handle = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&params.request_id);
        let Some(handle) = handle else {
            debug!(request_id = %params.request_id, "cancel for unknown request ignored");
            return;
        };
        handle.abort();
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner
                .reply(Message::error(params.request_id, RpcError::request_cancelled()))
                .await;
        });
    }

    async fn reply(&self, message: Message) {
        if let Err(err) = self.transport.send(message).await {
            warn!(%err, "failed to send response");
        }
    }
}

impl ClientService {
    /// Start configuring a client for `transport`.
    #[must_use]
    pub fn builder(transport: Arc<dyn Transport>) -> ClientBuilder {
        ClientBuilder {
            transport,
            timeout: None,
            handlers: HashMap::new(),
            listeners: Vec::new(),
        }
    }

    /// Send `method` and wait for its result.
    ///
    /// A call that times out locally is also cancelled on the agent with
    /// `$/cancelRequest`.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotConnected`] once the reader has stopped.
    /// - The transport's send error.
    /// - [`AppError::Rpc`] when the agent answers with an error object.
    /// - [`AppError::Timeout`] when the deadline passes.
    /// - The transport failure that stopped the reader.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(AppError::NotConnected);
        }
        let call = self.inner.calls.register(self.inner.timeout);
        let id = call.id().clone();
        debug!(request_id = %id, method, "sending request");
        self.inner
            .transport
            .send(Message::request(id.clone(), method, params))
            .await?;

        let outcome = call.wait().await;
        if matches!(outcome, Err(AppError::Timeout(_))) {
            if let Err(err) = self.notify_cancel(&id).await {
                debug!(request_id = %id, %err, "cancel after timeout not sent");
            }
        }
        outcome
    }

    /// [`call`](Self::call) with typed params and result.
    ///
    /// # Errors
    ///
    /// As [`call`](Self::call), plus [`AppError::Codec`] when the result
    /// does not decode.
    pub async fn call_typed<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: &P,
    ) -> Result<R> {
        let value = self.call(method, Some(serde_json::to_value(params)?)).await?;
        serde_json::from_value(value)
            .map_err(|err| AppError::Codec(format!("invalid {method} result: {err}")))
    }

    /// Send a notification.
    ///
    /// # Errors
    ///
    /// Returns the transport's send error.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.inner
            .transport
            .send(Message::notification(method, params))
            .await
    }

    async fn notify_cancel(&self, id: &RequestId) -> Result<()> {
        self.notify(
            methods::CANCEL_REQUEST,
            Some(serde_json::to_value(CancelRequestParams {
                request_id: id.clone(),
            })?),
        )
        .await
    }

    /// Cancel an outstanding call: its waiter fails with
    /// [`AppError::Cancelled`] and the agent receives `$/cancelRequest`.
    ///
    /// # Errors
    ///
    /// Returns the transport's send error.
    pub async fn cancel_request(&self, id: &RequestId) -> Result<()> {
        self.inner
            .calls
            .fail(id, AppError::Cancelled(format!("request {id} cancelled")));
        self.notify_cancel(id).await
    }

    /// `initialize`.
    ///
    /// # Errors
    ///
    /// As [`call_typed`](Self::call_typed).
    pub async fn initialize(&self, request: &InitializeRequest) -> Result<InitializeResponse> {
        self.call_typed(methods::INITIALIZE, request).await
    }

    /// `session/new`.
    ///
    /// # Errors
    ///
    /// As [`call_typed`](Self::call_typed).
    pub async fn new_session(&self, request: &NewSessionRequest) -> Result<NewSessionResponse> {
        self.call_typed(methods::SESSION_NEW, request).await
    }

    /// `session/prompt`.
    ///
    /// # Errors
    ///
    /// As [`call_typed`](Self::call_typed).
    pub async fn prompt(&self, request: &PromptRequest) -> Result<PromptResponse> {
        self.call_typed(methods::SESSION_PROMPT, request).await
    }

    /// `session/cancel` for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns the transport's send error.
    pub async fn cancel(&self, session_id: &str) -> Result<()> {
        self.notify(
            methods::SESSION_CANCEL,
            Some(serde_json::to_value(SessionIdParams {
                session_id: session_id.to_owned(),
            })?),
        )
        .await
    }

    /// Number of calls awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.calls.len()
    }

    /// Whether the reader has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Stop the reader, fail outstanding calls, and close the transport.
    ///
    /// # Errors
    ///
    /// Returns the transport's close error.
    pub async fn close(&self) -> Result<()> {
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reader) = reader {
            reader.abort();
        }
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.calls.fail_all(&AppError::NotConnected);
        self.inner.transport.close().await
    }
}
