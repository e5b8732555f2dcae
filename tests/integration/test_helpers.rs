//! Shared helpers for integration tests.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use acp_engine::agent::{AgentService, Executor, ExecutorFactory, ExecutorFuture};
use acp_engine::config::AgentConfig;
use acp_engine::permission::OutboundSender;
use acp_engine::protocol::{methods, SessionNotification};
use acp_engine::rpc::{Message, Request, RequestId, ResponsePayload, RpcError};
use serde_json::{json, Value};

/// Outbound messages captured from a service under test.
#[derive(Clone, Default)]
pub struct Outbox(Arc<Mutex<Vec<Message>>>);

impl Outbox {
    /// Sender that appends to this outbox.
    pub fn sender(&self) -> OutboundSender {
        let sink = Arc::clone(&self.0);
        Arc::new(move |message| {
            sink.lock().expect("outbox lock").push(message);
            Ok(())
        })
    }

    /// Every `session/update` captured so far, in order.
    pub fn updates(&self) -> Vec<SessionNotification> {
        self.0
            .lock()
            .expect("outbox lock")
            .iter()
            .filter(|m| m.method() == Some(methods::SESSION_UPDATE))
            .map(|m| {
                serde_json::from_value(m.params().cloned().expect("update params"))
                    .expect("well-formed update")
            })
            .collect()
    }

    /// Update discriminators captured so far.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.updates().iter().map(|n| n.update.kind()).collect()
    }

    /// Forget everything captured.
    pub fn clear(&self) {
        self.0.lock().expect("outbox lock").clear();
    }
}

/// Service with echo executors recording updates into a fresh outbox.
pub fn service(config: AgentConfig) -> (Arc<AgentService>, Outbox) {
    let outbox = Outbox::default();
    let service = AgentService::new(config, outbox.sender());
    (Arc::new(service), outbox)
}

/// Default config without prompt or session expiry.
pub fn config() -> AgentConfig {
    AgentConfig {
        session_ttl_seconds: 0,
        prompt_timeout_seconds: 0,
        ..AgentConfig::default()
    }
}

/// Send one request and return the raw response message.
pub async fn call(service: &AgentService, id: i64, method: &str, params: Value) -> Message {
    service
        .handle_request(Request {
            id: RequestId::Number(id),
            method: method.to_owned(),
            params: Some(params),
        })
        .await
}

/// Result of a successful response.
pub fn result(message: Message) -> Value {
    let Message::Response(response) = message else {
        panic!("expected a response");
    };
    match response.payload {
        ResponsePayload::Result(value) => value,
        ResponsePayload::Error(err) => panic!("expected success, got {err:?}"),
    }
}

/// Error object of a failed response.
pub fn error(message: Message) -> RpcError {
    let Message::Response(response) = message else {
        panic!("expected a response");
    };
    match response.payload {
        ResponsePayload::Error(err) => err,
        ResponsePayload::Result(value) => panic!("expected an error, got {value}"),
    }
}

/// Create a session in `cwd` and return its id.
pub async fn new_session(service: &AgentService, cwd: &str) -> String {
    let value = result(call(service, 1, methods::SESSION_NEW, json!({"cwd": cwd})).await);
    value["sessionId"].as_str().expect("session id").to_owned()
}

/// Params for a single-text prompt.
pub fn prompt(session_id: &str, text: &str) -> Value {
    json!({"sessionId": session_id, "prompt": [{"type": "text", "text": text}]})
}

/// Yield until `condition` holds, failing after a generous number of polls.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

/// Executor whose prompts never finish on their own.
pub struct Stalled;

impl Executor for Stalled {
    fn prompt(&self, _text: String) -> ExecutorFuture<'_> {
        Box::pin(std::future::pending())
    }
}

impl ExecutorFactory for Stalled {
    fn create(&self, _session_id: &str, _cwd: &str) -> Arc<dyn Executor> {
        Arc::new(Self)
    }
}

/// Run `future` with a wall-clock limit so a hang fails the test.
pub async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(10), future)
        .await
        .expect("test step timed out")
}
