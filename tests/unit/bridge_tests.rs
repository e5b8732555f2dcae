//! Unit tests for the permission request bridge.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use acp_engine::permission::{OutboundSender, PermissionBridge};
use acp_engine::protocol::client::{
    PermissionOption, RequestPermissionOutcome, RequestPermissionRequest,
};
use acp_engine::protocol::methods;
use acp_engine::protocol::update::{ToolCallStatus, ToolCallUpdate};
use acp_engine::rpc::{Message, Response, ResponsePayload};
use acp_engine::AppError;
use serde_json::json;

fn ask() -> RequestPermissionRequest {
    RequestPermissionRequest {
        session_id: "sess_1".into(),
        tool_call: ToolCallUpdate::status("call_1", ToolCallStatus::Pending),
        options: PermissionOption::canned(),
    }
}

fn capturing() -> (OutboundSender, Arc<Mutex<Vec<Message>>>) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&sent);
    let sender: OutboundSender = Arc::new(move |message| {
        sink.lock().expect("lock").push(message);
        Ok(())
    });
    (sender, sent)
}

async fn next_request_id(sent: &Arc<Mutex<Vec<Message>>>) -> acp_engine::rpc::RequestId {
    loop {
        if let Some(id) = sent.lock().expect("lock").last().and_then(Message::id).cloned() {
            return id;
        }
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn response_settles_the_request() {
    let (sender, sent) = capturing();
    let bridge = Arc::new(PermissionBridge::new(sender, None));

    let waiter = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move { bridge.request(&ask()).await })
    };
    let id = next_request_id(&sent).await;
    assert_eq!(
        sent.lock().expect("lock")[0].method(),
        Some(methods::SESSION_REQUEST_PERMISSION)
    );
    assert!(bridge.is_pending(&id));

    assert!(bridge.resolve(Response {
        id: id.clone(),
        payload: ResponsePayload::Result(json!({
            "outcome": {"outcome": "selected", "optionId": "allow_once"}
        })),
    }));
    let response = waiter.await.expect("join").expect("response");
    assert_eq!(response.outcome, RequestPermissionOutcome::selected("allow_once"));
    assert!(response.outcome.is_allowed());
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test]
async fn unknown_response_is_ignored() {
    let (sender, _sent) = capturing();
    let bridge = PermissionBridge::new(sender, None);
    assert!(!bridge.resolve(Response {
        id: 99_i64.into(),
        payload: ResponsePayload::Result(json!({})),
    }));
}

#[tokio::test(start_paused = true)]
async fn unanswered_request_times_out() {
    let (sender, _sent) = capturing();
    let bridge = PermissionBridge::new(sender, Some(Duration::from_secs(5)));
    let err = bridge.request(&ask()).await.unwrap_err();
    assert!(matches!(err, AppError::Timeout(_)));
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test]
async fn send_failure_settles_immediately() {
    let sender: OutboundSender = Arc::new(|_| Err(AppError::NotConnected));
    let bridge = PermissionBridge::new(sender, None);
    let err = bridge.request(&ask()).await.unwrap_err();
    assert!(matches!(err, AppError::NotConnected));
}

#[tokio::test]
async fn fail_all_settles_every_waiter() {
    let (sender, sent) = capturing();
    let bridge = Arc::new(PermissionBridge::new(sender, None));
    let waiter = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move { bridge.request(&ask()).await })
    };
    next_request_id(&sent).await;

    bridge.fail_all(&AppError::Transport("peer disconnected".into()));
    let err = waiter.await.expect("join").unwrap_err();
    assert!(err.to_string().contains("peer disconnected"));
}

#[tokio::test]
async fn error_response_surfaces_as_rpc_error() {
    let (sender, sent) = capturing();
    let bridge = Arc::new(PermissionBridge::new(sender, None));
    let waiter = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move { bridge.request(&ask()).await })
    };
    let id = next_request_id(&sent).await;
    bridge.resolve(Response {
        id,
        payload: ResponsePayload::Error(acp_engine::rpc::RpcError::internal("ui crashed")),
    });
    let err = waiter.await.expect("join").unwrap_err();
    assert!(matches!(err, AppError::Rpc(_)));
}
