//! Integration tests for the client service against a scripted agent.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use acp_engine::client::{typed, ClientService};
use acp_engine::protocol::{methods, SessionNotification, SessionUpdate};
use acp_engine::rpc::error::{INVALID_PARAMS, METHOD_NOT_FOUND, REQUEST_CANCELLED};
use acp_engine::rpc::{Message, Notification, Request, RequestId, ResponsePayload, RpcError};
use acp_engine::transport::{StdioTransport, Transport};
use acp_engine::AppError;
use serde_json::{json, Value};
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

use super::test_helpers::{wait_until, within};

type Side = StdioTransport<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

/// Connected (client, agent) transports over an in-memory pipe.
async fn pipe() -> (Arc<Side>, Arc<Side>) {
    let (client_io, agent_io) = tokio::io::duplex(64 * 1024);
    let (cr, cw) = tokio::io::split(client_io);
    let (ar, aw) = tokio::io::split(agent_io);
    let agent = Arc::new(StdioTransport::new(ar, aw));
    agent.connect().await.expect("agent side connects");
    (Arc::new(StdioTransport::new(cr, cw)), agent)
}

async fn next(agent: &Side) -> Message {
    within(agent.receive())
        .await
        .expect("agent receive")
        .expect("stream open")
}

async fn next_request(agent: &Side) -> Request {
    match next(agent).await {
        Message::Request(request) => request,
        other => panic!("expected a request, got {other:?}"),
    }
}

async fn next_notification(agent: &Side) -> Notification {
    match next(agent).await {
        Message::Notification(notification) => notification,
        other => panic!("expected a notification, got {other:?}"),
    }
}

async fn next_error(agent: &Side) -> (RequestId, RpcError) {
    match next(agent).await {
        Message::Response(response) => match response.payload {
            ResponsePayload::Error(err) => (response.id, err),
            ResponsePayload::Result(value) => panic!("expected an error, got {value}"),
        },
        other => panic!("expected a response, got {other:?}"),
    }
}

#[tokio::test]
async fn responses_settle_calls_out_of_order() {
    let (client_side, agent) = pipe().await;
    let client = Arc::new(
        ClientService::builder(client_side)
            .connect()
            .await
            .expect("connect"),
    );

    let first = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.call("ext/first", None).await }
    });
    let first_req = next_request(&agent).await;
    let second = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.call("ext/second", Some(json!({"n": 2}))).await }
    });
    let second_req = next_request(&agent).await;

    assert_eq!(first_req.id, RequestId::Number(1));
    assert_eq!(second_req.id, RequestId::Number(2));
    assert_eq!(second_req.params, Some(json!({"n": 2})));
    assert_eq!(client.pending_count(), 2);

    agent
        .send(Message::ok(second_req.id, json!("two")))
        .await
        .expect("send");
    agent
        .send(Message::ok(first_req.id, json!("one")))
        .await
        .expect("send");

    assert_eq!(first.await.expect("join").expect("first"), json!("one"));
    assert_eq!(second.await.expect("join").expect("second"), json!("two"));
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn error_response_surfaces_as_rpc_error() {
    let (client_side, agent) = pipe().await;
    let client = Arc::new(
        ClientService::builder(client_side)
            .connect()
            .await
            .expect("connect"),
    );

    let call = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.call(methods::SESSION_NEW, Some(json!({}))).await }
    });
    let request = next_request(&agent).await;
    agent
        .send(Message::error(request.id, RpcError::invalid_params("cwd is required")))
        .await
        .expect("send");

    let Err(AppError::Rpc(err)) = call.await.expect("join") else {
        panic!("expected an rpc error");
    };
    assert_eq!(err.code, INVALID_PARAMS);
    assert_eq!(err.message, "cwd is required");
}

#[tokio::test(start_paused = true)]
async fn timed_out_call_is_cancelled_on_the_agent() {
    let (client_side, agent) = pipe().await;
    let client = Arc::new(
        ClientService::builder(client_side)
            .with_timeout(Some(Duration::from_secs(5)))
            .connect()
            .await
            .expect("connect"),
    );

    let call = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.call("ext/slow", None).await }
    });
    let request = next_request(&agent).await;

    assert!(matches!(call.await.expect("join"), Err(AppError::Timeout(_))));
    let cancel = next_notification(&agent).await;
    assert_eq!(cancel.method, methods::CANCEL_REQUEST);
    assert_eq!(cancel.params, Some(json!({"requestId": 1})));
    assert_eq!(request.id, RequestId::Number(1));
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn explicit_cancel_fails_the_waiter_and_notifies() {
    let (client_side, agent) = pipe().await;
    let client = Arc::new(
        ClientService::builder(client_side)
            .connect()
            .await
            .expect("connect"),
    );

    let call = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.call("ext/slow", None).await }
    });
    let request = next_request(&agent).await;
    client.cancel_request(&request.id).await.expect("cancel");

    assert!(matches!(call.await.expect("join"), Err(AppError::Cancelled(_))));
    let cancel = next_notification(&agent).await;
    assert_eq!(cancel.params, Some(json!({"requestId": 1})));

    // A late answer for the cancelled call is ignored.
    agent
        .send(Message::ok(request.id, Value::Null))
        .await
        .expect("send");
    assert!(!client.is_closed());
}

#[tokio::test]
async fn registered_handler_answers_agent_requests() {
    let (client_side, agent) = pipe().await;
    let _client = ClientService::builder(client_side)
        .register(
            "ext/echo",
            Arc::new(typed(|params: Value| async move {
                Ok::<_, AppError>(json!({ "echo": params }))
            })),
        )
        .connect()
        .await
        .expect("connect");

    agent
        .send(Message::request(7_i64, "ext/echo", Some(json!({"x": 1}))))
        .await
        .expect("send");
    let Message::Response(response) = next(&agent).await else {
        panic!("expected a response");
    };
    assert_eq!(response.id, RequestId::Number(7));
    assert_eq!(
        response.payload,
        ResponsePayload::Result(json!({"echo": {"x": 1}}))
    );
}

#[tokio::test]
async fn unregistered_method_is_method_not_found() {
    let (client_side, agent) = pipe().await;
    let _client = ClientService::builder(client_side)
        .connect()
        .await
        .expect("connect");

    agent
        .send(Message::request("abc", methods::FS_READ_TEXT_FILE, Some(json!({}))))
        .await
        .expect("send");
    let (id, err) = next_error(&agent).await;
    assert_eq!(id, RequestId::Str("abc".into()));
    assert_eq!(err.code, METHOD_NOT_FOUND);
}

#[tokio::test]
async fn malformed_params_are_invalid_params() {
    let (client_side, agent) = pipe().await;
    let _client = ClientService::builder(client_side)
        .register(
            "ext/typed",
            Arc::new(typed(|n: u32| async move { Ok::<_, AppError>(n + 1) })),
        )
        .connect()
        .await
        .expect("connect");

    agent
        .send(Message::request(1_i64, "ext/typed", Some(json!("not a number"))))
        .await
        .expect("send");
    let (_, err) = next_error(&agent).await;
    assert_eq!(err.code, INVALID_PARAMS);
}

#[tokio::test]
async fn cancel_request_aborts_a_running_handler() {
    let (client_side, agent) = pipe().await;
    let _client = ClientService::builder(client_side)
        .register(
            "ext/forever",
            Arc::new(typed(|_: Value| async {
                std::future::pending::<acp_engine::Result<Value>>().await
            })),
        )
        .connect()
        .await
        .expect("connect");

    agent
        .send(Message::request(9_i64, "ext/forever", None))
        .await
        .expect("send");
    agent
        .send(Message::notification(
            methods::CANCEL_REQUEST,
            Some(json!({"requestId": 9})),
        ))
        .await
        .expect("send");

    let (id, err) = next_error(&agent).await;
    assert_eq!(id, RequestId::Number(9));
    assert_eq!(err.code, REQUEST_CANCELLED);
}

#[tokio::test]
async fn session_updates_reach_the_listener() {
    let (client_side, agent) = pipe().await;
    let seen: Arc<Mutex<Vec<SessionNotification>>> = Arc::default();
    let raw = Arc::new(Mutex::new(0_usize));
    let _client = ClientService::builder(client_side)
        .on_session_update({
            let seen = Arc::clone(&seen);
            move |update| seen.lock().expect("lock").push(update)
        })
        .on_notification({
            let raw = Arc::clone(&raw);
            move |_| *raw.lock().expect("lock") += 1
        })
        .connect()
        .await
        .expect("connect");

    agent
        .send(Message::notification(
            methods::SESSION_UPDATE,
            Some(json!({
                "sessionId": "sess_1",
                "update": {
                    "sessionUpdate": "agent_message_chunk",
                    "content": {"type": "text", "text": "hello"}
                }
            })),
        ))
        .await
        .expect("send");
    agent
        .send(Message::notification(
            methods::SESSION_UPDATE,
            Some(json!({"sessionId": "sess_1"})),
        ))
        .await
        .expect("send");
    // Round trip an unknown request so both notifications have been handled.
    agent
        .send(Message::request(1_i64, "ext/sync", None))
        .await
        .expect("send");
    next_error(&agent).await;

    let seen = seen.lock().expect("lock");
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].session_id, "sess_1");
    assert!(matches!(seen[0].update, SessionUpdate::AgentMessageChunk { .. }));
    assert_eq!(*raw.lock().expect("lock"), 2);
}

#[tokio::test]
async fn disconnect_fails_outstanding_and_later_calls() {
    let (client_side, agent) = pipe().await;
    let client = Arc::new(
        ClientService::builder(client_side)
            .connect()
            .await
            .expect("connect"),
    );

    let call = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.call("ext/slow", None).await }
    });
    next_request(&agent).await;
    drop(agent);

    assert!(matches!(
        within(call).await.expect("join"),
        Err(AppError::Transport(_))
    ));
    wait_until(|| client.is_closed()).await;
    assert!(matches!(
        client.call("ext/after", None).await,
        Err(AppError::NotConnected)
    ));
}

#[tokio::test]
async fn close_fails_outstanding_calls() {
    let (client_side, agent) = pipe().await;
    let client = Arc::new(
        ClientService::builder(client_side)
            .connect()
            .await
            .expect("connect"),
    );

    let call = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.call("ext/slow", None).await }
    });
    next_request(&agent).await;
    client.close().await.expect("close");

    assert!(matches!(call.await.expect("join"), Err(AppError::NotConnected)));
    assert!(client.is_closed());
    assert!(within(agent.receive()).await.expect("receive").is_none());
}
