//! Integration tests for the agent behind the WebSocket server transport.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use acp_engine::agent::{AgentServer, EchoExecutor};
use acp_engine::client::ClientService;
use acp_engine::protocol::schema::{NewSessionRequest, PromptRequest, StopReason};
use acp_engine::protocol::{ContentBlock, SessionNotification};
use acp_engine::rpc::error::{INVALID_REQUEST, PARSE_ERROR};
use acp_engine::transport::{
    Transport, WsClientConfig, WsClientTransport, WsServerConfig, WsServerTransport,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::test_helpers::{config, within};

type Updates = Arc<Mutex<Vec<SessionNotification>>>;

/// Poll `condition` on a real clock.
async fn eventually(mut condition: impl FnMut() -> bool) {
    within(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}

async fn start_server() -> (Arc<WsServerTransport>, SocketAddr) {
    let transport = Arc::new(WsServerTransport::new(WsServerConfig::new("127.0.0.1:0")));
    let shared: Arc<dyn Transport> = transport.clone();
    let server = AgentServer::new(shared, config(), Arc::new(EchoExecutor));
    tokio::spawn(server.run());
    eventually(|| transport.local_addr().is_some()).await;
    let addr = transport.local_addr().expect("bound");
    (transport, addr)
}

async fn connect(addr: SocketAddr) -> (ClientService, Updates) {
    let updates: Updates = Arc::default();
    let transport = WsClientTransport::new(WsClientConfig::new(format!("ws://{addr}/")));
    let client = ClientService::builder(Arc::new(transport))
        .on_session_update({
            let updates = Arc::clone(&updates);
            move |update| updates.lock().expect("lock").push(update)
        })
        .connect()
        .await
        .expect("client connects");
    (client, updates)
}

async fn open_session(client: &ClientService) -> String {
    within(client.new_session(&NewSessionRequest {
        cwd: "/workspace".into(),
        mcp_servers: Vec::new(),
    }))
    .await
    .expect("session/new")
    .session_id
}

async fn run_prompt(client: &ClientService, session_id: &str) -> StopReason {
    within(client.prompt(&PromptRequest {
        session_id: session_id.to_owned(),
        prompt: vec![ContentBlock::text("over the socket")],
    }))
    .await
    .expect("prompt")
    .stop_reason
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn updates_reach_only_the_owning_connection() {
    let (server, addr) = start_server().await;
    let (alice, alice_updates) = connect(addr).await;
    let (bob, bob_updates) = connect(addr).await;
    eventually(|| server.connection_count() == 2).await;

    // Both clients number their first call 1; the server keeps them apart.
    let alice_session = open_session(&alice).await;
    let bob_session = open_session(&bob).await;
    assert_ne!(alice_session, bob_session);

    assert_eq!(run_prompt(&alice, &alice_session).await, StopReason::EndTurn);
    {
        let alice_updates = alice_updates.lock().expect("lock");
        assert!(!alice_updates.is_empty());
        assert!(alice_updates.iter().all(|n| n.session_id == alice_session));
    }
    assert!(bob_updates.lock().expect("lock").is_empty());

    assert_eq!(run_prompt(&bob, &bob_session).await, StopReason::EndTurn);
    let bob_updates = bob_updates.lock().expect("lock");
    assert!(!bob_updates.is_empty());
    assert!(bob_updates.iter().all(|n| n.session_id == bob_session));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closed_connection_is_forgotten() {
    let (server, addr) = start_server().await;
    let (alice, _) = connect(addr).await;
    let (bob, _) = connect(addr).await;
    eventually(|| server.connection_count() == 2).await;

    alice.close().await.expect("close");
    eventually(|| server.connection_count() == 1).await;

    let session = open_session(&bob).await;
    assert_eq!(run_prompt(&bob, &session).await, StopReason::EndTurn);
}

/// Send `frame` on a raw socket and return the server's first text reply.
async fn reply_to_raw_frame(addr: SocketAddr, frame: &str) -> Value {
    let (mut socket, _) = connect_async(format!("ws://{addr}/")).await.expect("dial");
    socket.send(WsMessage::text(frame.to_owned())).await.expect("send");
    loop {
        match within(socket.next()).await.expect("frame").expect("read") {
            WsMessage::Text(text) => return serde_json::from_str(text.as_str()).expect("json"),
            WsMessage::Close(_) => panic!("closed without a reply"),
            _ => {}
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn undecodable_frames_are_answered_before_disconnect() {
    let (server, addr) = start_server().await;

    let reply = reply_to_raw_frame(addr, "{not json").await;
    assert_eq!(reply["error"]["code"], PARSE_ERROR);
    assert!(reply["id"].is_null());

    let reply = reply_to_raw_frame(addr, r#"{"jsonrpc":"2.0","id":1}"#).await;
    assert_eq!(reply["error"]["code"], INVALID_REQUEST);

    eventually(|| server.connection_count() == 0).await;
}
