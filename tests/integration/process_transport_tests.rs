//! Integration tests for the child-process transport.

#![cfg(unix)]

use std::time::{Duration, Instant};

use acp_engine::rpc::Message;
use acp_engine::transport::{ProcessConfig, ProcessTransport, Transport};
use acp_engine::AppError;
use serde_json::json;

use super::test_helpers::within;

fn shell(script: &str) -> ProcessConfig {
    ProcessConfig::new("/bin/sh", vec!["-c".into(), script.into()])
}

fn alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .is_ok_and(|status| status.success())
}

#[tokio::test]
async fn messages_round_trip_through_the_child() {
    let transport = ProcessTransport::new(ProcessConfig::new("cat", Vec::new()));
    transport.connect().await.expect("spawn");
    assert!(transport.pid().await.is_some());

    let request = Message::request(1_i64, "session/new", Some(json!({"cwd": "/w"})));
    transport.send(request.clone()).await.expect("send");
    let echoed = within(transport.receive())
        .await
        .expect("receive")
        .expect("open");
    assert_eq!(echoed, request);

    transport.close().await.expect("close");
}

#[tokio::test]
async fn child_exit_is_end_of_stream() {
    let transport = ProcessTransport::new(shell("exit 0"));
    transport.connect().await.expect("spawn");

    assert_eq!(within(transport.receive()).await.expect("receive"), None);
}

#[tokio::test]
async fn only_allowlisted_and_configured_variables_reach_the_child() {
    std::env::set_var("ACP_ENGINE_TEST_LEAK", "secret");
    let mut config = shell(
        r#"printf '{"jsonrpc":"2.0","method":"env","params":{"leak":"%s","given":"%s","path":"%s"}}\n' "${ACP_ENGINE_TEST_LEAK-unset}" "$GIVEN" "${PATH-unset}""#,
    );
    config.env.push(("GIVEN".into(), "yes".into()));
    let transport = ProcessTransport::new(config);
    transport.connect().await.expect("spawn");

    let message = within(transport.receive())
        .await
        .expect("receive")
        .expect("open");
    let params = message.params().expect("params");
    assert_eq!(params["leak"], "unset");
    assert_eq!(params["given"], "yes");
    assert_ne!(params["path"], "unset");
}

#[tokio::test]
async fn noisy_stderr_does_not_stall_stdout() {
    // Far more stderr than a pipe buffer holds.
    let transport = ProcessTransport::new(shell(
        r#"i=0; while [ $i -lt 20000 ]; do echo "noise line $i" >&2; i=$((i+1)); done; printf '{"jsonrpc":"2.0","method":"done"}\n'"#,
    ));
    transport.connect().await.expect("spawn");

    let message = within(transport.receive())
        .await
        .expect("receive")
        .expect("open");
    assert_eq!(message.method(), Some("done"));
}

#[tokio::test]
async fn close_waits_for_a_clean_exit() {
    let transport = ProcessTransport::new(ProcessConfig::new("cat", Vec::new()));
    transport.connect().await.expect("spawn");

    let started = Instant::now();
    within(transport.close()).await.expect("close");
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(transport.pid().await, None);
    assert!(matches!(
        transport.send(Message::notification("ext/x", None)).await,
        Err(AppError::NotConnected)
    ));
}

#[tokio::test]
async fn close_kills_a_child_that_ignores_stdin() {
    let transport = ProcessTransport::new(shell("exec sleep 30"));
    transport.connect().await.expect("spawn");
    let pid = transport.pid().await.expect("pid");

    within(transport.close()).await.expect("close");
    assert!(!alive(pid));
}

#[tokio::test]
async fn missing_program_fails_to_connect() {
    let transport = ProcessTransport::new(ProcessConfig::new(
        "/nonexistent/acp-engine-agent",
        Vec::new(),
    ));
    let err = transport.connect().await.expect_err("spawn fails");
    assert!(matches!(err, AppError::Transport(_)), "got {err:?}");
}
