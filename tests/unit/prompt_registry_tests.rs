//! Unit tests for the running-prompt registry and cancellation origins.

use acp_engine::agent::{CancelOrigin, PendingPrompts};
use acp_engine::rpc::RequestId;
use acp_engine::AppError;

#[test]
fn second_prompt_for_a_session_is_rejected() {
    let prompts = PendingPrompts::new();
    let _guard = prompts.begin("sess_1", RequestId::Number(1)).expect("first");
    let err = prompts.begin("sess_1", RequestId::Number(2)).err().expect("rejected");
    assert!(matches!(err, AppError::InvalidParams(_)));
    assert!(prompts.begin("sess_2", RequestId::Number(3)).is_ok());
}

#[test]
fn dropping_the_guard_clears_both_mappings() {
    let prompts = PendingPrompts::new();
    {
        let _guard = prompts.begin("sess_1", RequestId::Number(1)).expect("begin");
        assert!(prompts.is_running("sess_1"));
        assert_eq!(prompts.request_count(), 1);
    }
    assert!(prompts.is_empty());
    assert_eq!(prompts.request_count(), 0);
    assert!(!prompts.cancel_request(&RequestId::Number(1)));
}

#[tokio::test]
async fn session_cancel_records_session_origin() {
    let prompts = PendingPrompts::new();
    let guard = prompts.begin("sess_1", RequestId::Number(1)).expect("begin");
    assert!(prompts.cancel_session("sess_1"));
    guard.cancelled().await;
    assert_eq!(guard.origin(), Some(CancelOrigin::Session));
}

#[tokio::test]
async fn request_cancel_matches_by_request_id() {
    let prompts = PendingPrompts::new();
    let guard = prompts.begin("sess_1", RequestId::Str("p-1".into())).expect("begin");
    assert!(!prompts.cancel_request(&RequestId::Number(1)));
    assert!(prompts.cancel_request(&RequestId::Str("p-1".into())));
    guard.cancelled().await;
    assert_eq!(guard.origin(), Some(CancelOrigin::Request));
}

#[test]
fn first_origin_wins() {
    let prompts = PendingPrompts::new();
    let guard = prompts.begin("sess_1", RequestId::Number(1)).expect("begin");
    prompts.cancel_request(&RequestId::Number(1));
    prompts.cancel_session("sess_1");
    assert_eq!(guard.mark_timeout(), CancelOrigin::Request);
    assert_eq!(guard.origin(), Some(CancelOrigin::Request));
}

#[test]
fn timeout_is_recorded_when_nothing_else_fired() {
    let prompts = PendingPrompts::new();
    let guard = prompts.begin("sess_1", RequestId::Number(1)).expect("begin");
    assert_eq!(guard.mark_timeout(), CancelOrigin::Timeout);
    prompts.cancel_session("sess_1");
    assert_eq!(guard.origin(), Some(CancelOrigin::Timeout));
}

#[test]
fn cancel_for_idle_session_is_a_no_op() {
    let prompts = PendingPrompts::new();
    assert!(!prompts.cancel_session("sess_idle"));
}

#[test]
fn cancel_all_reaches_every_prompt() {
    let prompts = PendingPrompts::new();
    let a = prompts.begin("a", RequestId::Number(1)).expect("a");
    let b = prompts.begin("b", RequestId::Number(2)).expect("b");
    prompts.cancel_all();
    assert_eq!(a.origin(), Some(CancelOrigin::Session));
    assert_eq!(b.origin(), Some(CancelOrigin::Session));
}
