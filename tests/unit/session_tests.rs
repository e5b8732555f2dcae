//! Unit tests for the session entity.

use std::sync::Arc;

use acp_engine::agent::session::{auto_title, new_session_id, timestamp, MAX_TITLE_CHARS};
use acp_engine::agent::{EchoExecutor, Session};
use acp_engine::config::AgentConfig;
use acp_engine::protocol::schema::TranscriptTurn;
use chrono::TimeZone;

fn session() -> Session {
    Session::new(
        "sess_a".into(),
        "/work".into(),
        &AgentConfig::default(),
        Arc::new(EchoExecutor),
    )
}

#[test]
fn ids_are_prefixed_and_unique() {
    let a = new_session_id();
    let b = new_session_id();
    assert!(a.starts_with("sess_"));
    assert_ne!(a, b);
}

#[test]
fn timestamps_are_utc_millisecond_rfc3339() {
    let at = chrono::Utc
        .with_ymd_and_hms(2026, 3, 4, 5, 6, 7)
        .single()
        .expect("valid date");
    assert_eq!(timestamp(at), "2026-03-04T05:06:07.000Z");
}

#[test]
fn title_is_first_non_blank_line() {
    assert_eq!(auto_title("\n   \n  Fix the build \nmore"), Some("Fix the build".into()));
    assert_eq!(auto_title("  \n\t"), None);
}

#[test]
fn long_titles_are_capped_by_characters() {
    let title = auto_title(&"é".repeat(200)).expect("title");
    assert_eq!(title.chars().count(), MAX_TITLE_CHARS);
}

#[test]
fn new_session_starts_on_first_mode_and_model() {
    let session = session();
    let state = session.state();
    assert_eq!(
        state.modes.expect("modes").current_mode_id,
        AgentConfig::default().modes[0].id
    );
    assert_eq!(state.models.expect("models").current_model_id, "echo");
    assert!(session.title.is_none());
}

#[test]
fn fork_copies_history_under_new_id() {
    let mut source = session();
    source.title = Some("Original".into());
    source.transcript.push(TranscriptTurn {
        prompt: "hi".into(),
        response: "hi".into(),
        completed_at: timestamp(chrono::Utc::now()),
    });

    let fork = source.fork("sess_b".into(), Some("/elsewhere".into()), Arc::new(EchoExecutor));
    assert_eq!(fork.id, "sess_b");
    assert_eq!(fork.cwd, "/elsewhere");
    assert_eq!(fork.title.as_deref(), Some("Original"));
    assert_eq!(fork.transcript, source.transcript);

    let same_dir = source.fork("sess_c".into(), None, Arc::new(EchoExecutor));
    assert_eq!(same_dir.cwd, "/work");
}

#[test]
fn info_and_export_agree() {
    let session = session();
    let info = session.info();
    let export = session.export();
    assert_eq!(info.session_id, export.session_id);
    assert_eq!(info.updated_at, export.updated_at);
    assert!(export.turns.is_empty());
}
