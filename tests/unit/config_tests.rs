//! Unit tests for configuration parsing and validation.

use std::io::Write;
use std::time::Duration;

use acp_engine::{AppError, GlobalConfig};

#[test]
fn empty_document_yields_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("defaults");
    assert_eq!(config.agent.list_page_size, 50);
    assert_eq!(config.agent.prompt_timeout(), Some(Duration::from_secs(600)));
    assert_eq!(config.agent.modes[0].id, "default");
    assert_eq!(config.transport.bind, "127.0.0.1:7878");
    assert_eq!(config.client.request_timeout(), Some(Duration::from_secs(120)));
}

#[test]
fn zero_seconds_disables_timers() {
    let config = GlobalConfig::from_toml_str(
        r#"
        [agent]
        session_ttl_seconds = 0
        prompt_timeout_seconds = 0

        [transport]
        heartbeat_seconds = 0
        "#,
    )
    .expect("parse");
    assert!(config.agent.session_ttl().is_none());
    assert!(config.agent.prompt_timeout().is_none());
    assert!(config.transport.heartbeat().is_none());
}

#[test]
fn permission_rules_and_modes_parse() {
    let config = GlobalConfig::from_toml_str(
        r#"
        [agent]
        require_permission = true

        [agent.permission]
        allow = ["Execute *"]

        [[agent.modes]]
        id = "ask"
        name = "Ask"

        [[agent.config_options]]
        id = "depth"
        name = "Depth"
        current_value = "shallow"
        options = [
            { value = "shallow", name = "Shallow" },
            { value = "deep", name = "Deep" },
        ]
        "#,
    )
    .expect("parse");
    assert!(config.agent.require_permission);
    assert_eq!(config.agent.permission.allow, vec!["Execute *".to_owned()]);
    assert_eq!(config.agent.modes.len(), 1);
    assert_eq!(config.agent.config_options[0].options.len(), 2);
}

#[test]
fn zero_page_size_is_rejected() {
    let err = GlobalConfig::from_toml_str("[agent]\nlist_page_size = 0\n").unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
    assert!(err.to_string().contains("list_page_size"));
}

#[test]
fn inverted_retry_delays_are_rejected() {
    let err = GlobalConfig::from_toml_str(
        "[transport.retry]\nbase_delay_ms = 5000\nmax_delay_ms = 10\n",
    )
    .unwrap_err();
    assert!(err.to_string().contains("base_delay_ms"));
}

#[test]
fn config_option_value_must_be_allowed() {
    let err = GlobalConfig::from_toml_str(
        r#"
        [[agent.config_options]]
        id = "depth"
        name = "Depth"
        current_value = "bottomless"
        options = [{ value = "shallow", name = "Shallow" }]
        "#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("depth"));
}

#[test]
fn duplicate_mode_ids_are_rejected() {
    let err = GlobalConfig::from_toml_str(
        r#"
        [[agent.modes]]
        id = "a"
        name = "A"

        [[agent.modes]]
        id = "a"
        name = "Again"
        "#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("duplicate"));
}

#[test]
fn malformed_toml_is_a_config_error() {
    let err = GlobalConfig::from_toml_str("[agent\n").unwrap_err();
    assert!(err.to_string().starts_with("config:"));
}

#[test]
fn loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "[client]\nrequest_timeout_seconds = 7").expect("write");
    let config = GlobalConfig::load_from_path(file.path()).expect("load");
    assert_eq!(config.client.request_timeout(), Some(Duration::from_secs(7)));
}

#[test]
fn missing_file_is_a_config_error() {
    let err = GlobalConfig::load_from_path("/nonexistent/acp-engine.toml").unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}
