//! Unit tests for the exponential backoff policy.

use std::time::Duration;

use acp_engine::sync::retry::RetryConfig;
use acp_engine::sync::RetryPolicy;

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 4,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_millis(500),
    }
}

#[test]
fn delays_double_until_the_cap() {
    let policy = policy();
    assert_eq!(policy.delay_for(1), Some(Duration::from_millis(100)));
    assert_eq!(policy.delay_for(2), Some(Duration::from_millis(200)));
    assert_eq!(policy.delay_for(3), Some(Duration::from_millis(400)));
    assert_eq!(policy.delay_for(4), Some(Duration::from_millis(500)));
}

#[test]
fn attempts_past_the_limit_are_not_retried() {
    let policy = policy();
    assert!(policy.should_retry(4));
    assert!(!policy.should_retry(5));
    assert_eq!(policy.delay_for(0), None);
}

#[test]
fn never_policy_does_not_retry() {
    assert!(!RetryPolicy::never().should_retry(1));
}

#[test]
fn config_converts_milliseconds() {
    let config = RetryConfig {
        max_attempts: 2,
        base_delay_ms: 10,
        max_delay_ms: 15,
    };
    let policy = RetryPolicy::from(&config);
    assert_eq!(policy.delay_for(2), Some(Duration::from_millis(15)));
    assert_eq!(policy.delay_for(3), None);
}

#[test]
fn default_config_matches_default_policy() {
    assert_eq!(
        RetryPolicy::from(&RetryConfig::default()),
        RetryPolicy::default()
    );
}
