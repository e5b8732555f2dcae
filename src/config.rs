//! Global configuration parsing and validation.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::permission::PermissionRules;
use crate::protocol::schema::{AuthMethod, ModelInfo, SessionConfigOption, SessionMode};
use crate::protocol::update::AvailableCommand;
use crate::sync::retry::RetryConfig;
use crate::sync::RetryPolicy;
use crate::{AppError, Result};

/// Interpret `0` as "disabled".
fn seconds(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

fn default_modes() -> Vec<SessionMode> {
    vec![
        SessionMode {
            id: "default".into(),
            name: "Default".into(),
            description: Some("Ask before running prompts when permission is required".into()),
        },
        SessionMode {
            id: "plan".into(),
            name: "Plan".into(),
            description: Some("Describe the work without executing it".into()),
        },
    ]
}

fn default_models() -> Vec<ModelInfo> {
    vec![ModelInfo {
        model_id: "echo".into(),
        name: "Echo".into(),
        description: Some("Replies with the prompt text".into()),
    }]
}

fn default_commands() -> Vec<AvailableCommand> {
    vec![AvailableCommand {
        name: "help".into(),
        description: "Show available commands".into(),
        input_hint: None,
    }]
}

/// `[agent]` table: Agent Service behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Idle seconds before a session is pruned; 0 disables expiry.
    pub session_ttl_seconds: u64,
    /// Seconds a prompt may run; 0 disables the timeout.
    pub prompt_timeout_seconds: u64,
    /// Sessions per `session/list` page.
    pub list_page_size: usize,
    /// Title sessions from the first line of their first prompt.
    pub auto_title: bool,
    /// Ask the client before executing each prompt.
    pub require_permission: bool,
    /// Seconds to wait for a permission decision; 0 waits forever.
    pub permission_timeout_seconds: u64,
    /// Advertise and accept `logout`.
    pub supports_logout: bool,
    /// Advertised authentication methods; empty disables `authenticate`.
    pub auth_methods: Vec<AuthMethod>,
    /// Selectable session modes; the first is the initial mode.
    pub modes: Vec<SessionMode>,
    /// Selectable models; the first is the initial model.
    pub models: Vec<ModelInfo>,
    /// Per-session select options.
    pub config_options: Vec<SessionConfigOption>,
    /// Commands announced at the start of every prompt turn.
    pub commands: Vec<AvailableCommand>,
    /// Static permission rules.
    pub permission: PermissionRules,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: 3600,
            prompt_timeout_seconds: 600,
            list_page_size: 50,
            auto_title: true,
            require_permission: false,
            permission_timeout_seconds: 0,
            supports_logout: true,
            auth_methods: Vec::new(),
            modes: default_modes(),
            models: default_models(),
            config_options: Vec::new(),
            commands: default_commands(),
            permission: PermissionRules::default(),
        }
    }
}

impl AgentConfig {
    /// Session idle limit, if any.
    #[must_use]
    pub fn session_ttl(&self) -> Option<Duration> {
        seconds(self.session_ttl_seconds)
    }

    /// Prompt execution limit, if any.
    #[must_use]
    pub fn prompt_timeout(&self) -> Option<Duration> {
        seconds(self.prompt_timeout_seconds)
    }

    /// Permission wait limit, if any.
    #[must_use]
    pub fn permission_timeout(&self) -> Option<Duration> {
        seconds(self.permission_timeout_seconds)
    }
}

/// `[transport]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// WebSocket server listen address.
    pub bind: String,
    /// WebSocket client target.
    pub url: Option<String>,
    /// Backpressure capacity for outbound sends.
    pub max_in_flight: usize,
    /// WebSocket ping interval; 0 disables the heartbeat.
    pub heartbeat_seconds: u64,
    /// Reconnect and ping backoff.
    pub retry: RetryConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7878".into(),
            url: None,
            max_in_flight: 64,
            heartbeat_seconds: 30,
            retry: RetryConfig::default(),
        }
    }
}

impl TransportConfig {
    /// Heartbeat interval, if enabled.
    #[must_use]
    pub fn heartbeat(&self) -> Option<Duration> {
        seconds(self.heartbeat_seconds)
    }

    /// Backoff policy built from `[transport.retry]`.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }
}

/// `[client]` table: Client Service behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Seconds an outbound call may wait; 0 waits forever.
    pub request_timeout_seconds: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 120,
        }
    }
}

impl ClientConfig {
    /// Outbound call limit, if any.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        seconds(self.request_timeout_seconds)
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Agent Service settings.
    pub agent: AgentConfig,
    /// Transport settings.
    pub transport: TransportConfig,
    /// Client Service settings.
    pub client: ClientConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.agent.list_page_size == 0 {
            return Err(AppError::Config(
                "agent.list_page_size must be greater than zero".into(),
            ));
        }

        if self.transport.max_in_flight == 0 {
            return Err(AppError::Config(
                "transport.max_in_flight must be greater than zero".into(),
            ));
        }

        if self.transport.retry.base_delay_ms > self.transport.retry.max_delay_ms {
            return Err(AppError::Config(
                "transport.retry.base_delay_ms must not exceed max_delay_ms".into(),
            ));
        }

        for option in &self.agent.config_options {
            if !option.options.iter().any(|v| v.value == option.current_value) {
                return Err(AppError::Config(format!(
                    "config option {} has current value {} outside its allowed values",
                    option.id, option.current_value
                )));
            }
        }

        let mut mode_ids: Vec<&str> = self.agent.modes.iter().map(|m| m.id.as_str()).collect();
        mode_ids.sort_unstable();
        if mode_ids.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(AppError::Config("agent.modes contains duplicate ids".into()));
        }

        Ok(())
    }
}
