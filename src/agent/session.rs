//! Server-side session entity.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::time::Instant;
use uuid::Uuid;

use super::runtime::Executor;
use crate::config::AgentConfig;
use crate::protocol::schema::{
    ExportSessionResponse, SessionConfigOption, SessionInfo, SessionModeState, SessionModelState,
    SessionState, TranscriptTurn,
};

/// Longest auto-generated title, in characters.
pub const MAX_TITLE_CHARS: usize = 80;

/// Generate a fresh session id.
#[must_use]
pub fn new_session_id() -> String {
    format!("sess_{}", Uuid::new_v4().simple())
}

/// RFC 3339 timestamp with millisecond precision.
#[must_use]
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Title derived from a prompt: its first non-empty line, capped at
/// [`MAX_TITLE_CHARS`].
#[must_use]
pub fn auto_title(prompt: &str) -> Option<String> {
    let line = prompt.lines().map(str::trim).find(|l| !l.is_empty())?;
    Some(line.chars().take(MAX_TITLE_CHARS).collect())
}

/// One conversational context.
pub struct Session {
    /// `sess_<uuid>` identifier.
    pub id: String,
    /// Working directory.
    pub cwd: String,
    /// Title, once known.
    pub title: Option<String>,
    /// Wall-clock time of the last activity.
    pub updated_at: DateTime<Utc>,
    /// Monotonic time of the last activity; drives TTL pruning.
    pub last_touch: Instant,
    /// Mode state, when modes are configured.
    pub modes: Option<SessionModeState>,
    /// Model state, when models are configured.
    pub models: Option<SessionModelState>,
    /// Per-session select options.
    pub config_options: Vec<SessionConfigOption>,
    /// Completed turns, oldest first.
    pub transcript: Vec<TranscriptTurn>,
    /// Whether any prompt has produced output yet.
    pub produced_output: bool,
    /// Prompt execution unit.
    pub executor: Arc<dyn Executor>,
}

impl Session {
    /// New session seeded from `config`.
    #[must_use]
    pub fn new(id: String, cwd: String, config: &AgentConfig, executor: Arc<dyn Executor>) -> Self {
        let modes = config.modes.first().map(|first| SessionModeState {
            current_mode_id: first.id.clone(),
            available_modes: config.modes.clone(),
        });
        let models = config.models.first().map(|first| SessionModelState {
            current_model_id: first.model_id.clone(),
            available_models: config.models.clone(),
        });
        Self {
            id,
            cwd,
            title: None,
            updated_at: Utc::now(),
            last_touch: Instant::now(),
            modes,
            models,
            config_options: config.config_options.clone(),
            transcript: Vec::new(),
            produced_output: false,
            executor,
        }
    }

    /// Copy of this session under `id` with its own executor.
    #[must_use]
    pub fn fork(&self, id: String, cwd: Option<String>, executor: Arc<dyn Executor>) -> Self {
        Self {
            id,
            cwd: cwd.unwrap_or_else(|| self.cwd.clone()),
            title: self.title.clone(),
            updated_at: Utc::now(),
            last_touch: Instant::now(),
            modes: self.modes.clone(),
            models: self.models.clone(),
            config_options: self.config_options.clone(),
            transcript: self.transcript.clone(),
            produced_output: self.produced_output,
            executor,
        }
    }

    /// Record activity now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.last_touch = Instant::now();
    }

    /// Mode, model, and config state as returned to the client.
    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState {
            modes: self.modes.clone(),
            models: self.models.clone(),
            config_options: (!self.config_options.is_empty()).then(|| self.config_options.clone()),
        }
    }

    /// Listing summary.
    #[must_use]
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id.clone(),
            cwd: self.cwd.clone(),
            title: self.title.clone(),
            updated_at: timestamp(self.updated_at),
        }
    }

    /// Full export including the transcript.
    #[must_use]
    pub fn export(&self) -> ExportSessionResponse {
        ExportSessionResponse {
            session_id: self.id.clone(),
            cwd: self.cwd.clone(),
            title: self.title.clone(),
            updated_at: timestamp(self.updated_at),
            turns: self.transcript.clone(),
        }
    }
}
