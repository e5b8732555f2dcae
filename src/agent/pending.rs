//! Running-prompt registry.
//!
//! Tracks which sessions have a prompt executing, addressable both by
//! session id (`session/cancel`) and by the request id that started the
//! prompt (`$/cancelRequest`). A session appears here exactly while a
//! [`PromptGuard`] for it is alive.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::rpc::RequestId;
use crate::{AppError, Result};

/// Which mechanism stopped a prompt. The first one recorded wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOrigin {
    /// `session/cancel` notification.
    Session,
    /// `$/cancelRequest` naming the prompt's request id.
    Request,
    /// The prompt deadline elapsed.
    Timeout,
}

struct Running {
    token: CancellationToken,
    origin: Option<CancelOrigin>,
    request_id: RequestId,
}

#[derive(Default)]
struct Maps {
    by_session: HashMap<String, Running>,
    by_request: HashMap<RequestId, String>,
}

/// Registry of prompts currently executing.
#[derive(Default)]
pub struct PendingPrompts {
    maps: Mutex<Maps>,
}

/// Registration of one running prompt; dropping it clears both mappings.
pub struct PromptGuard<'a> {
    registry: &'a PendingPrompts,
    session_id: String,
    token: CancellationToken,
}

impl PendingPrompts {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn maps(&self) -> MutexGuard<'_, Maps> {
        self.maps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark a prompt as running for `session_id`, started by `request_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidParams`] when the session already has a
    /// prompt running.
    pub fn begin(&self, session_id: &str, request_id: RequestId) -> Result<PromptGuard<'_>> {
        let mut maps = self.maps();
        if maps.by_session.contains_key(session_id) {
            return Err(AppError::InvalidParams(format!(
                "prompt already running for session {session_id}"
            )));
        }
        let token = CancellationToken::new();
        maps.by_request
            .insert(request_id.clone(), session_id.to_owned());
        maps.by_session.insert(
            session_id.to_owned(),
            Running {
                token: token.clone(),
                origin: None,
                request_id,
            },
        );
        Ok(PromptGuard {
            registry: self,
            session_id: session_id.to_owned(),
            token,
        })
    }

    fn cancel_with(maps: &mut Maps, session_id: &str, origin: CancelOrigin) -> bool {
        let Some(running) = maps.by_session.get_mut(session_id) else {
            return false;
        };
        if running.origin.is_none() {
            running.origin = Some(origin);
        }
        running.token.cancel();
        true
    }

    /// Cancel the prompt running for `session_id`; `false` when idle.
    pub fn cancel_session(&self, session_id: &str) -> bool {
        let cancelled = Self::cancel_with(&mut self.maps(), session_id, CancelOrigin::Session);
        debug!(session_id, cancelled, "session cancel");
        cancelled
    }

    /// Cancel the prompt started by `request_id`; `false` when unknown.
    pub fn cancel_request(&self, request_id: &RequestId) -> bool {
        let mut maps = self.maps();
        let Some(session_id) = maps.by_request.get(request_id).cloned() else {
            debug!(request_id = %request_id, "cancel for unknown request ignored");
            return false;
        };
        Self::cancel_with(&mut maps, &session_id, CancelOrigin::Request)
    }

    /// Cancel every running prompt as if by `session/cancel`.
    pub fn cancel_all(&self) {
        let mut maps = self.maps();
        let sessions: Vec<String> = maps.by_session.keys().cloned().collect();
        for session_id in sessions {
            Self::cancel_with(&mut maps, &session_id, CancelOrigin::Session);
        }
    }

    /// Whether `session_id` has a prompt running.
    #[must_use]
    pub fn is_running(&self, session_id: &str) -> bool {
        self.maps().by_session.contains_key(session_id)
    }

    /// Number of running prompts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.maps().by_session.len()
    }

    /// Whether no prompt is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of request ids mapped to a running prompt.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.maps().by_request.len()
    }
}

impl PromptGuard<'_> {
    /// Resolves once the prompt is cancelled by any origin.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// The recorded cancellation origin, if any.
    #[must_use]
    pub fn origin(&self) -> Option<CancelOrigin> {
        let maps = self.registry.maps();
        maps.by_session
            .get(&self.session_id)
            .and_then(|running| running.origin)
    }

    /// Record a timeout unless an explicit cancel got there first.
    ///
    /// Returns the origin that now stands.
    pub fn mark_timeout(&self) -> CancelOrigin {
        let mut maps = self.registry.maps();
        let Some(running) = maps.by_session.get_mut(&self.session_id) else {
            return CancelOrigin::Timeout;
        };
        let origin = *running.origin.get_or_insert(CancelOrigin::Timeout);
        running.token.cancel();
        origin
    }
}

impl Drop for PromptGuard<'_> {
    fn drop(&mut self) {
        let mut maps = self.registry.maps();
        if let Some(running) = maps.by_session.remove(&self.session_id) {
            maps.by_request.remove(&running.request_id);
        }
    }
}
