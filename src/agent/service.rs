//! Agent Service: session lifecycle and prompt turns.
//!
//! Owns the session map and the running-prompt registry. Every request is
//! answered with exactly one response message; session updates go out
//! through the injected [`OutboundSender`] while the request is in flight.
//!
//! # Prompt turn
//!
//! 1. Reject when the session already has a prompt running.
//! 2. Touch the session and register the request id for `$/cancelRequest`.
//! 3. Ask for permission when a bridge is configured; anything but an
//!    `allow*` option ends the turn as `cancelled` before the executor runs.
//! 4. Race the executor against cancellation and the prompt deadline.
//! 5. Emit updates in a fixed order and answer `end_turn`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::cursor;
use super::pending::{CancelOrigin, PendingPrompts};
use super::runtime::{EchoExecutor, ExecutorFactory};
use super::session::{self, new_session_id, Session};
use crate::config::AgentConfig;
use crate::permission::{OutboundSender, PermissionBridge, PermissionPolicy, RememberingPolicy};
use crate::protocol::client::{PermissionOption, RequestPermissionOutcome, RequestPermissionRequest};
use crate::protocol::content::prompt_text;
use crate::protocol::schema::{
    AgentCapabilities, AuthenticateRequest, CancelRequestParams, Implementation,
    InitializeRequest, InitializeResponse, ListSessionsRequest, ListSessionsResponse,
    LoadSessionRequest, NewSessionRequest, NewSessionResponse, PromptCapabilities, PromptRequest,
    PromptResponse, SessionCapabilities, SessionIdParams, SessionState, SessionTargetRequest,
    SetSessionConfigOptionRequest, SetSessionConfigOptionResponse, SetSessionModeRequest,
    SetSessionModelRequest, StopReason, TranscriptTurn,
};
use crate::protocol::update::{
    PlanEntry, PlanEntryPriority, PlanEntryStatus, ToolCallStatus, ToolCallUpdate, ToolKind,
};
use crate::protocol::{
    is_agent_method, methods, ContentBlock, Empty, SessionNotification, SessionUpdate,
    PROTOCOL_VERSION,
};
use crate::rpc::{Message, Notification, Request, RequestId, RpcError};
use crate::{AppError, Result};

/// Title of the synthetic tool call wrapping each prompt execution.
pub const PROMPT_TOOL_TITLE: &str = "Execute prompt";

/// Decode `params`, treating an absent object as `{}`.
fn parse<T: DeserializeOwned>(params: Option<Value>) -> Result<T> {
    serde_json::from_value(params.unwrap_or_else(|| Value::Object(Map::new())))
        .map_err(|err| AppError::InvalidParams(err.to_string()))
}

fn reply<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn unknown_session(session_id: &str) -> AppError {
    AppError::NotFound(format!("unknown session {session_id}"))
}

/// Server side of the protocol.
pub struct AgentService {
    config: AgentConfig,
    sessions: Mutex<HashMap<String, Session>>,
    prompts: PendingPrompts,
    notifier: OutboundSender,
    executors: Arc<dyn ExecutorFactory>,
    bridge: Option<Arc<PermissionBridge>>,
    policy: Arc<dyn PermissionPolicy>,
}

impl AgentService {
    /// Service with echo executors, no permission bridge, and a
    /// [`RememberingPolicy`] built from `config.permission`.
    #[must_use]
    pub fn new(config: AgentConfig, notifier: OutboundSender) -> Self {
        let policy = Arc::new(RememberingPolicy::new(config.permission.clone()));
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
            prompts: PendingPrompts::new(),
            notifier,
            executors: Arc::new(EchoExecutor),
            bridge: None,
            policy,
        }
    }

    /// Use `factory` to create executors for new and forked sessions.
    #[must_use]
    pub fn with_executor_factory(mut self, factory: Arc<dyn ExecutorFactory>) -> Self {
        self.executors = factory;
        self
    }

    /// Ask the client through `bridge` before each prompt executes.
    #[must_use]
    pub fn with_permission_bridge(mut self, bridge: Arc<PermissionBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Replace the local permission policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn PermissionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Running-prompt registry.
    #[must_use]
    pub fn prompts(&self) -> &PendingPrompts {
        &self.prompts
    }

    /// Cancel every running prompt; used on transport teardown.
    pub fn cancel_all(&self) {
        self.prompts.cancel_all();
    }

    // ── Entry points ─────────────────────────────────────────────────────────

    /// Answer one request.
    pub async fn handle_request(&self, request: Request) -> Message {
        let Request { id, method, params } = request;
        let span = info_span!("agent_request", method = %method, request_id = %id);
        async {
            self.prune().await;
            match self.dispatch(&id, &method, params).await {
                Ok(result) => Message::ok(id.clone(), result),
                Err(err) => {
                    debug!(%err, "request failed");
                    Message::error(id.clone(), RpcError::from(err))
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Handle a notification; unknown methods are ignored.
    pub async fn handle_notification(&self, notification: Notification) {
        self.prune().await;
        if let Err(err) = self.on_notification(&notification.method, notification.params) {
            debug!(method = %notification.method, %err, "notification ignored");
        }
    }

    fn on_notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        match method {
            methods::SESSION_CANCEL => {
                let params: SessionIdParams = parse(params)?;
                self.prompts.cancel_session(&params.session_id);
            }
            methods::CANCEL_REQUEST => {
                let params: CancelRequestParams = parse(params)?;
                self.prompts.cancel_request(&params.request_id);
            }
            other => debug!(method = other, "unhandled notification"),
        }
        Ok(())
    }

    async fn dispatch(&self, id: &RequestId, method: &str, params: Option<Value>) -> Result<Value> {
        match method {
            methods::INITIALIZE => reply(&self.initialize(parse(params)?)?),
            methods::AUTHENTICATE => reply(&self.authenticate(&parse(params)?)?),
            methods::LOGOUT => reply(&self.logout().await?),
            methods::SESSION_NEW => reply(&self.new_session(parse(params)?).await?),
            methods::SESSION_LIST => reply(&self.list_sessions(parse(params)?).await?),
            methods::SESSION_LOAD => reply(&self.load_session(parse(params)?).await?),
            methods::SESSION_RESUME => reply(&self.resume_session(parse(params)?).await?),
            methods::SESSION_FORK => reply(&self.fork_session(parse(params)?).await?),
            methods::SESSION_DELETE => reply(&self.delete_session(&parse(params)?).await?),
            methods::SESSION_EXPORT => {
                let params: SessionIdParams = parse(params)?;
                let sessions = self.sessions.lock().await;
                let session = sessions
                    .get(&params.session_id)
                    .ok_or_else(|| unknown_session(&params.session_id))?;
                reply(&session.export())
            }
            methods::SESSION_PROMPT => reply(&self.prompt(id.clone(), parse(params)?).await?),
            methods::SESSION_SET_MODE => reply(&self.set_mode(parse(params)?).await?),
            methods::SESSION_SET_MODEL => reply(&self.set_model(parse(params)?).await?),
            methods::SESSION_SET_CONFIG_OPTION => reply(&self.set_config_option(parse(params)?).await?),
            // Cancellation sent as a request is honoured and answered with null.
            methods::SESSION_CANCEL | methods::CANCEL_REQUEST => {
                self.on_notification(method, params)?;
                Ok(Value::Null)
            }
            other if is_agent_method(other) => Err(AppError::Unsupported(format!(
                "{other} is not supported by this agent"
            ))),
            other => Err(AppError::Rpc(RpcError::method_not_found(other))),
        }
    }

    // ── Housekeeping ─────────────────────────────────────────────────────────

    /// Drop sessions idle for longer than the TTL. Sessions with a prompt
    /// running are kept.
    async fn prune(&self) {
        let Some(ttl) = self.config.session_ttl() else {
            return;
        };
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|id, session| {
            let keep = session.last_touch.elapsed() <= ttl || self.prompts.is_running(id);
            if !keep {
                debug!(session_id = %id, "session expired");
            }
            keep
        });
    }

    fn notify(&self, session_id: &str, update: SessionUpdate) {
        let kind = update.kind();
        let notification = SessionNotification {
            session_id: session_id.to_owned(),
            update,
        };
        let message = match serde_json::to_value(&notification) {
            Ok(params) => Message::notification(methods::SESSION_UPDATE, Some(params)),
            Err(err) => {
                warn!(session_id, kind, %err, "failed to encode session update");
                return;
            }
        };
        if let Err(err) = (self.notifier)(message) {
            warn!(session_id, kind, %err, "failed to send session update");
        }
    }

    fn session_mut<'a>(
        sessions: &'a mut HashMap<String, Session>,
        session_id: &str,
    ) -> Result<&'a mut Session> {
        sessions
            .get_mut(session_id)
            .ok_or_else(|| unknown_session(session_id))
    }

    // ── Connection methods ───────────────────────────────────────────────────

    fn initialize(&self, request: InitializeRequest) -> Result<InitializeResponse> {
        if request.protocol_version != PROTOCOL_VERSION {
            return Err(AppError::InvalidParams(format!(
                "unsupported protocol version {}; expected {PROTOCOL_VERSION}",
                request.protocol_version
            )));
        }
        if let Some(ref client) = request.client_info {
            info!(client = %client.name, version = %client.version, "client initialized");
        }
        Ok(InitializeResponse {
            protocol_version: PROTOCOL_VERSION,
            agent_capabilities: AgentCapabilities {
                load_session: true,
                logout: self.config.supports_logout,
                prompt_capabilities: PromptCapabilities {
                    image: false,
                    audio: false,
                    embedded_context: true,
                },
                session_capabilities: SessionCapabilities {
                    list: true,
                    fork: true,
                    resume: true,
                    delete: true,
                    export: true,
                },
            },
            auth_methods: self.config.auth_methods.clone(),
            agent_info: Some(Implementation {
                name: env!("CARGO_PKG_NAME").into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
            }),
        })
    }

    fn authenticate(&self, request: &AuthenticateRequest) -> Result<Empty> {
        if self.config.auth_methods.is_empty() {
            return Err(AppError::Unsupported(
                "authenticate: no authentication methods configured".into(),
            ));
        }
        if !self
            .config
            .auth_methods
            .iter()
            .any(|m| m.id == request.method_id)
        {
            return Err(AppError::InvalidParams(format!(
                "unknown authentication method {}",
                request.method_id
            )));
        }
        info!(method_id = %request.method_id, "authenticated");
        Ok(Empty {})
    }

    async fn logout(&self) -> Result<Empty> {
        if !self.config.supports_logout {
            return Err(AppError::Unsupported("logout is not supported".into()));
        }
        self.prompts.cancel_all();
        let dropped = {
            let mut sessions = self.sessions.lock().await;
            let count = sessions.len();
            sessions.clear();
            count
        };
        self.policy.clear();
        info!(dropped, "logged out");
        Ok(Empty {})
    }

    // ── Session methods ──────────────────────────────────────────────────────

    async fn new_session(&self, request: NewSessionRequest) -> Result<NewSessionResponse> {
        if request.cwd.is_empty() {
            return Err(AppError::InvalidParams("cwd must not be empty".into()));
        }
        let id = new_session_id();
        let executor = self.executors.create(&id, &request.cwd);
        let session = Session::new(id.clone(), request.cwd, &self.config, executor);
        let state = session.state();
        self.sessions.lock().await.insert(id.clone(), session);
        info!(session_id = %id, "session created");
        Ok(NewSessionResponse {
            session_id: id,
            state,
        })
    }

    async fn list_sessions(&self, request: ListSessionsRequest) -> Result<ListSessionsResponse> {
        let sessions = self.sessions.lock().await;
        let mut matching: Vec<&Session> = sessions
            .values()
            .filter(|s| request.cwd.as_ref().is_none_or(|cwd| &s.cwd == cwd))
            .collect();
        matching.sort_by(|a, b| {
            b.last_touch
                .cmp(&a.last_touch)
                .then_with(|| a.id.cmp(&b.id))
        });

        let total = matching.len();
        let start = match request.cursor.as_deref() {
            Some(raw) => cursor::decode(raw, total)?,
            None => 0,
        };
        // An unvalidated page size of zero would hand back the same cursor forever.
        let page = self.config.list_page_size.max(1);
        let end = start.saturating_add(page).min(total);
        Ok(ListSessionsResponse {
            sessions: matching[start..end].iter().copied().map(Session::info).collect(),
            next_cursor: (end < total).then(|| cursor::encode(end)),
        })
    }

    async fn load_session(&self, request: LoadSessionRequest) -> Result<SessionState> {
        let (state, transcript) = {
            let mut sessions = self.sessions.lock().await;
            let session = Self::session_mut(&mut sessions, &request.session_id)?;
            session.cwd = request.cwd;
            session.touch();
            (session.state(), session.transcript.clone())
        };
        for turn in transcript {
            self.notify(
                &request.session_id,
                SessionUpdate::UserMessageChunk {
                    content: ContentBlock::text(turn.prompt),
                },
            );
            self.notify(
                &request.session_id,
                SessionUpdate::AgentMessageChunk {
                    content: ContentBlock::text(turn.response),
                },
            );
        }
        Ok(state)
    }

    async fn resume_session(&self, request: SessionTargetRequest) -> Result<SessionState> {
        let mut sessions = self.sessions.lock().await;
        let session = Self::session_mut(&mut sessions, &request.session_id)?;
        if let Some(cwd) = request.cwd {
            session.cwd = cwd;
        }
        session.touch();
        Ok(session.state())
    }

    async fn fork_session(&self, request: SessionTargetRequest) -> Result<NewSessionResponse> {
        let mut sessions = self.sessions.lock().await;
        let source = sessions
            .get(&request.session_id)
            .ok_or_else(|| unknown_session(&request.session_id))?;
        let id = new_session_id();
        let cwd = request.cwd.as_deref().unwrap_or(&source.cwd);
        let executor = self.executors.create(&id, cwd);
        let fork = source.fork(id.clone(), request.cwd, executor);
        let state = fork.state();
        sessions.insert(id.clone(), fork);
        info!(session_id = %id, source = %request.session_id, "session forked");
        Ok(NewSessionResponse {
            session_id: id,
            state,
        })
    }

    async fn delete_session(&self, request: &SessionIdParams) -> Result<Empty> {
        self.prompts.cancel_session(&request.session_id);
        self.sessions
            .lock()
            .await
            .remove(&request.session_id)
            .ok_or_else(|| unknown_session(&request.session_id))?;
        info!(session_id = %request.session_id, "session deleted");
        Ok(Empty {})
    }

    async fn set_mode(&self, request: SetSessionModeRequest) -> Result<Empty> {
        {
            let mut sessions = self.sessions.lock().await;
            let session = Self::session_mut(&mut sessions, &request.session_id)?;
            let modes = session
                .modes
                .as_mut()
                .ok_or_else(|| AppError::InvalidParams("session has no modes".into()))?;
            if !modes.available_modes.iter().any(|m| m.id == request.mode_id) {
                return Err(AppError::InvalidParams(format!(
                    "unknown mode {}",
                    request.mode_id
                )));
            }
            modes.current_mode_id.clone_from(&request.mode_id);
            session.touch();
        }
        self.notify(
            &request.session_id,
            SessionUpdate::CurrentModeUpdate {
                current_mode_id: request.mode_id,
            },
        );
        Ok(Empty {})
    }

    async fn set_model(&self, request: SetSessionModelRequest) -> Result<Empty> {
        {
            let mut sessions = self.sessions.lock().await;
            let session = Self::session_mut(&mut sessions, &request.session_id)?;
            let models = session
                .models
                .as_mut()
                .ok_or_else(|| AppError::InvalidParams("session has no models".into()))?;
            if !models
                .available_models
                .iter()
                .any(|m| m.model_id == request.model_id)
            {
                return Err(AppError::InvalidParams(format!(
                    "unknown model {}",
                    request.model_id
                )));
            }
            models.current_model_id.clone_from(&request.model_id);
            session.touch();
        }
        self.notify(
            &request.session_id,
            SessionUpdate::CurrentModelUpdate {
                current_model_id: request.model_id,
            },
        );
        Ok(Empty {})
    }

    async fn set_config_option(
        &self,
        request: SetSessionConfigOptionRequest,
    ) -> Result<SetSessionConfigOptionResponse> {
        let config_options = {
            let mut sessions = self.sessions.lock().await;
            let session = Self::session_mut(&mut sessions, &request.session_id)?;
            let option = session
                .config_options
                .iter_mut()
                .find(|o| o.id == request.config_id)
                .ok_or_else(|| {
                    AppError::InvalidParams(format!("unknown config option {}", request.config_id))
                })?;
            if !option.options.iter().any(|v| v.value == request.value) {
                return Err(AppError::InvalidParams(format!(
                    "value {} is not allowed for {}",
                    request.value, request.config_id
                )));
            }
            option.current_value.clone_from(&request.value);
            session.touch();
            session.config_options.clone()
        };
        self.notify(
            &request.session_id,
            SessionUpdate::ConfigOptionUpdate {
                config_options: config_options.clone(),
            },
        );
        Ok(SetSessionConfigOptionResponse { config_options })
    }

    // ── Prompt turn ──────────────────────────────────────────────────────────

    async fn prompt(&self, request_id: RequestId, request: PromptRequest) -> Result<PromptResponse> {
        let session_id = request.session_id;
        let text = prompt_text(&request.prompt);

        let (guard, executor) = {
            let mut sessions = self.sessions.lock().await;
            let session = Self::session_mut(&mut sessions, &session_id)?;
            let guard = self.prompts.begin(&session_id, request_id)?;
            session.touch();
            (guard, Arc::clone(&session.executor))
        };

        let span = info_span!("prompt_turn", session_id = %session_id);
        async {
            let tool_call_id = format!("call_{}", Uuid::new_v4().simple());

            // ── Permission ───────────────────────────────────
            if let Some(ref bridge) = self.bridge {
                let ask = RequestPermissionRequest {
                    session_id: session_id.clone(),
                    tool_call: ToolCallUpdate {
                        title: Some(PROMPT_TOOL_TITLE.into()),
                        kind: Some(ToolKind::Execute),
                        raw_input: Some(json!({ "prompt": text })),
                        ..ToolCallUpdate::status(tool_call_id.clone(), ToolCallStatus::Pending)
                    },
                    options: PermissionOption::canned(),
                };
                let outcome = match self.policy.evaluate(&ask) {
                    Some(outcome) => outcome,
                    None => {
                        let decided = tokio::select! {
                            biased;
                            () = guard.cancelled() => None,
                            response = bridge.request(&ask) => Some(response?.outcome),
                        };
                        match decided {
                            Some(outcome) => {
                                self.policy.remember(&ask, &outcome);
                                outcome
                            }
                            None => RequestPermissionOutcome::Cancelled,
                        }
                    }
                };
                if guard.origin() == Some(CancelOrigin::Request) {
                    return Err(AppError::Rpc(RpcError::request_cancelled()));
                }
                if !outcome.is_allowed() {
                    info!("prompt not permitted");
                    return Ok(PromptResponse {
                        stop_reason: StopReason::Cancelled,
                    });
                }
            }

            // ── Execution ────────────────────────────────────
            let limit = self.config.prompt_timeout();
            let mut task = tokio::spawn({
                let text = text.clone();
                async move { executor.prompt(text).await }
            });
            let deadline = async {
                match limit {
                    Some(limit) => tokio::time::sleep(limit).await,
                    None => std::future::pending().await,
                }
            };
            let joined = tokio::select! {
                biased;
                () = guard.cancelled() => None,
                () = deadline => {
                    guard.mark_timeout();
                    None
                }
                joined = &mut task => Some(joined),
            };

            let response = match joined {
                Some(Ok(result)) => result?,
                Some(Err(err)) => return Err(AppError::Io(format!("prompt task failed: {err}"))),
                None => {
                    task.abort();
                    return Self::interrupted(guard.origin(), limit);
                }
            };

            // ── Updates ──────────────────────────────────────
            self.emit_turn(&session_id, &tool_call_id, &text, &response);
            self.record_turn(&session_id, text, response).await;
            info!("prompt completed");
            Ok(PromptResponse {
                stop_reason: StopReason::EndTurn,
            })
        }
        .instrument(span)
        .await
    }

    fn interrupted(origin: Option<CancelOrigin>, limit: Option<Duration>) -> Result<PromptResponse> {
        match origin {
            Some(CancelOrigin::Request) => {
                info!("prompt cancelled by request");
                Err(AppError::Rpc(RpcError::request_cancelled()))
            }
            Some(CancelOrigin::Timeout) => {
                let limit = limit.unwrap_or_default();
                warn!(?limit, "prompt timed out");
                Err(AppError::Rpc(RpcError::internal(format!(
                    "prompt timed out after {limit:?}"
                ))))
            }
            Some(CancelOrigin::Session) | None => {
                info!("prompt cancelled by session");
                Ok(PromptResponse {
                    stop_reason: StopReason::Cancelled,
                })
            }
        }
    }

    fn emit_turn(&self, session_id: &str, tool_call_id: &str, prompt: &str, response: &str) {
        self.notify(
            session_id,
            SessionUpdate::AvailableCommandsUpdate {
                available_commands: self.config.commands.clone(),
            },
        );
        self.notify(
            session_id,
            SessionUpdate::Plan {
                entries: vec![PlanEntry {
                    content: "Respond to the prompt".into(),
                    priority: PlanEntryPriority::Medium,
                    status: PlanEntryStatus::Completed,
                }],
            },
        );
        self.notify(
            session_id,
            SessionUpdate::ToolCallUpdate(ToolCallUpdate {
                title: Some(PROMPT_TOOL_TITLE.into()),
                kind: Some(ToolKind::Execute),
                raw_input: Some(json!({ "prompt": prompt })),
                ..ToolCallUpdate::status(tool_call_id, ToolCallStatus::InProgress)
            }),
        );
        self.notify(
            session_id,
            SessionUpdate::ToolCallUpdate(ToolCallUpdate {
                raw_output: Some(json!({ "response": response })),
                ..ToolCallUpdate::status(tool_call_id, ToolCallStatus::Completed)
            }),
        );
        self.notify(
            session_id,
            SessionUpdate::AgentMessageChunk {
                content: ContentBlock::text(response),
            },
        );
    }

    /// Append the turn to the transcript and title the session on its first
    /// output. A session deleted mid-turn is left alone.
    async fn record_turn(&self, session_id: &str, prompt: String, response: String) {
        let titled = {
            let mut sessions = self.sessions.lock().await;
            let Some(session) = sessions.get_mut(session_id) else {
                return;
            };
            let first_output = !session.produced_output;
            session.produced_output = true;
            let title = if first_output && self.config.auto_title {
                session::auto_title(&prompt)
            } else {
                None
            };
            session.transcript.push(TranscriptTurn {
                prompt,
                response,
                completed_at: session::timestamp(Utc::now()),
            });
            session.touch();
            title.map(|title| {
                session.title = Some(title.clone());
                (title, session::timestamp(session.updated_at))
            })
        };
        if let Some((title, updated_at)) = titled {
            self.notify(
                session_id,
                SessionUpdate::SessionInfoUpdate {
                    title: Some(title),
                    updated_at: Some(updated_at),
                },
            );
        }
    }
}
