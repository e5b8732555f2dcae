//! Agent Client Protocol method catalog and data model.
//!
//! - `content`: prompt and message content blocks.
//! - `update`: `session/update` notification payloads.
//! - `schema`: request/response shapes for agent-side methods.
//! - `client`: request/response shapes for client-side methods
//!   (permission, filesystem, terminal).

pub mod client;
pub mod content;
pub mod schema;
pub mod update;

pub use content::ContentBlock;
pub use update::{SessionNotification, SessionUpdate};

/// The only protocol version this engine speaks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Result of methods that return nothing but must still answer: `{}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Empty {}

/// Method names used on the wire.
pub mod methods {
    /// Version and capability negotiation.
    pub const INITIALIZE: &str = "initialize";
    /// Authenticate with one of the advertised methods.
    pub const AUTHENTICATE: &str = "authenticate";
    /// Drop all sessions and remembered permission decisions.
    pub const LOGOUT: &str = "logout";
    /// Create a session.
    pub const SESSION_NEW: &str = "session/new";
    /// Page through sessions.
    pub const SESSION_LIST: &str = "session/list";
    /// Load a session, replaying its history.
    pub const SESSION_LOAD: &str = "session/load";
    /// Resume a session without replay.
    pub const SESSION_RESUME: &str = "session/resume";
    /// Clone a session under a fresh id.
    pub const SESSION_FORK: &str = "session/fork";
    /// Remove a session.
    pub const SESSION_DELETE: &str = "session/delete";
    /// Export a session transcript.
    pub const SESSION_EXPORT: &str = "session/export";
    /// Run a prompt turn.
    pub const SESSION_PROMPT: &str = "session/prompt";
    /// Cancel the running prompt turn (notification).
    pub const SESSION_CANCEL: &str = "session/cancel";
    /// Switch session mode.
    pub const SESSION_SET_MODE: &str = "session/setMode";
    /// Switch session model.
    pub const SESSION_SET_MODEL: &str = "session/setModel";
    /// Change a session config option.
    pub const SESSION_SET_CONFIG_OPTION: &str = "session/setConfigOption";
    /// Agent → client permission request.
    pub const SESSION_REQUEST_PERMISSION: &str = "session/requestPermission";
    /// Agent → client session update notification.
    pub const SESSION_UPDATE: &str = "session/update";
    /// Agent → client file read.
    pub const FS_READ_TEXT_FILE: &str = "fs/readTextFile";
    /// Agent → client file write.
    pub const FS_WRITE_TEXT_FILE: &str = "fs/writeTextFile";
    /// Agent → client terminal creation.
    pub const TERMINAL_CREATE: &str = "terminal/create";
    /// Agent → client terminal output snapshot.
    pub const TERMINAL_OUTPUT: &str = "terminal/output";
    /// Agent → client terminal wait.
    pub const TERMINAL_WAIT_FOR_EXIT: &str = "terminal/waitForExit";
    /// Agent → client terminal kill.
    pub const TERMINAL_KILL: &str = "terminal/kill";
    /// Agent → client terminal release.
    pub const TERMINAL_RELEASE: &str = "terminal/release";
    /// Protocol-level cancellation (notification, either direction).
    pub const CANCEL_REQUEST: &str = "$/cancelRequest";
}

/// Methods every conforming agent answers.
pub const STABLE_BASELINE: &[&str] = &[
    methods::INITIALIZE,
    methods::AUTHENTICATE,
    methods::SESSION_NEW,
    methods::SESSION_LOAD,
    methods::SESSION_PROMPT,
    methods::SESSION_CANCEL,
    methods::SESSION_SET_MODE,
];

/// Methods still marked unstable upstream.
pub const UNSTABLE_BASELINE: &[&str] = &[
    methods::SESSION_LIST,
    methods::SESSION_RESUME,
    methods::SESSION_FORK,
    methods::SESSION_SET_MODEL,
    methods::SESSION_SET_CONFIG_OPTION,
    methods::CANCEL_REQUEST,
];

/// Project extensions beyond the upstream catalog.
pub const EXTENSIONS: &[&str] = &[
    methods::LOGOUT,
    methods::SESSION_DELETE,
    methods::SESSION_EXPORT,
];

/// Whether `method` is an agent-side method this engine knows.
#[must_use]
pub fn is_agent_method(method: &str) -> bool {
    STABLE_BASELINE.contains(&method)
        || UNSTABLE_BASELINE.contains(&method)
        || EXTENSIONS.contains(&method)
}
