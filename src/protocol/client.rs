//! Request and response shapes for methods the client answers.
//!
//! The agent issues these as server-initiated requests in the middle of a
//! prompt turn: permission asks, text file access, and terminal control.

use serde::{Deserialize, Serialize};

use super::update::ToolCallUpdate;

// ── session/requestPermission ─────────────────────────────────────────────────

/// How a permission option should be treated by the user interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOptionKind {
    /// Allow this one action.
    AllowOnce,
    /// Allow this action and remember the decision.
    AllowAlways,
    /// Reject this one action.
    RejectOnce,
    /// Reject this action and remember the decision.
    RejectAlways,
}

/// One choice offered in a permission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionOption {
    /// Id echoed back in the selected outcome.
    pub option_id: String,
    /// Display label.
    pub name: String,
    /// Semantic kind.
    pub kind: PermissionOptionKind,
}

impl PermissionOption {
    /// The four canned options offered before a prompt executes.
    ///
    /// Option ids mirror the kinds (`allow_once`, `allow_always`,
    /// `reject_once`, `reject_always`), so an id starting with `allow`
    /// grants the request.
    #[must_use]
    pub fn canned() -> Vec<Self> {
        [
            ("allow_once", "Allow once", PermissionOptionKind::AllowOnce),
            ("allow_always", "Always allow", PermissionOptionKind::AllowAlways),
            ("reject_once", "Reject", PermissionOptionKind::RejectOnce),
            ("reject_always", "Always reject", PermissionOptionKind::RejectAlways),
        ]
        .into_iter()
        .map(|(id, name, kind)| Self {
            option_id: id.to_owned(),
            name: name.to_owned(),
            kind,
        })
        .collect()
    }
}

/// `session/requestPermission` params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPermissionRequest {
    /// Session the action belongs to.
    pub session_id: String,
    /// The action awaiting approval.
    pub tool_call: ToolCallUpdate,
    /// Choices offered to the user.
    pub options: Vec<PermissionOption>,
}

/// Decision carried by a permission response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RequestPermissionOutcome {
    /// The prompt turn was cancelled before a decision was made.
    Cancelled,
    /// The user picked one of the offered options.
    #[serde(rename_all = "camelCase")]
    Selected {
        /// The chosen [`PermissionOption::option_id`].
        option_id: String,
    },
}

impl RequestPermissionOutcome {
    /// Selection of `option_id`.
    pub fn selected(option_id: impl Into<String>) -> Self {
        Self::Selected {
            option_id: option_id.into(),
        }
    }

    /// Whether this outcome grants the request.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Selected { option_id } if option_id.starts_with("allow"))
    }
}

/// `session/requestPermission` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPermissionResponse {
    /// The decision.
    pub outcome: RequestPermissionOutcome,
}

// ── fs/* ──────────────────────────────────────────────────────────────────────

/// `fs/readTextFile` params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadTextFileRequest {
    /// Requesting session.
    pub session_id: String,
    /// Absolute path, or relative to the workspace root.
    pub path: String,
    /// 1-based first line to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Maximum number of lines to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// `fs/readTextFile` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadTextFileResponse {
    /// File content, sliced by `line` / `limit`.
    pub content: String,
}

/// `fs/writeTextFile` params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteTextFileRequest {
    /// Requesting session.
    pub session_id: String,
    /// Absolute path, or relative to the workspace root.
    pub path: String,
    /// Full replacement content.
    pub content: String,
}

// ── terminal/* ────────────────────────────────────────────────────────────────

/// An environment variable for a spawned command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVariable {
    /// Variable name.
    pub name: String,
    /// Variable value.
    pub value: String,
}

/// `terminal/create` params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTerminalRequest {
    /// Requesting session.
    pub session_id: String,
    /// Program to run.
    pub command: String,
    /// Program arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment.
    #[serde(default)]
    pub env: Vec<EnvVariable>,
    /// Working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Bytes of output retained; older output is dropped first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_byte_limit: Option<u64>,
}

/// `terminal/create` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTerminalResponse {
    /// Handle for the other terminal methods.
    pub terminal_id: String,
}

/// Params of `terminal/output`, `waitForExit`, `kill`, and `release`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalRequest {
    /// Requesting session.
    pub session_id: String,
    /// Terminal addressed.
    pub terminal_id: String,
}

/// How a terminal command ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalExitStatus {
    /// Exit code, if the process exited normally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Terminating signal, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
}

/// `terminal/output` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalOutputResponse {
    /// Captured output.
    pub output: String,
    /// Whether older output was dropped to respect the byte limit.
    pub truncated: bool,
    /// Exit status, once the command has finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<TerminalExitStatus>,
}

/// `terminal/waitForExit` result.
pub type WaitForExitResponse = TerminalExitStatus;
