//! `session/update` notification payloads.
//!
//! The `sessionUpdate` discriminator selects exactly one payload shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::content::ContentBlock;
use super::schema::SessionConfigOption;

/// Category of tool being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Reading files or data.
    Read,
    /// Modifying files or content.
    Edit,
    /// Removing files or data.
    Delete,
    /// Moving or renaming.
    Move,
    /// Searching.
    Search,
    /// Running commands or code.
    Execute,
    /// Internal reasoning.
    Think,
    /// Retrieving external data.
    Fetch,
    /// Switching session mode.
    SwitchMode,
    /// Anything else.
    Other,
}

/// Execution status of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// Not started yet.
    Pending,
    /// Currently running.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

/// A newly reported tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Identifier unique within the session.
    pub tool_call_id: String,
    /// Human-readable title.
    pub title: String,
    /// Tool category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ToolKind>,
    /// Current status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ToolCallStatus>,
    /// Raw tool input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_input: Option<Value>,
    /// Produced content.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<Value>,
}

/// Partial update to a previously reported tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallUpdate {
    /// Tool call being updated.
    pub tool_call_id: String,
    /// Updated title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Updated category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ToolKind>,
    /// Updated status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ToolCallStatus>,
    /// Raw tool input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_input: Option<Value>,
    /// Raw tool output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<Value>,
    /// Replacement content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<Value>>,
}

impl ToolCallUpdate {
    /// Status-only update for `tool_call_id`.
    pub fn status(tool_call_id: impl Into<String>, status: ToolCallStatus) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            title: None,
            kind: None,
            status: Some(status),
            raw_input: None,
            raw_output: None,
            content: None,
        }
    }
}

/// Priority of a plan entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanEntryPriority {
    /// High.
    High,
    /// Medium.
    Medium,
    /// Low.
    Low,
}

/// Status of a plan entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanEntryStatus {
    /// Not started.
    Pending,
    /// Being worked on.
    InProgress,
    /// Done.
    Completed,
}

/// One step of the agent's plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanEntry {
    /// What the step does.
    pub content: String,
    /// Relative importance.
    pub priority: PlanEntryPriority,
    /// Progress.
    pub status: PlanEntryStatus,
}

/// Slash command the client may offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableCommand {
    /// Command name without the leading slash.
    pub name: String,
    /// Description shown to the user.
    pub description: String,
    /// Input hint, if the command takes an argument.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_hint: Option<String>,
}

/// Coarse execution state of the agent for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// No prompt running.
    Idle,
    /// A prompt is running.
    Running,
    /// Waiting on a permission decision.
    AwaitingPermission,
    /// The running prompt was cancelled.
    Cancelled,
}

/// Payload of a `session/update` notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sessionUpdate", rename_all = "snake_case")]
pub enum SessionUpdate {
    /// Replayed or echoed user content.
    UserMessageChunk {
        /// Chunk content.
        content: ContentBlock,
    },
    /// Agent response content.
    AgentMessageChunk {
        /// Chunk content.
        content: ContentBlock,
    },
    /// Agent reasoning content.
    AgentThoughtChunk {
        /// Chunk content.
        content: ContentBlock,
    },
    /// New tool call.
    ToolCall(ToolCall),
    /// Tool call progress.
    ToolCallUpdate(ToolCallUpdate),
    /// Full replacement of the plan.
    Plan {
        /// Plan steps.
        entries: Vec<PlanEntry>,
    },
    /// Commands the client may offer.
    #[serde(rename_all = "camelCase")]
    AvailableCommandsUpdate {
        /// Commands.
        available_commands: Vec<AvailableCommand>,
    },
    /// Session mode changed.
    #[serde(rename_all = "camelCase")]
    CurrentModeUpdate {
        /// New mode id.
        current_mode_id: String,
    },
    /// Session model changed.
    #[serde(rename_all = "camelCase")]
    CurrentModelUpdate {
        /// New model id.
        current_model_id: String,
    },
    /// Config options changed.
    #[serde(rename_all = "camelCase")]
    ConfigOptionUpdate {
        /// Full option list after the change.
        config_options: Vec<SessionConfigOption>,
    },
    /// Session metadata changed.
    #[serde(rename_all = "camelCase")]
    SessionInfoUpdate {
        /// New title.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        /// RFC 3339 timestamp of the change.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        updated_at: Option<String>,
    },
    /// Execution state changed.
    ExecutionStateUpdate {
        /// New state.
        state: ExecutionState,
        /// Optional detail.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// The agent is retrying a failed upstream call.
    #[serde(rename_all = "camelCase")]
    Retry {
        /// 1-based attempt number.
        attempt: u32,
        /// Attempt ceiling.
        max_attempts: u32,
        /// Delay before the next attempt.
        delay_ms: u64,
        /// Failure that triggered the retry.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Audit trail entry.
    Audit {
        /// Event name.
        event: String,
        /// RFC 3339 timestamp.
        timestamp: String,
        /// Structured detail.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<Value>,
    },
}

impl SessionUpdate {
    /// The wire discriminator.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserMessageChunk { .. } => "user_message_chunk",
            Self::AgentMessageChunk { .. } => "agent_message_chunk",
            Self::AgentThoughtChunk { .. } => "agent_thought_chunk",
            Self::ToolCall(_) => "tool_call",
            Self::ToolCallUpdate(_) => "tool_call_update",
            Self::Plan { .. } => "plan",
            Self::AvailableCommandsUpdate { .. } => "available_commands_update",
            Self::CurrentModeUpdate { .. } => "current_mode_update",
            Self::CurrentModelUpdate { .. } => "current_model_update",
            Self::ConfigOptionUpdate { .. } => "config_option_update",
            Self::SessionInfoUpdate { .. } => "session_info_update",
            Self::ExecutionStateUpdate { .. } => "execution_state_update",
            Self::Retry { .. } => "retry",
            Self::Audit { .. } => "audit",
        }
    }
}

/// Params of a `session/update` notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionNotification {
    /// Session the update belongs to.
    pub session_id: String,
    /// The update.
    pub update: SessionUpdate,
}
