use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A durable unit of work: a stable opaque identifier, a human title, and a
/// creation timestamp. Owns its messages (cascade-delete) and, by
/// convention, a workspace directory named after its sanitized id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub task_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Tagged category of a persisted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    UserInput,
    AgentMessage,
    ConfirmedPlanLog,
    MajorStepAnnouncement,
    SubStatus,
    Thought,
    ToolResultForChat,
    StatusMessage,
    /// Replayed to the monitor side-channel only; never reconstructs chat UI.
    MonitorLog,
    MonitorError,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::UserInput => "user_input",
            MessageKind::AgentMessage => "agent_message",
            MessageKind::ConfirmedPlanLog => "confirmed_plan_log",
            MessageKind::MajorStepAnnouncement => "major_step_announcement",
            MessageKind::SubStatus => "sub_status",
            MessageKind::Thought => "thought",
            MessageKind::ToolResultForChat => "tool_result_for_chat",
            MessageKind::StatusMessage => "status_message",
            MessageKind::MonitorLog => "monitor_log",
            MessageKind::MonitorError => "monitor_error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "user_input" => MessageKind::UserInput,
            "agent_message" => MessageKind::AgentMessage,
            "confirmed_plan_log" => MessageKind::ConfirmedPlanLog,
            "major_step_announcement" => MessageKind::MajorStepAnnouncement,
            "sub_status" => MessageKind::SubStatus,
            "thought" => MessageKind::Thought,
            "tool_result_for_chat" => MessageKind::ToolResultForChat,
            "status_message" => MessageKind::StatusMessage,
            "monitor_log" => MessageKind::MonitorLog,
            "monitor_error" => MessageKind::MonitorError,
            _ => return None,
        })
    }
}

/// Append-only message record. `payload` is UTF-8, JSON-encoded for
/// structured kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub task_id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
    pub payload: String,
}

/// A file in a task's workspace surfaced to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Image,
    Text,
    Pdf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactView {
    pub kind: ArtifactKind,
    pub filename: String,
    /// Relative path under the task workspace root; the gateway maps this
    /// to a servable URL.
    pub path: String,
    pub modified_at: DateTime<Utc>,
}
