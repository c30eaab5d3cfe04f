//! Worker wire protocol types.
//!
//! Defines the request/response types for communication between tgdeck and the
//! Telegram worker process. The protocol uses newline-delimited JSON over the
//! worker's stdin/stdout: one command per line in, one message per line out.
//! Field names are camelCase on the wire to match the worker script.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol actions the worker understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerAction {
    /// Attach a logical session inside the worker.
    Connect,
    /// Detach a logical session.
    Disconnect,
    /// Send a message through an attached session.
    SendMessage,
}

impl std::fmt::Display for WorkerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerAction::Connect => write!(f, "connect"),
            WorkerAction::Disconnect => write!(f, "disconnect"),
            WorkerAction::SendMessage => write!(f, "send_message"),
        }
    }
}

/// One command line written to the worker's stdin.
///
/// `request_id` is unique per command and must be echoed by the matching
/// response; it is the only correlation key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerCommand {
    pub action: WorkerAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub request_id: String,
}

/// One message line read from the worker's stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Worker lifecycle status. `status: "ready"` signals the worker is
    /// accepting commands.
    Status(WorkerStatus),

    /// Reply to a previously sent command, matched by `request_id`.
    Response(WorkerResponse),

    /// Unsolicited event tagged with the session that produced it.
    Event(WorkerEvent),
}

impl WorkerMessage {
    /// Parse a single stdout line into a message.
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

/// Worker status line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub status: String,
}

impl WorkerStatus {
    pub fn is_ready(&self) -> bool {
        self.status == "ready"
    }
}

/// Response to a command. Carries `success` plus either `data` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResponse {
    #[serde(default)]
    pub request_id: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Unsolicited event from the worker (e.g. an inbound Telegram message).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerEvent {
    pub session_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}
