//! WebSocket wire types.
//!
//! Frames are tagged by `type` with the payload under `data`, matching what
//! the dashboard frontend sends and expects.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tasks::Task;

/// Telegram-side operations a client may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelegramAction {
    Connect,
    Disconnect,
    SendMessage,
}

/// Chain-editor operations a client may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorAction {
    StartTask,
    StopTask,
    StopChain,
}

/// Messages received from a dashboard client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Identity handshake, must be the first message on the socket.
    #[serde(rename_all = "camelCase")]
    Auth { user_id: i64 },

    /// Command routed to the Telegram worker.
    #[serde(rename_all = "camelCase")]
    TelegramCommand {
        action: TelegramAction,
        session_id: i64,
        #[serde(default)]
        params: Option<Value>,
    },

    /// Command operating on dialogue chains and their tasks.
    #[serde(rename_all = "camelCase")]
    EditorCommand {
        action: EditorAction,
        #[serde(default)]
        chain_id: Option<i64>,
        #[serde(default)]
        task_id: Option<i64>,
    },
}

/// Messages pushed to a dashboard client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Auth handshake accepted.
    #[serde(rename_all = "camelCase")]
    AuthSuccess { user_id: i64 },

    /// Something went wrong handling the last message.
    Error { message: String },

    /// Outcome of a telegram command.
    #[serde(rename_all = "camelCase")]
    TelegramResponse {
        action: TelegramAction,
        session_id: i64,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Outcome of an editor command.
    #[serde(rename_all = "camelCase")]
    EditorResponse {
        action: EditorAction,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        task: Option<Task>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// A task changed status or gained log lines.
    TaskUpdate { task: Task },

    /// Unsolicited event surfaced from the worker for one of the user's
    /// sessions.
    #[serde(rename_all = "camelCase")]
    TelegramEvent {
        session_id: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        event_type: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_auth() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"auth","data":{"userId":7}}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Auth { user_id: 7 }));
    }

    #[test]
    fn test_parse_telegram_command() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"telegram_command","data":{"action":"send_message","sessionId":3,"params":{"peer":"@bob","message":"hi"}}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::TelegramCommand {
                action,
                session_id,
                params,
            } => {
                assert_eq!(action, TelegramAction::SendMessage);
                assert_eq!(session_id, 3);
                assert_eq!(params.unwrap()["peer"], "@bob");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_editor_command() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"editor_command","data":{"action":"start_task","chainId":12}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::EditorCommand {
                action,
                chain_id,
                task_id,
            } => {
                assert_eq!(action, EditorAction::StartTask);
                assert_eq!(chain_id, Some(12));
                assert_eq!(task_id, None);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"mystery","data":{}}"#).is_err());
    }

    #[test]
    fn test_serialize_auth_success() {
        let json = serde_json::to_value(ServerMessage::AuthSuccess { user_id: 7 }).unwrap();
        assert_eq!(json, json!({"type": "auth_success", "data": {"userId": 7}}));
    }

    #[test]
    fn test_serialize_telegram_response_omits_empty() {
        let json = serde_json::to_value(ServerMessage::TelegramResponse {
            action: TelegramAction::Connect,
            session_id: 5,
            success: true,
            data: None,
            error: None,
        })
        .unwrap();
        assert_eq!(
            json,
            json!({
                "type": "telegram_response",
                "data": {"action": "connect", "sessionId": 5, "success": true},
            })
        );
    }

    #[test]
    fn test_serialize_telegram_event() {
        let json = serde_json::to_value(ServerMessage::TelegramEvent {
            session_id: 2,
            event_type: Some("newMessage".to_string()),
            data: Some(json!({"message": "hello"})),
        })
        .unwrap();
        assert_eq!(json["type"], "telegram_event");
        assert_eq!(json["data"]["sessionId"], 2);
        assert_eq!(json["data"]["eventType"], "newMessage");
    }
}
