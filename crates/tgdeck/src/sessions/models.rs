//! Bot session data models.

use serde::{Deserialize, Serialize};

/// Connection status of a bot session.
///
/// `Active` means the worker acknowledged a connect command for this session
/// and it has not been disconnected since. The status is never set
/// speculatively on send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SessionStatus {
    Inactive,
    Active,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Inactive => write!(f, "inactive"),
            SessionStatus::Active => write!(f, "active"),
        }
    }
}

/// A user-owned Telegram session.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BotSession {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub api_id: i64,
    /// Opaque to the core; forwarded to the worker as-is.
    #[serde(skip_serializing)]
    pub api_hash: String,
    #[serde(skip_serializing)]
    pub session_string: String,
    pub status: SessionStatus,
    pub created_at: String,
}

/// Fields for creating a new bot session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBotSession {
    pub owner_id: i64,
    pub name: String,
    pub api_id: i64,
    pub api_hash: String,
    pub session_string: String,
}
