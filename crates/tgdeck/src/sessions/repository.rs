//! Bot session database repository.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::{BotSession, NewBotSession, SessionStatus};

const SESSION_COLUMNS: &str =
    "id, owner_id, name, api_id, api_hash, session_string, status, created_at";

/// Repository for bot session persistence.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    /// Create a new repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new bot session.
    pub async fn create(&self, new: &NewBotSession) -> Result<BotSession> {
        let session = sqlx::query_as::<_, BotSession>(&format!(
            "INSERT INTO bot_sessions (owner_id, name, api_id, api_hash, session_string) \
             VALUES (?, ?, ?, ?, ?) RETURNING {SESSION_COLUMNS}",
        ))
        .bind(new.owner_id)
        .bind(&new.name)
        .bind(new.api_id)
        .bind(&new.api_hash)
        .bind(&new.session_string)
        .fetch_one(&self.pool)
        .await
        .context("creating bot session")?;

        Ok(session)
    }

    /// Get a session by id.
    pub async fn get(&self, id: i64) -> Result<Option<BotSession>> {
        let session = sqlx::query_as::<_, BotSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM bot_sessions WHERE id = ?",
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("fetching bot session")?;

        Ok(session)
    }

    /// List sessions owned by a user.
    pub async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<BotSession>> {
        let sessions = sqlx::query_as::<_, BotSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM bot_sessions WHERE owner_id = ? ORDER BY created_at DESC",
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .context("listing bot sessions")?;

        Ok(sessions)
    }

    /// Update session connection status.
    pub async fn update_status(&self, id: i64, status: SessionStatus) -> Result<()> {
        sqlx::query("UPDATE bot_sessions SET status = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("updating session status")?;

        Ok(())
    }

    /// Mark every session inactive. Used after a worker crash, when all
    /// worker-side state is lost.
    pub async fn mark_all_inactive(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE bot_sessions SET status = 'inactive' WHERE status = 'active'")
            .execute(&self.pool)
            .await
            .context("marking sessions inactive")?;

        Ok(result.rows_affected())
    }

    /// Delete a session.
    pub async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM bot_sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("deleting bot session")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::user::UserRepository;

    async fn setup() -> (SessionRepository, i64) {
        let db = Database::in_memory().await.unwrap();
        let users = UserRepository::new(db.pool().clone());
        let owner = users.create("alice").await.unwrap();
        (SessionRepository::new(db.pool().clone()), owner.id)
    }

    fn sample(owner_id: i64) -> NewBotSession {
        NewBotSession {
            owner_id,
            name: "main".to_string(),
            api_id: 12345,
            api_hash: "abcdef".to_string(),
            session_string: "1Aa...".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_defaults_to_inactive() {
        let (repo, owner) = setup().await;
        let session = repo.create(&sample(owner)).await.unwrap();
        assert_eq!(session.status, SessionStatus::Inactive);
        assert_eq!(session.owner_id, owner);
    }

    #[tokio::test]
    async fn test_status_roundtrip() {
        let (repo, owner) = setup().await;
        let session = repo.create(&sample(owner)).await.unwrap();

        repo.update_status(session.id, SessionStatus::Active)
            .await
            .unwrap();
        let fetched = repo.get(session.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, SessionStatus::Active);

        repo.mark_all_inactive().await.unwrap();
        let fetched = repo.get(session.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, SessionStatus::Inactive);
    }
}
