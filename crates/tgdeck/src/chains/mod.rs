//! Dialogue chain persistence.
//!
//! Chains are the node graphs authored in the editor. The graph itself is
//! opaque to the core; only ownership and the active flag matter here.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::SqlitePool;

/// A dialogue chain owned by a user.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DialogueChain {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub graph_json: String,
    pub session_id: Option<i64>,
    pub is_active: bool,
    pub created_at: String,
}

const CHAIN_COLUMNS: &str = "id, owner_id, name, graph_json, session_id, is_active, created_at";

/// Repository for dialogue chain persistence.
#[derive(Debug, Clone)]
pub struct ChainRepository {
    pool: SqlitePool,
}

impl ChainRepository {
    /// Create a new repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new chain.
    pub async fn create(
        &self,
        owner_id: i64,
        name: &str,
        graph_json: &str,
        session_id: Option<i64>,
    ) -> Result<DialogueChain> {
        let chain = sqlx::query_as::<_, DialogueChain>(&format!(
            "INSERT INTO dialogue_chains (owner_id, name, graph_json, session_id) \
             VALUES (?, ?, ?, ?) RETURNING {CHAIN_COLUMNS}",
        ))
        .bind(owner_id)
        .bind(name)
        .bind(graph_json)
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .context("creating dialogue chain")?;

        Ok(chain)
    }

    /// Get a chain by id.
    pub async fn get(&self, id: i64) -> Result<Option<DialogueChain>> {
        let chain = sqlx::query_as::<_, DialogueChain>(&format!(
            "SELECT {CHAIN_COLUMNS} FROM dialogue_chains WHERE id = ?",
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("fetching dialogue chain")?;

        Ok(chain)
    }

    /// List chains owned by a user.
    pub async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<DialogueChain>> {
        let chains = sqlx::query_as::<_, DialogueChain>(&format!(
            "SELECT {CHAIN_COLUMNS} FROM dialogue_chains WHERE owner_id = ? ORDER BY created_at DESC",
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .context("listing dialogue chains")?;

        Ok(chains)
    }

    /// Toggle the active flag while a run is live.
    pub async fn set_active(&self, id: i64, active: bool) -> Result<()> {
        sqlx::query("UPDATE dialogue_chains SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("updating chain active flag")?;

        Ok(())
    }
}
