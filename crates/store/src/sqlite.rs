//! SQLite conversation store.
//!
//! Uses a single SQLite database file with three tables:
//! - `conversations` — one JSON-encoded `ConversationState` per row
//! - `checkpoints` — suspended handler snapshots keyed by
//!   `(conversation_id, checkpoint_id)`
//! - `personas` — per-user persona records
//!
//! Each save is a single upsert statement, so it is atomic.

use async_trait::async_trait;
use switchyard_core::error::StoreError;
use switchyard_core::{
    Checkpoint, ConversationState, ConversationStore, ConversationSummary, PersonaSettings,
    PersonaStore,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// A production SQLite conversation store.
pub struct SqliteStore {
    pool: SqlitePool,
}

/// Connection-level failures are reported as unavailability so callers can retry.
fn db_error(context: &str, e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(format!("{context}: {e}"))
        }
        other => StoreError::QueryFailed(format!("{context}: {other}")),
    }
}

fn decode_error(context: &str, e: serde_json::Error) -> StoreError {
    StoreError::Storage(format!("{context}: corrupt JSON: {e}"))
}

impl SqliteStore {
    /// Create a new SQLite store from a file path.
    ///
    /// The database and all tables are created automatically.
    /// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite conversation store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                conversation_id TEXT PRIMARY KEY NOT NULL,
                user_id         TEXT NOT NULL,
                version         INTEGER NOT NULL DEFAULT 0,
                state           TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversations table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id, updated_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversations index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                conversation_id TEXT NOT NULL,
                checkpoint_id   TEXT NOT NULL,
                handler         TEXT NOT NULL,
                data            TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                consumed_at     TEXT,
                PRIMARY KEY (conversation_id, checkpoint_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("checkpoints table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS personas (
                user_id TEXT PRIMARY KEY NOT NULL,
                data    TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("personas table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Total stored conversations.
    pub async fn count(&self) -> Result<usize, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM conversations")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("count", e))?;
        let n: i64 = row.try_get("n").map_err(|e| db_error("count", e))?;
        Ok(n as usize)
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationState>, StoreError> {
        let row = sqlx::query("SELECT state FROM conversations WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("load", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let json: String = row.try_get("state").map_err(|e| db_error("load", e))?;
        let state = serde_json::from_str(&json).map_err(|e| decode_error("load", e))?;
        Ok(Some(state))
    }

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        let json = serde_json::to_string(state)
            .map_err(|e| StoreError::Storage(format!("save: encode failed: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO conversations (conversation_id, user_id, version, state, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(conversation_id) DO UPDATE SET
                user_id = excluded.user_id,
                version = excluded.version,
                state = excluded.state,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.conversation_id)
        .bind(&state.user_id)
        .bind(state.version as i64)
        .bind(&json)
        .bind(state.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("save", e))?;

        debug!(conversation_id = %state.conversation_id, version = state.version, "Conversation saved");
        Ok(())
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let json = serde_json::to_string(checkpoint)
            .map_err(|e| StoreError::Storage(format!("save_checkpoint: encode failed: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO checkpoints (conversation_id, checkpoint_id, handler, data, created_at, consumed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(conversation_id, checkpoint_id) DO UPDATE SET
                data = excluded.data,
                consumed_at = excluded.consumed_at
            "#,
        )
        .bind(&checkpoint.conversation_id)
        .bind(&checkpoint.checkpoint_id)
        .bind(&checkpoint.handler)
        .bind(&json)
        .bind(checkpoint.created_at.to_rfc3339())
        .bind(checkpoint.consumed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("save_checkpoint", e))?;
        Ok(())
    }

    async fn load_checkpoint(
        &self,
        conversation_id: &str,
        checkpoint_id: &str,
    ) -> Result<Option<Checkpoint>, StoreError> {
        let row = sqlx::query(
            "SELECT data FROM checkpoints WHERE conversation_id = ? AND checkpoint_id = ?",
        )
        .bind(conversation_id)
        .bind(checkpoint_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("load_checkpoint", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let json: String = row.try_get("data").map_err(|e| db_error("load_checkpoint", e))?;
        let checkpoint = serde_json::from_str(&json).map_err(|e| decode_error("load_checkpoint", e))?;
        Ok(Some(checkpoint))
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>, StoreError> {
        let rows = sqlx::query(
            "SELECT conversation_id, state FROM conversations WHERE user_id = ? ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list_conversations", e))?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let json: String = row
                .try_get("state")
                .map_err(|e| db_error("list_conversations", e))?;
            match serde_json::from_str::<ConversationState>(&json) {
                Ok(state) => summaries.push(state.summary()),
                Err(e) => {
                    let id: String = row.try_get("conversation_id").unwrap_or_default();
                    warn!(conversation_id = %id, "Skipping unreadable conversation: {e}");
                }
            }
        }
        Ok(summaries)
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<bool, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("delete_conversation", e))?;

        sqlx::query("DELETE FROM checkpoints WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("delete_conversation", e))?;

        let result = sqlx::query("DELETE FROM conversations WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("delete_conversation", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("delete_conversation", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("health check: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl PersonaStore for SqliteStore {
    async fn load_persona(&self, user_id: &str) -> Result<Option<PersonaSettings>, StoreError> {
        let row = sqlx::query("SELECT data FROM personas WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("load_persona", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let json: String = row.try_get("data").map_err(|e| db_error("load_persona", e))?;
        let persona = serde_json::from_str(&json).map_err(|e| decode_error("load_persona", e))?;
        Ok(Some(persona))
    }

    async fn save_persona(&self, persona: &PersonaSettings) -> Result<(), StoreError> {
        let json = serde_json::to_string(persona)
            .map_err(|e| StoreError::Storage(format!("save_persona: encode failed: {e}")))?;
        sqlx::query(
            "INSERT INTO personas (user_id, data) VALUES (?, ?) ON CONFLICT(user_id) DO UPDATE SET data = excluded.data",
        )
        .bind(&persona.user_id)
        .bind(&json)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("save_persona", e))?;
        Ok(())
    }
}
