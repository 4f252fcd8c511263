//! SQLite backend for history, profiles, and analytics.
//!
//! One database file, three tables:
//! - `conversation_turns` — append-only question/answer pairs
//! - `profiles` — one row per user: grade and consolidated memory text
//! - `analytics_events` — usage events with JSON metadata

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clinq_core::error::StoreError;
use clinq_core::message::ConversationId;
use clinq_core::store::{
    AnalyticsEvent, AnalyticsSink, ConversationTurn, HistoryStore, Profile, ProfileStore,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url`.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database.
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {url}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversation_turns (
                iid             INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL,
                user_id         TEXT,
                question        TEXT NOT NULL,
                answer          TEXT NOT NULL,
                created_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversation_turns table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_turns_conversation ON conversation_turns(conversation_id, iid)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversation index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                user_id             TEXT PRIMARY KEY,
                grade               TEXT,
                custom_instructions TEXT NOT NULL DEFAULT '',
                updated_at          TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("profiles table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analytics_events (
                iid        INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id    TEXT,
                event_type TEXT NOT NULL,
                metadata   TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("analytics_events table: {e}")))?;

        Ok(())
    }

    /// Number of analytics events recorded.
    pub async fn analytics_count(&self) -> Result<usize, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM analytics_events")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("COUNT: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| StoreError::QueryFailed(format!("cnt column: {e}")))?;
        Ok(cnt as usize)
    }

    fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| StoreError::QueryFailed(format!("Bad timestamp '{raw}': {e}")))
    }

    fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationTurn, StoreError> {
        let col = |name: &str| StoreError::QueryFailed(format!("{name} column"));

        let conversation_id: String = row.try_get("conversation_id").map_err(|_| col("conversation_id"))?;
        let created_at: String = row.try_get("created_at").map_err(|_| col("created_at"))?;

        Ok(ConversationTurn {
            conversation_id: ConversationId(conversation_id),
            user_id: row.try_get("user_id").map_err(|_| col("user_id"))?,
            question: row.try_get("question").map_err(|_| col("question"))?,
            answer: row.try_get("answer").map_err(|_| col("answer"))?,
            created_at: Self::parse_timestamp(&created_at)?,
        })
    }
}

#[async_trait]
impl HistoryStore for SqliteStore {
    async fn append_turn(&self, turn: ConversationTurn) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO conversation_turns (conversation_id, user_id, question, answer, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&turn.conversation_id.0)
        .bind(&turn.user_id)
        .bind(&turn.question)
        .bind(&turn.answer)
        .bind(turn.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT turn failed: {e}")))?;

        debug!(conversation = %turn.conversation_id, "Appended conversation turn");
        Ok(())
    }

    async fn turns(&self, conversation_id: &ConversationId) -> Result<Vec<ConversationTurn>, StoreError> {
        let rows = sqlx::query("SELECT * FROM conversation_turns WHERE conversation_id = ?1 ORDER BY iid ASC")
            .bind(&conversation_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("SELECT turns: {e}")))?;

        rows.iter().map(Self::row_to_turn).collect()
    }
}

#[async_trait]
impl ProfileStore for SqliteStore {
    async fn load(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query("SELECT user_id, grade, custom_instructions FROM profiles WHERE user_id = ?1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("GET profile: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Profile {
            user_id: row
                .try_get("user_id")
                .map_err(|e| StoreError::QueryFailed(format!("user_id column: {e}")))?,
            grade: row
                .try_get("grade")
                .map_err(|e| StoreError::QueryFailed(format!("grade column: {e}")))?,
            custom_instructions: row
                .try_get("custom_instructions")
                .map_err(|e| StoreError::QueryFailed(format!("custom_instructions column: {e}")))?,
        }))
    }

    async fn save_memory(&self, user_id: &str, memory: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO profiles (user_id, custom_instructions, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET
                custom_instructions = excluded.custom_instructions,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(memory)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Profile memory UPSERT failed: {e}")))?;

        debug!(user_id, "Saved consolidated memory");
        Ok(())
    }
}

#[async_trait]
impl AnalyticsSink for SqliteStore {
    async fn record(&self, event: AnalyticsEvent) -> Result<(), StoreError> {
        let metadata = serde_json::to_string(&event.metadata)
            .map_err(|e| StoreError::Storage(format!("Metadata serialization: {e}")))?;

        sqlx::query(
            "INSERT INTO analytics_events (user_id, event_type, metadata, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&event.user_id)
        .bind(&event.event_type)
        .bind(&metadata)
        .bind(event.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT event failed: {e}")))?;

        Ok(())
    }
}
