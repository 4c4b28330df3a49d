//! SQLite session store.
//!
//! Uses a single `context_sessions` table. Timestamps are stored as integer
//! microseconds since the Unix epoch so ordering and the resolvability
//! predicate stay in plain integer comparisons.
//!
//! Every mutation is one conditional `UPDATE`, so concurrent relay
//! instances sharing the database see row-level read-modify-write
//! atomicity without any in-process locking.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobrelay_core::error::StoreError;
use jobrelay_core::session::{ContextSession, ContextSessionStore, JobContext, NewContextSession};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// A production SQLite context session store. Cloning shares the pool.
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Create a store from a SQLite URL.
    ///
    /// The database and all tables/indexes are created automatically.
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Unavailable(format!("Invalid SQLite URL: {e}")))?;
        let in_memory = url.contains(":memory:");
        let store = Self::connect(options, in_memory).await?;
        info!("SQLite session store initialized at {url}");
        Ok(store)
    }

    /// Open (or create) a database file.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new().filename(path);
        let store = Self::connect(options, false).await?;
        info!("SQLite session store initialized at {}", path.display());
        Ok(store)
    }

    async fn connect(options: SqliteConnectOptions, in_memory: bool) -> Result<Self, StoreError> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        // Every connection to `:memory:` is its own database
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to open SQLite: {e}")))?;

        Self::from_pool(pool).await
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create the table and its indexes if missing.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS context_sessions (
                id                   TEXT PRIMARY KEY,
                session_token        TEXT UNIQUE NOT NULL,
                context_data         TEXT NOT NULL,
                bound_identity       TEXT,
                is_active            INTEGER NOT NULL DEFAULT 1,
                expires_at           INTEGER NOT NULL,
                last_accessed_at     INTEGER NOT NULL,
                conversation_started INTEGER NOT NULL DEFAULT 0,
                created_at           INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("context_sessions table: {e}")))?;

        // Fallback lookup: resolvable sessions for one identity, newest access first
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_context_sessions_identity \
             ON context_sessions(bound_identity, last_accessed_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("identity index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Parse a `ContextSession` from a SQLite row.
    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<ContextSession, StoreError> {
        let column = |name: &str, e: sqlx::Error| StoreError::Corrupt(format!("{name} column: {e}"));

        let context_json: String = row
            .try_get("context_data")
            .map_err(|e| column("context_data", e))?;
        let context_data: JobContext = serde_json::from_str(&context_json)
            .map_err(|e| StoreError::Corrupt(format!("context_data JSON: {e}")))?;

        Ok(ContextSession {
            id: row.try_get("id").map_err(|e| column("id", e))?,
            session_token: row
                .try_get("session_token")
                .map_err(|e| column("session_token", e))?,
            context_data,
            bound_identity: row
                .try_get("bound_identity")
                .map_err(|e| column("bound_identity", e))?,
            is_active: row.try_get("is_active").map_err(|e| column("is_active", e))?,
            expires_at: from_micros(
                row.try_get("expires_at").map_err(|e| column("expires_at", e))?,
            )?,
            last_accessed_at: from_micros(
                row.try_get("last_accessed_at")
                    .map_err(|e| column("last_accessed_at", e))?,
            )?,
            conversation_started: row
                .try_get("conversation_started")
                .map_err(|e| column("conversation_started", e))?,
            created_at: from_micros(
                row.try_get("created_at").map_err(|e| column("created_at", e))?,
            )?,
        })
    }

    /// Issue a new session expiring `ttl` from now.
    pub async fn issue(&self, new: NewContextSession) -> Result<ContextSession, StoreError> {
        let now = Utc::now();
        let expires_at = crate::expiry_after(now, new.ttl)?;
        let session = ContextSession {
            id: Uuid::new_v4().to_string(),
            session_token: new.session_token.unwrap_or_else(crate::generate_token),
            context_data: new.context_data,
            bound_identity: None,
            is_active: true,
            expires_at,
            last_accessed_at: now,
            conversation_started: false,
            created_at: now,
        };
        self.insert(&session).await?;
        Ok(session)
    }

    /// Insert a fully specified session. Tokens must be unique.
    pub async fn insert(&self, session: &ContextSession) -> Result<(), StoreError> {
        let context_json = serde_json::to_string(&session.context_data)
            .map_err(|e| StoreError::WriteFailed(format!("context_data serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO context_sessions
                (id, session_token, context_data, bound_identity, is_active,
                 expires_at, last_accessed_at, conversation_started, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&session.id)
        .bind(&session.session_token)
        .bind(&context_json)
        .bind(&session.bound_identity)
        .bind(session.is_active)
        .bind(session.expires_at.timestamp_micros())
        .bind(session.last_accessed_at.timestamp_micros())
        .bind(session.conversation_started)
        .bind(session.created_at.timestamp_micros())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::WriteFailed(format!("INSERT failed: {e}")))?;

        debug!(token = %session.session_token, "Stored context session");
        Ok(())
    }

    /// Soft-delete a session by token. Returns whether a row changed.
    pub async fn deactivate(&self, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE context_sessions SET is_active = 0 WHERE session_token = ?1 AND is_active = 1",
        )
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::WriteFailed(format!("deactivate: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Fetch a session by token regardless of resolvability (for inspection).
    pub async fn get_by_token(&self, token: &str) -> Result<Option<ContextSession>, StoreError> {
        let row = sqlx::query("SELECT * FROM context_sessions WHERE session_token = ?1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("GET by token: {e}")))?;

        row.as_ref().map(Self::row_to_session).transpose()
    }

    /// Close the pool (used by tests to simulate an outage).
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {micros}")))
}

#[async_trait]
impl ContextSessionStore for SqliteSessionStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<ContextSession>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM context_sessions
            WHERE session_token = ?1 AND is_active = 1 AND expires_at > ?2
            "#,
        )
        .bind(token)
        .bind(Utc::now().timestamp_micros())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("find_by_token: {e}")))?;

        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn find_latest_by_identity(
        &self,
        identity: &str,
    ) -> Result<Option<ContextSession>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM context_sessions
            WHERE bound_identity = ?1 AND is_active = 1 AND expires_at > ?2
            ORDER BY last_accessed_at DESC, created_at DESC, id ASC
            LIMIT 1
            "#,
        )
        .bind(identity)
        .bind(Utc::now().timestamp_micros())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("find_latest_by_identity: {e}")))?;

        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn bind_and_touch(&self, session_id: &str, identity: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE context_sessions
            SET bound_identity = ?2,
                conversation_started = 1,
                last_accessed_at = MAX(?3, last_accessed_at + 1)
            WHERE id = ?1 AND is_active = 1 AND expires_at > ?3
            "#,
        )
        .bind(session_id)
        .bind(identity)
        .bind(Utc::now().timestamp_micros())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::WriteFailed(format!("bind_and_touch: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn touch(&self, session_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE context_sessions
            SET last_accessed_at = MAX(?2, last_accessed_at + 1)
            WHERE id = ?1 AND is_active = 1 AND expires_at > ?2
            "#,
        )
        .bind(session_id)
        .bind(Utc::now().timestamp_micros())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::WriteFailed(format!("touch: {e}")))?;

        Ok(result.rows_affected() > 0)
    }
}
