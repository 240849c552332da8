//! # Nova Storage - SQLite Backend
//!
//! Durable session storage. Each named session gets its own database file,
//! so separate processes attached to the same session behave like reloads
//! of one tab: they see each other's writes on their next read.
//!
//! SQLite gives no change notifications across processes; consumers of this
//! backend rely on polling.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use nova_storage::{StorageBackend, StorageError};

/// One recorded write against a session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Key written.
    pub key: String,
    /// Value written (`None` for deletes).
    pub value: Option<String>,
    /// Key version after the write.
    pub version: i64,
    /// `create`, `update` or `delete`.
    pub operation: String,
    /// Who performed the write, if known.
    pub actor: Option<String>,
    /// Unix timestamp of the write.
    pub timestamp: i64,
}

/// SQLite session backend.
///
/// Each session lives in `{base_path}/{session}.db`.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
    actor: Option<String>,
    db_path: PathBuf,
}

impl SqliteBackend {
    /// Opens or creates the database for a named session.
    ///
    /// # Arguments
    ///
    /// * `base_path` - Directory where session databases are stored
    /// * `session` - Session name (must match `[a-z0-9_-]+`)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Session name is invalid
    /// - Directory cannot be created
    /// - Database connection fails
    pub async fn open(base_path: impl AsRef<Path>, session: &str) -> Result<Self, StorageError> {
        Self::validate_session(session)?;

        let base = base_path.as_ref();
        std::fs::create_dir_all(base).map_err(|e| {
            StorageError::ConnectionFailed(format!("failed to create directory: {e}"))
        })?;

        let db_path = base.join(format!("{session}.db"));
        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        debug!(session = %session, path = %db_path.display(), "Opening session database");

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect(&db_url)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        let backend = Self {
            pool,
            actor: None,
            db_path,
        };

        backend.migrate().await?;

        info!(session = %session, "Session database ready");

        Ok(backend)
    }

    /// Sets the actor recorded in the write history.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Path of the database file.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Validates that a session name is safe to use as a file name.
    fn validate_session(session: &str) -> Result<(), StorageError> {
        if session.is_empty() {
            return Err(StorageError::InvalidInput("session cannot be empty".into()));
        }

        if session.len() > 64 {
            return Err(StorageError::InvalidInput("session name too long".into()));
        }

        let valid = session
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');

        if !valid {
            return Err(StorageError::InvalidInput(
                "session must match [a-z0-9_-]+".into(),
            ));
        }

        Ok(())
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        debug!("Running session migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_entries (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                version    INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::ConnectionFailed(format!("migration failed: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_history (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                key        TEXT NOT NULL,
                value      TEXT,
                version    INTEGER NOT NULL,
                operation  TEXT NOT NULL,
                actor      TEXT,
                timestamp  INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::ConnectionFailed(format!("migration failed: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_session_history_key ON session_history (key)")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::ConnectionFailed(format!("migration failed: {e}")))?;

        Ok(())
    }

    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default()
    }

    async fn current_version(&self, key: &str) -> Result<Option<i64>, StorageError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM session_entries WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::QueryFailed(e.to_string()))?;
        Ok(row.map(|(v,)| v))
    }

    async fn record(
        &self,
        key: &str,
        value: Option<&str>,
        version: i64,
        operation: &str,
        now: i64,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO session_history (key, value, version, operation, actor, timestamp) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(key)
        .bind(value)
        .bind(version)
        .bind(operation)
        .bind(self.actor.as_deref())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    /// Returns the write history, oldest first, optionally for one key.
    pub async fn history(&self, key: Option<&str>) -> Result<Vec<HistoryEntry>, StorageError> {
        type Row = (String, Option<String>, i64, String, Option<String>, i64);

        let rows: Vec<Row> = match key {
            Some(key) => {
                sqlx::query_as::<_, Row>(
                    "SELECT key, value, version, operation, actor, timestamp FROM session_history WHERE key = ? ORDER BY id",
                )
                .bind(key)
                .fetch_all(&self.pool)
                .await
            },
            None => {
                sqlx::query_as::<_, Row>(
                    "SELECT key, value, version, operation, actor, timestamp FROM session_history ORDER BY id",
                )
                .fetch_all(&self.pool)
                .await
            },
        }
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(key, value, version, operation, actor, timestamp)| HistoryEntry {
                key,
                value,
                version,
                operation,
                actor,
                timestamp,
            })
            .collect())
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM session_entries WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(row.map(|(v,)| v))
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let now = Self::now();

        let (version, operation) = match self.current_version(key).await? {
            Some(v) => (v + 1, "update"),
            None => (1, "create"),
        };

        sqlx::query(
            r#"
            INSERT INTO session_entries (key, value, version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                version = excluded.version,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(version)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        self.record(key, Some(value), version, operation, now).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let Some(version) = self.current_version(key).await? else {
            return Ok(());
        };

        sqlx::query("DELETE FROM session_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        self.record(key, None, version + 1, "delete", Self::now())
            .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        // Plain prefix comparison: LIKE would treat `_` and `%` as wildcards.
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT key FROM session_entries WHERE substr(key, 1, length(?)) = ?")
                .bind(prefix)
                .bind(prefix)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(rows.into_iter().map(|(k,)| k).collect())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, SqliteBackend) {
        let tmp = TempDir::new().unwrap();
        let backend = SqliteBackend::open(tmp.path(), "test-session")
            .await
            .unwrap();
        (tmp, backend)
    }

    #[tokio::test]
    async fn test_open_creates_db() {
        let tmp = TempDir::new().unwrap();
        let backend = SqliteBackend::open(tmp.path(), "tab-1").await.unwrap();

        let db_path = tmp.path().join("tab-1.db");
        assert!(db_path.exists(), "database file should be created");
        assert_eq!(backend.db_path(), db_path.as_path());
    }

    #[tokio::test]
    async fn test_session_validation() {
        let tmp = TempDir::new().unwrap();

        for name in ["", "Session", "my session", "a/b", "../escape", "s.db"] {
            let result = SqliteBackend::open(tmp.path(), name).await;
            assert!(
                matches!(result, Err(StorageError::InvalidInput(_))),
                "should reject session name: {name:?}"
            );
        }

        for name in ["default", "tab-2", "session_1"] {
            let result = SqliteBackend::open(tmp.path(), name).await;
            assert!(result.is_ok(), "should accept session name: {name}");
        }
    }

    #[tokio::test]
    async fn test_crud_roundtrip() {
        let (_tmp, backend) = setup().await;

        assert!(backend.get("portalUser").await.unwrap().is_none());

        backend.put("portalUser", "customer").await.unwrap();
        assert_eq!(
            backend.get("portalUser").await.unwrap().as_deref(),
            Some("customer")
        );

        backend.put("portalUser", "employee").await.unwrap();
        assert_eq!(
            backend.get("portalUser").await.unwrap().as_deref(),
            Some("employee")
        );

        backend.delete("portalUser").await.unwrap();
        assert!(backend.get("portalUser").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_ok() {
        let (_tmp, backend) = setup().await;
        backend.delete("nonexistent").await.unwrap();
        assert!(backend.history(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_prefix() {
        let (_tmp, backend) = setup().await;

        backend.put("userDbId_customer", "C_1").await.unwrap();
        backend.put("userDbId_employee", "E_1").await.unwrap();
        backend.put("portalUser", "customer").await.unwrap();

        let mut keys = backend.list("userDbId_").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["userDbId_customer", "userDbId_employee"]);
    }

    #[tokio::test]
    async fn test_list_prefix_is_literal() {
        let (_tmp, backend) = setup().await;

        backend.put("userDbId_customer", "C_1").await.unwrap();
        backend.put("userDbIdXcustomer", "X").await.unwrap();
        backend.put("USERDBID_employee", "Y").await.unwrap();
        backend.put("100%done", "Z").await.unwrap();

        assert_eq!(backend.list("userDbId_").await.unwrap(), vec!["userDbId_customer"]);
        assert_eq!(backend.list("100%").await.unwrap(), vec!["100%done"]);
        assert!(backend.list("1%").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_sees_writes() {
        let tmp = TempDir::new().unwrap();

        let first = SqliteBackend::open(tmp.path(), "tab").await.unwrap();
        first.put("userDbId_customer", "C_010").await.unwrap();

        let second = SqliteBackend::open(tmp.path(), "tab").await.unwrap();
        assert_eq!(
            second.get("userDbId_customer").await.unwrap().as_deref(),
            Some("C_010")
        );
    }

    #[tokio::test]
    async fn test_history_records_operations() {
        let (_tmp, backend) = setup().await;
        let backend = backend.with_actor("sign-in");

        backend.put("key", "v1").await.unwrap();
        backend.put("key", "v2").await.unwrap();
        backend.delete("key").await.unwrap();

        let history = backend.history(Some("key")).await.unwrap();
        let ops: Vec<(&str, i64)> = history
            .iter()
            .map(|h| (h.operation.as_str(), h.version))
            .collect();
        assert_eq!(ops, vec![("create", 1), ("update", 2), ("delete", 3)]);
        assert!(history.iter().all(|h| h.actor.as_deref() == Some("sign-in")));
        assert_eq!(history[2].value, None);
    }

    #[tokio::test]
    async fn test_sessions_isolated() {
        let tmp = TempDir::new().unwrap();

        let a = SqliteBackend::open(tmp.path(), "session-a").await.unwrap();
        let b = SqliteBackend::open(tmp.path(), "session-b").await.unwrap();

        a.put("portalUser", "admin").await.unwrap();
        b.put("portalUser", "customer").await.unwrap();

        assert_eq!(a.get("portalUser").await.unwrap().as_deref(), Some("admin"));
        assert_eq!(b.get("portalUser").await.unwrap().as_deref(), Some("customer"));
    }

    #[tokio::test]
    async fn test_no_storage_events() {
        let (_tmp, backend) = setup().await;
        assert!(backend.storage_events().is_none());
    }
}
