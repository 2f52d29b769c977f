//! SQLite check store implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers keep working while checker tasks append
//! - **Connection pooling**: One pooled connection per concurrent append,
//!   so a slow device check never serializes the rest of the batch
//!
//! The schema is created idempotently on startup; rows are append-only,
//! so there is nothing to migrate between versions so far.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};

use super::backend::CheckStore;
use super::error::{StorageError, StorageResult};
use super::schema::CheckRow;
use crate::CheckMethod;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS availability_checks (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    device_id   INTEGER NOT NULL,
    device_name TEXT NOT NULL,
    timestamp   INTEGER NOT NULL,
    available   INTEGER NOT NULL,
    latency_ms  REAL,
    method      TEXT NOT NULL,
    error       TEXT
);
CREATE INDEX IF NOT EXISTS idx_checks_device_time
    ON availability_checks (device_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_checks_time
    ON availability_checks (timestamp);
"#;

/// SQLite check store
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteStore {
    /// Open (or create) the database file and prepare the schema.
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite check store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("preparing check store schema");
        sqlx::raw_sql(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn row_from_sqlite(row: &sqlx::sqlite::SqliteRow) -> CheckRow {
        let method_tag: String = row.get("method");

        CheckRow {
            timestamp: Self::millis_to_timestamp(row.get("timestamp")),
            device_id: row.get("device_id"),
            device_name: row.get("device_name"),
            available: row.get::<i64, _>("available") != 0,
            latency_ms: row.get("latency_ms"),
            method: CheckMethod::from_tag(&method_tag),
            error: row.get("error"),
        }
    }
}

#[async_trait]
impl CheckStore for SqliteStore {
    #[instrument(skip(self, row), fields(device_id = row.device_id))]
    async fn append_check(&self, row: CheckRow) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO availability_checks
                (device_id, device_name, timestamp, available, latency_ms, method, error)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.device_id)
        .bind(&row.device_name)
        .bind(Self::timestamp_to_millis(&row.timestamp))
        .bind(row.available as i64)
        .bind(row.latency_ms)
        .bind(row.method.to_string())
        .bind(&row.error)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    async fn query_since(
        &self,
        device_id: Option<i64>,
        since: Option<DateTime<Utc>>,
    ) -> StorageResult<Vec<CheckRow>> {
        // -1 sentinels keep this a single prepared statement
        let rows = sqlx::query(
            r#"
            SELECT device_id, device_name, timestamp, available, latency_ms, method, error
            FROM availability_checks
            WHERE (?1 < 0 OR device_id = ?1)
              AND (?2 < 0 OR timestamp >= ?2)
            ORDER BY timestamp ASC
            "#,
        )
        .bind(device_id.unwrap_or(-1))
        .bind(since.map_or(-1, |dt| Self::timestamp_to_millis(&dt)))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(rows.iter().map(Self::row_from_sqlite).collect())
    }

    async fn history(&self, device_id: i64, limit: usize) -> StorageResult<Vec<CheckRow>> {
        let rows = sqlx::query(
            r#"
            SELECT device_id, device_name, timestamp, available, latency_ms, method, error
            FROM availability_checks
            WHERE device_id = ?
            ORDER BY timestamp DESC
            LIMIT ?
            "#,
        )
        .bind(device_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(rows.iter().map(Self::row_from_sqlite).collect())
    }

    async fn latest_per_device(&self) -> StorageResult<Vec<CheckRow>> {
        let rows = sqlx::query(
            r#"
            SELECT c.device_id, c.device_name, c.timestamp, c.available,
                   c.latency_ms, c.method, c.error
            FROM availability_checks c
            JOIN (
                SELECT device_id, MAX(timestamp) AS max_timestamp
                FROM availability_checks
                GROUP BY device_id
            ) latest
              ON c.device_id = latest.device_id
             AND c.timestamp = latest.max_timestamp
            GROUP BY c.device_id
            ORDER BY c.device_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(rows.iter().map(Self::row_from_sqlite).collect())
    }

    async fn recent_errors(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<CheckRow>> {
        let rows = sqlx::query(
            r#"
            SELECT device_id, device_name, timestamp, available, latency_ms, method, error
            FROM availability_checks
            WHERE available = 0
              AND error IS NOT NULL
              AND timestamp >= ?
            ORDER BY timestamp DESC
            LIMIT ?
            "#,
        )
        .bind(Self::timestamp_to_millis(&since))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(rows.iter().map(Self::row_from_sqlite).collect())
    }

    async fn slowest_available(
        &self,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> StorageResult<Vec<CheckRow>> {
        let rows = sqlx::query(
            r#"
            SELECT device_id, device_name, timestamp, available, latency_ms, method, error
            FROM availability_checks
            WHERE available = 1
              AND latency_ms IS NOT NULL
              AND (?1 < 0 OR timestamp >= ?1)
            ORDER BY latency_ms DESC
            LIMIT ?2
            "#,
        )
        .bind(since.map_or(-1, |dt| Self::timestamp_to_millis(&dt)))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(rows.iter().map(Self::row_from_sqlite).collect())
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing SQLite check store at {}", self.db_path);
        self.pool.close().await;
        Ok(())
    }
}
