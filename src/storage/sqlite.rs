//! SQLite storage backend implementation
//!
//! Each metric is one row `(name, kind, value, delta)`, unique on
//! `(name, kind)`. Writes are upserts:
//!
//! - gauges replace `value`
//! - counters add the incoming delta to the stored one inside the database
//!   (`delta = delta + excluded.delta`), so several hub processes can share
//!   one database without losing increments
//!
//! Bulk updates run in a single transaction and are all-or-nothing.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, MetricStore, validate_delta};
use super::error::{StorageError, StorageResult};
use crate::MetricKind;

const UPSERT_GAUGE: &str = r#"
    INSERT INTO metrics (name, kind, value, delta)
    VALUES (?, 'gauge', ?, NULL)
    ON CONFLICT (name, kind) DO UPDATE SET value = excluded.value
    RETURNING value
"#;

const UPSERT_COUNTER: &str = r#"
    INSERT INTO metrics (name, kind, value, delta)
    VALUES (?, 'counter', NULL, ?)
    ON CONFLICT (name, kind) DO UPDATE SET delta = metrics.delta + excluded.delta
        WHERE metrics.delta <= 9223372036854775807 - excluded.delta
    RETURNING delta
"#;

/// SQLite would promote an overflowing sum to REAL, so the upsert refuses it
/// and returns no row instead
fn counter_overflow(name: &str) -> StorageError {
    StorageError::Validation(format!("counter {name} overflowed"))
}

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    dsn: String,
}

impl SqliteBackend {
    /// Connect to the database, probe it and run migrations
    ///
    /// `dsn` is a SQLite URL or path (`sqlite://./metrics.db`, `./metrics.db`).
    /// The file is created if it does not exist. Connection and probe
    /// failures are reported as [`StorageError::Retriable`] so the whole
    /// construction can be retried.
    #[instrument(skip_all)]
    pub async fn connect(dsn: &str) -> StorageResult<Self> {
        info!("initializing SQLite backend at: {}", dsn);

        let options = SqliteConnectOptions::from_str(dsn)
            .map_err(|e| StorageError::InvalidConfig(format!("invalid database DSN: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Retriable(format!("failed to connect: {e}")))?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| StorageError::Retriable(format!("liveness probe failed: {e}")))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database migrations complete");

        Ok(Self {
            pool,
            dsn: dsn.to_string(),
        })
    }
}

#[async_trait]
impl MetricStore for SqliteBackend {
    #[instrument(skip(self))]
    async fn set_gauge(&self, name: &str, value: f64) -> StorageResult<f64> {
        let stored = sqlx::query_scalar::<_, f64>(UPSERT_GAUGE)
            .bind(name)
            .bind(value)
            .fetch_one(&self.pool)
            .await?;
        Ok(stored)
    }

    #[instrument(skip(self))]
    async fn get_gauge(&self, name: &str) -> StorageResult<f64> {
        sqlx::query_scalar::<_, Option<f64>>(
            "SELECT value FROM metrics WHERE name = ? AND kind = 'gauge'",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .flatten()
        .ok_or_else(|| StorageError::not_found(MetricKind::Gauge, name))
    }

    #[instrument(skip(self))]
    async fn set_counter(&self, name: &str, delta: i64) -> StorageResult<i64> {
        validate_delta(name, delta)?;

        sqlx::query_scalar::<_, i64>(UPSERT_COUNTER)
            .bind(name)
            .bind(delta)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| counter_overflow(name))
    }

    #[instrument(skip(self))]
    async fn get_counter(&self, name: &str) -> StorageResult<i64> {
        sqlx::query_scalar::<_, Option<i64>>(
            "SELECT delta FROM metrics WHERE name = ? AND kind = 'counter'",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .flatten()
        .ok_or_else(|| StorageError::not_found(MetricKind::Counter, name))
    }

    async fn gauges(&self) -> StorageResult<HashMap<String, f64>> {
        let rows = sqlx::query_as::<_, (String, Option<f64>)>(
            "SELECT name, value FROM metrics WHERE kind = 'gauge'",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v)))
            .collect())
    }

    async fn counters(&self) -> StorageResult<HashMap<String, i64>> {
        let rows = sqlx::query_as::<_, (String, Option<i64>)>(
            "SELECT name, delta FROM metrics WHERE kind = 'counter'",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(name, delta)| delta.map(|d| (name, d)))
            .collect())
    }

    #[instrument(skip_all, fields(counters = counters.len(), gauges = gauges.len()))]
    async fn update_counters_and_gauges(
        &self,
        counters: &HashMap<String, i64>,
        gauges: &HashMap<String, f64>,
    ) -> StorageResult<()> {
        if counters.is_empty() && gauges.is_empty() {
            return Ok(());
        }

        for (name, delta) in counters {
            validate_delta(name, *delta)?;
        }

        let mut tx = self.pool.begin().await?;

        for (name, delta) in counters {
            let total = sqlx::query_scalar::<_, i64>(UPSERT_COUNTER)
                .bind(name)
                .bind(*delta)
                .fetch_optional(&mut *tx)
                .await?;
            if total.is_none() {
                tx.rollback().await?;
                return Err(counter_overflow(name));
            }
        }

        for (name, value) in gauges {
            sqlx::query(UPSERT_GAUGE)
                .bind(name)
                .bind(*value)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        debug!("batch update complete");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        // Simple ping query to verify connection
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                message: "SQLite backend operational".to_string(),
                metadata: HashMap::from([
                    ("backend".to_string(), "sqlite".to_string()),
                    ("dsn".to_string(), self.dsn.clone()),
                ]),
            }),
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn shutdown(&self) -> StorageResult<()> {
        if !self.pool.is_closed() {
            info!("closing SQLite backend");
            self.pool.close().await;
        }
        Ok(())
    }
}
