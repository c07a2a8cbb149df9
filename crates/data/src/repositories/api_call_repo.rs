//! Provider call log repository.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::{to_millis, ApiCallLog, ProviderCallStats};

/// Repository for provider call logs.
#[derive(Debug, Clone)]
pub struct ApiCallRepository {
    pool: SqlitePool,
}

impl ApiCallRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Appends one call record.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn record(&self, log: &ApiCallLog, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO api_calls
                (provider, endpoint, symbol, status, status_code, rows_returned,
                 latency_ms, error, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(&log.provider)
        .bind(&log.endpoint)
        .bind(&log.symbol)
        .bind(log.status.as_str())
        .bind(log.status_code.map(i64::from))
        .bind(log.rows_returned)
        .bind(log.latency_ms)
        .bind(&log.error)
        .bind(to_millis(at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Per-provider statistics for calls recorded at or after `since`.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn stats_since(&self, since: DateTime<Utc>) -> Result<Vec<ProviderCallStats>> {
        let stats = sqlx::query_as::<_, ProviderCallStats>(
            r"
            SELECT
                provider,
                COUNT(*) AS total,
                SUM(CASE WHEN status = 'ok' THEN 1 ELSE 0 END) AS ok,
                SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END) AS errors,
                SUM(CASE WHEN status = 'timeout' THEN 1 ELSE 0 END) AS timeouts,
                CAST(AVG(latency_ms) AS REAL) AS avg_latency_ms
            FROM api_calls
            WHERE recorded_at >= ?1
            GROUP BY provider
            ORDER BY provider
            ",
        )
        .bind(to_millis(since))
        .fetch_all(&self.pool)
        .await?;

        Ok(stats)
    }

    /// Deletes calls recorded before `cutoff`; returns how many were removed.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let done = sqlx::query("DELETE FROM api_calls WHERE recorded_at < ?1")
            .bind(to_millis(cutoff))
            .execute(&self.pool)
            .await?;

        Ok(done.rows_affected())
    }
}
