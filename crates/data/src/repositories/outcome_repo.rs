//! Outcome repository (read side; outcomes are written by the signal repository).

use anyhow::Result;
use chrono::{DateTime, Utc};
use cryptopulse_core::Outcome;
use sqlx::SqlitePool;

use crate::models::{to_millis, OutcomeRow};

const OUTCOME_COLUMNS: &str = "signal_id, symbol, signal_type, pattern_name, result, \
    pnl_percent, exit_price, exit_timestamp, manual";

/// Win/loss/neutral counts for a symbol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct OutcomeCounts {
    pub wins: i64,
    pub losses: i64,
    pub neutrals: i64,
}

impl OutcomeCounts {
    #[must_use]
    pub fn total(&self) -> i64 {
        self.wins + self.losses + self.neutrals
    }
}

/// Repository for outcome queries.
#[derive(Debug, Clone)]
pub struct OutcomeRepository {
    pool: SqlitePool,
}

impl OutcomeRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Counts outcomes by result over the full history of a symbol.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn counts_for_symbol(&self, symbol: &str) -> Result<OutcomeCounts> {
        let counts = sqlx::query_as::<_, OutcomeCounts>(
            r"
            SELECT
                COALESCE(SUM(CASE WHEN result = 'WIN' THEN 1 ELSE 0 END), 0) AS wins,
                COALESCE(SUM(CASE WHEN result = 'LOSS' THEN 1 ELSE 0 END), 0) AS losses,
                COALESCE(SUM(CASE WHEN result = 'NEUTRAL' THEN 1 ELSE 0 END), 0) AS neutrals
            FROM outcomes
            WHERE symbol = ?1
            ",
        )
        .bind(symbol)
        .fetch_one(&self.pool)
        .await?;

        Ok(counts)
    }

    /// Most recent outcomes for a symbol, newest first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn recent_for_symbol(&self, symbol: &str, limit: usize) -> Result<Vec<Outcome>> {
        let sql = format!(
            "SELECT {OUTCOME_COLUMNS} FROM outcomes WHERE symbol = ?1 \
             ORDER BY exit_timestamp DESC, id DESC LIMIT ?2"
        );
        let rows = sqlx::query_as::<_, OutcomeRow>(&sql)
            .bind(symbol)
            .bind(i64::try_from(limit)?)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Outcome::try_from).collect()
    }

    /// All outcomes with an exit at or after `since`, oldest first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn since(&self, since: DateTime<Utc>) -> Result<Vec<Outcome>> {
        let sql = format!(
            "SELECT {OUTCOME_COLUMNS} FROM outcomes WHERE exit_timestamp >= ?1 \
             ORDER BY exit_timestamp ASC, id ASC"
        );
        let rows = sqlx::query_as::<_, OutcomeRow>(&sql)
            .bind(to_millis(since))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Outcome::try_from).collect()
    }

    /// Total number of stored outcomes.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM outcomes")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
