//! Reputation repository.

use anyhow::Result;
use cryptopulse_core::ReputationRecord;
use sqlx::SqlitePool;

use crate::models::{to_millis, ReputationRow};

/// Repository for per-symbol reputation.
#[derive(Debug, Clone)]
pub struct ReputationRepository {
    pool: SqlitePool,
}

impl ReputationRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces the reputation of a symbol.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn upsert(&self, record: &ReputationRecord) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO reputation
                (symbol, win_count, loss_count, total_trades, success_rate, reputation_score, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(symbol) DO UPDATE SET
                win_count = excluded.win_count,
                loss_count = excluded.loss_count,
                total_trades = excluded.total_trades,
                success_rate = excluded.success_rate,
                reputation_score = excluded.reputation_score,
                updated_at = excluded.updated_at
            ",
        )
        .bind(&record.symbol)
        .bind(record.win_count)
        .bind(record.loss_count)
        .bind(record.total_trades)
        .bind(record.success_rate)
        .bind(record.reputation_score)
        .bind(to_millis(record.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets the reputation of a symbol.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get(&self, symbol: &str) -> Result<Option<ReputationRecord>> {
        let row = sqlx::query_as::<_, ReputationRow>(
            r"
            SELECT symbol, win_count, loss_count, total_trades, success_rate,
                   reputation_score, updated_at
            FROM reputation WHERE symbol = ?1
            ",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ReputationRecord::try_from).transpose()
    }

    /// Reputation of a symbol, or the neutral record when none exists yet.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get_or_neutral(&self, symbol: &str) -> Result<ReputationRecord> {
        Ok(self
            .get(symbol)
            .await?
            .unwrap_or_else(|| ReputationRecord::neutral(symbol)))
    }
}
