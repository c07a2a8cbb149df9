//! Pattern statistics repository.

use anyhow::Result;
use chrono::{DateTime, Utc};
use cryptopulse_core::PatternRecord;
use sqlx::SqlitePool;

use crate::models::{to_millis, PatternRow};

/// How pattern confidence boosts are derived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoostPolicy {
    /// Occurrences required before any boost applies
    pub min_occurrences: i64,
    /// Absolute cap on the boost
    pub max_boost: f64,
}

/// Repository for pattern records.
#[derive(Debug, Clone)]
pub struct PatternRepository {
    pool: SqlitePool,
}

impl PatternRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Adds one occurrence to a pattern and recomputes its win rate and boost.
    ///
    /// Counters are incremented in SQL so concurrent evaluations never lose an update.
    /// The boost is `(win_rate - 50) / 5`, clamped to `max_boost`, and zero until
    /// `min_occurrences` is reached.
    ///
    /// # Errors
    /// Returns an error if the database transaction fails.
    pub async fn record_occurrence(
        &self,
        pattern_name: &str,
        won: bool,
        pnl_percent: f64,
        policy: BoostPolicy,
        at: DateTime<Utc>,
    ) -> Result<PatternRecord> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO patterns
                (pattern_name, occurrence_count, win_count, win_rate, confidence_boost,
                 total_pnl_percent, updated_at)
            VALUES (?1, 1, ?2, 0, 0, ?3, ?4)
            ON CONFLICT(pattern_name) DO UPDATE SET
                occurrence_count = occurrence_count + 1,
                win_count = win_count + excluded.win_count,
                total_pnl_percent = total_pnl_percent + excluded.total_pnl_percent,
                updated_at = excluded.updated_at
            ",
        )
        .bind(pattern_name)
        .bind(i64::from(won))
        .bind(pnl_percent)
        .bind(to_millis(at))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            UPDATE patterns SET
                win_rate = win_count * 100.0 / occurrence_count,
                confidence_boost = CASE
                    WHEN occurrence_count >= ?2
                        THEN MAX(-?3, MIN(?3, (win_count * 100.0 / occurrence_count - 50.0) / 5.0))
                    ELSE 0
                END
            WHERE pattern_name = ?1
            ",
        )
        .bind(pattern_name)
        .bind(policy.min_occurrences)
        .bind(policy.max_boost)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, PatternRow>(
            r"
            SELECT pattern_name, occurrence_count, win_count, win_rate, confidence_boost,
                   total_pnl_percent, updated_at
            FROM patterns WHERE pattern_name = ?1
            ",
        )
        .bind(pattern_name)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        PatternRecord::try_from(row)
    }

    /// Gets a pattern by name.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get(&self, pattern_name: &str) -> Result<Option<PatternRecord>> {
        let row = sqlx::query_as::<_, PatternRow>(
            r"
            SELECT pattern_name, occurrence_count, win_count, win_rate, confidence_boost,
                   total_pnl_percent, updated_at
            FROM patterns WHERE pattern_name = ?1
            ",
        )
        .bind(pattern_name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PatternRecord::try_from).transpose()
    }

    /// Lists patterns by win rate, best first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn list(&self, min_occurrences: i64, limit: i64) -> Result<Vec<PatternRecord>> {
        let rows = sqlx::query_as::<_, PatternRow>(
            r"
            SELECT pattern_name, occurrence_count, win_count, win_rate, confidence_boost,
                   total_pnl_percent, updated_at
            FROM patterns
            WHERE occurrence_count >= ?1
            ORDER BY win_rate DESC, occurrence_count DESC, pattern_name ASC
            LIMIT ?2
            ",
        )
        .bind(min_occurrences)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PatternRecord::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    const POLICY: BoostPolicy = BoostPolicy {
        min_occurrences: 5,
        max_boost: 10.0,
    };

    #[tokio::test]
    async fn test_counters_accumulate_and_boost_waits_for_sample() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.repositories().patterns;
        let now = Utc::now();

        for _ in 0..4 {
            let rec = repo
                .record_occurrence("P", true, 2.0, POLICY, now)
                .await
                .unwrap();
            assert_eq!(rec.confidence_boost, 0.0);
        }

        let rec = repo
            .record_occurrence("P", false, -1.0, POLICY, now)
            .await
            .unwrap();
        assert_eq!(rec.occurrence_count, 5);
        assert_eq!(rec.win_count, 4);
        assert!((rec.win_rate - 80.0).abs() < 1e-9);
        // (80 - 50) / 5 = 6
        assert!((rec.confidence_boost - 6.0).abs() < 1e-9);
        assert!((rec.total_pnl_percent - 7.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_boost_is_capped() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.repositories().patterns;
        let now = Utc::now();

        let mut rec = None;
        for _ in 0..6 {
            rec = Some(
                repo.record_occurrence("L", false, -1.0, POLICY, now)
                    .await
                    .unwrap(),
            );
        }
        let rec = rec.unwrap();
        assert_eq!(rec.win_rate, 0.0);
        assert_eq!(rec.confidence_boost, -10.0);

        let listed = repo.list(5, 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(repo.get("missing").await.unwrap().is_none());
    }
}
