//! Signal repository.
//!
//! Owns the `signals` table and the transactional hand-off into `outcomes`.
//! Cooldown and double-evaluation guards are enforced in SQL so concurrent
//! cycles cannot race past them.

use anyhow::Result;
use chrono::{DateTime, Utc};
use cryptopulse_core::{Outcome, Signal, SignalStatus, SignalType};
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::models::{to_millis, SignalRow};

const SIGNAL_COLUMNS: &str = "id, symbol, signal_type, confidence, entry_price, take_profit, \
    stop_loss, horizon_minutes, pattern_name, reason, source, status, indicators_json, \
    created_at, evaluated_at";

/// Result of a cooldown-guarded insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another signal holds the (symbol, horizon) key
    Suppressed,
}

/// Filters for signal history queries.
#[derive(Debug, Clone)]
pub struct SignalFilter {
    pub symbol: Option<String>,
    pub status: Option<SignalStatus>,
    pub signal_type: Option<SignalType>,
    pub since: Option<DateTime<Utc>>,
    pub limit: i64,
}

impl Default for SignalFilter {
    fn default() -> Self {
        Self {
            symbol: None,
            status: None,
            signal_type: None,
            since: None,
            limit: 100,
        }
    }
}

/// Repository for signal operations.
#[derive(Debug, Clone)]
pub struct SignalRepository {
    pool: SqlitePool,
}

impl SignalRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a signal unless its (symbol, horizon) key is cooling down.
    ///
    /// The key is cooling down while another signal for it is still active or
    /// one was created after `cooldown_since`. Check and insert are a single
    /// statement; a unique-index violation from a concurrent insert is also
    /// reported as [`InsertOutcome::Suppressed`].
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn insert_with_cooldown(
        &self,
        signal: &Signal,
        cooldown_since: DateTime<Utc>,
    ) -> Result<InsertOutcome> {
        let row = SignalRow::from_signal(signal)?;

        let result = sqlx::query(
            r"
            INSERT INTO signals
                (id, symbol, signal_type, confidence, entry_price, take_profit, stop_loss,
                 horizon_minutes, pattern_name, reason, source, status, indicators_json,
                 created_at, evaluated_at)
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15
            WHERE NOT EXISTS (
                SELECT 1 FROM signals
                WHERE symbol = ?2 AND horizon_minutes = ?8
                  AND (status = 'active' OR created_at > ?16)
            )
            ",
        )
        .bind(&row.id)
        .bind(&row.symbol)
        .bind(&row.signal_type)
        .bind(row.confidence)
        .bind(row.entry_price)
        .bind(row.take_profit)
        .bind(row.stop_loss)
        .bind(row.horizon_minutes)
        .bind(&row.pattern_name)
        .bind(&row.reason)
        .bind(&row.source)
        .bind(&row.status)
        .bind(&row.indicators_json)
        .bind(row.created_at)
        .bind(row.evaluated_at)
        .bind(to_millis(cooldown_since))
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => Ok(InsertOutcome::Inserted),
            Ok(_) => Ok(InsertOutcome::Suppressed),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Ok(InsertOutcome::Suppressed)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Gets a signal by id.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: Uuid) -> Result<Option<Signal>> {
        let sql = format!("SELECT {SIGNAL_COLUMNS} FROM signals WHERE id = ?1");
        let row = sqlx::query_as::<_, SignalRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Signal::try_from).transpose()
    }

    /// Lists active signals, newest first, optionally for one symbol.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn list_active(&self, symbol: Option<&str>) -> Result<Vec<Signal>> {
        let sql = format!(
            "SELECT {SIGNAL_COLUMNS} FROM signals \
             WHERE status = 'active' AND (?1 IS NULL OR symbol = ?1) \
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, SignalRow>(&sql)
            .bind(symbol)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Signal::try_from).collect()
    }

    /// Lists signals matching a filter, newest first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn list(&self, filter: &SignalFilter) -> Result<Vec<Signal>> {
        let sql = format!(
            "SELECT {SIGNAL_COLUMNS} FROM signals \
             WHERE (?1 IS NULL OR symbol = ?1) \
               AND (?2 IS NULL OR status = ?2) \
               AND (?3 IS NULL OR signal_type = ?3) \
               AND (?4 IS NULL OR created_at >= ?4) \
             ORDER BY created_at DESC \
             LIMIT ?5"
        );
        let rows = sqlx::query_as::<_, SignalRow>(&sql)
            .bind(filter.symbol.as_deref())
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.signal_type.map(|t| t.as_str()))
            .bind(filter.since.map(to_millis))
            .bind(filter.limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Signal::try_from).collect()
    }

    /// Active, unevaluated signals created at or before `created_before`, oldest first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn pending_evaluation(&self, created_before: DateTime<Utc>) -> Result<Vec<Signal>> {
        let sql = format!(
            "SELECT {SIGNAL_COLUMNS} FROM signals \
             WHERE status = 'active' AND evaluated_at IS NULL AND created_at <= ?1 \
             ORDER BY created_at ASC"
        );
        let rows = sqlx::query_as::<_, SignalRow>(&sql)
            .bind(to_millis(created_before))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Signal::try_from).collect()
    }

    /// Moves an active signal to `taken`. Returns false if it was not active.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn mark_taken(&self, id: Uuid) -> Result<bool> {
        let done = sqlx::query(
            r"
            UPDATE signals SET status = 'taken'
            WHERE id = ?1 AND status = 'active' AND evaluated_at IS NULL
            ",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(done.rows_affected() == 1)
    }

    /// Resolves an active signal and stores its outcome atomically.
    ///
    /// The status update is guarded by `evaluated_at IS NULL`; when another
    /// run got there first nothing is written and `false` is returned.
    ///
    /// # Errors
    /// Returns an error if the database transaction fails.
    pub async fn resolve(&self, outcome: &Outcome) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let done = sqlx::query(
            r"
            UPDATE signals SET status = ?2, evaluated_at = ?3
            WHERE id = ?1 AND status = 'active' AND evaluated_at IS NULL
            ",
        )
        .bind(outcome.signal_id.to_string())
        .bind(outcome.result.signal_status().as_str())
        .bind(to_millis(outcome.exit_timestamp))
        .execute(&mut *tx)
        .await?;

        if done.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_outcome(&mut tx, outcome).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Stores a user-reported outcome for a taken signal.
    ///
    /// The signal keeps its `taken` status; only `evaluated_at` is set.
    /// Returns false if the signal is not taken or already has an outcome.
    ///
    /// # Errors
    /// Returns an error if the database transaction fails.
    pub async fn record_manual_outcome(&self, outcome: &Outcome) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let done = sqlx::query(
            r"
            UPDATE signals SET evaluated_at = ?2
            WHERE id = ?1 AND status = 'taken' AND evaluated_at IS NULL
            ",
        )
        .bind(outcome.signal_id.to_string())
        .bind(to_millis(outcome.exit_timestamp))
        .execute(&mut *tx)
        .await?;

        if done.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_outcome(&mut tx, outcome).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Counts signals created since a timestamp.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn count_created_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM signals WHERE created_at >= ?1")
            .bind(to_millis(since))
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

async fn insert_outcome(tx: &mut Transaction<'_, Sqlite>, outcome: &Outcome) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO outcomes
            (signal_id, symbol, signal_type, pattern_name, result, pnl_percent,
             exit_price, exit_timestamp, manual)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ",
    )
    .bind(outcome.signal_id.to_string())
    .bind(&outcome.symbol)
    .bind(outcome.signal_type.as_str())
    .bind(&outcome.pattern_name)
    .bind(outcome.result.as_str())
    .bind(outcome.pnl_percent)
    .bind(outcome.exit_price)
    .bind(to_millis(outcome.exit_timestamp))
    .bind(outcome.manual)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use chrono::{Duration, TimeZone};
    use cryptopulse_core::{CandidateSignal, IndicatorSet, OutcomeResult, SignalSource};

    // =========================================================================
    // Test Helpers
    // =========================================================================

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 31, 12, 0, 0).unwrap()
    }

    fn buy_signal(symbol: &str, created_at: DateTime<Utc>) -> Signal {
        Signal::from_candidate(
            CandidateSignal {
                symbol: symbol.to_string(),
                signal_type: SignalType::Buy,
                confidence: 80.0,
                entry_price: 100.0,
                take_profit: 102.0,
                stop_loss: 99.0,
                pattern_name: "RSI_neutral_MACD_bullish_EMA_uptrend_NEWS_neutral".to_string(),
                reason: "test".to_string(),
                source: SignalSource::Rule,
                indicators: IndicatorSet::default(),
            },
            240,
            created_at,
        )
    }

    fn outcome_for(signal: &Signal, result: OutcomeResult, at: DateTime<Utc>) -> Outcome {
        Outcome {
            signal_id: signal.id,
            symbol: signal.symbol.clone(),
            signal_type: signal.signal_type,
            pattern_name: signal.pattern_name.clone(),
            result,
            pnl_percent: 2.0,
            exit_price: signal.take_profit,
            exit_timestamp: at,
            manual: false,
        }
    }

    async fn repo() -> SignalRepository {
        let db = Database::in_memory().await.unwrap();
        db.repositories().signals
    }

    // =========================================================================
    // Cooldown Tests
    // =========================================================================

    #[tokio::test]
    async fn test_insert_then_duplicate_is_suppressed() {
        let repo = repo().await;
        let first = buy_signal("BTCUSDT", t0());
        let cooldown = t0() - Duration::minutes(240);

        assert_eq!(
            repo.insert_with_cooldown(&first, cooldown).await.unwrap(),
            InsertOutcome::Inserted
        );

        let second = buy_signal("BTCUSDT", t0() + Duration::minutes(5));
        assert_eq!(
            repo.insert_with_cooldown(&second, cooldown).await.unwrap(),
            InsertOutcome::Suppressed
        );
        assert_eq!(repo.list_active(Some("BTCUSDT")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_other_symbol_not_affected_by_cooldown() {
        let repo = repo().await;
        let cooldown = t0() - Duration::minutes(240);
        repo.insert_with_cooldown(&buy_signal("BTCUSDT", t0()), cooldown)
            .await
            .unwrap();

        let eth = buy_signal("ETHUSDT", t0());
        assert_eq!(
            repo.insert_with_cooldown(&eth, cooldown).await.unwrap(),
            InsertOutcome::Inserted
        );
    }

    #[tokio::test]
    async fn test_recently_resolved_key_still_cools_down() {
        let repo = repo().await;
        let first = buy_signal("BTCUSDT", t0());
        repo.insert_with_cooldown(&first, t0() - Duration::minutes(240))
            .await
            .unwrap();
        assert!(repo
            .resolve(&outcome_for(&first, OutcomeResult::Win, t0() + Duration::minutes(90)))
            .await
            .unwrap());

        // Two hours later the key is free of active signals but still inside the horizon.
        let later = t0() + Duration::minutes(120);
        let second = buy_signal("BTCUSDT", later);
        assert_eq!(
            repo.insert_with_cooldown(&second, later - Duration::minutes(240))
                .await
                .unwrap(),
            InsertOutcome::Suppressed
        );

        // Once the horizon has passed a new signal is accepted.
        let much_later = t0() + Duration::minutes(300);
        let third = buy_signal("BTCUSDT", much_later);
        assert_eq!(
            repo.insert_with_cooldown(&third, much_later - Duration::minutes(240))
                .await
                .unwrap(),
            InsertOutcome::Inserted
        );
    }

    // =========================================================================
    // Resolution Tests
    // =========================================================================

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let repo = repo().await;
        let signal = buy_signal("BTCUSDT", t0());
        repo.insert_with_cooldown(&signal, t0() - Duration::minutes(240))
            .await
            .unwrap();

        let outcome = outcome_for(&signal, OutcomeResult::Win, t0() + Duration::hours(2));
        assert!(repo.resolve(&outcome).await.unwrap());
        assert!(!repo.resolve(&outcome).await.unwrap());

        let stored = repo.get(signal.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SignalStatus::Completed);
        assert_eq!(stored.evaluated_at, Some(t0() + Duration::hours(2)));

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM outcomes")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_pending_evaluation_respects_age_and_status() {
        let repo = repo().await;
        let old = buy_signal("BTCUSDT", t0());
        let young = buy_signal("ETHUSDT", t0() + Duration::minutes(50));
        let cooldown = t0() - Duration::minutes(240);
        repo.insert_with_cooldown(&old, cooldown).await.unwrap();
        repo.insert_with_cooldown(&young, cooldown).await.unwrap();

        let pending = repo
            .pending_evaluation(t0() + Duration::minutes(30))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, old.id);

        assert!(repo.mark_taken(old.id).await.unwrap());
        let pending = repo
            .pending_evaluation(t0() + Duration::minutes(60))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, young.id);
    }

    #[tokio::test]
    async fn test_manual_outcome_requires_taken() {
        let repo = repo().await;
        let signal = buy_signal("BTCUSDT", t0());
        repo.insert_with_cooldown(&signal, t0() - Duration::minutes(240))
            .await
            .unwrap();

        let mut outcome = outcome_for(&signal, OutcomeResult::Loss, t0() + Duration::hours(1));
        outcome.manual = true;
        assert!(!repo.record_manual_outcome(&outcome).await.unwrap());

        assert!(repo.mark_taken(signal.id).await.unwrap());
        assert!(!repo.mark_taken(signal.id).await.unwrap());
        assert!(repo.record_manual_outcome(&outcome).await.unwrap());
        assert!(!repo.record_manual_outcome(&outcome).await.unwrap());

        let stored = repo.get(signal.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SignalStatus::Taken);
        assert!(stored.evaluated_at.is_some());
    }

    #[tokio::test]
    async fn test_list_with_filters() {
        let repo = repo().await;
        let cooldown = t0() - Duration::minutes(240);
        let btc = buy_signal("BTCUSDT", t0());
        let eth = buy_signal("ETHUSDT", t0() + Duration::minutes(1));
        repo.insert_with_cooldown(&btc, cooldown).await.unwrap();
        repo.insert_with_cooldown(&eth, cooldown).await.unwrap();
        repo.resolve(&outcome_for(&btc, OutcomeResult::Loss, t0() + Duration::hours(2)))
            .await
            .unwrap();

        let all = repo.list(&SignalFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, eth.id);

        let failed = repo
            .list(&SignalFilter {
                status: Some(SignalStatus::Failed),
                ..SignalFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, btc.id);

        let eth_only = repo
            .list(&SignalFilter {
                symbol: Some("ETHUSDT".to_string()),
                signal_type: Some(SignalType::Buy),
                since: Some(t0()),
                limit: 10,
                ..SignalFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(eth_only.len(), 1);

        assert_eq!(repo.count_created_since(t0()).await.unwrap(), 2);
    }
}
