//! Backtest run repository.

use anyhow::Result;
use cryptopulse_core::{BacktestRun, BacktestTrade};
use sqlx::SqlitePool;

use crate::models::{to_millis, BacktestRunRow, BacktestTradeRow, StoredBacktestRun};

const RUN_COLUMNS: &str = "id, symbol, tested_days, start_date, end_date, signals_tested, \
    signals_win, signals_loss, signals_neutral, winrate, avg_profit, avg_loss, \
    total_pnl_percent, max_drawdown_pct, best_pattern, worst_pattern, created_at";

/// Repository for backtest runs and their trades.
#[derive(Debug, Clone)]
pub struct BacktestRepository {
    pool: SqlitePool,
}

impl BacktestRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stores a run and its trades in one transaction, returning the run id.
    ///
    /// # Errors
    /// Returns an error if the database transaction fails.
    pub async fn insert_run(&self, run: &BacktestRun, trades: &[BacktestTrade]) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let (run_id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO backtest_runs
                (symbol, tested_days, start_date, end_date, signals_tested, signals_win,
                 signals_loss, signals_neutral, winrate, avg_profit, avg_loss,
                 total_pnl_percent, max_drawdown_pct, best_pattern, worst_pattern, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            RETURNING id
            ",
        )
        .bind(&run.symbol)
        .bind(run.tested_days)
        .bind(to_millis(run.start_date))
        .bind(to_millis(run.end_date))
        .bind(run.signals_tested)
        .bind(run.signals_win)
        .bind(run.signals_loss)
        .bind(run.signals_neutral)
        .bind(run.winrate)
        .bind(run.avg_profit)
        .bind(run.avg_loss)
        .bind(run.total_pnl_percent)
        .bind(run.max_drawdown_pct)
        .bind(&run.best_pattern)
        .bind(&run.worst_pattern)
        .bind(to_millis(run.created_at))
        .fetch_one(&mut *tx)
        .await?;

        for trade in trades {
            sqlx::query(
                r"
                INSERT INTO backtest_trades
                    (run_id, timestamp, signal_type, confidence, entry_price, take_profit,
                     stop_loss, pattern_name, result, exit_price, pnl_percent, bars_held)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                ",
            )
            .bind(run_id)
            .bind(to_millis(trade.timestamp))
            .bind(trade.signal_type.as_str())
            .bind(trade.confidence)
            .bind(trade.entry_price)
            .bind(trade.take_profit)
            .bind(trade.stop_loss)
            .bind(&trade.pattern_name)
            .bind(trade.result.as_str())
            .bind(trade.exit_price)
            .bind(trade.pnl_percent)
            .bind(i64::try_from(trade.bars_held)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(run_id)
    }

    /// Most recent run for a symbol.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn latest_for_symbol(&self, symbol: &str) -> Result<Option<StoredBacktestRun>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM backtest_runs WHERE symbol = ?1 \
             ORDER BY created_at DESC, id DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, BacktestRunRow>(&sql)
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?;

        row.map(StoredBacktestRun::try_from).transpose()
    }

    /// Runs for a symbol, newest first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn list_for_symbol(&self, symbol: &str, limit: i64) -> Result<Vec<StoredBacktestRun>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM backtest_runs WHERE symbol = ?1 \
             ORDER BY created_at DESC, id DESC LIMIT ?2"
        );
        let rows = sqlx::query_as::<_, BacktestRunRow>(&sql)
            .bind(symbol)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(StoredBacktestRun::try_from).collect()
    }

    /// Trades of a run in generation order.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn trades_for_run(&self, run_id: i64) -> Result<Vec<BacktestTrade>> {
        let rows = sqlx::query_as::<_, BacktestTradeRow>(
            r"
            SELECT run_id, timestamp, signal_type, confidence, entry_price, take_profit,
                   stop_loss, pattern_name, result, exit_price, pnl_percent, bars_held
            FROM backtest_trades WHERE run_id = ?1
            ORDER BY id ASC
            ",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(BacktestTrade::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use chrono::{Duration, TimeZone, Utc};
    use cryptopulse_core::{OutcomeResult, SignalType};

    #[tokio::test]
    async fn test_insert_and_read_back_run_with_trades() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.repositories().backtests;
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        let run = BacktestRun {
            symbol: "BTCUSDT".to_string(),
            tested_days: 30,
            start_date: start,
            end_date: start + Duration::days(30),
            signals_tested: 1,
            signals_win: 1,
            signals_loss: 0,
            signals_neutral: 0,
            winrate: 100.0,
            avg_profit: 2.0,
            avg_loss: 0.0,
            total_pnl_percent: 2.0,
            max_drawdown_pct: 1.5,
            best_pattern: None,
            worst_pattern: None,
            created_at: start + Duration::days(30),
        };
        let trade = BacktestTrade {
            timestamp: start + Duration::days(3),
            signal_type: SignalType::Buy,
            confidence: 75.0,
            entry_price: 100.0,
            take_profit: 102.0,
            stop_loss: 99.0,
            pattern_name: "P".to_string(),
            result: OutcomeResult::Win,
            exit_price: 102.0,
            pnl_percent: 2.0,
            bars_held: 3,
        };

        let id = repo.insert_run(&run, &[trade.clone()]).await.unwrap();
        let latest = repo.latest_for_symbol("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(latest.id, id);
        assert_eq!(latest.run, run);
        assert_eq!(latest.run.max_drawdown_pct, 1.5);
        assert_eq!(repo.trades_for_run(id).await.unwrap(), vec![trade]);
        assert!(repo.latest_for_symbol("ETHUSDT").await.unwrap().is_none());
    }
}
