use super::from_millis;
use anyhow::Result;
use cryptopulse_core::{BacktestRun, BacktestTrade};
use serde::Serialize;

/// Row of the `backtest_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BacktestRunRow {
    pub id: i64,
    pub symbol: String,
    pub tested_days: i64,
    pub start_date: i64,
    pub end_date: i64,
    pub signals_tested: i64,
    pub signals_win: i64,
    pub signals_loss: i64,
    pub signals_neutral: i64,
    pub winrate: f64,
    pub avg_profit: f64,
    pub avg_loss: f64,
    pub total_pnl_percent: f64,
    pub max_drawdown_pct: f64,
    pub best_pattern: Option<String>,
    pub worst_pattern: Option<String>,
    pub created_at: i64,
}

/// A persisted run together with its database id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredBacktestRun {
    pub id: i64,
    #[serde(flatten)]
    pub run: BacktestRun,
}

impl TryFrom<BacktestRunRow> for StoredBacktestRun {
    type Error = anyhow::Error;

    fn try_from(row: BacktestRunRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            run: BacktestRun {
                symbol: row.symbol,
                tested_days: row.tested_days,
                start_date: from_millis(row.start_date)?,
                end_date: from_millis(row.end_date)?,
                signals_tested: row.signals_tested,
                signals_win: row.signals_win,
                signals_loss: row.signals_loss,
                signals_neutral: row.signals_neutral,
                winrate: row.winrate,
                avg_profit: row.avg_profit,
                avg_loss: row.avg_loss,
                total_pnl_percent: row.total_pnl_percent,
                max_drawdown_pct: row.max_drawdown_pct,
                best_pattern: row.best_pattern,
                worst_pattern: row.worst_pattern,
                created_at: from_millis(row.created_at)?,
            },
        })
    }
}

/// Row of the `backtest_trades` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BacktestTradeRow {
    pub run_id: i64,
    pub timestamp: i64,
    pub signal_type: String,
    pub confidence: f64,
    pub entry_price: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub pattern_name: String,
    pub result: String,
    pub exit_price: f64,
    pub pnl_percent: f64,
    pub bars_held: i64,
}

impl TryFrom<BacktestTradeRow> for BacktestTrade {
    type Error = anyhow::Error;

    fn try_from(row: BacktestTradeRow) -> Result<Self> {
        Ok(Self {
            timestamp: from_millis(row.timestamp)?,
            signal_type: row.signal_type.parse()?,
            confidence: row.confidence,
            entry_price: row.entry_price,
            take_profit: row.take_profit,
            stop_loss: row.stop_loss,
            pattern_name: row.pattern_name,
            result: row.result.parse()?,
            exit_price: row.exit_price,
            pnl_percent: row.pnl_percent,
            bars_held: usize::try_from(row.bars_held)?,
        })
    }
}
