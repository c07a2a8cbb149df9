use crate::outcome::OutcomeResult;
use crate::signal::SignalType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One simulated signal and how it resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestTrade {
    /// Candle timestamp the signal was generated at
    pub timestamp: DateTime<Utc>,
    pub signal_type: SignalType,
    pub confidence: f64,
    pub entry_price: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub pattern_name: String,
    pub result: OutcomeResult,
    pub exit_price: f64,
    pub pnl_percent: f64,
    /// Candles elapsed until resolution
    pub bars_held: usize,
}

/// Aggregate result of one backtest invocation. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRun {
    pub symbol: String,
    pub tested_days: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub signals_tested: i64,
    pub signals_win: i64,
    pub signals_loss: i64,
    pub signals_neutral: i64,
    /// wins / (wins + losses) in percent
    pub winrate: f64,
    /// Mean P&L of winning trades
    pub avg_profit: f64,
    /// Mean P&L of losing trades (negative)
    pub avg_loss: f64,
    pub total_pnl_percent: f64,
    /// Largest peak-to-trough fall of the cumulative P&L, in percentage points
    pub max_drawdown_pct: f64,
    pub best_pattern: Option<String>,
    pub worst_pattern: Option<String>,
    pub created_at: DateTime<Utc>,
}
