use super::from_millis;
use anyhow::Result;
use cryptopulse_core::{PatternRecord, ReputationRecord};

/// Row of the `patterns` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PatternRow {
    pub pattern_name: String,
    pub occurrence_count: i64,
    pub win_count: i64,
    pub win_rate: f64,
    pub confidence_boost: f64,
    pub total_pnl_percent: f64,
    pub updated_at: i64,
}

impl TryFrom<PatternRow> for PatternRecord {
    type Error = anyhow::Error;

    fn try_from(row: PatternRow) -> Result<Self> {
        Ok(Self {
            pattern_name: row.pattern_name,
            occurrence_count: row.occurrence_count,
            win_count: row.win_count,
            win_rate: row.win_rate,
            confidence_boost: row.confidence_boost,
            total_pnl_percent: row.total_pnl_percent,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

/// Row of the `reputation` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReputationRow {
    pub symbol: String,
    pub win_count: i64,
    pub loss_count: i64,
    pub total_trades: i64,
    pub success_rate: f64,
    pub reputation_score: f64,
    pub updated_at: i64,
}

impl TryFrom<ReputationRow> for ReputationRecord {
    type Error = anyhow::Error;

    fn try_from(row: ReputationRow) -> Result<Self> {
        Ok(Self {
            symbol: row.symbol,
            win_count: row.win_count,
            loss_count: row.loss_count,
            total_trades: row.total_trades,
            success_rate: row.success_rate,
            reputation_score: row.reputation_score,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}
