use super::from_millis;
use anyhow::{Context, Result};
use cryptopulse_core::RiskState;

/// Row of the `risk_states` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RiskStateRow {
    pub symbol: String,
    pub recent_winrate: f64,
    pub winrate_source: String,
    pub base_allocation: f64,
    pub adjusted_allocation: f64,
    pub leverage: f64,
    pub risk_status: String,
    pub confidence_level: String,
    pub last_adjustment_reason: String,
    pub recommendations_json: String,
    pub updated_at: i64,
}

impl TryFrom<RiskStateRow> for RiskState {
    type Error = anyhow::Error;

    fn try_from(row: RiskStateRow) -> Result<Self> {
        Ok(Self {
            symbol: row.symbol,
            recent_winrate: row.recent_winrate,
            winrate_source: row.winrate_source.parse()?,
            base_allocation: row.base_allocation,
            adjusted_allocation: row.adjusted_allocation,
            leverage: row.leverage,
            risk_status: row.risk_status.parse()?,
            confidence_level: row.confidence_level,
            last_adjustment_reason: row.last_adjustment_reason,
            recommendations: serde_json::from_str(&row.recommendations_json)
                .context("corrupt recommendations_json")?,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}
