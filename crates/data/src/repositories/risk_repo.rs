//! Risk state repository.

use anyhow::Result;
use cryptopulse_core::RiskState;
use sqlx::SqlitePool;

use crate::models::{to_millis, RiskStateRow};

const RISK_COLUMNS: &str = "symbol, recent_winrate, winrate_source, base_allocation, \
    adjusted_allocation, leverage, risk_status, confidence_level, last_adjustment_reason, \
    recommendations_json, updated_at";

/// Repository for risk states.
#[derive(Debug, Clone)]
pub struct RiskStateRepository {
    pool: SqlitePool,
}

impl RiskStateRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces the risk state of a symbol.
    ///
    /// # Errors
    /// Returns an error if serialization or the database operation fails.
    pub async fn upsert(&self, state: &RiskState) -> Result<()> {
        let recommendations = serde_json::to_string(&state.recommendations)?;

        sqlx::query(
            r"
            INSERT INTO risk_states
                (symbol, recent_winrate, winrate_source, base_allocation, adjusted_allocation,
                 leverage, risk_status, confidence_level, last_adjustment_reason,
                 recommendations_json, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(symbol) DO UPDATE SET
                recent_winrate = excluded.recent_winrate,
                winrate_source = excluded.winrate_source,
                base_allocation = excluded.base_allocation,
                adjusted_allocation = excluded.adjusted_allocation,
                leverage = excluded.leverage,
                risk_status = excluded.risk_status,
                confidence_level = excluded.confidence_level,
                last_adjustment_reason = excluded.last_adjustment_reason,
                recommendations_json = excluded.recommendations_json,
                updated_at = excluded.updated_at
            ",
        )
        .bind(&state.symbol)
        .bind(state.recent_winrate)
        .bind(state.winrate_source.as_str())
        .bind(state.base_allocation)
        .bind(state.adjusted_allocation)
        .bind(state.leverage)
        .bind(state.risk_status.as_str())
        .bind(&state.confidence_level)
        .bind(&state.last_adjustment_reason)
        .bind(recommendations)
        .bind(to_millis(state.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets the risk state of a symbol.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get(&self, symbol: &str) -> Result<Option<RiskState>> {
        let sql = format!("SELECT {RISK_COLUMNS} FROM risk_states WHERE symbol = ?1");
        let row = sqlx::query_as::<_, RiskStateRow>(&sql)
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?;

        row.map(RiskState::try_from).transpose()
    }

    /// Lists all risk states by symbol.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<RiskState>> {
        let sql = format!("SELECT {RISK_COLUMNS} FROM risk_states ORDER BY symbol");
        let rows = sqlx::query_as::<_, RiskStateRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(RiskState::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use chrono::{TimeZone, Utc};
    use cryptopulse_core::{RiskStatus, WinrateSource};

    #[tokio::test]
    async fn test_upsert_replaces_state() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.repositories().risk;
        let mut state = RiskState {
            symbol: "BTCUSDT".to_string(),
            recent_winrate: 60.0,
            winrate_source: WinrateSource::Live,
            base_allocation: 1.0,
            adjusted_allocation: 1.0,
            leverage: 2.0,
            risk_status: RiskStatus::Normal,
            confidence_level: "medium".to_string(),
            last_adjustment_reason: "live win rate 60.0%".to_string(),
            recommendations: vec!["keep going".to_string()],
            updated_at: Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap(),
        };
        repo.upsert(&state).await.unwrap();

        state.risk_status = RiskStatus::Suspended;
        state.recommendations.clear();
        repo.upsert(&state).await.unwrap();

        let stored = repo.get("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(stored, state);
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
