use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Accumulated statistics for one indicator-regime pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub pattern_name: String,
    pub occurrence_count: i64,
    pub win_count: i64,
    /// Percentage of occurrences that won
    pub win_rate: f64,
    /// Confidence points added to future candidates with this pattern
    pub confidence_boost: f64,
    pub total_pnl_percent: f64,
    pub updated_at: DateTime<Utc>,
}

/// Per-symbol reliability of generated signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationRecord {
    pub symbol: String,
    pub win_count: i64,
    pub loss_count: i64,
    /// All outcomes, NEUTRAL included
    pub total_trades: i64,
    /// wins / (wins + losses) in percent
    pub success_rate: f64,
    /// Bounded score in [0, 100]; 50 is neutral
    pub reputation_score: f64,
    pub updated_at: DateTime<Utc>,
}

impl ReputationRecord {
    /// Neutral reputation for a symbol with no history.
    #[must_use]
    pub fn neutral(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            win_count: 0,
            loss_count: 0,
            total_trades: 0,
            success_rate: 50.0,
            reputation_score: 50.0,
            updated_at: Utc::now(),
        }
    }
}
