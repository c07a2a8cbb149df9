//! Trading signal types and the signal state machine.
//!
//! A [`CandidateSignal`] is what the synthesizer produces every cycle. Only
//! directional candidates become persisted [`Signal`]s, which then move through
//! [`SignalStatus`] exactly once from `active` to a terminal state.

use crate::indicator::IndicatorSet;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Direction of a trading signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    Buy,
    Sell,
    /// No trade; never persisted
    Wait,
}

impl SignalType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Wait => "WAIT",
        }
    }

    /// Returns true for BUY and SELL.
    #[must_use]
    pub const fn is_directional(&self) -> bool {
        !matches!(self, Self::Wait)
    }
}

impl FromStr for SignalType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            "WAIT" => Ok(Self::Wait),
            _ => Err(anyhow!("Invalid signal type: {s}")),
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a persisted signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Active,
    /// Resolved as a win
    Completed,
    /// Resolved as a loss
    Failed,
    /// Horizon elapsed without touching a target
    Expired,
    /// Taken by the user; outcome comes from explicit feedback
    Taken,
}

impl SignalStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Taken => "taken",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }

    /// Allowed transitions: only `active` may move, and only to a different status.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(self, Self::Active) && !matches!(next, Self::Active)
    }
}

impl FromStr for SignalStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "expired" => Ok(Self::Expired),
            "taken" => Ok(Self::Taken),
            _ => Err(anyhow!("Invalid signal status: {s}")),
        }
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which decision channel produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalSource {
    Rule,
    Advisory,
}

impl SignalSource {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Rule => "rule",
            Self::Advisory => "advisory",
        }
    }
}

impl FromStr for SignalSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rule" => Ok(Self::Rule),
            "advisory" => Ok(Self::Advisory),
            _ => Err(anyhow!("Invalid signal source: {s}")),
        }
    }
}

/// Checks the price ordering for a direction.
///
/// BUY needs `take_profit > entry > stop_loss`, SELL needs
/// `stop_loss > entry > take_profit`. WAIT carries no targets and always passes.
#[must_use]
pub fn targets_are_ordered(
    signal_type: SignalType,
    entry: f64,
    take_profit: f64,
    stop_loss: f64,
) -> bool {
    let finite = entry.is_finite() && take_profit.is_finite() && stop_loss.is_finite();
    match signal_type {
        SignalType::Buy => finite && take_profit > entry && entry > stop_loss,
        SignalType::Sell => finite && stop_loss > entry && entry > take_profit,
        SignalType::Wait => true,
    }
}

/// Output of one synthesis pass, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSignal {
    pub symbol: String,
    pub signal_type: SignalType,
    pub confidence: f64,
    pub entry_price: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub pattern_name: String,
    pub reason: String,
    pub source: SignalSource,
    pub indicators: IndicatorSet,
}

impl CandidateSignal {
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        self.signal_type.is_directional()
    }
}

/// Persisted trading signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub symbol: String,
    pub signal_type: SignalType,
    pub confidence: f64,
    pub entry_price: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub horizon_minutes: i64,
    pub pattern_name: String,
    pub reason: String,
    pub source: SignalSource,
    pub status: SignalStatus,
    /// Indicator values at creation, for audit
    pub indicators: Option<IndicatorSet>,
    pub created_at: DateTime<Utc>,
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl Signal {
    /// Creates a fresh `active` signal from a candidate.
    #[must_use]
    pub fn from_candidate(
        candidate: CandidateSignal,
        horizon_minutes: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: candidate.symbol,
            signal_type: candidate.signal_type,
            confidence: candidate.confidence,
            entry_price: candidate.entry_price,
            take_profit: candidate.take_profit,
            stop_loss: candidate.stop_loss,
            horizon_minutes,
            pattern_name: candidate.pattern_name,
            reason: candidate.reason,
            source: candidate.source,
            status: SignalStatus::Active,
            indicators: Some(candidate.indicators),
            created_at,
            evaluated_at: None,
        }
    }

    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// End of the window in which take-profit and stop-loss count.
    #[must_use]
    pub fn horizon_end(&self) -> DateTime<Utc> {
        self.created_at + Duration::minutes(self.horizon_minutes)
    }

    /// True once the signal has outlived its horizon.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.horizon_end()
    }

    #[must_use]
    pub fn is_pending_evaluation(&self) -> bool {
        self.status == SignalStatus::Active && self.evaluated_at.is_none()
    }
}
