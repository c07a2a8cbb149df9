//! Outcome types and the resolution rule shared by live evaluation and backtests.

use crate::market::Candle;
use crate::signal::{SignalStatus, SignalType};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Result of a resolved signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutcomeResult {
    Win,
    Loss,
    /// Horizon elapsed without touching take-profit or stop-loss
    Neutral,
}

impl OutcomeResult {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Win => "WIN",
            Self::Loss => "LOSS",
            Self::Neutral => "NEUTRAL",
        }
    }

    /// Terminal signal status for this result.
    #[must_use]
    pub const fn signal_status(&self) -> SignalStatus {
        match self {
            Self::Win => SignalStatus::Completed,
            Self::Loss => SignalStatus::Failed,
            Self::Neutral => SignalStatus::Expired,
        }
    }

    /// True for WIN and LOSS.
    #[must_use]
    pub const fn is_decisive(&self) -> bool {
        !matches!(self, Self::Neutral)
    }
}

impl FromStr for OutcomeResult {
    type Err = anyhow::Error;

    /// Accepts both outcome spellings and the user feedback words `win`/`lose`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "win" => Ok(Self::Win),
            "loss" | "lose" => Ok(Self::Loss),
            "neutral" => Ok(Self::Neutral),
            _ => Err(anyhow!("Invalid outcome result: {s}")),
        }
    }
}

impl fmt::Display for OutcomeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of how a signal ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub signal_id: Uuid,
    pub symbol: String,
    pub signal_type: SignalType,
    pub pattern_name: String,
    pub result: OutcomeResult,
    pub pnl_percent: f64,
    pub exit_price: f64,
    pub exit_timestamp: DateTime<Utc>,
    /// Recorded from explicit user feedback rather than price observation
    pub manual: bool,
}

/// Price action observed over some period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub high: f64,
    pub low: f64,
    /// Last price of the period
    pub close: f64,
}

impl PriceObservation {
    /// Observation made of a single price.
    #[must_use]
    pub const fn at(price: f64) -> Self {
        Self {
            high: price,
            low: price,
            close: price,
        }
    }

}

impl From<Candle> for PriceObservation {
    fn from(candle: Candle) -> Self {
        Self {
            high: candle.high,
            low: candle.low,
            close: candle.close,
        }
    }
}

/// A resolved result with its exit price and realized P&L.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub result: OutcomeResult,
    pub exit_price: f64,
    pub pnl_percent: f64,
}

/// Directional P&L in percent: a favorable move is positive for BUY and SELL alike.
#[must_use]
pub fn directional_pnl_pct(signal_type: SignalType, entry: f64, exit: f64) -> f64 {
    if entry <= 0.0 {
        return 0.0;
    }
    match signal_type {
        SignalType::Buy => (exit - entry) / entry * 100.0,
        SignalType::Sell => (entry - exit) / entry * 100.0,
        SignalType::Wait => 0.0,
    }
}

/// Classifies observed price action against a signal's targets.
///
/// Take-profit is checked before stop-loss. When neither is touched the signal
/// resolves NEUTRAL at the observed close only if `horizon_elapsed`; otherwise
/// it stays open and `None` is returned.
#[must_use]
pub fn resolve(
    signal_type: SignalType,
    entry: f64,
    take_profit: f64,
    stop_loss: f64,
    observed: PriceObservation,
    horizon_elapsed: bool,
) -> Option<Resolution> {
    let (result, exit_price) = match signal_type {
        SignalType::Buy if observed.high >= take_profit => (OutcomeResult::Win, take_profit),
        SignalType::Buy if observed.low <= stop_loss => (OutcomeResult::Loss, stop_loss),
        SignalType::Sell if observed.low <= take_profit => (OutcomeResult::Win, take_profit),
        SignalType::Sell if observed.high >= stop_loss => (OutcomeResult::Loss, stop_loss),
        SignalType::Wait => return None,
        _ if horizon_elapsed => (OutcomeResult::Neutral, observed.close),
        _ => return None,
    };

    Some(Resolution {
        result,
        exit_price,
        pnl_percent: directional_pnl_pct(signal_type, entry, exit_price),
    })
}

/// Walks observations in chronological order and stops at the first one that
/// touches take-profit or stop-loss.
///
/// Returns the resolution together with the 1-based position of the deciding
/// observation. When nothing is touched the last observation closes the signal
/// NEUTRAL if `horizon_elapsed`; an empty path never resolves.
#[must_use]
pub fn resolve_path<I>(
    signal_type: SignalType,
    entry: f64,
    take_profit: f64,
    stop_loss: f64,
    path: I,
    horizon_elapsed: bool,
) -> Option<(Resolution, usize)>
where
    I: IntoIterator<Item = PriceObservation>,
{
    if signal_type == SignalType::Wait {
        return None;
    }

    let mut last = None;
    for (i, observed) in path.into_iter().enumerate() {
        if let Some(r) = resolve(signal_type, entry, take_profit, stop_loss, observed, false) {
            return Some((r, i + 1));
        }
        last = Some((observed, i + 1));
    }

    let (observed, steps) = last?;
    resolve(signal_type, entry, take_profit, stop_loss, observed, horizon_elapsed)
        .map(|r| (r, steps))
}
