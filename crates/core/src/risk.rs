use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trading posture derived from the recent win rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskStatus {
    Aggressive,
    Normal,
    Conservative,
    Suspended,
}

impl RiskStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Aggressive => "aggressive",
            Self::Normal => "normal",
            Self::Conservative => "conservative",
            Self::Suspended => "suspended",
        }
    }

    /// Maps a win rate (percent) to a status.
    ///
    /// Below 45 suspends, [45, 55) is conservative, [55, 70] normal, above 70 aggressive.
    #[must_use]
    pub fn from_winrate(winrate: f64) -> Self {
        if winrate < 45.0 {
            Self::Suspended
        } else if winrate < 55.0 {
            Self::Conservative
        } else if winrate <= 70.0 {
            Self::Normal
        } else {
            Self::Aggressive
        }
    }

    /// Allocation multiplier applied to the base allocation.
    #[must_use]
    pub const fn allocation_multiplier(&self) -> f64 {
        match self {
            Self::Aggressive => 1.5,
            Self::Normal => 1.0,
            Self::Conservative => 0.5,
            Self::Suspended => 0.0,
        }
    }

    /// Maximum leverage allowed in this status.
    #[must_use]
    pub const fn leverage_cap(&self) -> f64 {
        match self {
            Self::Aggressive => 3.0,
            Self::Normal => 2.0,
            Self::Conservative | Self::Suspended => 1.0,
        }
    }
}

impl FromStr for RiskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "aggressive" => Ok(Self::Aggressive),
            "normal" => Ok(Self::Normal),
            "conservative" => Ok(Self::Conservative),
            "suspended" => Ok(Self::Suspended),
            _ => Err(anyhow!("Invalid risk status: {s}")),
        }
    }
}

impl fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the win-rate estimate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WinrateSource {
    Backtest,
    Live,
    Default,
}

impl WinrateSource {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Backtest => "backtest",
            Self::Live => "live",
            Self::Default => "default",
        }
    }
}

impl FromStr for WinrateSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "backtest" => Ok(Self::Backtest),
            "live" => Ok(Self::Live),
            "default" => Ok(Self::Default),
            _ => Err(anyhow!("Invalid winrate source: {s}")),
        }
    }
}

/// Current allocation recommendation for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub symbol: String,
    pub recent_winrate: f64,
    pub winrate_source: WinrateSource,
    pub base_allocation: f64,
    pub adjusted_allocation: f64,
    pub leverage: f64,
    pub risk_status: RiskStatus,
    /// "high", "medium" or "low"
    pub confidence_level: String,
    pub last_adjustment_reason: String,
    pub recommendations: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_boundaries() {
        assert_eq!(RiskStatus::from_winrate(44.9), RiskStatus::Suspended);
        assert_eq!(RiskStatus::from_winrate(45.0), RiskStatus::Conservative);
        assert_eq!(RiskStatus::from_winrate(54.9), RiskStatus::Conservative);
        assert_eq!(RiskStatus::from_winrate(55.0), RiskStatus::Normal);
        assert_eq!(RiskStatus::from_winrate(60.0), RiskStatus::Normal);
        assert_eq!(RiskStatus::from_winrate(70.0), RiskStatus::Normal);
        assert_eq!(RiskStatus::from_winrate(70.1), RiskStatus::Aggressive);
    }

    #[test]
    fn test_suspended_allocates_nothing() {
        assert_eq!(RiskStatus::Suspended.allocation_multiplier(), 0.0);
        assert!(RiskStatus::Aggressive.leverage_cap() > RiskStatus::Normal.leverage_cap());
    }
}
