//! Market data types shared by providers, the indicator engine and the backtester.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Candle interval accepted by the market-data providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    /// 1 minute
    M1,
    /// 5 minutes
    M5,
    /// 15 minutes
    M15,
    /// 30 minutes
    M30,
    /// 1 hour
    H1,
    /// 4 hours
    H4,
    /// 1 day
    D1,
}

impl Interval {
    /// Returns the provider string for this interval.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        }
    }

    /// Returns the interval length in minutes.
    #[must_use]
    pub const fn minutes(&self) -> i64 {
        match self {
            Self::M1 => 1,
            Self::M5 => 5,
            Self::M15 => 15,
            Self::M30 => 30,
            Self::H1 => 60,
            Self::H4 => 240,
            Self::D1 => 1440,
        }
    }

    /// Returns the interval length in milliseconds.
    #[must_use]
    pub const fn duration_ms(&self) -> i64 {
        self.minutes() * 60 * 1000
    }

    /// Number of candles covering one day.
    #[must_use]
    pub const fn per_day(&self) -> usize {
        (1440 / self.minutes()) as usize
    }
}

impl FromStr for Interval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1m" => Ok(Self::M1),
            "5m" => Ok(Self::M5),
            "15m" => Ok(Self::M15),
            "30m" => Ok(Self::M30),
            "1h" => Ok(Self::H1),
            "4h" => Ok(Self::H4),
            "1d" => Ok(Self::D1),
            _ => Err(anyhow!(
                "Invalid interval: {s}. Valid values: 1m, 5m, 15m, 30m, 1h, 4h, 1d"
            )),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 24h ticker as returned by a provider, before it is stamped into a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub price: f64,
    pub change_24h_pct: f64,
    pub volume_24h: f64,
    pub high_24h: f64,
    pub low_24h: f64,
}

/// Point-in-time market view for one symbol. Never mutated once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub price: f64,
    pub change_24h_pct: f64,
    pub volume_24h: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    /// Provider that served the data (or `cache:<provider>` for a cache fallback)
    pub provider: String,
    pub fetched_at: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Builds a snapshot from a provider ticker.
    #[must_use]
    pub fn from_ticker(
        symbol: impl Into<String>,
        ticker: Ticker,
        provider: impl Into<String>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            price: ticker.price,
            change_24h_pct: ticker.change_24h_pct,
            volume_24h: ticker.volume_24h,
            high_24h: ticker.high_24h,
            low_24h: ticker.low_24h,
            provider: provider.into(),
            fetched_at,
        }
    }

    /// High-low range as a percentage of the last price.
    #[must_use]
    pub fn range_pct(&self) -> f64 {
        if self.price <= 0.0 || self.high_24h < self.low_24h {
            return 0.0;
        }
        (self.high_24h - self.low_24h) / self.price * 100.0
    }
}

/// Single OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Ordered candle sequence for one symbol and interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleSeries {
    pub symbol: String,
    pub interval: Interval,
    pub candles: Vec<Candle>,
}

impl CandleSeries {
    /// Minimum candle count for a valid indicator set.
    pub const MIN_LEN: usize = 50;

    /// Creates a series, sorting candles by timestamp.
    #[must_use]
    pub fn new(symbol: impl Into<String>, interval: Interval, mut candles: Vec<Candle>) -> Self {
        candles.sort_by_key(|c| c.timestamp);
        Self {
            symbol: symbol.into(),
            interval,
            candles,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Returns the close prices in order.
    #[must_use]
    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    /// Returns the volumes in order.
    #[must_use]
    pub fn volumes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.volume).collect()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Candles strictly after `since`.
    pub fn since(&self, since: DateTime<Utc>) -> impl Iterator<Item = &Candle> {
        self.candles.iter().filter(move |c| c.timestamp > since)
    }
}

/// Aggregated news sentiment for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

impl Sentiment {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bullish => "bullish",
            Self::Bearish => "bearish",
            Self::Neutral => "neutral",
        }
    }

    /// Classifies vote counts: one side must outweigh the other by half again.
    #[must_use]
    pub fn from_votes(positive: u64, negative: u64) -> Self {
        let (pos, neg) = (positive as f64, negative as f64);
        if pos > neg * 1.5 {
            Self::Bullish
        } else if neg > pos * 1.5 {
            Self::Bearish
        } else {
            Self::Neutral
        }
    }
}

impl FromStr for Sentiment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bullish" => Ok(Self::Bullish),
            "bearish" => Ok(Self::Bearish),
            "neutral" => Ok(Self::Neutral),
            _ => Err(anyhow!("Invalid sentiment: {s}")),
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
