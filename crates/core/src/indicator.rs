use serde::{Deserialize, Serialize};

/// MACD line, its (approximated) signal line and the histogram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Macd {
    pub value: f64,
    pub signal: f64,
    pub histogram: f64,
}

impl Macd {
    #[must_use]
    pub fn is_bullish(&self) -> bool {
        self.histogram > 0.0
    }

    #[must_use]
    pub fn is_bearish(&self) -> bool {
        self.histogram < 0.0
    }
}

/// Indicator values derived from one candle window.
///
/// Recomputed every cycle; stored alongside a signal for audit only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct IndicatorSet {
    /// RSI(14), always within [0, 100]
    pub rsi: f64,
    pub macd: Macd,
    pub ema20: f64,
    pub ema50: f64,
    /// Mean absolute close-to-close move
    pub atr: f64,
    /// Latest volume over the trailing average
    pub volume_ratio: f64,
    /// Percent change of the last close
    pub price_change_pct: f64,
    /// Percent change over the momentum period
    pub momentum: f64,
}

impl IndicatorSet {
    /// Short-term trend is up when EMA20 sits above EMA50.
    #[must_use]
    pub fn is_uptrend(&self) -> bool {
        self.ema20 > self.ema50
    }

    /// Human-readable indicator list appended to signal reasons.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "RSI {:.1}, MACD hist {:.4}, EMA20 {:.2}, EMA50 {:.2}, ATR {:.4}, Vol x{:.2}",
            self.rsi, self.macd.histogram, self.ema20, self.ema50, self.atr, self.volume_ratio
        )
    }
}
