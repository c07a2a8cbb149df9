//! Regime naming used to group outcomes for learning.

use cryptopulse_core::{IndicatorSet, Sentiment};

const OVERBOUGHT_RSI: f64 = 70.0;
const OVERSOLD_RSI: f64 = 30.0;

/// Names the indicator regime, e.g.
/// `RSI_oversold_MACD_bullish_EMA_uptrend_NEWS_neutral`.
#[must_use]
pub fn pattern_name(indicators: &IndicatorSet, sentiment: Sentiment) -> String {
    let rsi = if indicators.rsi > OVERBOUGHT_RSI {
        "overbought"
    } else if indicators.rsi < OVERSOLD_RSI {
        "oversold"
    } else {
        "neutral"
    };
    let macd = if indicators.macd.histogram > 0.0 {
        "bullish"
    } else {
        "bearish"
    };
    let ema = if indicators.is_uptrend() {
        "uptrend"
    } else {
        "downtrend"
    };

    format!(
        "RSI_{rsi}_MACD_{macd}_EMA_{ema}_NEWS_{}",
        sentiment.as_str()
    )
}
