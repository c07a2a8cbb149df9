//! Deterministic rule channel and safety corrections.

use cryptopulse_core::{IndicatorSet, RuleConfig, Sentiment, SignalType};

/// Decision of the rule channel.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDecision {
    pub signal_type: SignalType,
    pub confidence: f64,
    pub reason: String,
}

/// Result of the safety pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyOutcome {
    pub signal_type: SignalType,
    pub confidence: f64,
    /// Set when the direction was overridden
    pub forced: bool,
}

/// True when `price` is within `pct` percent of `reference`.
fn is_near(price: f64, reference: f64, pct: f64) -> bool {
    reference > 0.0 && ((price - reference).abs() / reference * 100.0) <= pct
}

/// Applies the BUY/SELL/WAIT rules to one indicator set.
///
/// BUY needs an oversold-ish RSI, a positive histogram, price above EMA50 (or
/// hugging it in an uptrend), above-average volume and non-bearish news.
/// SELL mirrors it without the volume requirement.
#[must_use]
pub fn evaluate(
    config: &RuleConfig,
    price: f64,
    indicators: &IndicatorSet,
    sentiment: Sentiment,
) -> RuleDecision {
    let near_ema50 = is_near(price, indicators.ema50, config.ema_proximity_pct);
    let hist = indicators.macd.histogram;
    let rsi = indicators.rsi;

    let buy_trend = price > indicators.ema50 || (near_ema50 && indicators.ema20 > indicators.ema50);
    if rsi < config.buy_rsi_max
        && hist > 0.0
        && buy_trend
        && indicators.volume_ratio > config.min_volume_ratio
        && sentiment != Sentiment::Bearish
    {
        return RuleDecision {
            signal_type: SignalType::Buy,
            confidence: (config.base_confidence + (config.buy_rsi_max - rsi)).min(100.0),
            reason: format!(
                "RSI {rsi:.1} below {:.0} with bullish MACD above EMA50 on {:.2}x volume",
                config.buy_rsi_max, indicators.volume_ratio
            ),
        };
    }

    let sell_trend =
        price < indicators.ema50 || (near_ema50 && indicators.ema20 < indicators.ema50);
    if rsi > config.sell_rsi_min && hist < 0.0 && sell_trend && sentiment != Sentiment::Bullish {
        return RuleDecision {
            signal_type: SignalType::Sell,
            confidence: (config.base_confidence + (rsi - config.sell_rsi_min)).min(100.0),
            reason: format!(
                "RSI {rsi:.1} above {:.0} with bearish MACD below EMA50",
                config.sell_rsi_min
            ),
        };
    }

    RuleDecision {
        signal_type: SignalType::Wait,
        confidence: config.wait_confidence,
        reason: "No rule conditions met".to_string(),
    }
}

/// Overrides the direction in clear overbought-breakdown or
/// oversold-breakout regimes, whatever channel produced the candidate.
#[must_use]
pub fn apply_safety(
    config: &RuleConfig,
    signal_type: SignalType,
    confidence: f64,
    price: f64,
    indicators: &IndicatorSet,
) -> SafetyOutcome {
    let hist = indicators.macd.histogram;

    let forced = if indicators.rsi > config.overbought_rsi && hist < 0.0 && price < indicators.ema50
    {
        Some(SignalType::Sell)
    } else if indicators.rsi < config.oversold_rsi && hist > 0.0 && price > indicators.ema50 {
        Some(SignalType::Buy)
    } else {
        None
    };

    match forced {
        Some(direction) => SafetyOutcome {
            signal_type: direction,
            confidence: confidence.max(config.forced_confidence),
            forced: direction != signal_type,
        },
        None => SafetyOutcome {
            signal_type,
            confidence,
            forced: false,
        },
    }
}
