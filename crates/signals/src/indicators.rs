//! Technical indicators over close and volume series.
//!
//! Everything here is pure and deterministic so that live synthesis and
//! backtests see identical values for identical candles.

use cryptopulse_core::{CandleSeries, IndicatorSet, Macd, PipelineError};

pub const RSI_PERIOD: usize = 14;
pub const MOMENTUM_PERIOD: usize = 10;
const VOLUME_WINDOW: usize = 20;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
/// Signal line approximated as a fixed fraction of MACD
const MACD_SIGNAL_FACTOR: f64 = 0.9;

/// Relative Strength Index over the last `period` changes.
///
/// Returns 50 with fewer than `period + 1` closes and 100 when there were no
/// losses.
#[must_use]
pub fn rsi(closes: &[f64], period: usize) -> f64 {
    if period == 0 || closes.len() < period + 1 {
        return 50.0;
    }

    let window = &closes[closes.len() - period - 1..];
    let (gains, losses) = window
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .fold((0.0, 0.0), |(g, l), change| {
            if change > 0.0 {
                (g + change, l)
            } else {
                (g, l - change)
            }
        });

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;

    if avg_loss == 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
}

/// Exponential moving average seeded with the SMA of the first `period` values.
///
/// Falls back to the last close when the series is shorter than `period`.
#[must_use]
pub fn ema(closes: &[f64], period: usize) -> f64 {
    let Some(&last) = closes.last() else {
        return 0.0;
    };
    if period == 0 || closes.len() < period {
        return last;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let seed = closes[..period].iter().sum::<f64>() / period as f64;

    closes[period..]
        .iter()
        .fold(seed, |prev, &close| close * k + prev * (1.0 - k))
}

/// MACD(12, 26) with the signal line at 0.9 × MACD.
#[must_use]
pub fn macd(closes: &[f64]) -> Macd {
    let value = ema(closes, MACD_FAST) - ema(closes, MACD_SLOW);
    let signal = value * MACD_SIGNAL_FACTOR;
    Macd {
        value,
        signal,
        histogram: value - signal,
    }
}

/// Mean absolute close-to-close move across the whole series.
#[must_use]
pub fn atr(closes: &[f64]) -> f64 {
    if closes.is_empty() {
        return 0.0;
    }
    let total: f64 = closes.windows(2).map(|pair| (pair[1] - pair[0]).abs()).sum();
    total / closes.len() as f64
}

/// Latest volume over the average of the trailing 20 volumes.
#[must_use]
pub fn volume_ratio(volumes: &[f64]) -> f64 {
    let Some(&latest) = volumes.last() else {
        return 1.0;
    };
    let window = &volumes[volumes.len().saturating_sub(VOLUME_WINDOW)..];
    let avg = window.iter().sum::<f64>() / window.len() as f64;
    if avg <= 0.0 {
        return 1.0;
    }
    latest / avg
}

/// Percent change of the last close against the previous one.
#[must_use]
pub fn price_change_pct(closes: &[f64]) -> f64 {
    match closes {
        [.., prev, last] if *prev != 0.0 => (last - prev) / prev * 100.0,
        _ => 0.0,
    }
}

/// Percent change of the last close against the close `period` bars earlier.
#[must_use]
pub fn momentum(closes: &[f64], period: usize) -> f64 {
    if period == 0 || closes.len() <= period {
        return 0.0;
    }
    let last = closes[closes.len() - 1];
    let base = closes[closes.len() - 1 - period];
    if base == 0.0 {
        return 0.0;
    }
    (last - base) / base * 100.0
}

/// Computes the full indicator set for a candle series.
///
/// # Errors
///
/// Returns [`PipelineError::InsufficientHistory`] with fewer than
/// [`CandleSeries::MIN_LEN`] candles.
pub fn compute(series: &CandleSeries) -> Result<IndicatorSet, PipelineError> {
    if series.len() < CandleSeries::MIN_LEN {
        return Err(PipelineError::InsufficientHistory {
            symbol: series.symbol.clone(),
            have: series.len(),
            need: CandleSeries::MIN_LEN,
        });
    }

    let closes = series.closes();
    let volumes = series.volumes();
    Ok(compute_from(&closes, &volumes))
}

/// Indicator set from raw slices; callers guarantee the length.
#[must_use]
pub fn compute_from(closes: &[f64], volumes: &[f64]) -> IndicatorSet {
    IndicatorSet {
        rsi: rsi(closes, RSI_PERIOD),
        macd: macd(closes),
        ema20: ema(closes, 20),
        ema50: ema(closes, 50),
        atr: atr(closes),
        volume_ratio: volume_ratio(volumes),
        price_change_pct: price_change_pct(closes),
        momentum: momentum(closes, MOMENTUM_PERIOD),
    }
}
