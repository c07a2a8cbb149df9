//! Candle-by-candle replay of the deterministic synthesizer.
//!
//! At every index the simulator builds the snapshot a live cycle would have
//! seen from the trailing window, synthesizes with neutral sentiment and
//! reputation, and scans the following candles with the same [`resolve_path`] rule
//! the live evaluation uses. No clock, randomness or I/O is involved, so
//! identical candles always give identical trades.

use cryptopulse_core::{
    resolve_path, BacktestTrade, Candle, CandleSeries, MarketSnapshot, PipelineError,
    PriceObservation,
};
use cryptopulse_signals::indicators::compute_from;
use cryptopulse_signals::{SignalSynthesizer, SynthesisInput};

/// Provider id stamped on replayed snapshots.
const REPLAY_PROVIDER: &str = "backtest";

/// Replays a candle series through synthesis and resolution.
#[derive(Debug, Clone)]
pub struct BacktestSimulator {
    synthesizer: SignalSynthesizer,
    /// Candles per indicator window
    window: usize,
    /// Candles scanned forward before a signal times out
    horizon_candles: usize,
}

impl BacktestSimulator {
    #[must_use]
    pub fn new(synthesizer: SignalSynthesizer, window: usize, horizon_candles: usize) -> Self {
        Self {
            synthesizer,
            window: window.max(CandleSeries::MIN_LEN),
            horizon_candles: horizon_candles.max(1),
        }
    }

    /// `horizon_minutes / interval_minutes`, at least one candle.
    #[must_use]
    pub fn horizon_candles_for(horizon_minutes: i64, interval_minutes: i64) -> usize {
        usize::try_from(horizon_minutes / interval_minutes.max(1))
            .unwrap_or(1)
            .max(1)
    }

    #[must_use]
    pub const fn window(&self) -> usize {
        self.window
    }

    #[must_use]
    pub const fn horizon_candles(&self) -> usize {
        self.horizon_candles
    }

    /// Fewest candles that produce at least one simulated signal.
    #[must_use]
    pub const fn min_candles(&self) -> usize {
        self.window + self.horizon_candles + 1
    }

    /// Replays `series` and returns every directional trade in candle order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InsufficientHistory`] when the series is
    /// shorter than [`Self::min_candles`].
    pub fn run(&self, series: &CandleSeries) -> Result<Vec<BacktestTrade>, PipelineError> {
        let candles = &series.candles;
        if candles.len() < self.min_candles() {
            return Err(PipelineError::InsufficientHistory {
                symbol: series.symbol.clone(),
                have: candles.len(),
                need: self.min_candles(),
            });
        }

        let per_day = series.interval.per_day();
        let mut trades = Vec::new();

        for i in self.window..candles.len() - self.horizon_candles {
            let window = &candles[i + 1 - self.window..=i];
            let closes: Vec<f64> = window.iter().map(|c| c.close).collect();
            let volumes: Vec<f64> = window.iter().map(|c| c.volume).collect();
            let indicators = compute_from(&closes, &volumes);

            let snapshot = replay_snapshot(&series.symbol, window, per_day);
            let candidate = self
                .synthesizer
                .synthesize(&SynthesisInput::deterministic(&snapshot, &indicators));
            if !candidate.is_actionable() {
                continue;
            }

            let future = candles[i + 1..=i + self.horizon_candles]
                .iter()
                .copied()
                .map(PriceObservation::from);

            if let Some((resolution, bars_held)) = resolve_path(
                candidate.signal_type,
                candidate.entry_price,
                candidate.take_profit,
                candidate.stop_loss,
                future,
                true,
            ) {
                trades.push(BacktestTrade {
                    timestamp: candles[i].timestamp,
                    signal_type: candidate.signal_type,
                    confidence: candidate.confidence,
                    entry_price: candidate.entry_price,
                    take_profit: candidate.take_profit,
                    stop_loss: candidate.stop_loss,
                    pattern_name: candidate.pattern_name.clone(),
                    result: resolution.result,
                    exit_price: resolution.exit_price,
                    pnl_percent: resolution.pnl_percent,
                    bars_held,
                });
            }
        }

        Ok(trades)
    }
}

/// Snapshot as of the last candle of `window`, with 24h figures taken from
/// the trailing day of candles inside it.
fn replay_snapshot(symbol: &str, window: &[Candle], per_day: usize) -> MarketSnapshot {
    let day = &window[window.len().saturating_sub(per_day.max(1))..];
    let last = window[window.len() - 1];
    let open = day[0].open;

    MarketSnapshot {
        symbol: symbol.to_string(),
        price: last.close,
        change_24h_pct: if open > 0.0 {
            (last.close - open) / open * 100.0
        } else {
            0.0
        },
        volume_24h: day.iter().map(|c| c.volume).sum(),
        high_24h: day.iter().map(|c| c.high).fold(f64::MIN, f64::max),
        low_24h: day.iter().map(|c| c.low).fold(f64::MAX, f64::min),
        provider: REPLAY_PROVIDER.to_string(),
        fetched_at: last.timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use cryptopulse_core::{Interval, OutcomeResult, SignalType};

    fn candle(i: usize, close: f64) -> Candle {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        Candle {
            timestamp: start + Duration::hours(i64::try_from(i).unwrap()),
            open: close,
            high: close,
            low: close,
            close,
            volume: 100.0,
        }
    }

    fn flat(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| candle(i, if i % 2 == 0 { 100.0 } else { 100.4 }))
            .collect()
    }

    /// Crash from 200 to 100 followed by a steady 14-candle bounce: RSI pinned
    /// at 100, MACD negative and price far below EMA50. Ends on a SELL candle.
    fn dead_cat_bounce() -> Vec<Candle> {
        let mut candles: Vec<Candle> = (0..36).map(|i| candle(i, 200.0)).collect();
        for k in 0..15 {
            candles.push(candle(36 + k, 100.0 + f64::from(u32::try_from(k).unwrap())));
        }
        candles
    }

    /// Appends candles closing at `entry * (1 - step * k)` for k in 1..=4.
    fn then_falling(mut candles: Vec<Candle>, step: f64) -> Vec<Candle> {
        let last = candles.len() - 1;
        let entry = candles[last].close;
        for k in 1..=4u32 {
            candles.push(candle(
                last + usize::try_from(k).unwrap(),
                entry * (1.0 - step * f64::from(k)),
            ));
        }
        candles
    }

    #[test]
    fn test_horizon_candles() {
        assert_eq!(BacktestSimulator::horizon_candles_for(240, 60), 4);
        assert_eq!(BacktestSimulator::horizon_candles_for(30, 60), 1);
        assert_eq!(BacktestSimulator::horizon_candles_for(240, 15), 16);
    }

    #[test]
    fn test_short_series_is_insufficient() {
        let sim = BacktestSimulator::new(SignalSynthesizer::default(), 50, 4);
        let series = CandleSeries::new("BTCUSDT", Interval::H1, flat(54));

        let err = sim.run(&series).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientHistory { have: 54, need: 55, .. }
        ));
    }

    #[test]
    fn test_flat_market_produces_no_trades() {
        let sim = BacktestSimulator::new(SignalSynthesizer::default(), 50, 4);
        let series = CandleSeries::new("BTCUSDT", Interval::H1, flat(120));

        assert!(sim.run(&series).unwrap().is_empty());
    }

    #[test]
    fn test_window_ends_at_signal_candle() {
        let sim = BacktestSimulator::new(SignalSynthesizer::default(), 50, 4);
        let series = CandleSeries::new(
            "BTCUSDT",
            Interval::H1,
            then_falling(dead_cat_bounce(), 0.01),
        );

        let trades = sim.run(&series).unwrap();
        assert_eq!(trades.len(), 1);
        let trade = &trades[0];

        // Only index 50 has a full window and horizon; its close is the entry
        assert_eq!(trade.timestamp, series.candles[50].timestamp);
        assert_eq!(trade.signal_type, SignalType::Sell);
        assert_eq!(trade.entry_price, 114.0);
        // Wide 24h range widens the 2% take-profit to 2.5%
        assert!((trade.take_profit - 114.0 * 0.975).abs() < 1e-9);
        assert_eq!(trade.result, OutcomeResult::Win);
        assert_eq!(trade.exit_price, trade.take_profit);
        assert_eq!(trade.bars_held, 3);
        assert!((trade.pnl_percent - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_timeout_resolves_at_last_scanned_close() {
        let sim = BacktestSimulator::new(SignalSynthesizer::default(), 50, 4);
        let series = CandleSeries::new(
            "BTCUSDT",
            Interval::H1,
            then_falling(dead_cat_bounce(), 0.001),
        );

        let trades = sim.run(&series).unwrap();
        let trade = &trades[0];

        assert_eq!(trade.result, OutcomeResult::Neutral);
        assert_eq!(trade.bars_held, 4);
        assert!((trade.exit_price - 114.0 * 0.996).abs() < 1e-9);
    }
}
