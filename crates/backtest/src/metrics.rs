use chrono::{DateTime, Utc};
use cryptopulse_core::{BacktestRun, BacktestTrade, OutcomeResult};
use std::collections::BTreeMap;

/// Aggregate statistics over a set of simulated trades.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceMetrics {
    pub signals_tested: usize,
    pub wins: usize,
    pub losses: usize,
    pub neutrals: usize,
    /// wins / (wins + losses) in percent, 0 without decisive trades
    pub winrate: f64,
    pub avg_profit: f64,
    pub avg_loss: f64,
    pub total_pnl_percent: f64,
    /// Largest peak-to-trough fall of the cumulative P&L, in percentage points
    pub max_drawdown_pct: f64,
    pub best_pattern: Option<String>,
    pub worst_pattern: Option<String>,
}

impl PerformanceMetrics {
    /// Stamps the metrics into a storable run.
    #[must_use]
    pub fn into_run(
        self,
        symbol: impl Into<String>,
        tested_days: i64,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> BacktestRun {
        BacktestRun {
            symbol: symbol.into(),
            tested_days,
            start_date,
            end_date,
            signals_tested: to_i64(self.signals_tested),
            signals_win: to_i64(self.wins),
            signals_loss: to_i64(self.losses),
            signals_neutral: to_i64(self.neutrals),
            winrate: self.winrate,
            avg_profit: self.avg_profit,
            avg_loss: self.avg_loss,
            total_pnl_percent: self.total_pnl_percent,
            max_drawdown_pct: self.max_drawdown_pct,
            best_pattern: self.best_pattern,
            worst_pattern: self.worst_pattern,
            created_at,
        }
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[derive(Debug, Default, Clone, Copy)]
struct PatternTally {
    occurrences: usize,
    wins: usize,
}

impl PatternTally {
    #[allow(clippy::cast_precision_loss)]
    fn win_ratio(self) -> f64 {
        self.wins as f64 / self.occurrences as f64
    }
}

/// Accumulates trades one at a time and summarizes them.
pub struct MetricsCalculator {
    min_pattern_occurrences: usize,
    profits: Vec<f64>,
    losses: Vec<f64>,
    neutrals: usize,
    equity_curve: Vec<f64>,
    patterns: BTreeMap<String, PatternTally>,
}

impl MetricsCalculator {
    /// Patterns with fewer than `min_pattern_occurrences` trades are never
    /// ranked best or worst.
    #[must_use]
    pub fn new(min_pattern_occurrences: usize) -> Self {
        Self {
            min_pattern_occurrences: min_pattern_occurrences.max(1),
            profits: Vec::new(),
            losses: Vec::new(),
            neutrals: 0,
            equity_curve: vec![0.0],
            patterns: BTreeMap::new(),
        }
    }

    pub fn add_trade(&mut self, trade: &BacktestTrade) {
        match trade.result {
            OutcomeResult::Win => self.profits.push(trade.pnl_percent),
            OutcomeResult::Loss => self.losses.push(trade.pnl_percent),
            OutcomeResult::Neutral => self.neutrals += 1,
        }

        let equity = self.equity_curve.last().copied().unwrap_or(0.0);
        self.equity_curve.push(equity + trade.pnl_percent);

        let tally = self.patterns.entry(trade.pattern_name.clone()).or_default();
        tally.occurrences += 1;
        if trade.result == OutcomeResult::Win {
            tally.wins += 1;
        }
    }

    #[must_use]
    pub fn calculate(&self) -> PerformanceMetrics {
        let wins = self.profits.len();
        let losses = self.losses.len();

        #[allow(clippy::cast_precision_loss)]
        let winrate = if wins + losses > 0 {
            wins as f64 / (wins + losses) as f64 * 100.0
        } else {
            0.0
        };

        let (best_pattern, worst_pattern) = self.rank_patterns();

        PerformanceMetrics {
            signals_tested: wins + losses + self.neutrals,
            wins,
            losses,
            neutrals: self.neutrals,
            winrate,
            avg_profit: mean(&self.profits),
            avg_loss: mean(&self.losses),
            total_pnl_percent: self.equity_curve.last().copied().unwrap_or(0.0),
            max_drawdown_pct: self.calculate_max_drawdown(),
            best_pattern,
            worst_pattern,
        }
    }

    fn calculate_max_drawdown(&self) -> f64 {
        let mut max_drawdown: f64 = 0.0;
        let mut peak = f64::MIN;

        for &equity in &self.equity_curve {
            peak = peak.max(equity);
            max_drawdown = max_drawdown.max(peak - equity);
        }

        max_drawdown
    }

    /// Highest and lowest win ratio among qualifying patterns. The map is
    /// name-ordered and only strictly better ratios replace, so ties go to the
    /// alphabetically first name.
    fn rank_patterns(&self) -> (Option<String>, Option<String>) {
        let mut best: Option<(&str, f64)> = None;
        let mut worst: Option<(&str, f64)> = None;

        for (name, tally) in &self.patterns {
            if tally.occurrences < self.min_pattern_occurrences {
                continue;
            }
            let ratio = tally.win_ratio();
            if best.map_or(true, |(_, b)| ratio > b) {
                best = Some((name, ratio));
            }
            if worst.map_or(true, |(_, w)| ratio < w) {
                worst = Some((name, ratio));
            }
        }

        (
            best.map(|(name, _)| name.to_string()),
            worst.map(|(name, _)| name.to_string()),
        )
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cryptopulse_core::SignalType;

    fn trade(pattern: &str, result: OutcomeResult, pnl: f64) -> BacktestTrade {
        BacktestTrade {
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            signal_type: SignalType::Buy,
            confidence: 75.0,
            entry_price: 100.0,
            take_profit: 102.0,
            stop_loss: 99.0,
            pattern_name: pattern.to_string(),
            result,
            exit_price: 100.0 + pnl,
            pnl_percent: pnl,
            bars_held: 1,
        }
    }

    #[test]
    fn test_empty_metrics() {
        let metrics = MetricsCalculator::new(5).calculate();
        assert_eq!(metrics.signals_tested, 0);
        assert_eq!(metrics.winrate, 0.0);
        assert_eq!(metrics.total_pnl_percent, 0.0);
        assert_eq!(metrics.max_drawdown_pct, 0.0);
        assert!(metrics.best_pattern.is_none());
    }

    #[test]
    fn test_winrate_ignores_neutrals() {
        let mut calc = MetricsCalculator::new(5);
        for _ in 0..3 {
            calc.add_trade(&trade("A", OutcomeResult::Win, 2.0));
        }
        calc.add_trade(&trade("A", OutcomeResult::Loss, -1.0));
        for _ in 0..4 {
            calc.add_trade(&trade("A", OutcomeResult::Neutral, 0.5));
        }

        let metrics = calc.calculate();
        assert_eq!(metrics.signals_tested, 8);
        assert_eq!(metrics.neutrals, 4);
        assert!((metrics.winrate - 75.0).abs() < 1e-9);
        assert!((metrics.avg_profit - 2.0).abs() < 1e-9);
        assert!((metrics.avg_loss + 1.0).abs() < 1e-9);
        assert!((metrics.total_pnl_percent - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_max_drawdown_of_cumulative_pnl() {
        let mut calc = MetricsCalculator::new(5);
        for (result, pnl) in [
            (OutcomeResult::Win, 2.0),
            (OutcomeResult::Loss, -1.0),
            (OutcomeResult::Loss, -1.0),
            (OutcomeResult::Win, 2.0),
        ] {
            calc.add_trade(&trade("A", result, pnl));
        }

        assert!((calc.calculate().max_drawdown_pct - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_pattern_ranking_requires_min_occurrences() {
        let mut calc = MetricsCalculator::new(5);
        // GOOD: 4/5, BAD: 1/5, RARE: 2/2 but too few
        for i in 0..5 {
            let good = if i < 4 { OutcomeResult::Win } else { OutcomeResult::Loss };
            let bad = if i < 1 { OutcomeResult::Win } else { OutcomeResult::Loss };
            calc.add_trade(&trade("GOOD", good, 1.0));
            calc.add_trade(&trade("BAD", bad, -1.0));
        }
        calc.add_trade(&trade("RARE", OutcomeResult::Win, 2.0));
        calc.add_trade(&trade("RARE", OutcomeResult::Win, 2.0));

        let metrics = calc.calculate();
        assert_eq!(metrics.best_pattern.as_deref(), Some("GOOD"));
        assert_eq!(metrics.worst_pattern.as_deref(), Some("BAD"));
    }

    #[test]
    fn test_pattern_ties_go_to_first_name() {
        let mut calc = MetricsCalculator::new(1);
        calc.add_trade(&trade("ZETA", OutcomeResult::Win, 1.0));
        calc.add_trade(&trade("ALPHA", OutcomeResult::Win, 1.0));

        let metrics = calc.calculate();
        assert_eq!(metrics.best_pattern.as_deref(), Some("ALPHA"));
        assert_eq!(metrics.worst_pattern.as_deref(), Some("ALPHA"));
    }

    #[test]
    fn test_into_run() {
        let mut calc = MetricsCalculator::new(5);
        calc.add_trade(&trade("A", OutcomeResult::Win, 2.0));
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 31, 0, 0, 0).unwrap();

        let run = calc.calculate().into_run("BTCUSDT", 30, start, end, end);
        assert_eq!(run.symbol, "BTCUSDT");
        assert_eq!(run.signals_tested, 1);
        assert_eq!(run.signals_win, 1);
        assert_eq!(run.winrate, 100.0);
        assert_eq!(run.best_pattern, None);
    }
}
