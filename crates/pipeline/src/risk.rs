//! Risk allocation from recent win rates.
//!
//! The win rate comes from the best available evidence, in order: a recent
//! and large enough backtest, the latest live outcomes, or a neutral default.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use cryptopulse_core::{OutcomeResult, RiskConfig, RiskState, RiskStatus, WinrateSource};
use cryptopulse_data::{BacktestRepository, OutcomeRepository, Repositories, RiskStateRepository};
use serde::Serialize;
use tracing::{info, warn};

use crate::learning::win_rate;

const OVERFITTING_WINRATE: f64 = 80.0;
const WEAK_WINRATE: f64 = 45.0;

/// Win rate and where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WinrateEstimate {
    pub winrate: f64,
    pub source: WinrateSource,
    /// Signals or outcomes behind the estimate
    pub sample_size: i64,
}

/// "high" at 65% and above, "medium" at 50% and above, else "low".
#[must_use]
pub fn confidence_level(winrate: f64) -> &'static str {
    if winrate >= 65.0 {
        "high"
    } else if winrate >= 50.0 {
        "medium"
    } else {
        "low"
    }
}

/// Operator guidance for a status and win rate.
#[must_use]
pub fn recommendations(status: RiskStatus, winrate: f64) -> Vec<String> {
    let mut out: Vec<String> = match status {
        RiskStatus::Aggressive => vec![
            "Excellent performance: keep the current strategy",
            "Consider a modest increase in position size",
            "Watch for over-trading",
        ],
        RiskStatus::Normal => vec![
            "Stable performance: continue with the current strategy",
            "Track winning patterns for tuning",
        ],
        RiskStatus::Conservative => vec![
            "Declining performance: reduce position size",
            "Review losing patterns",
            "Prefer high-confidence signals (above 75%)",
        ],
        RiskStatus::Suspended => vec![
            "Critical performance: suspend automated trading",
            "Review the strategy and indicators",
            "Run a fresh backtest before resuming",
            "Resume only once the win rate is back above 55%",
        ],
    }
    .into_iter()
    .map(String::from)
    .collect();

    if winrate > OVERFITTING_WINRATE {
        out.push("Exceptional win rate: check for overfitting".to_string());
    } else if winrate < WEAK_WINRATE {
        out.push("Weak win rate: strategy or market conditions may be unfavorable".to_string());
    }
    out
}

/// Maps a win-rate estimate to a full risk state.
#[must_use]
pub fn assess(
    symbol: &str,
    estimate: &WinrateEstimate,
    base_allocation: f64,
    now: DateTime<Utc>,
) -> RiskState {
    let status = RiskStatus::from_winrate(estimate.winrate);

    RiskState {
        symbol: symbol.to_string(),
        recent_winrate: estimate.winrate,
        winrate_source: estimate.source,
        base_allocation,
        adjusted_allocation: base_allocation * status.allocation_multiplier(),
        leverage: status.leverage_cap(),
        risk_status: status,
        confidence_level: confidence_level(estimate.winrate).to_string(),
        last_adjustment_reason: format!(
            "{} win rate {:.1}% over {} signals: {} ({}x allocation, {}x leverage)",
            estimate.source.as_str(),
            estimate.winrate,
            estimate.sample_size,
            status,
            status.allocation_multiplier(),
            status.leverage_cap()
        ),
        recommendations: recommendations(status, estimate.winrate),
        updated_at: now,
    }
}

/// Recomputes and stores per-symbol risk states.
#[derive(Debug, Clone)]
pub struct RiskAllocationController {
    backtests: BacktestRepository,
    outcomes: OutcomeRepository,
    states: RiskStateRepository,
    config: RiskConfig,
}

impl RiskAllocationController {
    #[must_use]
    pub fn new(repos: &Repositories, config: RiskConfig) -> Self {
        Self {
            backtests: repos.backtests.clone(),
            outcomes: repos.outcomes.clone(),
            states: repos.risk.clone(),
            config,
        }
    }

    /// Picks the win rate from backtest, live outcomes or the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the backtest or outcome tables cannot be read.
    pub async fn estimate_winrate(
        &self,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Result<WinrateEstimate> {
        let max_age = Duration::hours(self.config.backtest_max_age_hours);
        if let Some(stored) = self.backtests.latest_for_symbol(symbol).await? {
            let run = stored.run;
            if now - run.created_at <= max_age
                && run.signals_tested >= self.config.backtest_min_signals
            {
                return Ok(WinrateEstimate {
                    winrate: run.winrate,
                    source: WinrateSource::Backtest,
                    sample_size: run.signals_tested,
                });
            }
        }

        let recent = self
            .outcomes
            .recent_for_symbol(symbol, self.config.live_window)
            .await?;
        if recent.len() >= self.config.live_min_outcomes {
            let count = |r: OutcomeResult| {
                i64::try_from(recent.iter().filter(|o| o.result == r).count()).unwrap_or(0)
            };
            let (wins, losses) = (count(OutcomeResult::Win), count(OutcomeResult::Loss));
            if wins + losses > 0 {
                return Ok(WinrateEstimate {
                    winrate: win_rate(wins, losses),
                    source: WinrateSource::Live,
                    sample_size: wins + losses,
                });
            }
        }

        Ok(WinrateEstimate {
            winrate: self.config.default_winrate,
            source: WinrateSource::Default,
            sample_size: 0,
        })
    }

    /// Recomputes and stores the risk state of one symbol.
    ///
    /// # Errors
    ///
    /// Returns an error if the inputs cannot be read or the state written.
    pub async fn recompute(&self, symbol: &str, now: DateTime<Utc>) -> Result<RiskState> {
        let estimate = self
            .estimate_winrate(symbol, now)
            .await
            .with_context(|| format!("failed to estimate win rate for {symbol}"))?;

        let state = assess(symbol, &estimate, self.config.base_allocation, now);
        self.states
            .upsert(&state)
            .await
            .with_context(|| format!("failed to store risk state for {symbol}"))?;

        info!(symbol = %symbol, "Risk {}", state.last_adjustment_reason);
        Ok(state)
    }

    /// Recomputes every symbol, skipping the ones that fail.
    pub async fn recompute_all(&self, symbols: &[String], now: DateTime<Utc>) -> Vec<RiskState> {
        let mut states = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match self.recompute(symbol, now).await {
                Ok(state) => states.push(state),
                Err(e) => warn!(symbol = %symbol, "Risk recompute failed: {:#}", e),
            }
        }
        states
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get(&self, symbol: &str) -> Result<Option<RiskState>> {
        self.states.get(symbol).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cryptopulse_core::{
        BacktestRun, CandidateSignal, IndicatorSet, Outcome, Signal, SignalSource, SignalType,
    };
    use cryptopulse_data::Database;

    fn estimate(winrate: f64, source: WinrateSource) -> WinrateEstimate {
        WinrateEstimate {
            winrate,
            source,
            sample_size: 30,
        }
    }

    async fn store_outcomes(repos: &Repositories, wins: usize, losses: usize) {
        let results = std::iter::repeat(OutcomeResult::Win)
            .take(wins)
            .chain(std::iter::repeat(OutcomeResult::Loss).take(losses));

        for (i, result) in results.enumerate() {
            let created = Utc::now() - Duration::hours(100 - i64::try_from(i).unwrap());
            let signal = Signal::from_candidate(
                CandidateSignal {
                    symbol: "BTCUSDT".to_string(),
                    signal_type: SignalType::Buy,
                    confidence: 80.0,
                    entry_price: 100.0,
                    take_profit: 102.0,
                    stop_loss: 99.0,
                    pattern_name: "p".to_string(),
                    reason: "test".to_string(),
                    source: SignalSource::Rule,
                    indicators: IndicatorSet::default(),
                },
                240,
                created,
            );
            repos.signals.insert_with_cooldown(&signal, created).await.unwrap();
            let outcome = Outcome {
                signal_id: signal.id,
                symbol: "BTCUSDT".to_string(),
                signal_type: SignalType::Buy,
                pattern_name: "p".to_string(),
                result,
                pnl_percent: if result == OutcomeResult::Win { 2.0 } else { -1.0 },
                exit_price: 100.0,
                exit_timestamp: created + Duration::minutes(30),
                manual: false,
            };
            assert!(repos.signals.resolve(&outcome).await.unwrap());
        }
    }

    fn run(winrate: f64, signals_tested: i64, created_at: DateTime<Utc>) -> BacktestRun {
        BacktestRun {
            symbol: "BTCUSDT".to_string(),
            tested_days: 30,
            start_date: created_at - Duration::days(30),
            end_date: created_at,
            signals_tested,
            signals_win: 0,
            signals_loss: 0,
            signals_neutral: 0,
            winrate,
            avg_profit: 0.0,
            avg_loss: 0.0,
            total_pnl_percent: 0.0,
            max_drawdown_pct: 0.0,
            best_pattern: None,
            worst_pattern: None,
            created_at,
        }
    }

    // ============================================
    // Assessment
    // ============================================

    #[test]
    fn test_assess_normal() {
        let state = assess("BTCUSDT", &estimate(60.0, WinrateSource::Live), 1.0, Utc::now());

        assert_eq!(state.risk_status, RiskStatus::Normal);
        assert_eq!(state.adjusted_allocation, 1.0);
        assert_eq!(state.leverage, 2.0);
        assert_eq!(state.confidence_level, "medium");
        assert!(state.last_adjustment_reason.starts_with("live win rate 60.0%"));
    }

    #[test]
    fn test_assess_suspended_allocates_nothing() {
        let state = assess("BTCUSDT", &estimate(40.0, WinrateSource::Backtest), 2.0, Utc::now());

        assert_eq!(state.risk_status, RiskStatus::Suspended);
        assert_eq!(state.adjusted_allocation, 0.0);
        assert_eq!(state.leverage, 1.0);
        assert_eq!(state.confidence_level, "low");
        assert!(state.recommendations.iter().any(|r| r.starts_with("Weak win rate")));
    }

    #[test]
    fn test_overfitting_warning() {
        let recs = recommendations(RiskStatus::Aggressive, 85.0);
        assert!(recs.iter().any(|r| r.contains("overfitting")));
        assert_eq!(confidence_level(85.0), "high");
    }

    // ============================================
    // Win Rate Sources
    // ============================================

    #[tokio::test]
    async fn test_default_without_evidence() {
        let db = Database::in_memory().await.unwrap();
        let controller = RiskAllocationController::new(&db.repositories(), RiskConfig::default());

        let estimate = controller.estimate_winrate("BTCUSDT", Utc::now()).await.unwrap();
        assert_eq!(estimate.source, WinrateSource::Default);
        assert_eq!(estimate.winrate, 50.0);
    }

    #[tokio::test]
    async fn test_live_outcomes_18_of_30_is_normal() {
        let db = Database::in_memory().await.unwrap();
        let repos = db.repositories();
        store_outcomes(&repos, 18, 12).await;
        let controller = RiskAllocationController::new(&repos, RiskConfig::default());

        let state = controller.recompute("BTCUSDT", Utc::now()).await.unwrap();

        assert_eq!(state.winrate_source, WinrateSource::Live);
        assert!((state.recent_winrate - 60.0).abs() < 1e-9);
        assert_eq!(state.risk_status, RiskStatus::Normal);
        let stored = repos.risk.get("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(stored.risk_status, RiskStatus::Normal);
        assert_eq!(stored.recommendations, state.recommendations);
    }

    #[tokio::test]
    async fn test_too_few_live_outcomes_uses_default() {
        let db = Database::in_memory().await.unwrap();
        let repos = db.repositories();
        store_outcomes(&repos, 9, 0).await;
        let controller = RiskAllocationController::new(&repos, RiskConfig::default());

        let estimate = controller.estimate_winrate("BTCUSDT", Utc::now()).await.unwrap();
        assert_eq!(estimate.source, WinrateSource::Default);
    }

    #[tokio::test]
    async fn test_recent_backtest_wins_over_live() {
        let db = Database::in_memory().await.unwrap();
        let repos = db.repositories();
        store_outcomes(&repos, 18, 12).await;
        let now = Utc::now();
        repos
            .backtests
            .insert_run(&run(72.0, 25, now - Duration::hours(10)), &[])
            .await
            .unwrap();
        let controller = RiskAllocationController::new(&repos, RiskConfig::default());

        let estimate = controller.estimate_winrate("BTCUSDT", now).await.unwrap();
        assert_eq!(estimate.source, WinrateSource::Backtest);
        assert_eq!(estimate.winrate, 72.0);
    }

    #[tokio::test]
    async fn test_stale_or_small_backtest_is_ignored() {
        let db = Database::in_memory().await.unwrap();
        let repos = db.repositories();
        let now = Utc::now();
        repos
            .backtests
            .insert_run(&run(72.0, 25, now - Duration::hours(80)), &[])
            .await
            .unwrap();
        let controller = RiskAllocationController::new(&repos, RiskConfig::default());
        assert_eq!(
            controller.estimate_winrate("BTCUSDT", now).await.unwrap().source,
            WinrateSource::Default
        );

        repos
            .backtests
            .insert_run(&run(72.0, 5, now), &[])
            .await
            .unwrap();
        assert_eq!(
            controller.estimate_winrate("BTCUSDT", now).await.unwrap().source,
            WinrateSource::Default
        );
    }
}
