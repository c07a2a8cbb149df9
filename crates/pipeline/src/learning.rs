//! Learning feedback loop.
//!
//! Every stored outcome updates the statistics of its pattern and recomputes the
//! reputation of its symbol from the full outcome history. The next synthesis
//! cycle reads both; nothing here feeds back into the current one.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use cryptopulse_core::{LearningConfig, Outcome, OutcomeResult, PatternRecord, ReputationRecord};
use cryptopulse_data::{
    BoostPolicy, OutcomeCounts, OutcomeRepository, PatternRepository, Repositories,
    ReputationRepository,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Success rate used when a symbol has no decisive outcomes.
const NEUTRAL_SUCCESS_RATE: f64 = 50.0;
/// How strongly the success rate moves the reputation score away from 50.
const REPUTATION_GAIN: f64 = 1.5;

/// wins / (wins + losses) in percent, 0 when there are neither.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn win_rate(wins: i64, losses: i64) -> f64 {
    let decisive = wins + losses;
    if decisive == 0 {
        return 0.0;
    }
    wins as f64 / decisive as f64 * 100.0
}

/// Builds a reputation record from outcome counts.
///
/// NEUTRAL outcomes count towards `total_trades` but not the success rate.
#[must_use]
pub fn reputation_from_counts(
    symbol: &str,
    counts: OutcomeCounts,
    at: DateTime<Utc>,
) -> ReputationRecord {
    let success_rate = if counts.wins + counts.losses > 0 {
        win_rate(counts.wins, counts.losses)
    } else {
        NEUTRAL_SUCCESS_RATE
    };

    ReputationRecord {
        symbol: symbol.to_string(),
        win_count: counts.wins,
        loss_count: counts.losses,
        total_trades: counts.total(),
        success_rate,
        reputation_score: (50.0 + (success_rate - 50.0) * REPUTATION_GAIN).clamp(0.0, 100.0),
        updated_at: at,
    }
}

/// Updates pattern and reputation aggregates from outcomes.
#[derive(Debug, Clone)]
pub struct LearningFeedbackLoop {
    patterns: PatternRepository,
    outcomes: OutcomeRepository,
    reputation: ReputationRepository,
    config: LearningConfig,
}

impl LearningFeedbackLoop {
    #[must_use]
    pub fn new(repos: &Repositories, config: LearningConfig) -> Self {
        Self {
            patterns: repos.patterns.clone(),
            outcomes: repos.outcomes.clone(),
            reputation: repos.reputation.clone(),
            config,
        }
    }

    #[must_use]
    pub fn boost_policy(&self) -> BoostPolicy {
        BoostPolicy {
            min_occurrences: self.config.min_pattern_occurrences,
            max_boost: self.config.max_confidence_boost,
        }
    }

    /// Feeds one stored outcome into the pattern and reputation aggregates.
    ///
    /// # Errors
    ///
    /// Returns an error if either aggregate cannot be written.
    pub async fn on_outcome(&self, outcome: &Outcome) -> Result<ReputationRecord> {
        let pattern = self
            .patterns
            .record_occurrence(
                &outcome.pattern_name,
                outcome.result == OutcomeResult::Win,
                outcome.pnl_percent,
                self.boost_policy(),
                outcome.exit_timestamp,
            )
            .await
            .with_context(|| format!("failed to update pattern {}", outcome.pattern_name))?;

        debug!(
            pattern = %pattern.pattern_name,
            "Pattern now {}/{} wins, boost {:+.1}",
            pattern.win_count,
            pattern.occurrence_count,
            pattern.confidence_boost
        );

        let reputation = self
            .recompute_reputation(&outcome.symbol, outcome.exit_timestamp)
            .await?;

        info!(
            symbol = %outcome.symbol,
            "Learned from {} ({:+.2}%): reputation {:.1}",
            outcome.result,
            outcome.pnl_percent,
            reputation.reputation_score
        );

        Ok(reputation)
    }

    /// Recomputes a symbol's reputation from its full outcome history.
    ///
    /// # Errors
    ///
    /// Returns an error if the outcome counts cannot be read or the record written.
    pub async fn recompute_reputation(
        &self,
        symbol: &str,
        at: DateTime<Utc>,
    ) -> Result<ReputationRecord> {
        let counts = self
            .outcomes
            .counts_for_symbol(symbol)
            .await
            .with_context(|| format!("failed to count outcomes for {symbol}"))?;

        let record = reputation_from_counts(symbol, counts, at);
        self.reputation
            .upsert(&record)
            .await
            .with_context(|| format!("failed to store reputation for {symbol}"))?;

        Ok(record)
    }

    /// Confidence boost learned for a pattern; zero when unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern table cannot be read.
    pub async fn pattern_boost(&self, pattern_name: &str) -> Result<f64> {
        Ok(self
            .patterns
            .get(pattern_name)
            .await?
            .map_or(0.0, |p| p.confidence_boost))
    }

    /// Patterns with enough history, best win rate first.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern table cannot be read.
    pub async fn top_patterns(&self, limit: i64) -> Result<Vec<PatternRecord>> {
        self.patterns
            .list(self.config.min_pattern_occurrences, limit)
            .await
    }

    /// Outcome performance over the last `days` days.
    ///
    /// # Errors
    ///
    /// Returns an error if the outcomes cannot be read.
    pub async fn performance_report(
        &self,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<PerformanceReport> {
        let since = now - Duration::days(days);
        let outcomes = self
            .outcomes
            .since(since)
            .await
            .context("failed to load outcomes for report")?;

        Ok(PerformanceReport::from_outcomes(days, since, &outcomes))
    }
}

/// Win/loss tallies for one slice of outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceBucket {
    pub total: i64,
    pub wins: i64,
    pub losses: i64,
    pub neutrals: i64,
    /// wins / (wins + losses) in percent; 0 without decisive outcomes
    pub win_rate: f64,
    pub total_pnl_percent: f64,
}

impl PerformanceBucket {
    fn add(&mut self, outcome: &Outcome) {
        self.total += 1;
        match outcome.result {
            OutcomeResult::Win => self.wins += 1,
            OutcomeResult::Loss => self.losses += 1,
            OutcomeResult::Neutral => self.neutrals += 1,
        }
        self.total_pnl_percent += outcome.pnl_percent;

        self.win_rate = win_rate(self.wins, self.losses);
    }
}

/// Performance over a time window, overall and broken down.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub window_days: i64,
    pub since: DateTime<Utc>,
    pub overall: PerformanceBucket,
    pub by_symbol: BTreeMap<String, PerformanceBucket>,
    pub by_signal_type: BTreeMap<String, PerformanceBucket>,
}

impl PerformanceReport {
    #[must_use]
    pub fn from_outcomes(window_days: i64, since: DateTime<Utc>, outcomes: &[Outcome]) -> Self {
        let mut report = Self {
            window_days,
            since,
            overall: PerformanceBucket::default(),
            by_symbol: BTreeMap::new(),
            by_signal_type: BTreeMap::new(),
        };

        for outcome in outcomes {
            report.overall.add(outcome);
            report
                .by_symbol
                .entry(outcome.symbol.clone())
                .or_default()
                .add(outcome);
            report
                .by_signal_type
                .entry(outcome.signal_type.as_str().to_string())
                .or_default()
                .add(outcome);
        }

        report
    }
}
