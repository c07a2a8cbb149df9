//! Outcome evaluation of open signals.
//!
//! Each run looks at every active, unevaluated signal old enough to judge and
//! walks the candles between its creation and the end of its horizon in order
//! with the shared [`resolve_path`] rule, so the first target touched decides.
//! Price action after the horizon never counts. Resolution and the outcome
//! insert happen in one guarded transaction, so a signal is resolved at most
//! once no matter how many evaluation runs overlap.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use cryptopulse_core::{
    resolve_path, Interval, Outcome, OutcomeResult, PipelineError, PriceObservation, Resolution,
    Signal,
};
use cryptopulse_data::SignalRepository;
use cryptopulse_market_data::MarketDataAggregator;
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::learning::LearningFeedbackLoop;

/// Largest candle request made to observe one signal.
const MAX_OBSERVATION_CANDLES: i64 = 1000;

/// What one evaluation run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationSummary {
    /// Signals old enough to be judged
    pub checked: usize,
    pub wins: usize,
    pub losses: usize,
    pub neutrals: usize,
    /// Untouched and still inside their horizon
    pub still_open: usize,
    pub errors: usize,
}

impl EvaluationSummary {
    #[must_use]
    pub const fn resolved(&self) -> usize {
        self.wins + self.losses + self.neutrals
    }
}

/// Resolves open signals into outcomes.
#[derive(Clone)]
pub struct EvaluationEngine {
    signals: SignalRepository,
    market: MarketDataAggregator,
    learning: LearningFeedbackLoop,
    interval: Interval,
    min_age_minutes: i64,
}

impl EvaluationEngine {
    #[must_use]
    pub fn new(
        signals: SignalRepository,
        market: MarketDataAggregator,
        learning: LearningFeedbackLoop,
        interval: Interval,
        min_age_minutes: i64,
    ) -> Self {
        Self {
            signals,
            market,
            learning,
            interval,
            min_age_minutes,
        }
    }

    /// Whether a signal is old enough to judge: `min(min_age, horizon)`.
    #[must_use]
    pub fn is_eligible(&self, signal: &Signal, now: DateTime<Utc>) -> bool {
        let min_age = self.min_age_minutes.min(signal.horizon_minutes);
        signal.is_pending_evaluation() && signal.age(now) >= Duration::minutes(min_age)
    }

    /// Evaluates every eligible signal concurrently.
    ///
    /// # Errors
    ///
    /// Returns an error only if the pending signals cannot be loaded; failures
    /// on individual signals are counted and logged.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<EvaluationSummary> {
        let pending: Vec<Signal> = self
            .signals
            .pending_evaluation(now)
            .await?
            .into_iter()
            .filter(|s| self.is_eligible(s, now))
            .collect();

        let mut summary = EvaluationSummary {
            checked: pending.len(),
            ..EvaluationSummary::default()
        };
        if pending.is_empty() {
            debug!("No signals due for evaluation");
            return Ok(summary);
        }

        let results = join_all(pending.iter().map(|s| self.evaluate(s, now))).await;

        for (signal, result) in pending.iter().zip(results) {
            match result {
                Ok(Some(outcome)) => match outcome.result {
                    OutcomeResult::Win => summary.wins += 1,
                    OutcomeResult::Loss => summary.losses += 1,
                    OutcomeResult::Neutral => summary.neutrals += 1,
                },
                Ok(None) => summary.still_open += 1,
                Err(e) => {
                    summary.errors += 1;
                    warn!(symbol = %signal.symbol, "Evaluation of {} failed: {}", signal.id, e);
                }
            }
        }

        info!(
            "Evaluated {} signals: {} won, {} lost, {} neutral, {} open, {} errors",
            summary.checked,
            summary.wins,
            summary.losses,
            summary.neutrals,
            summary.still_open,
            summary.errors
        );
        Ok(summary)
    }

    /// Evaluates one signal. Returns the stored outcome, or `None` when the
    /// signal stays open or another run resolved it first.
    ///
    /// # Errors
    ///
    /// Returns an error if no price can be observed or the store fails.
    pub async fn evaluate(
        &self,
        signal: &Signal,
        now: DateTime<Utc>,
    ) -> Result<Option<Outcome>, PipelineError> {
        let Some(resolution) = self.settle(signal, now).await? else {
            return Ok(None);
        };

        let outcome = Outcome {
            signal_id: signal.id,
            symbol: signal.symbol.clone(),
            signal_type: signal.signal_type,
            pattern_name: signal.pattern_name.clone(),
            result: resolution.result,
            pnl_percent: resolution.pnl_percent,
            exit_price: resolution.exit_price,
            exit_timestamp: now,
            manual: false,
        };

        if !self.signals.resolve(&outcome).await? {
            debug!(symbol = %signal.symbol, "Signal {} already evaluated", signal.id);
            return Ok(None);
        }

        info!(
            symbol = %signal.symbol,
            "{} {} resolved {} at {:.4} ({:+.2}%)",
            signal.signal_type,
            signal.id,
            outcome.result,
            outcome.exit_price,
            outcome.pnl_percent
        );

        if let Err(e) = self.learning.on_outcome(&outcome).await {
            warn!(symbol = %signal.symbol, "Outcome stored but learning failed: {:#}", e);
        }

        Ok(Some(outcome))
    }

    /// Scans the in-horizon candles oldest first, then the current price while
    /// the horizon is still open.
    ///
    /// An expired signal closes NEUTRAL at its last in-horizon candle, or at the
    /// current price when no such candle is available. Candles are optional
    /// while the signal is open; the current price is optional when candles
    /// exist.
    async fn settle(
        &self,
        signal: &Signal,
        now: DateTime<Utc>,
    ) -> Result<Option<Resolution>, PipelineError> {
        let expired = signal.is_expired_at(now);
        let mut path = self.in_horizon_path(signal, now).await;

        if !expired {
            match self.market.get_snapshot(&signal.symbol).await {
                Ok(snapshot) => path.push(PriceObservation::at(snapshot.price)),
                Err(e) if !path.is_empty() => {
                    debug!(symbol = %signal.symbol, "Using candles only: {}", e);
                }
                Err(e) => return Err(e),
            }
        } else if path.is_empty() {
            let snapshot = self.market.get_snapshot(&signal.symbol).await?;
            path.push(PriceObservation::at(snapshot.price));
        }

        Ok(resolve_path(
            signal.signal_type,
            signal.entry_price,
            signal.take_profit,
            signal.stop_loss,
            path,
            expired,
        )
        .map(|(resolution, _)| resolution))
    }

    /// Candles opened after the signal and before its horizon ended, oldest
    /// first. Empty when candles are unavailable.
    async fn in_horizon_path(&self, signal: &Signal, now: DateTime<Utc>) -> Vec<PriceObservation> {
        let elapsed = signal.age(now).num_minutes().max(0);
        let count = (elapsed / self.interval.minutes() + 2).min(MAX_OBSERVATION_CANDLES);
        let count = usize::try_from(count).unwrap_or(1);
        let horizon_end = signal.horizon_end();

        match self
            .market
            .get_candles(&signal.symbol, self.interval, count)
            .await
        {
            Ok(series) => series
                .since(signal.created_at)
                .take_while(|c| c.timestamp < horizon_end)
                .copied()
                .map(PriceObservation::from)
                .collect(),
            Err(e) => {
                debug!(symbol = %signal.symbol, "No candles for evaluation: {}", e);
                Vec::new()
            }
        }
    }
}
