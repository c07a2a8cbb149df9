//! Signal lifecycle: persistence with cooldown, user feedback, listings.

use chrono::{DateTime, Duration, Utc};
use cryptopulse_core::{
    directional_pnl_pct, targets_are_ordered, CandidateSignal, Outcome, OutcomeResult,
    PipelineError, Signal, SignalStatus,
};
use cryptopulse_data::{InsertOutcome, SignalFilter, SignalRepository};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::learning::LearningFeedbackLoop;

/// Failure of a user-driven lifecycle action.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Signal {0} not found")]
    NotFound(Uuid),

    #[error("Signal {id} is {status}; cannot {action}")]
    InvalidTransition {
        id: Uuid,
        status: SignalStatus,
        action: &'static str,
    },

    #[error("Invalid feedback: {0}")]
    InvalidFeedback(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Outcome reported by the user for a taken signal.
#[derive(Debug, Clone, Deserialize)]
pub struct Feedback {
    pub result: OutcomeResult,
    pub pnl_percent: Option<f64>,
    pub exit_price: Option<f64>,
}

impl Feedback {
    fn validate(&self) -> Result<(), LifecycleError> {
        if let Some(price) = self.exit_price {
            if !price.is_finite() || price <= 0.0 {
                return Err(LifecycleError::InvalidFeedback(format!(
                    "exit_price must be a positive number, got {price}"
                )));
            }
        }
        if self.pnl_percent.is_some_and(|pnl| !pnl.is_finite()) {
            return Err(LifecycleError::InvalidFeedback(
                "pnl_percent must be a finite number".to_string(),
            ));
        }
        Ok(())
    }
}

/// Owns every write to the `signals` table outside of evaluation.
#[derive(Debug, Clone)]
pub struct SignalLifecycleManager {
    signals: SignalRepository,
    learning: LearningFeedbackLoop,
    horizon_minutes: i64,
}

impl SignalLifecycleManager {
    #[must_use]
    pub fn new(signals: SignalRepository, learning: LearningFeedbackLoop, horizon_minutes: i64) -> Self {
        Self {
            signals,
            learning,
            horizon_minutes,
        }
    }

    #[must_use]
    pub const fn horizon_minutes(&self) -> i64 {
        self.horizon_minutes
    }

    /// Persists a directional candidate as a new active signal.
    ///
    /// WAIT candidates are skipped and yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::PersistenceConflict`] when the (symbol, horizon) key
    ///   is cooling down
    /// - [`PipelineError::InvariantViolation`] when the targets are not ordered
    /// - [`PipelineError::Storage`] when the insert fails
    pub async fn persist(
        &self,
        candidate: CandidateSignal,
        now: DateTime<Utc>,
    ) -> Result<Option<Signal>, PipelineError> {
        if !candidate.is_actionable() {
            debug!(symbol = %candidate.symbol, "WAIT candidate not persisted");
            return Ok(None);
        }

        if candidate.take_profit == candidate.entry_price
            || !targets_are_ordered(
                candidate.signal_type,
                candidate.entry_price,
                candidate.take_profit,
                candidate.stop_loss,
            )
        {
            return Err(PipelineError::InvariantViolation(format!(
                "refusing to persist {} {} entry {} tp {} sl {}",
                candidate.symbol,
                candidate.signal_type,
                candidate.entry_price,
                candidate.take_profit,
                candidate.stop_loss
            )));
        }

        let signal = Signal::from_candidate(candidate, self.horizon_minutes, now);
        let cooldown_since = now - Duration::minutes(self.horizon_minutes);

        match self.signals.insert_with_cooldown(&signal, cooldown_since).await? {
            InsertOutcome::Inserted => {
                info!(
                    symbol = %signal.symbol,
                    "Persisted {} {} at {:.4} (conf {:.1}, tp {:.4}, sl {:.4})",
                    signal.signal_type,
                    signal.id,
                    signal.entry_price,
                    signal.confidence,
                    signal.take_profit,
                    signal.stop_loss
                );
                Ok(Some(signal))
            }
            InsertOutcome::Suppressed => Err(PipelineError::PersistenceConflict {
                symbol: signal.symbol,
                horizon_minutes: signal.horizon_minutes,
            }),
        }
    }

    async fn load(&self, id: Uuid) -> Result<Signal, LifecycleError> {
        self.signals
            .get(id)
            .await?
            .ok_or(LifecycleError::NotFound(id))
    }

    /// Moves an active signal to `taken`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] for an unknown id and
    /// [`LifecycleError::InvalidTransition`] when the signal is not active.
    pub async fn mark_taken(&self, id: Uuid) -> Result<Signal, LifecycleError> {
        let mut signal = self.load(id).await?;

        if !self.signals.mark_taken(id).await? {
            return Err(LifecycleError::InvalidTransition {
                id,
                status: signal.status,
                action: "take",
            });
        }

        info!(symbol = %signal.symbol, "Signal {} taken", id);
        signal.status = SignalStatus::Taken;
        Ok(signal)
    }

    /// Records the user's outcome for a taken signal and feeds it to learning.
    ///
    /// A missing exit price defaults to the target matching the result (entry
    /// for NEUTRAL); a missing P&L is computed directionally from it.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidFeedback`] for a non-positive exit
    /// price or a non-finite P&L, and [`LifecycleError::InvalidTransition`]
    /// unless the signal is taken and has no outcome yet.
    pub async fn record_feedback(
        &self,
        id: Uuid,
        feedback: &Feedback,
        now: DateTime<Utc>,
    ) -> Result<Outcome, LifecycleError> {
        feedback.validate()?;
        let signal = self.load(id).await?;

        let invalid = || LifecycleError::InvalidTransition {
            id,
            status: signal.status,
            action: "record feedback",
        };
        if signal.status != SignalStatus::Taken || signal.evaluated_at.is_some() {
            return Err(invalid());
        }

        let exit_price = feedback.exit_price.unwrap_or(match feedback.result {
            OutcomeResult::Win => signal.take_profit,
            OutcomeResult::Loss => signal.stop_loss,
            OutcomeResult::Neutral => signal.entry_price,
        });
        let pnl_percent = feedback.pnl_percent.unwrap_or_else(|| {
            directional_pnl_pct(signal.signal_type, signal.entry_price, exit_price)
        });

        let outcome = Outcome {
            signal_id: signal.id,
            symbol: signal.symbol.clone(),
            signal_type: signal.signal_type,
            pattern_name: signal.pattern_name.clone(),
            result: feedback.result,
            pnl_percent,
            exit_price,
            exit_timestamp: now,
            manual: true,
        };

        if !self.signals.record_manual_outcome(&outcome).await? {
            return Err(invalid());
        }

        if let Err(e) = self.learning.on_outcome(&outcome).await {
            warn!(symbol = %outcome.symbol, "Feedback stored but learning failed: {:#}", e);
        }

        Ok(outcome)
    }

    /// Active signals, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_active(&self, symbol: Option<&str>) -> anyhow::Result<Vec<Signal>> {
        self.signals.list_active(symbol).await
    }

    /// Signal history matching a filter, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn history(&self, filter: &SignalFilter) -> anyhow::Result<Vec<Signal>> {
        self.signals.list(filter).await
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get(&self, id: Uuid) -> anyhow::Result<Option<Signal>> {
        self.signals.get(id).await
    }
}
