//! Scheduled synthesis cycle.
//!
//! For each watched symbol: snapshot and candles from the aggregator,
//! indicators, sentiment, reputation and learned pattern boost, an optional
//! advisory opinion, one synthesis pass and finally the lifecycle insert.
//! Symbols run concurrently and the whole cycle is bounded by a timeout.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use cryptopulse_core::{
    AdvisoryProvider, AdvisoryRequest, CandidateSignal, IndicatorSet, Interval, MarketSnapshot,
    PipelineError, ReputationRecord, Sentiment, Signal,
};
use cryptopulse_data::{ReputationRepository, RiskStateRepository};
use cryptopulse_market_data::MarketDataAggregator;
use cryptopulse_signals::{compute_indicators, pattern_name, SignalSynthesizer, SynthesisInput};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::learning::LearningFeedbackLoop;
use crate::lifecycle::SignalLifecycleManager;

/// What a cycle did for one symbol.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Persisted(Signal),
    /// Below threshold or no rule matched
    Wait(CandidateSignal),
    /// Directional but the (symbol, horizon) key is cooling down
    Suppressed(CandidateSignal),
}

impl CycleOutcome {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Persisted(_) => "persisted",
            Self::Wait(_) => "wait",
            Self::Suppressed(_) => "suppressed",
        }
    }
}

/// Result of one symbol in a cycle.
#[derive(Debug)]
pub struct SymbolReport {
    pub symbol: String,
    pub result: Result<CycleOutcome, PipelineError>,
}

/// Runs synthesis for the watchlist.
#[derive(Clone)]
pub struct SynthesisCycle {
    market: MarketDataAggregator,
    synthesizer: SignalSynthesizer,
    lifecycle: SignalLifecycleManager,
    learning: LearningFeedbackLoop,
    reputation: ReputationRepository,
    risk: RiskStateRepository,
    advisory: Option<Arc<dyn AdvisoryProvider>>,
    interval: Interval,
    candle_count: usize,
    timeout: Duration,
}

impl SynthesisCycle {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        market: MarketDataAggregator,
        synthesizer: SignalSynthesizer,
        lifecycle: SignalLifecycleManager,
        learning: LearningFeedbackLoop,
        reputation: ReputationRepository,
        risk: RiskStateRepository,
        interval: Interval,
        candle_count: usize,
    ) -> Self {
        Self {
            market,
            synthesizer,
            lifecycle,
            learning,
            reputation,
            risk,
            advisory: None,
            interval,
            candle_count,
            timeout: Duration::from_secs(120),
        }
    }

    #[must_use]
    pub fn with_advisory(mut self, advisory: Arc<dyn AdvisoryProvider>) -> Self {
        self.advisory = Some(advisory);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs one cycle over `symbols`.
    ///
    /// # Errors
    ///
    /// Returns an error when the cycle exceeds its timeout; the next tick retries.
    pub async fn run(&self, symbols: &[String], now: DateTime<Utc>) -> Result<Vec<SymbolReport>> {
        let work = join_all(symbols.iter().map(|symbol| async move {
            SymbolReport {
                symbol: symbol.clone(),
                result: self.run_symbol(symbol, now).await,
            }
        }));

        let reports = tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| anyhow!("Synthesis cycle timed out after {:?}", self.timeout))?;

        for report in &reports {
            match &report.result {
                Ok(outcome) => debug!(symbol = %report.symbol, "Cycle {}", outcome.label()),
                Err(e) if e.is_alert() => {
                    error!(alert = true, symbol = %report.symbol, "{}", e);
                }
                Err(e) => warn!(symbol = %report.symbol, "Cycle skipped: {}", e),
            }
        }

        let persisted = reports
            .iter()
            .filter(|r| matches!(r.result, Ok(CycleOutcome::Persisted(_))))
            .count();
        info!(
            "Synthesis cycle done: {} symbols, {} signals persisted",
            reports.len(),
            persisted
        );
        Ok(reports)
    }

    /// Synthesizes and persists one symbol.
    ///
    /// # Errors
    ///
    /// Returns the pipeline error that stopped this symbol.
    pub async fn run_symbol(
        &self,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Result<CycleOutcome, PipelineError> {
        let candidate = self.synthesize(symbol).await?;

        if !candidate.is_actionable() {
            return Ok(CycleOutcome::Wait(candidate));
        }

        match self.lifecycle.persist(candidate.clone(), now).await {
            Ok(Some(signal)) => Ok(CycleOutcome::Persisted(signal)),
            Ok(None) => Ok(CycleOutcome::Wait(candidate)),
            Err(PipelineError::PersistenceConflict { .. }) => {
                info!(symbol = %symbol, "Duplicate suppressed");
                Ok(CycleOutcome::Suppressed(candidate))
            }
            Err(e) => Err(e),
        }
    }

    /// Produces a candidate for one symbol without persisting it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoMarketDataAvailable`] or
    /// [`PipelineError::InsufficientHistory`] when inputs are missing.
    pub async fn synthesize(&self, symbol: &str) -> Result<CandidateSignal, PipelineError> {
        let snapshot = self.market.get_snapshot(symbol).await?;
        let series = self
            .market
            .get_candles(symbol, self.interval, self.candle_count)
            .await?;
        let indicators = compute_indicators(&series)?;
        let sentiment = self.market.get_sentiment(symbol).await;

        let reputation = self
            .reputation
            .get_or_neutral(symbol)
            .await
            .unwrap_or_else(|e| {
                warn!(symbol = %symbol, "Reputation unavailable, using neutral: {:#}", e);
                ReputationRecord::neutral(symbol)
            });

        let pattern = pattern_name(&indicators, sentiment);
        let pattern_boost = self
            .learning
            .pattern_boost(&pattern)
            .await
            .unwrap_or_else(|e| {
                warn!(symbol = %symbol, "Pattern boost unavailable: {:#}", e);
                0.0
            });

        let advisory = self
            .consult_advisory(&snapshot, &indicators, &reputation, sentiment)
            .await;

        let candidate = self.synthesizer.synthesize(&SynthesisInput {
            snapshot: &snapshot,
            indicators: &indicators,
            reputation_score: reputation.reputation_score,
            sentiment,
            advisory: advisory.as_deref(),
            pattern_boost,
        });

        info!(
            symbol = %symbol,
            "Candidate {} conf {:.1} via {} ({})",
            candidate.signal_type,
            candidate.confidence,
            candidate.source.as_str(),
            snapshot.provider
        );
        Ok(candidate)
    }

    /// Raw advisory text, when a provider is configured and the symbol's
    /// reputation allows it. Failures degrade to the rule channel.
    async fn consult_advisory(
        &self,
        snapshot: &MarketSnapshot,
        indicators: &IndicatorSet,
        reputation: &ReputationRecord,
        sentiment: Sentiment,
    ) -> Option<String> {
        let advisory = self.advisory.as_ref()?;
        if !self.synthesizer.accepts_advisory(reputation.reputation_score) {
            return None;
        }

        let risk_profile = match self.risk.get(&snapshot.symbol).await {
            Ok(state) => state.map(|s| s.risk_status),
            Err(e) => {
                debug!(symbol = %snapshot.symbol, "Risk state unavailable: {:#}", e);
                None
            }
        };

        let request = AdvisoryRequest {
            snapshot: snapshot.clone(),
            indicators: *indicators,
            reputation: reputation.clone(),
            sentiment,
            risk_profile,
        };

        match advisory.advise(&request).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(
                    symbol = %snapshot.symbol,
                    "{}; using rule channel",
                    PipelineError::Advisory(e)
                );
                None
            }
        }
    }
}
