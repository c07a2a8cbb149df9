//! Candidate signal synthesis.
//!
//! One pass turns a snapshot and its indicators into a [`CandidateSignal`]:
//!
//! 1. Rule channel decision, replaced by a validated advisory opinion when one
//!    is supplied and the symbol's reputation allows it
//! 2. Safety corrections
//! 3. Pattern boost
//! 4. Confidence threshold (below it the candidate becomes WAIT)
//! 5. Price targets and the direction invariant

use cryptopulse_core::{
    CandidateSignal, IndicatorSet, MarketSnapshot, PipelineError, RuleConfig, Sentiment,
    SignalSource, SignalType, TargetConfig,
};
use tracing::{debug, warn};

use super::advisory::{parse_opinion, Candidate};
use super::pattern::pattern_name;
use super::rules::{self, RuleDecision};
use super::targets::{self, Targets};

/// Reputation assumed when no history exists.
pub const NEUTRAL_REPUTATION: f64 = 50.0;

/// Everything one synthesis pass looks at.
#[derive(Debug, Clone)]
pub struct SynthesisInput<'a> {
    pub snapshot: &'a MarketSnapshot,
    pub indicators: &'a IndicatorSet,
    /// Reputation score of the symbol, 0-100
    pub reputation_score: f64,
    pub sentiment: Sentiment,
    /// Raw advisory response, unvalidated
    pub advisory: Option<&'a str>,
    /// Confidence boost learned for this regime's pattern
    pub pattern_boost: f64,
}

impl<'a> SynthesisInput<'a> {
    /// Input with neutral sentiment and reputation, no advisory and no boost.
    #[must_use]
    pub fn deterministic(snapshot: &'a MarketSnapshot, indicators: &'a IndicatorSet) -> Self {
        Self {
            snapshot,
            indicators,
            reputation_score: NEUTRAL_REPUTATION,
            sentiment: Sentiment::Neutral,
            advisory: None,
            pattern_boost: 0.0,
        }
    }
}

/// Turns market state into candidate signals.
#[derive(Debug, Clone)]
pub struct SignalSynthesizer {
    rules: RuleConfig,
    targets: TargetConfig,
    advisory_min_reputation: f64,
}

impl Default for SignalSynthesizer {
    fn default() -> Self {
        Self::new(RuleConfig::default(), TargetConfig::default(), 30.0)
    }
}

impl SignalSynthesizer {
    #[must_use]
    pub fn new(rules: RuleConfig, targets: TargetConfig, advisory_min_reputation: f64) -> Self {
        Self {
            rules,
            targets,
            advisory_min_reputation,
        }
    }

    #[must_use]
    pub fn rules(&self) -> &RuleConfig {
        &self.rules
    }

    /// Advisory opinions are only consulted above this reputation.
    #[must_use]
    pub fn accepts_advisory(&self, reputation_score: f64) -> bool {
        reputation_score >= self.advisory_min_reputation
    }

    /// Picks the channel for this pass. Malformed advisory text falls back to
    /// the rule decision.
    #[must_use]
    pub fn select_channel(
        &self,
        rule: RuleDecision,
        advisory: Option<&str>,
        reputation_score: f64,
        symbol: &str,
    ) -> Candidate {
        let Some(text) = advisory else {
            return Candidate::RuleOnly(rule);
        };

        if !self.accepts_advisory(reputation_score) {
            debug!(
                symbol = %symbol,
                "Ignoring advisory at reputation {:.1}", reputation_score
            );
            return Candidate::RuleOnly(rule);
        }

        match parse_opinion(text) {
            Ok(opinion) => Candidate::AdvisoryValidated(opinion),
            Err(e) => {
                warn!(symbol = %symbol, "{}; using rule channel", PipelineError::Advisory(e));
                Candidate::RuleOnly(rule)
            }
        }
    }

    /// Runs one synthesis pass.
    #[must_use]
    pub fn synthesize(&self, input: &SynthesisInput<'_>) -> CandidateSignal {
        let snapshot = input.snapshot;
        let indicators = input.indicators;
        let entry = snapshot.price;
        let pattern = pattern_name(indicators, input.sentiment);

        if !entry.is_finite() || entry <= 0.0 {
            warn!(symbol = %snapshot.symbol, "Unusable entry price {}", entry);
            return wait(
                snapshot,
                indicators,
                pattern,
                self.rules.wait_confidence,
                "Unusable entry price".to_string(),
            );
        }

        let rule = rules::evaluate(&self.rules, entry, indicators, input.sentiment);
        let candidate = self.select_channel(
            rule,
            input.advisory,
            input.reputation_score,
            &snapshot.symbol,
        );

        let (source, mut reason, advisory_targets) = match &candidate {
            Candidate::RuleOnly(rule) => (SignalSource::Rule, rule.reason.clone(), None),
            Candidate::AdvisoryValidated(opinion) => (
                SignalSource::Advisory,
                opinion.reason.clone(),
                opinion.take_profit.zip(opinion.stop_loss),
            ),
        };

        let safety = rules::apply_safety(
            &self.rules,
            candidate.signal_type(),
            candidate.confidence(),
            entry,
            indicators,
        );
        if safety.forced {
            reason = format!(
                "Safety override to {} (was {}): {}",
                safety.signal_type,
                candidate.signal_type(),
                reason
            );
        }
        let signal_type = safety.signal_type;
        let mut confidence = safety.confidence;

        if signal_type.is_directional() && input.pattern_boost != 0.0 {
            confidence = (confidence + input.pattern_boost).clamp(0.0, 100.0);
            reason = format!("{reason} (pattern boost {:+.1})", input.pattern_boost);
        }

        if signal_type.is_directional() && confidence < self.rules.confidence_threshold {
            debug!(
                symbol = %snapshot.symbol,
                "{} at {:.1} below threshold {:.0}",
                signal_type,
                confidence,
                self.rules.confidence_threshold
            );
            return wait(
                snapshot,
                indicators,
                pattern,
                confidence,
                format!("{reason}; confidence below threshold"),
            );
        }

        if !signal_type.is_directional() {
            return wait(snapshot, indicators, pattern, confidence, reason);
        }

        let (tp_pct, sl_pct) =
            targets::distances(&self.targets, input.reputation_score, snapshot.range_pct());
        let derived = targets::place(signal_type, entry, tp_pct, sl_pct);

        // Advisory targets survive only when the direction was not overridden
        // and they already sit on the right sides of entry.
        let chosen = match advisory_targets {
            Some((take_profit, stop_loss))
                if !safety.forced
                    && take_profit != entry
                    && cryptopulse_core::targets_are_ordered(
                        signal_type,
                        entry,
                        take_profit,
                        stop_loss,
                    ) =>
            {
                Targets {
                    take_profit,
                    stop_loss,
                }
            }
            _ => derived,
        };

        let (final_targets, corrected) =
            targets::enforce(&self.targets, signal_type, entry, chosen, sl_pct);
        if corrected {
            let violation = PipelineError::InvariantViolation(format!(
                "{} {} entry {} tp {} sl {}",
                snapshot.symbol, signal_type, entry, chosen.take_profit, chosen.stop_loss
            ));
            warn!(symbol = %snapshot.symbol, "{}; targets corrected", violation);
        }

        CandidateSignal {
            symbol: snapshot.symbol.clone(),
            signal_type,
            confidence,
            entry_price: entry,
            take_profit: final_targets.take_profit,
            stop_loss: final_targets.stop_loss,
            pattern_name: pattern,
            reason: format!("{reason}. Indicators: {}", indicators.summary()),
            source,
            indicators: *indicators,
        }
    }
}

fn wait(
    snapshot: &MarketSnapshot,
    indicators: &IndicatorSet,
    pattern: String,
    confidence: f64,
    reason: String,
) -> CandidateSignal {
    CandidateSignal {
        symbol: snapshot.symbol.clone(),
        signal_type: SignalType::Wait,
        confidence,
        entry_price: snapshot.price,
        take_profit: snapshot.price,
        stop_loss: snapshot.price,
        pattern_name: pattern,
        reason,
        source: SignalSource::Rule,
        indicators: *indicators,
    }
}
