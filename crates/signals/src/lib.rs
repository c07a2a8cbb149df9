//! Indicators and signal synthesis for the cryptopulse pipeline.
//!
//! Pure computation only: callers fetch market data, reputation, sentiment
//! and pattern boosts, and persist what comes out.

pub mod generator;
pub mod indicators;

pub use generator::{
    apply_safety, parse_opinion, pattern_name, AdvisoryOpinion, Candidate, HttpAdvisoryClient,
    RuleDecision, SafetyOutcome, SignalSynthesizer, SynthesisInput, Targets, NEUTRAL_REPUTATION,
};
pub use indicators::compute as compute_indicators;
