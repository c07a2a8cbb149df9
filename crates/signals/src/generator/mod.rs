//! Signal generation: rule channel, advisory channel, targets and synthesis.

pub mod advisory;
pub mod pattern;
pub mod rules;
mod synthesizer;
pub mod targets;

pub use advisory::{parse_opinion, AdvisoryOpinion, Candidate, HttpAdvisoryClient};
pub use pattern::pattern_name;
pub use rules::{apply_safety, RuleDecision, SafetyOutcome};
pub use synthesizer::{SignalSynthesizer, SynthesisInput, NEUTRAL_REPUTATION};
pub use targets::Targets;
