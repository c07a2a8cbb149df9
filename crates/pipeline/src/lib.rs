//! Signal pipeline stages for cryptopulse.
//!
//! - [`SynthesisCycle`]: market data to persisted signals, per symbol in parallel
//! - [`SignalLifecycleManager`]: cooldown-guarded persistence and user feedback
//! - [`EvaluationEngine`]: open signals to WIN/LOSS/NEUTRAL outcomes
//! - [`LearningFeedbackLoop`]: pattern and reputation aggregates, performance reports
//! - [`RiskAllocationController`]: win rate to allocation, leverage and status
//!
//! All cross-cycle state lives in the store; the stages hold only repositories
//! and configuration.

pub mod cycle;
pub mod evaluation;
pub mod learning;
pub mod lifecycle;
pub mod risk;
pub mod services;

pub use cycle::{CycleOutcome, SymbolReport, SynthesisCycle};
pub use evaluation::{EvaluationEngine, EvaluationSummary};
pub use learning::{
    reputation_from_counts, win_rate, LearningFeedbackLoop, PerformanceBucket, PerformanceReport,
};
pub use lifecycle::{Feedback, LifecycleError, SignalLifecycleManager};
pub use risk::{assess, RiskAllocationController, WinrateEstimate};
pub use services::PipelineServices;
