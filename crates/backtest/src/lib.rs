//! Deterministic backtesting of the cryptopulse signal rules.
//!
//! The simulator replays candles through the same indicator and synthesis code
//! the live pipeline runs, with advisory and news switched off, and resolves
//! each simulated signal with the shared target/timeout rule.

pub mod data_provider;
pub mod metrics;
pub mod service;
pub mod simulator;

pub use data_provider::HistoricalDataProvider;
pub use metrics::{MetricsCalculator, PerformanceMetrics};
pub use service::{BacktestReport, BacktestService, MAX_DAYS};
pub use simulator::BacktestSimulator;
