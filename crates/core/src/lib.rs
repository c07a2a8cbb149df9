//! Core types for the cryptopulse signal pipeline.
//!
//! Everything here is shared by the data, market-data, signals, pipeline and
//! backtest crates: domain types, provider traits, the error taxonomy and the
//! layered configuration.

pub mod backtest;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod indicator;
pub mod learning;
pub mod market;
pub mod outcome;
pub mod risk;
pub mod signal;
pub mod traits;

pub use backtest::{BacktestRun, BacktestTrade};
pub use config::{
    AdvisoryConfig, AppConfig, BacktestConfig, DatabaseConfig, LearningConfig, MarketDataConfig,
    NewsConfig, PipelineConfig, ProviderConfig, ProviderKind, RiskConfig, RuleConfig,
    SchedulerConfig, ServerConfig, StreamConfig, TargetConfig,
};
pub use config_loader::ConfigLoader;
pub use error::{AdvisoryError, PipelineError, ProviderError};
pub use indicator::{IndicatorSet, Macd};
pub use learning::{PatternRecord, ReputationRecord};
pub use market::{Candle, CandleSeries, Interval, MarketSnapshot, Sentiment, Ticker};
pub use outcome::{
    directional_pnl_pct, resolve, resolve_path, Outcome, OutcomeResult, PriceObservation, Resolution,
};
pub use risk::{RiskState, RiskStatus, WinrateSource};
pub use signal::{
    targets_are_ordered, CandidateSignal, Signal, SignalSource, SignalStatus, SignalType,
};
pub use traits::{AdvisoryProvider, AdvisoryRequest, MarketDataProvider, NewsProvider};
