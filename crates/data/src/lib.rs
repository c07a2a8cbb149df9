//! Persistence for the cryptopulse signal pipeline.
//!
//! This crate provides:
//! - An `SQLite` database handle with embedded migrations
//! - Row models converting to and from the core domain types
//! - Repositories for typed access to every pipeline table

pub mod database;
pub mod models;
pub mod repositories;

pub use database::Database;
pub use models::{ApiCallLog, ApiCallStatus, CacheEntry, ProviderCallStats, StoredBacktestRun};
pub use repositories::{
    ApiCallRepository, BacktestRepository, BoostPolicy, CacheRepository, InsertOutcome,
    OutcomeCounts, OutcomeRepository, PatternRepository, Repositories, ReputationRepository,
    RiskStateRepository, SignalFilter, SignalRepository,
};
