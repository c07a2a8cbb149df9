//! Database repositories for the signal pipeline.
//!
//! Each repository wraps one table (or one tightly coupled pair) over a shared
//! `SQLite` pool.

pub mod api_call_repo;
pub mod backtest_repo;
pub mod cache_repo;
pub mod outcome_repo;
pub mod pattern_repo;
pub mod reputation_repo;
pub mod risk_repo;
pub mod signal_repo;

pub use api_call_repo::ApiCallRepository;
pub use backtest_repo::BacktestRepository;
pub use cache_repo::CacheRepository;
pub use outcome_repo::{OutcomeCounts, OutcomeRepository};
pub use pattern_repo::{BoostPolicy, PatternRepository};
pub use reputation_repo::ReputationRepository;
pub use risk_repo::RiskStateRepository;
pub use signal_repo::{InsertOutcome, SignalFilter, SignalRepository};

use sqlx::SqlitePool;

/// Creates all repositories from a single database pool.
#[derive(Debug, Clone)]
pub struct Repositories {
    pub signals: SignalRepository,
    pub outcomes: OutcomeRepository,
    pub patterns: PatternRepository,
    pub reputation: ReputationRepository,
    pub risk: RiskStateRepository,
    pub backtests: BacktestRepository,
    pub cache: CacheRepository,
    pub api_calls: ApiCallRepository,
}

impl Repositories {
    /// Creates a new set of repositories from a database pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            signals: SignalRepository::new(pool.clone()),
            outcomes: OutcomeRepository::new(pool.clone()),
            patterns: PatternRepository::new(pool.clone()),
            reputation: ReputationRepository::new(pool.clone()),
            risk: RiskStateRepository::new(pool.clone()),
            backtests: BacktestRepository::new(pool.clone()),
            cache: CacheRepository::new(pool.clone()),
            api_calls: ApiCallRepository::new(pool),
        }
    }
}
