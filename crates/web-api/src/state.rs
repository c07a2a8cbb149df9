use chrono::{DateTime, Utc};
use cryptopulse_backtest::BacktestService;
use cryptopulse_data::{Database, Repositories};
use cryptopulse_pipeline::PipelineServices;

/// Shared handles behind every route.
#[derive(Clone)]
pub struct AppState {
    pub services: PipelineServices,
    pub backtests: BacktestService,
    pub repos: Repositories,
    pub db: Database,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    #[must_use]
    pub fn new(
        services: PipelineServices,
        backtests: BacktestService,
        repos: Repositories,
        db: Database,
    ) -> Self {
        Self {
            services,
            backtests,
            repos,
            db,
            started_at: Utc::now(),
        }
    }
}
