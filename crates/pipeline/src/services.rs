//! Wiring of the pipeline stages from configuration.

use anyhow::{Context, Result};
use cryptopulse_core::{AppConfig, Interval};
use cryptopulse_data::Repositories;
use cryptopulse_market_data::MarketDataAggregator;
use cryptopulse_signals::{HttpAdvisoryClient, SignalSynthesizer};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::cycle::SynthesisCycle;
use crate::evaluation::EvaluationEngine;
use crate::learning::LearningFeedbackLoop;
use crate::lifecycle::SignalLifecycleManager;
use crate::risk::RiskAllocationController;

/// Every pipeline stage, built once and shared by the scheduler, API and CLI.
#[derive(Clone)]
pub struct PipelineServices {
    pub market: MarketDataAggregator,
    pub lifecycle: SignalLifecycleManager,
    pub evaluation: EvaluationEngine,
    pub learning: LearningFeedbackLoop,
    pub risk: RiskAllocationController,
    pub cycle: SynthesisCycle,
    pub interval: Interval,
    pub symbols: Vec<String>,
}

impl PipelineServices {
    /// # Errors
    ///
    /// Returns an error if the candle interval is invalid or a provider or
    /// advisory client cannot be built.
    pub fn from_config(config: &AppConfig, repos: &Repositories) -> Result<Self> {
        let market = MarketDataAggregator::from_config(&config.market_data, repos)?;
        Self::with_market(config, repos, market)
    }

    /// Builds the stages over an already constructed aggregator.
    ///
    /// # Errors
    ///
    /// Returns an error if the candle interval is invalid or the advisory
    /// client cannot be built.
    pub fn with_market(
        config: &AppConfig,
        repos: &Repositories,
        market: MarketDataAggregator,
    ) -> Result<Self> {
        let interval: Interval = config
            .market_data
            .candle_interval
            .parse()
            .context("invalid market_data.candle_interval")?;

        let learning = LearningFeedbackLoop::new(repos, config.learning.clone());
        let lifecycle = SignalLifecycleManager::new(
            repos.signals.clone(),
            learning.clone(),
            config.pipeline.horizon_minutes,
        );
        let evaluation = EvaluationEngine::new(
            repos.signals.clone(),
            market.clone(),
            learning.clone(),
            interval,
            config.pipeline.evaluation_min_age_minutes,
        );
        let risk = RiskAllocationController::new(repos, config.risk.clone());

        let synthesizer = SignalSynthesizer::new(
            config.rules.clone(),
            config.targets.clone(),
            config.advisory.min_reputation,
        );
        let mut cycle = SynthesisCycle::new(
            market.clone(),
            synthesizer,
            lifecycle.clone(),
            learning.clone(),
            repos.reputation.clone(),
            repos.risk.clone(),
            interval,
            config.market_data.candle_count,
        )
        .with_timeout(Duration::from_secs(config.pipeline.cycle_timeout_secs));

        if config.advisory.enabled {
            let client = HttpAdvisoryClient::from_config(&config.advisory)
                .context("failed to build advisory client")?;
            info!("Advisory channel enabled at {}", config.advisory.endpoint);
            cycle = cycle.with_advisory(Arc::new(client));
        }

        Ok(Self {
            market,
            lifecycle,
            evaluation,
            learning,
            risk,
            cycle,
            interval,
            symbols: config.pipeline.symbols.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cryptopulse_data::Database;

    #[tokio::test]
    async fn test_builds_from_default_config() {
        let db = Database::in_memory().await.unwrap();
        let services = PipelineServices::from_config(&AppConfig::default(), &db.repositories())
            .unwrap();

        assert_eq!(services.interval, Interval::H1);
        assert_eq!(services.market.provider_ids().len(), 3);
        assert_eq!(services.lifecycle.horizon_minutes(), 240);
    }

    #[tokio::test]
    async fn test_rejects_bad_interval() {
        let db = Database::in_memory().await.unwrap();
        let mut config = AppConfig::default();
        config.market_data.candle_interval = "7m".to_string();

        assert!(PipelineServices::from_config(&config, &db.repositories()).is_err());
    }
}
