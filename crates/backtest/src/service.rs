//! Backtest invocation: fetch history, simulate, persist, refresh risk.

use anyhow::Context;
use chrono::{DateTime, Utc};
use cryptopulse_core::{
    AppConfig, BacktestConfig, BacktestRun, BacktestTrade, CandleSeries, Interval, PipelineError,
    RiskState,
};
use cryptopulse_data::{BacktestRepository, Repositories};
use cryptopulse_market_data::MarketDataAggregator;
use cryptopulse_pipeline::RiskAllocationController;
use cryptopulse_signals::SignalSynthesizer;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::metrics::MetricsCalculator;
use crate::simulator::BacktestSimulator;

/// Upper bound on the requested history.
pub const MAX_DAYS: i64 = 90;

/// Stored run plus everything the caller may want to show.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub run_id: i64,
    pub run: BacktestRun,
    pub trades: Vec<BacktestTrade>,
    /// Risk state refreshed from this run, when the refresh succeeded
    pub risk: Option<RiskState>,
}

#[derive(Clone)]
pub struct BacktestService {
    market: MarketDataAggregator,
    backtests: BacktestRepository,
    risk: RiskAllocationController,
    simulator: BacktestSimulator,
    interval: Interval,
    config: BacktestConfig,
}

impl BacktestService {
    #[must_use]
    pub fn new(
        market: MarketDataAggregator,
        backtests: BacktestRepository,
        risk: RiskAllocationController,
        simulator: BacktestSimulator,
        interval: Interval,
        config: BacktestConfig,
    ) -> Self {
        Self {
            market,
            backtests,
            risk,
            simulator,
            interval,
            config,
        }
    }

    /// Builds the service with the same rules and targets as live synthesis.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured candle interval is invalid.
    pub fn from_config(
        config: &AppConfig,
        repos: &Repositories,
        market: MarketDataAggregator,
        risk: RiskAllocationController,
    ) -> anyhow::Result<Self> {
        let interval: Interval = config
            .market_data
            .candle_interval
            .parse()
            .context("invalid market_data.candle_interval")?;

        let synthesizer = SignalSynthesizer::new(
            config.rules.clone(),
            config.targets.clone(),
            config.advisory.min_reputation,
        );
        let simulator = BacktestSimulator::new(
            synthesizer,
            config.backtest.window,
            BacktestSimulator::horizon_candles_for(
                config.pipeline.horizon_minutes,
                interval.minutes(),
            ),
        );

        Ok(Self::new(
            market,
            repos.backtests.clone(),
            risk,
            simulator,
            interval,
            config.backtest.clone(),
        ))
    }

    #[must_use]
    pub const fn default_days(&self) -> i64 {
        self.config.default_days
    }

    /// Candles requested for a `days`-long backtest.
    #[must_use]
    pub fn candles_for(&self, days: i64) -> usize {
        usize::try_from(days.clamp(1, MAX_DAYS)).unwrap_or(1) * self.interval.per_day()
    }

    /// Backtests `symbol` over the last `days` of live history.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoMarketDataAvailable`] when no history can be
    /// fetched, [`PipelineError::InsufficientHistory`] when it is too short for
    /// a single simulated signal, and [`PipelineError::Storage`] when the run
    /// cannot be stored.
    pub async fn run(
        &self,
        symbol: &str,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<BacktestReport, PipelineError> {
        let days = days.clamp(1, MAX_DAYS);
        let series = self
            .market
            .get_candles(symbol, self.interval, self.candles_for(days))
            .await?;
        self.run_series(&series, days, now).await
    }

    /// Backtests an already loaded series, e.g. one read from CSV.
    ///
    /// # Errors
    ///
    /// Same as [`Self::run`], minus the fetch.
    pub async fn run_series(
        &self,
        series: &CandleSeries,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<BacktestReport, PipelineError> {
        let symbol = series.symbol.as_str();
        let trades = match self.simulator.run(series) {
            Ok(trades) => trades,
            Err(e) => {
                warn!(symbol = %symbol, "Backtest skipped: {}", e);
                return Err(e);
            }
        };

        let mut calculator = MetricsCalculator::new(self.config.min_pattern_occurrences);
        for trade in &trades {
            calculator.add_trade(trade);
        }
        let metrics = calculator.calculate();

        let (start_date, end_date) = match (series.candles.first(), series.candles.last()) {
            (Some(first), Some(last)) => (first.timestamp, last.timestamp),
            _ => (now, now),
        };
        let run = metrics.into_run(symbol, days, start_date, end_date, now);

        let run_id = self
            .backtests
            .insert_run(&run, &trades)
            .await
            .with_context(|| format!("failed to store backtest for {symbol}"))?;

        info!(
            symbol = %symbol,
            run_id,
            "Backtest over {} candles: {} signals, {:.1}% win rate, {:+.2}% total",
            series.len(),
            run.signals_tested,
            run.winrate,
            run.total_pnl_percent
        );

        let risk = match self.risk.recompute(symbol, now).await {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(symbol = %symbol, "Risk refresh after backtest failed: {:#}", e);
                None
            }
        };

        Ok(BacktestReport {
            run_id,
            run,
            trades,
            risk,
        })
    }

    /// Backtests every symbol with the default window, skipping failures.
    pub async fn run_all(&self, symbols: &[String], now: DateTime<Utc>) -> Vec<BacktestReport> {
        let mut reports = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match self.run(symbol, self.config.default_days, now).await {
                Ok(report) => reports.push(report),
                Err(e) if e.is_alert() => {
                    error!(alert = true, symbol = %symbol, "Backtest failed: {}", e);
                }
                Err(e) => warn!(symbol = %symbol, "Backtest failed: {}", e),
            }
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use cryptopulse_core::{Candle, MarketDataProvider, ProviderError, RiskConfig, Ticker};
    use cryptopulse_data::Database;
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    /// Serves a fixed number of flat candles, whatever the limit.
    struct FlatHistory {
        candles: usize,
    }

    #[async_trait]
    impl MarketDataProvider for FlatHistory {
        fn id(&self) -> &str {
            "flat"
        }

        fn cache_ttl(&self) -> StdDuration {
            StdDuration::from_secs(600)
        }

        async fn fetch_ticker(&self, _symbol: &str) -> Result<Ticker, ProviderError> {
            Err(ProviderError::Network("ticker not served".to_string()))
        }

        async fn fetch_candles(
            &self,
            _symbol: &str,
            interval: Interval,
            limit: usize,
        ) -> Result<Vec<Candle>, ProviderError> {
            let start = Utc::now() - Duration::days(30);
            Ok((0..limit.min(self.candles))
                .map(|i| {
                    let close = if i % 2 == 0 { 100.0 } else { 100.4 };
                    Candle {
                        timestamp: start
                            + Duration::minutes(interval.minutes() * i64::try_from(i).unwrap()),
                        open: close,
                        high: close,
                        low: close,
                        close,
                        volume: 100.0,
                    }
                })
                .collect())
        }
    }

    async fn service(candles: usize) -> (BacktestService, Repositories) {
        let db = Database::in_memory().await.unwrap();
        let repos = db.repositories();
        let market = MarketDataAggregator::new(
            vec![Arc::new(FlatHistory { candles }) as Arc<dyn MarketDataProvider>],
            repos.cache.clone(),
            repos.api_calls.clone(),
        );
        let risk = RiskAllocationController::new(&repos, RiskConfig::default());
        let service =
            BacktestService::from_config(&AppConfig::default(), &repos, market, risk).unwrap();
        (service, repos)
    }

    // ============================================
    // Sizing
    // ============================================

    #[tokio::test]
    async fn test_candles_for_days() {
        let (service, _) = service(0).await;
        assert_eq!(service.candles_for(30), 720);
        assert_eq!(service.candles_for(0), 24);
        assert_eq!(service.candles_for(365), 90 * 24);
    }

    // ============================================
    // Runs
    // ============================================

    #[tokio::test]
    async fn test_run_persists_and_refreshes_risk() {
        let (service, repos) = service(200).await;
        let now = Utc::now();

        let report = service.run("BTCUSDT", 30, now).await.unwrap();
        assert_eq!(report.run.signals_tested, 0);
        assert_eq!(report.run.tested_days, 30);
        assert!(report.trades.is_empty());

        let stored = repos.backtests.latest_for_symbol("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(stored.id, report.run_id);
        assert_eq!(stored.run.symbol, "BTCUSDT");

        // Too few signals to trust the backtest: the default win rate applies
        let risk = report.risk.unwrap();
        assert_eq!(risk.symbol, "BTCUSDT");
        assert!(repos.risk.get("BTCUSDT").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_short_history_is_insufficient() {
        let (service, repos) = service(40).await;

        let err = service.run("BTCUSDT", 30, Utc::now()).await.unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientHistory { have: 40, .. }));
        assert!(repos.backtests.latest_for_symbol("BTCUSDT").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_all_skips_failures() {
        let (service, _) = service(40).await;

        let reports = service
            .run_all(&["BTCUSDT".to_string(), "ETHUSDT".to_string()], Utc::now())
            .await;
        assert!(reports.is_empty());
    }
}
