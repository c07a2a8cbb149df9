//! End-to-end flow: synthesis, persistence, evaluation, learning and risk.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use cryptopulse_core::{
    AdvisoryError, AdvisoryProvider, AdvisoryRequest, AppConfig, Candle, Interval,
    MarketDataProvider, OutcomeResult, ProviderError, RiskStatus, SignalSource, SignalStatus,
    SignalType, Ticker, WinrateSource,
};
use cryptopulse_data::Database;
use cryptopulse_market_data::MarketDataAggregator;
use cryptopulse_pipeline::{CycleOutcome, PipelineServices};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

/// Flat market whose live price can be moved by the test.
struct MovableMarket {
    price: Mutex<f64>,
}

impl MovableMarket {
    fn set_price(&self, price: f64) {
        *self.price.lock().unwrap() = price;
    }
}

#[async_trait]
impl MarketDataProvider for MovableMarket {
    fn id(&self) -> &str {
        "movable"
    }

    fn cache_ttl(&self) -> StdDuration {
        StdDuration::from_secs(600)
    }

    async fn fetch_ticker(&self, _symbol: &str) -> Result<Ticker, ProviderError> {
        let price = *self.price.lock().unwrap();
        Ok(Ticker {
            price,
            change_24h_pct: 0.0,
            volume_24h: 5_000.0,
            high_24h: price * 1.01,
            low_24h: price * 0.99,
        })
    }

    async fn fetch_candles(
        &self,
        _symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        let start = Utc::now() - Duration::days(30);
        Ok((0..limit.min(80))
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

struct BullishAdvisor;

#[async_trait]
impl AdvisoryProvider for BullishAdvisor {
    async fn advise(&self, _request: &AdvisoryRequest) -> Result<String, AdvisoryError> {
        Ok(r#"Analysis follows.
```json
{"signal_type": "BUY", "confidence": 80, "reasoning": "accumulation"}
```"#
            .to_string())
    }
}

#[tokio::test]
async fn test_signal_flows_from_synthesis_to_risk() {
    let db = Database::in_memory().await.unwrap();
    let repos = db.repositories();
    let config = AppConfig::default();

    let provider = Arc::new(MovableMarket {
        price: Mutex::new(100.0),
    });
    let market = MarketDataAggregator::new(
        vec![provider.clone() as Arc<dyn MarketDataProvider>],
        repos.cache.clone(),
        repos.api_calls.clone(),
    );
    let mut services = PipelineServices::with_market(&config, &repos, market).unwrap();
    services.cycle = services.cycle.clone().with_advisory(Arc::new(BullishAdvisor));

    // Synthesis: flat indicators, advisory BUY at 80 with derived targets
    let created = Utc::now();
    let reports = services
        .cycle
        .run(&["BTCUSDT".to_string()], created)
        .await
        .unwrap();
    let Ok(CycleOutcome::Persisted(signal)) = &reports[0].result else {
        panic!("expected a persisted signal: {:?}", reports[0].result);
    };
    assert_eq!(signal.signal_type, SignalType::Buy);
    assert_eq!(signal.source, SignalSource::Advisory);
    assert!((signal.take_profit - 102.0).abs() < 1e-9);
    assert!((signal.stop_loss - 99.0).abs() < 1e-9);

    // Too young to evaluate
    let early = services.evaluation.run(created).await.unwrap();
    assert_eq!(early.checked, 0);

    // Price runs through the take-profit
    provider.set_price(103.0);
    let later = created + Duration::hours(2);
    let summary = services.evaluation.run(later).await.unwrap();
    assert_eq!(summary.wins, 1);

    let stored = repos.signals.get(signal.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SignalStatus::Completed);

    // Evaluating again changes nothing
    let again = services.evaluation.run(later).await.unwrap();
    assert_eq!(again.checked, 0);
    assert_eq!(repos.outcomes.count().await.unwrap(), 1);

    // Learning aggregates
    let reputation = repos.reputation.get("BTCUSDT").await.unwrap().unwrap();
    assert_eq!(reputation.win_count, 1);
    assert_eq!(reputation.reputation_score, 100.0);
    let pattern = repos
        .patterns
        .get(&signal.pattern_name)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pattern.occurrence_count, 1);

    let report = services.learning.performance_report(30, later).await.unwrap();
    assert_eq!(report.overall.wins, 1);
    assert_eq!(report.by_symbol["BTCUSDT"].total, 1);

    // One outcome is not enough evidence: default win rate
    let risk = services.risk.recompute("BTCUSDT", later).await.unwrap();
    assert_eq!(risk.winrate_source, WinrateSource::Default);
    assert_eq!(risk.risk_status, RiskStatus::Conservative);

    let outcome = &repos.outcomes.recent_for_symbol("BTCUSDT", 1).await.unwrap()[0];
    assert_eq!(outcome.result, OutcomeResult::Win);
    assert!(!outcome.manual);
}
