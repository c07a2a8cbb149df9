//! The offline backtest path behind `cryptopulse backtest --csv`.

use chrono::{Duration, TimeZone, Utc};
use cryptopulse_backtest::{BacktestService, HistoricalDataProvider};
use cryptopulse_core::{AppConfig, Interval};
use cryptopulse_data::Database;
use cryptopulse_market_data::MarketDataAggregator;
use cryptopulse_pipeline::RiskAllocationController;
use std::fmt::Write as _;

/// Hourly candles oscillating around 100 with a slow downtrend.
fn csv_history(n: usize) -> String {
    let start = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
    let mut out = String::from("timestamp,open,high,low,close,volume\n");
    let mut close = 100.0_f64;
    for i in 0..n {
        let open = close;
        #[allow(clippy::cast_precision_loss)]
        let x = i as f64;
        close = 100.0 - x * 0.05 + (x / 3.0).sin() * 2.0;
        let ts = start + Duration::hours(i64::try_from(i).unwrap());
        writeln!(
            out,
            "{},{:.4},{:.4},{:.4},{:.4},{:.1}",
            ts.to_rfc3339(),
            open,
            open.max(close) * 1.002,
            open.min(close) * 0.998,
            close,
            100.0 + x
        )
        .unwrap();
    }
    out
}

#[tokio::test]
async fn test_csv_backtest_is_stored_and_refreshes_risk() {
    let config = AppConfig::default();
    let db = Database::in_memory().await.unwrap();
    let repos = db.repositories();
    let market = MarketDataAggregator::new(vec![], repos.cache.clone(), repos.api_calls.clone());
    let risk = RiskAllocationController::new(&repos, config.risk.clone());
    let service = BacktestService::from_config(&config, &repos, market, risk).unwrap();

    let csv = csv_history(240);
    let series =
        HistoricalDataProvider::from_reader(csv.as_bytes(), "SOLUSDT", Interval::H1).unwrap();
    assert_eq!(series.len(), 240);

    let report = service.run_series(&series, 10, Utc::now()).await.unwrap();
    assert_eq!(report.run.symbol, "SOLUSDT");
    assert_eq!(report.run.tested_days, 10);
    assert_eq!(report.run.signals_tested, i64::try_from(report.trades.len()).unwrap());
    assert_eq!(
        report.run.signals_tested,
        report.run.signals_win + report.run.signals_loss + report.run.signals_neutral
    );
    assert_eq!(report.run.start_date, series.candles[0].timestamp);
    assert!(report.risk.is_some());

    let stored = repos.backtests.list_for_symbol("SOLUSDT", 10).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, report.run_id);
    assert!(report.run.max_drawdown_pct >= 0.0);
    assert_eq!(stored[0].run.max_drawdown_pct, report.run.max_drawdown_pct);
}

#[tokio::test]
async fn test_short_csv_is_rejected() {
    let config = AppConfig::default();
    let db = Database::in_memory().await.unwrap();
    let repos = db.repositories();
    let market = MarketDataAggregator::new(vec![], repos.cache.clone(), repos.api_calls.clone());
    let risk = RiskAllocationController::new(&repos, config.risk.clone());
    let service = BacktestService::from_config(&config, &repos, market, risk).unwrap();

    let series =
        HistoricalDataProvider::from_reader(csv_history(20).as_bytes(), "SOLUSDT", Interval::H1)
            .unwrap();
    assert!(service.run_series(&series, 1, Utc::now()).await.is_err());
    assert!(repos
        .backtests
        .list_for_symbol("SOLUSDT", 10)
        .await
        .unwrap()
        .is_empty());
}
