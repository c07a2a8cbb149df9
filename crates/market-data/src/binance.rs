//! Binance spot REST provider.
//!
//! Used for both the primary `api.binance.com` host and its gateway mirror;
//! the two differ only in base URL and id.

use crate::http::{parse_number, JsonSource};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use cryptopulse_core::{Candle, Interval, MarketDataProvider, ProviderError, Ticker};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Binance caps klines per request at 1000.
const MAX_KLINES_PER_REQUEST: usize = 1000;

/// Binance spot market data client.
pub struct BinanceProvider {
    id: String,
    source: JsonSource,
    cache_ttl: Duration,
    history_timeout: Duration,
}

/// `GET /api/v3/ticker/24hr` response (fields we use).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    last_price: String,
    price_change_percent: String,
    quote_volume: String,
    high_price: String,
    low_price: String,
}

impl Ticker24h {
    fn into_ticker(self) -> Result<Ticker, ProviderError> {
        let field = |name: &str, raw: &str| {
            raw.parse::<f64>()
                .map_err(|_| ProviderError::Malformed(format!("{name}: {raw}")))
        };

        let ticker = Ticker {
            price: field("lastPrice", &self.last_price)?,
            change_24h_pct: field("priceChangePercent", &self.price_change_percent)?,
            volume_24h: field("quoteVolume", &self.quote_volume)?,
            high_24h: field("highPrice", &self.high_price)?,
            low_24h: field("lowPrice", &self.low_price)?,
        };

        if ticker.price <= 0.0 {
            return Err(ProviderError::Malformed(format!(
                "non-positive price {}",
                ticker.price
            )));
        }
        Ok(ticker)
    }
}

impl BinanceProvider {
    /// Creates a provider against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        id: impl Into<String>,
        base_url: impl Into<String>,
        requests_per_second: u32,
        request_timeout: Duration,
        history_timeout: Duration,
        cache_ttl: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            id: id.into(),
            source: JsonSource::new(base_url, requests_per_second, request_timeout)?,
            cache_ttl,
            history_timeout,
        })
    }

    /// Provider with default limits, for tests and ad-hoc use.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new(
            "binance",
            base_url,
            10,
            Duration::from_secs(10),
            Duration::from_secs(30),
            Duration::from_secs(600),
        )
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        self.source.base_url()
    }
}

#[async_trait]
impl MarketDataProvider for BinanceProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ProviderError> {
        let raw: Ticker24h = self
            .source
            .get_json(
                "/api/v3/ticker/24hr",
                &[("symbol", symbol.to_uppercase())],
                None,
            )
            .await?;
        raw.into_ticker()
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        let symbol = symbol.to_uppercase();
        let mut candles: Vec<Candle> = Vec::with_capacity(limit);
        let mut end_time: Option<i64> = None;
        let now_ms = Utc::now().timestamp_millis();

        // Page backwards from now until `limit` closed candles are collected.
        while candles.len() < limit {
            let batch = (limit - candles.len()).min(MAX_KLINES_PER_REQUEST);
            let mut query = vec![
                ("symbol", symbol.clone()),
                ("interval", interval.as_str().to_string()),
                ("limit", batch.to_string()),
            ];
            if let Some(end) = end_time {
                query.push(("endTime", end.to_string()));
            }

            let rows: Vec<Vec<serde_json::Value>> = self
                .source
                .get_json("/api/v3/klines", &query, Some(self.history_timeout))
                .await?;

            if rows.is_empty() {
                break;
            }

            let mut page = Vec::with_capacity(rows.len());
            for row in &rows {
                let candle = parse_kline(row)?;
                if is_forming(row, now_ms) {
                    debug!(symbol = %symbol, "Skipping forming kline at {}", candle.timestamp);
                    continue;
                }
                page.push(candle);
            }
            let received = rows.len();

            end_time = rows
                .first()
                .and_then(|row| row.first())
                .and_then(serde_json::Value::as_i64)
                .map(|open_time| open_time - 1);
            page.append(&mut candles);
            candles = page;

            if received < batch {
                break;
            }
        }

        Ok(candles)
    }
}

/// The newest kline Binance returns is still trading until its close time.
fn is_forming(row: &[serde_json::Value], now_ms: i64) -> bool {
    row.get(6)
        .and_then(serde_json::Value::as_i64)
        .is_some_and(|close_time| close_time >= now_ms)
}

fn parse_kline(row: &[serde_json::Value]) -> Result<Candle, ProviderError> {
    if row.len() < 6 {
        return Err(ProviderError::Malformed(format!(
            "kline has {} fields",
            row.len()
        )));
    }

    let open_time = row[0]
        .as_i64()
        .ok_or_else(|| ProviderError::Malformed("kline open time".to_string()))?;
    let timestamp = Utc
        .timestamp_millis_opt(open_time)
        .single()
        .ok_or_else(|| ProviderError::Malformed(format!("kline timestamp {open_time}")))?;

    let num = |idx: usize| {
        parse_number(&row[idx])
            .ok_or_else(|| ProviderError::Malformed(format!("kline field {idx}")))
    };

    Ok(Candle {
        timestamp,
        open: num(1)?,
        high: num(2)?,
        low: num(3)?,
        close: num(4)?,
        volume: num(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn kline(open_time: i64, close: &str) -> serde_json::Value {
        json!([open_time, "100.0", "105.0", "95.0", close, "12.5", open_time + 3_599_999, "1250.0", 10, "6.0", "600.0", "0"])
    }

    #[tokio::test]
    async fn test_fetch_ticker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/ticker/24hr"))
            .and(query_param("symbol", "BTCUSDT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "symbol": "BTCUSDT",
                "lastPrice": "65000.50",
                "priceChangePercent": "-1.25",
                "quoteVolume": "1200000000.0",
                "highPrice": "66000.00",
                "lowPrice": "64000.00",
                "volume": "18000.0"
            })))
            .mount(&server)
            .await;

        let provider = BinanceProvider::with_base_url(server.uri()).unwrap();
        let ticker = provider.fetch_ticker("btcusdt").await.unwrap();

        assert_eq!(ticker.price, 65000.50);
        assert_eq!(ticker.change_24h_pct, -1.25);
        assert_eq!(ticker.high_24h, 66000.0);
        assert_eq!(ticker.low_24h, 64000.0);
    }

    #[tokio::test]
    async fn test_fetch_ticker_rejects_bad_price() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/ticker/24hr"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "lastPrice": "not-a-number",
                "priceChangePercent": "0",
                "quoteVolume": "0",
                "highPrice": "0",
                "lowPrice": "0"
            })))
            .mount(&server)
            .await;

        let provider = BinanceProvider::with_base_url(server.uri()).unwrap();
        let err = provider.fetch_ticker("BTCUSDT").await.unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_fetch_candles_single_page() {
        let server = MockServer::start().await;
        let start = 1_700_000_000_000_i64;
        let rows: Vec<_> = (0..3)
            .map(|i| kline(start + i * 3_600_000, &format!("{}", 100 + i)))
            .collect();

        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .and(query_param("interval", "1h"))
            .and(query_param("limit", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(rows)))
            .mount(&server)
            .await;

        let provider = BinanceProvider::with_base_url(server.uri()).unwrap();
        let candles = provider
            .fetch_candles("BTCUSDT", Interval::H1, 3)
            .await
            .unwrap();

        assert_eq!(candles.len(), 3);
        assert_eq!(candles[0].timestamp.timestamp_millis(), start);
        assert_eq!(candles[2].close, 102.0);
        assert_eq!(candles[0].volume, 12.5);
    }

    #[tokio::test]
    async fn test_forming_kline_is_dropped_and_backfilled() {
        let server = MockServer::start().await;
        let hour = 3_600_000_i64;
        let now = Utc::now().timestamp_millis();
        let current = now - now % hour;

        // Newest row is the hour still trading: its close time is in the future.
        let latest = vec![
            kline(current - 2 * hour, "101"),
            kline(current - hour, "102"),
            kline(current, "103"),
        ];
        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .and(query_param("limit", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(latest)))
            .expect(1)
            .mount(&server)
            .await;

        let older = vec![kline(current - 3 * hour, "100")];
        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .and(query_param("limit", "1"))
            .and(query_param("endTime", (current - 2 * hour - 1).to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(older)))
            .expect(1)
            .mount(&server)
            .await;

        let provider = BinanceProvider::with_base_url(server.uri()).unwrap();
        let candles = provider
            .fetch_candles("BTCUSDT", Interval::H1, 3)
            .await
            .unwrap();

        assert_eq!(candles.len(), 3);
        assert_eq!(candles[0].timestamp.timestamp_millis(), current - 3 * hour);
        assert_eq!(candles[2].timestamp.timestamp_millis(), current - hour);
        assert_eq!(candles[2].close, 102.0);
    }

    #[test]
    fn test_is_forming_reads_close_time() {
        let row = kline(1_700_000_000_000, "100");
        let row = row.as_array().unwrap();
        assert!(!is_forming(row, 1_700_003_600_000));
        assert!(is_forming(row, 1_700_003_599_999));
        assert!(is_forming(row, 1_700_000_000_001));
    }

    #[tokio::test]
    async fn test_fetch_candles_stops_on_short_page() {
        let server = MockServer::start().await;
        let rows = vec![kline(1_700_000_000_000, "101")];

        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(rows)))
            .expect(1)
            .mount(&server)
            .await;

        let provider = BinanceProvider::with_base_url(server.uri()).unwrap();
        let candles = provider
            .fetch_candles("BTCUSDT", Interval::H1, 50)
            .await
            .unwrap();

        assert_eq!(candles.len(), 1);
    }

    #[test]
    fn test_parse_kline_rejects_short_rows() {
        let row = vec![json!(1), json!("1")];
        assert!(parse_kline(&row).is_err());
    }
}
