//! CoinGecko fallback provider.
//!
//! CoinGecko has no klines endpoint for free use, so candles are resampled
//! from `market_chart` price points into the requested interval, each point
//! spanning a ±0.5% band. Its simple price endpoint carries no 24h high/low;
//! snapshots from it report a zero range.

use crate::http::{parse_number, JsonSource};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use cryptopulse_core::{Candle, Interval, MarketDataProvider, ProviderError, Ticker};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Half-width of the synthetic high/low band around a price point.
const POINT_BAND: f64 = 0.005;

/// CoinGecko REST client.
pub struct CoinGeckoProvider {
    id: String,
    source: JsonSource,
    /// Trading symbol (e.g. `BTCUSDT`) to CoinGecko coin id
    coin_ids: HashMap<String, String>,
    cache_ttl: Duration,
    history_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct SimplePrice {
    usd: f64,
    #[serde(default)]
    usd_24h_change: Option<f64>,
    #[serde(default)]
    usd_24h_vol: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MarketChart {
    prices: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    total_volumes: Vec<Vec<serde_json::Value>>,
}

impl CoinGeckoProvider {
    /// Creates a provider against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        id: impl Into<String>,
        base_url: impl Into<String>,
        coin_ids: HashMap<String, String>,
        requests_per_second: u32,
        request_timeout: Duration,
        history_timeout: Duration,
        cache_ttl: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            id: id.into(),
            source: JsonSource::new(base_url, requests_per_second, request_timeout)?,
            coin_ids: coin_ids
                .into_iter()
                .map(|(symbol, coin)| (symbol.to_uppercase(), coin))
                .collect(),
            cache_ttl,
            history_timeout,
        })
    }

    /// Provider with default limits, for tests and ad-hoc use.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_base_url(
        base_url: impl Into<String>,
        coin_ids: HashMap<String, String>,
    ) -> Result<Self, ProviderError> {
        Self::new(
            "coingecko",
            base_url,
            coin_ids,
            5,
            Duration::from_secs(10),
            Duration::from_secs(30),
            Duration::from_secs(900),
        )
    }

    fn coin_id(&self, symbol: &str) -> Result<&str, ProviderError> {
        self.coin_ids
            .get(&symbol.to_uppercase())
            .map(String::as_str)
            .ok_or_else(|| ProviderError::UnsupportedSymbol(symbol.to_string()))
    }
}

#[async_trait]
impl MarketDataProvider for CoinGeckoProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ProviderError> {
        let coin = self.coin_id(symbol)?;

        let mut prices: HashMap<String, SimplePrice> = self
            .source
            .get_json(
                "/simple/price",
                &[
                    ("ids", coin.to_string()),
                    ("vs_currencies", "usd".to_string()),
                    ("include_24hr_change", "true".to_string()),
                    ("include_24hr_vol", "true".to_string()),
                ],
                None,
            )
            .await?;

        let quote = prices
            .remove(coin)
            .ok_or_else(|| ProviderError::Malformed(format!("no price for {coin}")))?;
        if quote.usd <= 0.0 {
            return Err(ProviderError::Malformed(format!(
                "non-positive price {}",
                quote.usd
            )));
        }

        Ok(Ticker {
            price: quote.usd,
            change_24h_pct: quote.usd_24h_change.unwrap_or(0.0),
            volume_24h: quote.usd_24h_vol.unwrap_or(0.0),
            high_24h: quote.usd,
            low_24h: quote.usd,
        })
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        let coin = self.coin_id(symbol)?;
        let days = chart_days(interval, limit);

        let chart: MarketChart = self
            .source
            .get_json(
                &format!("/coins/{coin}/market_chart"),
                &[
                    ("vs_currency", "usd".to_string()),
                    ("days", days.to_string()),
                ],
                Some(self.history_timeout),
            )
            .await?;

        let mut candles = resample(&chart, interval)?;
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        Ok(candles)
    }
}

/// Days of history needed to cover `limit` candles (at least one).
fn chart_days(interval: Interval, limit: usize) -> i64 {
    let minutes = interval.minutes() * limit as i64;
    ((minutes + 1439) / 1440).max(1)
}

/// Buckets chart points into OHLC candles of `interval`.
///
/// Volume is CoinGecko's rolling 24h figure at the bucket's last point.
fn resample(chart: &MarketChart, interval: Interval) -> Result<Vec<Candle>, ProviderError> {
    let volumes: BTreeMap<i64, f64> = chart
        .total_volumes
        .iter()
        .filter_map(|point| Some((point.first()?.as_i64()?, parse_number(point.get(1)?)?)))
        .collect();

    let bucket_ms = interval.duration_ms();
    let mut buckets: BTreeMap<i64, Candle> = BTreeMap::new();

    for point in &chart.prices {
        let (ts, price) = match (
            point.first().and_then(serde_json::Value::as_i64),
            point.get(1).and_then(parse_number),
        ) {
            (Some(ts), Some(price)) => (ts, price),
            _ => return Err(ProviderError::Malformed("market_chart point".to_string())),
        };

        let bucket = ts - ts.rem_euclid(bucket_ms);
        let volume = volumes
            .range(..=ts)
            .next_back()
            .map_or(0.0, |(_, v)| *v);

        match buckets.get_mut(&bucket) {
            Some(candle) => {
                candle.high = candle.high.max(price * (1.0 + POINT_BAND));
                candle.low = candle.low.min(price * (1.0 - POINT_BAND));
                candle.close = price;
                candle.volume = volume;
            }
            None => {
                let timestamp = Utc
                    .timestamp_millis_opt(bucket)
                    .single()
                    .ok_or_else(|| ProviderError::Malformed(format!("timestamp {bucket}")))?;
                buckets.insert(
                    bucket,
                    Candle {
                        timestamp,
                        open: price,
                        high: price * (1.0 + POINT_BAND),
                        low: price * (1.0 - POINT_BAND),
                        close: price,
                        volume,
                    },
                );
            }
        }
    }

    Ok(buckets.into_values().collect())
}
