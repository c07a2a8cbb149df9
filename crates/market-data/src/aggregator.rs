//! Ordered-fallback market data aggregation.
//!
//! Live providers are tried in configured order. The first success is cached
//! with that provider's TTL; when every provider fails, the freshest
//! non-expired cache entry is served instead. Every provider attempt is
//! appended to the `api_calls` log.

use crate::binance::BinanceProvider;
use crate::coingecko::CoinGeckoProvider;
use crate::news::CryptoPanicProvider;
use anyhow::Result;
use chrono::{DateTime, Utc};
use cryptopulse_core::{
    Candle, CandleSeries, Interval, MarketDataConfig, MarketDataProvider, MarketSnapshot,
    NewsProvider, PipelineError, ProviderError, ProviderKind, Sentiment,
};
use cryptopulse_data::{
    ApiCallLog, ApiCallRepository, ApiCallStatus, CacheRepository, Repositories,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const SENTIMENT_PROVIDER: &str = "news";

/// Market data front door used by every pipeline stage.
#[derive(Clone)]
pub struct MarketDataAggregator {
    providers: Vec<Arc<dyn MarketDataProvider>>,
    news: Option<Arc<dyn NewsProvider>>,
    news_ttl: Duration,
    /// Upper bound on any single provider call
    call_timeout: Duration,
    cache: CacheRepository,
    api_calls: ApiCallRepository,
}

impl MarketDataAggregator {
    /// Creates an aggregator over an explicit provider chain.
    #[must_use]
    pub fn new(
        providers: Vec<Arc<dyn MarketDataProvider>>,
        cache: CacheRepository,
        api_calls: ApiCallRepository,
    ) -> Self {
        Self {
            providers,
            news: None,
            news_ttl: Duration::from_secs(900),
            call_timeout: Duration::from_secs(30),
            cache,
            api_calls,
        }
    }

    /// Attaches a news sentiment provider.
    #[must_use]
    pub fn with_news(mut self, provider: Arc<dyn NewsProvider>, ttl: Duration) -> Self {
        self.news = Some(provider);
        self.news_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Builds the configured provider chain and news source.
    ///
    /// # Errors
    ///
    /// Returns an error if a provider's HTTP client cannot be built.
    pub fn from_config(config: &MarketDataConfig, repos: &Repositories) -> Result<Self> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let history_timeout = Duration::from_secs(config.history_timeout_secs);

        let mut providers: Vec<Arc<dyn MarketDataProvider>> = Vec::new();
        for entry in &config.providers {
            let ttl = Duration::from_secs(entry.cache_ttl_secs);
            let provider: Arc<dyn MarketDataProvider> = match entry.kind {
                ProviderKind::Binance => Arc::new(BinanceProvider::new(
                    entry.id.clone(),
                    entry.base_url.clone(),
                    entry.requests_per_second,
                    request_timeout,
                    history_timeout,
                    ttl,
                )?),
                ProviderKind::Coingecko => Arc::new(CoinGeckoProvider::new(
                    entry.id.clone(),
                    entry.base_url.clone(),
                    config.coingecko_ids.clone(),
                    entry.requests_per_second,
                    request_timeout,
                    history_timeout,
                    ttl,
                )?),
            };
            info!("Market data provider {} -> {}", entry.id, entry.base_url);
            providers.push(provider);
        }

        let mut aggregator = Self::new(providers, repos.cache.clone(), repos.api_calls.clone())
            .with_call_timeout(history_timeout.max(request_timeout));

        match (&config.news.api_token, config.news.enabled) {
            (Some(token), true) => {
                let news = CryptoPanicProvider::new(
                    config.news.base_url.clone(),
                    token.clone(),
                    request_timeout,
                )?;
                aggregator = aggregator.with_news(
                    Arc::new(news),
                    Duration::from_secs(config.news.cache_ttl_secs),
                );
            }
            (None, true) => warn!("News sentiment enabled without an API token; using neutral"),
            _ => {}
        }

        Ok(aggregator)
    }

    #[must_use]
    pub fn provider_ids(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.id().to_string()).collect()
    }

    /// Current ticker snapshot for `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoMarketDataAvailable`] when every provider
    /// failed and no fresh cache entry exists.
    pub async fn get_snapshot(&self, symbol: &str) -> Result<MarketSnapshot, PipelineError> {
        let key = ticker_cache_key(symbol);

        for provider in &self.providers {
            let started = Instant::now();
            let result = self
                .bounded(provider.fetch_ticker(symbol))
                .await;
            let latency = elapsed_ms(started);

            match result {
                Ok(ticker) => {
                    self.log_call(ApiCallLog::ok(provider.id(), "ticker", Some(symbol), 1, latency))
                        .await;

                    let now = Utc::now();
                    let snapshot = MarketSnapshot::from_ticker(symbol, ticker, provider.id(), now);
                    self.store(&key, provider.id(), &snapshot, now, provider.cache_ttl())
                        .await;
                    return Ok(snapshot);
                }
                Err(e) => {
                    warn!(symbol = %symbol, provider = provider.id(), "Ticker fetch failed: {}", e);
                    self.log_call(failed_call(provider.id(), "ticker", symbol, &e, latency))
                        .await;
                }
            }
        }

        self.report_exhausted(symbol);

        match self.cache.get_fresh(&key, Utc::now()).await {
            Ok(Some(entry)) => {
                let mut snapshot: MarketSnapshot = entry.decode().map_err(PipelineError::Storage)?;
                info!(
                    symbol = %symbol,
                    "Serving cached ticker from {} ({}s old)",
                    entry.provider,
                    entry.age_secs(Utc::now())
                );
                snapshot.provider = format!("cache:{}", entry.provider);
                Ok(snapshot)
            }
            Ok(None) => Err(PipelineError::NoMarketDataAvailable {
                symbol: symbol.to_string(),
            }),
            Err(e) => {
                warn!(symbol = %symbol, "Cache lookup failed: {:#}", e);
                Err(PipelineError::NoMarketDataAvailable {
                    symbol: symbol.to_string(),
                })
            }
        }
    }

    /// Most recent `count` candles for `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoMarketDataAvailable`] when every provider
    /// failed and no fresh cache entry exists.
    pub async fn get_candles(
        &self,
        symbol: &str,
        interval: Interval,
        count: usize,
    ) -> Result<CandleSeries, PipelineError> {
        let key = candles_cache_key(symbol, interval, count);

        for provider in &self.providers {
            let started = Instant::now();
            let result = self
                .bounded(provider.fetch_candles(symbol, interval, count))
                .await;
            let latency = elapsed_ms(started);

            match result {
                Ok(candles) if candles.is_empty() => {
                    let err = ProviderError::Malformed("empty candle set".to_string());
                    warn!(symbol = %symbol, provider = provider.id(), "Candle fetch failed: {}", err);
                    self.log_call(failed_call(provider.id(), "candles", symbol, &err, latency))
                        .await;
                }
                Ok(candles) => {
                    self.log_call(ApiCallLog::ok(
                        provider.id(),
                        "candles",
                        Some(symbol),
                        candles.len() as i64,
                        latency,
                    ))
                    .await;

                    debug!(
                        symbol = %symbol,
                        "{} returned {} {} candles",
                        provider.id(),
                        candles.len(),
                        interval
                    );
                    self.store(&key, provider.id(), &candles, Utc::now(), provider.cache_ttl())
                        .await;
                    return Ok(CandleSeries::new(symbol, interval, candles));
                }
                Err(e) => {
                    warn!(symbol = %symbol, provider = provider.id(), "Candle fetch failed: {}", e);
                    self.log_call(failed_call(provider.id(), "candles", symbol, &e, latency))
                        .await;
                }
            }
        }

        self.report_exhausted(symbol);

        match self.cache.get_fresh(&key, Utc::now()).await {
            Ok(Some(entry)) => {
                let candles: Vec<Candle> = entry.decode().map_err(PipelineError::Storage)?;
                info!(
                    symbol = %symbol,
                    "Serving {} cached candles from {}",
                    candles.len(),
                    entry.provider
                );
                Ok(CandleSeries::new(symbol, interval, candles))
            }
            Ok(None) => Err(PipelineError::NoMarketDataAvailable {
                symbol: symbol.to_string(),
            }),
            Err(e) => {
                warn!(symbol = %symbol, "Cache lookup failed: {:#}", e);
                Err(PipelineError::NoMarketDataAvailable {
                    symbol: symbol.to_string(),
                })
            }
        }
    }

    /// News sentiment for `symbol`. Never fails: anything unusable is neutral.
    pub async fn get_sentiment(&self, symbol: &str) -> Sentiment {
        let Some(news) = &self.news else {
            return Sentiment::Neutral;
        };
        let key = sentiment_cache_key(symbol);

        if let Ok(Some(entry)) = self.cache.get_fresh(&key, Utc::now()).await {
            if let Ok(sentiment) = entry.decode::<Sentiment>() {
                debug!(symbol = %symbol, "Sentiment from cache: {}", sentiment);
                return sentiment;
            }
        }

        let started = Instant::now();
        let result = self.bounded(news.fetch_sentiment(symbol)).await;
        let latency = elapsed_ms(started);

        match result {
            Ok(sentiment) => {
                self.log_call(ApiCallLog::ok(news.id(), "sentiment", Some(symbol), 1, latency))
                    .await;
                self.store(&key, SENTIMENT_PROVIDER, &sentiment, Utc::now(), self.news_ttl)
                    .await;
                sentiment
            }
            Err(e) => {
                warn!(symbol = %symbol, "News sentiment unavailable: {}", e);
                self.log_call(failed_call(news.id(), "sentiment", symbol, &e, latency))
                    .await;
                Sentiment::Neutral
            }
        }
    }

    async fn bounded<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout),
        }
    }

    fn report_exhausted(&self, symbol: &str) {
        let err = PipelineError::ProviderUnavailable {
            symbol: symbol.to_string(),
            attempts: self.providers.len(),
        };
        warn!(symbol = %symbol, "{}; trying cache", err);
    }

    async fn store<T: serde::Serialize + Sync>(
        &self,
        key: &str,
        provider: &str,
        payload: &T,
        fetched_at: DateTime<Utc>,
        ttl: Duration,
    ) {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(10));
        if let Err(e) = self.cache.put(key, provider, payload, fetched_at, ttl).await {
            warn!("Failed to cache {}: {:#}", key, e);
        }
    }

    /// Deletes expired cache entries and provider calls older than
    /// `api_call_retention`.
    ///
    /// # Errors
    ///
    /// Returns an error if either delete fails.
    pub async fn prune(
        &self,
        now: DateTime<Utc>,
        api_call_retention: chrono::Duration,
    ) -> Result<RetentionReport> {
        let report = RetentionReport {
            cache_entries: self.cache.purge_expired(now).await?,
            api_calls: self.api_calls.prune_before(now - api_call_retention).await?,
        };
        debug!(
            "Pruned {} cache entries and {} API calls",
            report.cache_entries, report.api_calls
        );
        Ok(report)
    }

    async fn log_call(&self, log: ApiCallLog) {
        if let Err(e) = self.api_calls.record(&log, Utc::now()).await {
            warn!("Failed to record API call for {}: {:#}", log.provider, e);
        }
    }
}

/// Rows removed by one [`MarketDataAggregator::prune`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub cache_entries: u64,
    pub api_calls: u64,
}

/// Cache key of the latest ticker snapshot for a symbol.
#[must_use]
pub fn ticker_cache_key(symbol: &str) -> String {
    format!("ticker:{}", symbol.to_uppercase())
}

#[must_use]
pub fn candles_cache_key(symbol: &str, interval: Interval, count: usize) -> String {
    format!("candles:{}:{}:{}", symbol.to_uppercase(), interval, count)
}

#[must_use]
pub fn sentiment_cache_key(symbol: &str) -> String {
    format!("sentiment:{}", symbol.to_uppercase())
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}

fn failed_call(
    provider: &str,
    endpoint: &str,
    symbol: &str,
    err: &ProviderError,
    latency_ms: i64,
) -> ApiCallLog {
    let status = if err.is_timeout() {
        ApiCallStatus::Timeout
    } else {
        ApiCallStatus::Error
    };
    ApiCallLog::failed(
        provider,
        endpoint,
        Some(symbol),
        status,
        err.status_code(),
        err.to_string(),
        latency_ms,
    )
}
