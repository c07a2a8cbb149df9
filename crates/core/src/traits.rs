use crate::error::{AdvisoryError, ProviderError};
use crate::indicator::IndicatorSet;
use crate::learning::ReputationRecord;
use crate::market::{Candle, Interval, MarketSnapshot, Sentiment, Ticker};
use crate::risk::RiskStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A live source of tickers and candles.
///
/// Implementations own their HTTP client and rate limiter. The aggregator calls
/// providers in configured order and moves on at the first error.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Stable identifier recorded in snapshots and call logs.
    fn id(&self) -> &str;

    /// How long a successful response may be served from cache.
    fn cache_ttl(&self) -> Duration;

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ProviderError>;

    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError>;
}

/// Source of news sentiment for a symbol.
#[async_trait]
pub trait NewsProvider: Send + Sync {
    fn id(&self) -> &str;

    async fn fetch_sentiment(&self, symbol: &str) -> Result<Sentiment, ProviderError>;
}

/// Payload sent to the advisory service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryRequest {
    pub snapshot: MarketSnapshot,
    pub indicators: IndicatorSet,
    pub reputation: ReputationRecord,
    pub sentiment: Sentiment,
    /// Current risk posture, when known
    pub risk_profile: Option<RiskStatus>,
}

/// External opinion service. Returns the raw response body; validation
/// happens in the synthesizer, never in the transport.
#[async_trait]
pub trait AdvisoryProvider: Send + Sync {
    async fn advise(&self, request: &AdvisoryRequest) -> Result<String, AdvisoryError>;
}
