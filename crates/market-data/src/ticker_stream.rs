//! Live 24h ticker stream from Binance.
//!
//! Subscribes to the combined `<symbol>@ticker` streams and writes every
//! update into the cache under the same key the aggregator serves from, so
//! a rate-limited REST chain can still answer from fresh stream data.
//!
//! # Reconnection
//!
//! ```text
//! Connecting ──ok──▶ Streaming ──error──▶ Backoff(base × 2^attempt, capped)
//!     ▲                                       │
//!     └───────────────────────────────────────┘
//!                         attempts exhausted ──▶ GaveUp (terminal, alert)
//! ```
//!
//! The attempt counter belongs to the stream object and is reset once a
//! connection has delivered data.

use crate::aggregator::ticker_cache_key;
use chrono::{DateTime, Utc};
use cryptopulse_core::{MarketSnapshot, StreamConfig, Ticker};
use cryptopulse_data::CacheRepository;
use futures_util::StreamExt;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Provider id stamped on snapshots from the stream.
pub const STREAM_PROVIDER: &str = "binance-stream";

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Connection closed: {0}")]
    Closed(String),

    #[error("No symbols to subscribe")]
    NoSymbols,

    /// Terminal: reconnect attempts exhausted
    #[error("Gave up after {0} reconnect attempts")]
    GaveUp(u32),
}

/// Where the stream is in its connect/backoff cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Connecting { attempt: u32 },
    Streaming,
    Backoff { attempt: u32, delay_ms: u64 },
    GaveUp { attempts: u32 },
    Stopped,
}

/// Bounded exponential backoff.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max,
            max_attempts,
            attempt: 0,
        }
    }

    /// Delay before the next reconnect, or `None` once attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(self.attempt);
        self.attempt += 1;
        Some(self.base.saturating_mul(factor).min(self.max))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

/// `<symbol>@ticker` payload (fields we use).
#[derive(Debug, Deserialize)]
struct TickerEvent {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "E")]
    event_time: i64,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "c")]
    last_price: String,
    #[serde(rename = "P")]
    change_pct: String,
    #[serde(rename = "q")]
    quote_volume: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
}

/// Combined-stream envelope.
#[derive(Debug, Deserialize)]
struct Envelope {
    data: TickerEvent,
}

impl TickerEvent {
    fn into_snapshot(self) -> Option<MarketSnapshot> {
        if self.event_type != "24hrTicker" {
            return None;
        }
        let ticker = Ticker {
            price: self.last_price.parse().ok()?,
            change_24h_pct: self.change_pct.parse().ok()?,
            volume_24h: self.quote_volume.parse().ok()?,
            high_24h: self.high.parse().ok()?,
            low_24h: self.low.parse().ok()?,
        };
        if ticker.price <= 0.0 {
            return None;
        }
        let fetched_at = DateTime::from_timestamp_millis(self.event_time).unwrap_or_else(Utc::now);
        Some(MarketSnapshot::from_ticker(
            self.symbol,
            ticker,
            STREAM_PROVIDER,
            fetched_at,
        ))
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    pub messages_received: u64,
    pub snapshots_written: u64,
    pub parse_errors: u64,
    pub reconnects: u32,
    pub last_update: Option<DateTime<Utc>>,
}

/// Binance combined ticker stream writing into the cache.
pub struct TickerStream {
    config: StreamConfig,
    symbols: Vec<String>,
    cache: CacheRepository,
    backoff: Backoff,
    state: StreamState,
    stats: StreamStats,
    updates: Option<mpsc::Sender<MarketSnapshot>>,
    should_stop: Arc<AtomicBool>,
}

impl TickerStream {
    #[must_use]
    pub fn new(config: StreamConfig, symbols: Vec<String>, cache: CacheRepository) -> Self {
        let backoff = Backoff::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.max_reconnect_attempts,
        );
        Self {
            config,
            symbols,
            cache,
            backoff,
            state: StreamState::Idle,
            stats: StreamStats::default(),
            updates: None,
            should_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Also forwards each snapshot to `sender`.
    #[must_use]
    pub fn with_updates(mut self, sender: mpsc::Sender<MarketSnapshot>) -> Self {
        self.updates = Some(sender);
        self
    }

    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.should_stop.clone()
    }

    #[must_use]
    pub fn state(&self) -> StreamState {
        self.state
    }

    #[must_use]
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    fn build_url(&self) -> String {
        let streams: Vec<String> = self
            .symbols
            .iter()
            .map(|s| format!("{}@ticker", s.to_lowercase()))
            .collect();
        format!(
            "{}/stream?streams={}",
            self.config.url.trim_end_matches('/'),
            streams.join("/")
        )
    }

    /// Streams until stopped or until reconnect attempts are exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::GaveUp`] in the terminal state.
    pub async fn run(&mut self) -> Result<(), StreamError> {
        if self.symbols.is_empty() {
            return Err(StreamError::NoSymbols);
        }

        loop {
            if self.should_stop.load(Ordering::SeqCst) {
                info!("Ticker stream stopping on request");
                self.state = StreamState::Stopped;
                return Ok(());
            }

            self.state = StreamState::Connecting {
                attempt: self.backoff.attempts(),
            };
            let received_before = self.stats.messages_received;

            match self.connect_and_stream().await {
                Ok(()) => {
                    self.state = StreamState::Stopped;
                    return Ok(());
                }
                Err(e) => {
                    if self.stats.messages_received > received_before {
                        self.backoff.reset();
                    }

                    match self.backoff.next_delay() {
                        Some(delay) => {
                            self.stats.reconnects += 1;
                            self.state = StreamState::Backoff {
                                attempt: self.backoff.attempts(),
                                delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            };
                            warn!(
                                "Ticker stream error: {}; reconnecting in {:?} (attempt {}/{})",
                                e,
                                delay,
                                self.backoff.attempts(),
                                self.config.max_reconnect_attempts
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            let attempts = self.backoff.attempts();
                            self.state = StreamState::GaveUp { attempts };
                            error!(
                                alert = true,
                                symbols = ?self.symbols,
                                "Ticker stream gave up after {} attempts: {}",
                                attempts,
                                e
                            );
                            return Err(StreamError::GaveUp(attempts));
                        }
                    }
                }
            }
        }
    }

    async fn connect_and_stream(&mut self) -> Result<(), StreamError> {
        let url = self.build_url();
        info!("Connecting to ticker stream: {}", url);

        let (ws_stream, _) = tokio_tungstenite::connect_async(&url).await?;
        self.state = StreamState::Streaming;
        info!("Ticker stream connected for {} symbols", self.symbols.len());

        let (_, mut read) = ws_stream.split();

        while let Some(msg) = read.next().await {
            if self.should_stop.load(Ordering::SeqCst) {
                return Ok(());
            }

            match msg {
                Ok(Message::Text(text)) => self.handle_message(&text).await,
                Ok(Message::Close(frame)) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    return Err(StreamError::Closed(reason));
                }
                Err(e) => return Err(StreamError::WebSocket(e)),
                _ => {}
            }
        }

        Err(StreamError::Closed("stream ended".to_string()))
    }

    async fn handle_message(&mut self, text: &str) {
        self.stats.messages_received += 1;

        let snapshot = match serde_json::from_str::<Envelope>(text) {
            Ok(envelope) => envelope.data.into_snapshot(),
            Err(e) => {
                self.stats.parse_errors += 1;
                if self.stats.parse_errors <= 5 {
                    warn!("Failed to parse ticker message: {}", e);
                }
                return;
            }
        };
        let Some(snapshot) = snapshot else {
            return;
        };

        let ttl = chrono::Duration::seconds(
            i64::try_from(self.config.cache_ttl_secs).unwrap_or(i64::MAX / 1000),
        );
        let key = ticker_cache_key(&snapshot.symbol);
        match self
            .cache
            .put(&key, STREAM_PROVIDER, &snapshot, snapshot.fetched_at, ttl)
            .await
        {
            Ok(()) => self.stats.snapshots_written += 1,
            Err(e) => warn!("Failed to cache stream ticker {}: {:#}", key, e),
        }

        self.stats.last_update = Some(snapshot.fetched_at);
        debug!(symbol = %snapshot.symbol, price = snapshot.price, "Stream ticker");

        if let Some(sender) = &self.updates {
            if sender.try_send(snapshot).is_err() {
                debug!("Ticker update channel full or closed");
            }
        }
    }
}
