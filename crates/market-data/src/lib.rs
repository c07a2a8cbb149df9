//! Market data for the cryptopulse pipeline.
//!
//! Provides:
//! - REST providers for Binance (primary and gateway mirror) and CoinGecko
//! - CryptoPanic news sentiment
//! - [`MarketDataAggregator`]: ordered fallback, TTL caching, call logging
//! - [`TickerStream`]: live WebSocket tickers written into the cache

pub mod aggregator;
pub mod binance;
pub mod coingecko;
mod http;
pub mod news;
pub mod ticker_stream;

pub use aggregator::{
    candles_cache_key, sentiment_cache_key, ticker_cache_key, MarketDataAggregator,
    RetentionReport,
};
pub use binance::BinanceProvider;
pub use coingecko::CoinGeckoProvider;
pub use news::{base_asset, CryptoPanicProvider};
pub use ticker_stream::{Backoff, StreamError, StreamState, StreamStats, TickerStream};
