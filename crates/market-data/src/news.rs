//! CryptoPanic news sentiment.

use crate::http::JsonSource;
use async_trait::async_trait;
use cryptopulse_core::{NewsProvider, ProviderError, Sentiment};
use serde::Deserialize;
use std::time::Duration;

const QUOTE_ASSETS: [&str; 4] = ["USDT", "USDC", "BUSD", "USD"];

/// CryptoPanic "hot posts" client.
pub struct CryptoPanicProvider {
    source: JsonSource,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct PostsResponse {
    #[serde(default)]
    results: Vec<Post>,
}

#[derive(Debug, Deserialize)]
struct Post {
    #[serde(default)]
    votes: Votes,
}

#[derive(Debug, Default, Deserialize)]
struct Votes {
    #[serde(default)]
    positive: u64,
    #[serde(default)]
    negative: u64,
}

impl CryptoPanicProvider {
    /// Creates a client for `base_url` (e.g. `https://cryptopanic.com/api/v1`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            source: JsonSource::new(base_url, 1, timeout)?,
            api_token: api_token.into(),
        })
    }
}

/// Base asset of a trading pair, e.g. `BTCUSDT` -> `BTC`.
#[must_use]
pub fn base_asset(symbol: &str) -> String {
    let upper = symbol.to_uppercase();
    QUOTE_ASSETS
        .iter()
        .find_map(|quote| {
            upper
                .strip_suffix(quote)
                .filter(|base| !base.is_empty())
                .map(str::to_string)
        })
        .unwrap_or(upper)
}

/// Counts posts voted mostly positive against posts voted mostly negative.
fn classify(posts: &[Post]) -> Sentiment {
    let positive = posts
        .iter()
        .filter(|p| p.votes.positive > p.votes.negative)
        .count() as u64;
    let negative = posts
        .iter()
        .filter(|p| p.votes.negative > p.votes.positive)
        .count() as u64;
    Sentiment::from_votes(positive, negative)
}

#[async_trait]
impl NewsProvider for CryptoPanicProvider {
    fn id(&self) -> &str {
        "cryptopanic"
    }

    async fn fetch_sentiment(&self, symbol: &str) -> Result<Sentiment, ProviderError> {
        let response: PostsResponse = self
            .source
            .get_json(
                "/posts/",
                &[
                    ("auth_token", self.api_token.clone()),
                    ("currencies", base_asset(symbol)),
                    ("filter", "hot".to_string()),
                ],
                None,
            )
            .await?;

        Ok(classify(&response.results))
    }
}
