//! Shared rate-limited JSON-over-HTTP plumbing for the REST providers.

use cryptopulse_core::ProviderError;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use nonzero_ext::nonzero;
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// HTTP client bound to one base URL with its own request quota.
pub(crate) struct JsonSource {
    http: reqwest::Client,
    base_url: String,
    rate_limiter: DirectLimiter,
}

impl JsonSource {
    /// Creates a source limited to `requests_per_second` (minimum 1).
    pub(crate) fn new(
        base_url: impl Into<String>,
        requests_per_second: u32,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let rps = NonZeroU32::new(requests_per_second).unwrap_or(nonzero!(1u32));

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::direct(Quota::per_second(rps)),
        })
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GETs `path` (relative to the base URL) and decodes the JSON body.
    ///
    /// `timeout` overrides the client default for slow endpoints such as
    /// candle history.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        timeout: Option<Duration>,
    ) -> Result<T, ProviderError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let mut request = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .query(query);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), truncate(&body)));
        }

        let body = response.text().await.map_err(map_transport_error)?;
        serde_json::from_str(&body).map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

fn map_transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else if let Some(status) = err.status() {
        ProviderError::from_status(status.as_u16(), err.to_string())
    } else {
        ProviderError::Network(err.to_string())
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}

/// Parses a number that providers send either as a JSON string or a number.
pub(crate) fn parse_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_number_accepts_strings_and_numbers() {
        assert_eq!(parse_number(&json!("42.5")), Some(42.5));
        assert_eq!(parse_number(&json!(7)), Some(7.0));
        assert_eq!(parse_number(&json!("abc")), None);
        assert_eq!(parse_number(&json!(null)), None);
    }

    #[tokio::test]
    async fn test_get_json_decodes_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(query_param("symbol", "BTCUSDT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let source = JsonSource::new(server.uri(), 10, Duration::from_secs(5)).unwrap();
        let body: serde_json::Value = source
            .get_json("/ping", &[("symbol", "BTCUSDT".to_string())], None)
            .await
            .unwrap();

        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_status_429_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let source = JsonSource::new(server.uri(), 10, Duration::from_secs(5)).unwrap();
        let err = source
            .get_json::<serde_json::Value>("/busy", &[], None)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::RateLimited));
    }

    #[tokio::test]
    async fn test_server_error_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let source = JsonSource::new(server.uri(), 10, Duration::from_secs(5)).unwrap();
        let err = source
            .get_json::<serde_json::Value>("/down", &[], None)
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(503));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let source = JsonSource::new(server.uri(), 10, Duration::from_millis(50)).unwrap();
        let err = source
            .get_json::<serde_json::Value>("/slow", &[], None)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_invalid_json_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/garbage"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let source = JsonSource::new(server.uri(), 10, Duration::from_secs(5)).unwrap();
        let err = source
            .get_json::<serde_json::Value>("/garbage", &[], None)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Malformed(_)));
    }
}
