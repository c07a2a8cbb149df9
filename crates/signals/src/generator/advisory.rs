//! Advisory channel: HTTP client and validation of its untrusted output.
//!
//! The advisory service answers in free text that is expected to contain a
//! JSON object shaped like a candidate signal, possibly wrapped in a markdown
//! code fence. Nothing in it is trusted until [`parse_opinion`] accepts it.

use async_trait::async_trait;
use cryptopulse_core::{
    AdvisoryConfig, AdvisoryError, AdvisoryProvider, AdvisoryRequest, SignalType,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::rules::RuleDecision;

/// Validated advisory opinion.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisoryOpinion {
    pub signal_type: SignalType,
    pub confidence: f64,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
    pub reason: String,
}

/// Channel that produced the candidate direction.
#[derive(Debug, Clone, PartialEq)]
pub enum Candidate {
    RuleOnly(RuleDecision),
    AdvisoryValidated(AdvisoryOpinion),
}

impl Candidate {
    #[must_use]
    pub fn signal_type(&self) -> SignalType {
        match self {
            Self::RuleOnly(rule) => rule.signal_type,
            Self::AdvisoryValidated(opinion) => opinion.signal_type,
        }
    }

    #[must_use]
    pub fn confidence(&self) -> f64 {
        match self {
            Self::RuleOnly(rule) => rule.confidence,
            Self::AdvisoryValidated(opinion) => opinion.confidence,
        }
    }
}

/// Raw advisory payload. Field names vary between model prompts.
#[derive(Debug, Deserialize)]
struct RawOpinion {
    #[serde(alias = "signal", alias = "type")]
    signal_type: String,
    confidence: f64,
    #[serde(default)]
    take_profit: Option<f64>,
    #[serde(default)]
    stop_loss: Option<f64>,
    #[serde(default, alias = "reasoning")]
    reason: Option<String>,
}

/// Strips a markdown code fence and any prose around the JSON object.
fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let body = match trimmed.find("```") {
        Some(start) => {
            let after = &trimmed[start + 3..];
            let after = after.strip_prefix("json").unwrap_or(after);
            match after.find("```") {
                Some(end) => &after[..end],
                None => after,
            }
        }
        None => trimmed,
    };

    let open = body.find('{')?;
    let close = body.rfind('}')?;
    (open < close).then(|| &body[open..=close])
}

fn positive_price(field: &str, value: Option<f64>) -> Result<Option<f64>, AdvisoryError> {
    match value {
        Some(v) if !v.is_finite() || v <= 0.0 => Err(AdvisoryError::Malformed(format!(
            "{field} must be a positive price, got {v}"
        ))),
        other => Ok(other),
    }
}

/// Validates an advisory response.
///
/// # Errors
///
/// Returns [`AdvisoryError::Malformed`] when no JSON object can be found, the
/// direction is unknown, the confidence is outside 0-100 or a price is not a
/// positive finite number.
pub fn parse_opinion(text: &str) -> Result<AdvisoryOpinion, AdvisoryError> {
    let json = extract_json(text)
        .ok_or_else(|| AdvisoryError::Malformed("no JSON object in response".to_string()))?;

    let raw: RawOpinion =
        serde_json::from_str(json).map_err(|e| AdvisoryError::Malformed(e.to_string()))?;

    let signal_type = raw
        .signal_type
        .parse::<SignalType>()
        .map_err(|e| AdvisoryError::Malformed(e.to_string()))?;

    if !raw.confidence.is_finite() || !(0.0..=100.0).contains(&raw.confidence) {
        return Err(AdvisoryError::Malformed(format!(
            "confidence out of range: {}",
            raw.confidence
        )));
    }

    Ok(AdvisoryOpinion {
        signal_type,
        confidence: raw.confidence,
        take_profit: positive_price("take_profit", raw.take_profit)?,
        stop_loss: positive_price("stop_loss", raw.stop_loss)?,
        reason: raw
            .reason
            .unwrap_or_else(|| "Advisory opinion".to_string()),
    })
}

/// JSON-over-HTTP advisory service client.
pub struct HttpAdvisoryClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpAdvisoryClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AdvisoryError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdvisoryError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &AdvisoryConfig) -> Result<Self, AdvisoryError> {
        Self::new(
            config.endpoint.clone(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl AdvisoryProvider for HttpAdvisoryClient {
    async fn advise(&self, request: &AdvisoryRequest) -> Result<String, AdvisoryError> {
        debug!(symbol = %request.snapshot.symbol, "POST {}", self.endpoint);

        let mut builder = self.http.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AdvisoryError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdvisoryError::Unavailable(format!("HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| AdvisoryError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cryptopulse_core::{IndicatorSet, MarketSnapshot, ReputationRecord, Sentiment};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // ============================================
    // Parsing
    // ============================================

    #[test]
    fn test_parse_plain_json() {
        let opinion = parse_opinion(
            r#"{"signal_type":"BUY","confidence":82,"take_profit":105.0,"stop_loss":98.0,"reason":"breakout"}"#,
        )
        .unwrap();

        assert_eq!(opinion.signal_type, SignalType::Buy);
        assert_eq!(opinion.confidence, 82.0);
        assert_eq!(opinion.take_profit, Some(105.0));
        assert_eq!(opinion.reason, "breakout");
    }

    #[test]
    fn test_parse_fenced_json_with_prose() {
        let text = "Here is my analysis:\n```json\n{\"type\": \"sell\", \"confidence\": 71.5, \"reasoning\": \"overbought\"}\n```\nGood luck.";
        let opinion = parse_opinion(text).unwrap();

        assert_eq!(opinion.signal_type, SignalType::Sell);
        assert_eq!(opinion.confidence, 71.5);
        assert_eq!(opinion.take_profit, None);
        assert_eq!(opinion.reason, "overbought");
    }

    #[test]
    fn test_rejects_unknown_direction() {
        let err = parse_opinion(r#"{"signal":"HODL","confidence":90}"#).unwrap_err();
        assert!(matches!(err, AdvisoryError::Malformed(_)));
    }

    #[test]
    fn test_rejects_out_of_range_confidence() {
        assert!(parse_opinion(r#"{"signal":"BUY","confidence":140}"#).is_err());
        assert!(parse_opinion(r#"{"signal":"BUY","confidence":-1}"#).is_err());
    }

    #[test]
    fn test_rejects_bad_prices() {
        assert!(parse_opinion(r#"{"signal":"BUY","confidence":80,"take_profit":-5}"#).is_err());
        assert!(parse_opinion(r#"{"signal":"BUY","confidence":80,"stop_loss":0}"#).is_err());
    }

    #[test]
    fn test_rejects_non_json() {
        assert!(parse_opinion("I think you should buy").is_err());
        assert!(parse_opinion("").is_err());
    }

    // ============================================
    // Client
    // ============================================

    fn request() -> AdvisoryRequest {
        AdvisoryRequest {
            snapshot: MarketSnapshot {
                symbol: "BTCUSDT".to_string(),
                price: 100.0,
                change_24h_pct: 1.0,
                volume_24h: 1000.0,
                high_24h: 101.0,
                low_24h: 99.0,
                provider: "binance".to_string(),
                fetched_at: Utc::now(),
            },
            indicators: IndicatorSet::default(),
            reputation: ReputationRecord::neutral("BTCUSDT"),
            sentiment: Sentiment::Neutral,
            risk_profile: None,
        }
    }

    #[tokio::test]
    async fn test_client_returns_raw_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/advise"))
            .and(header("authorization", "Bearer key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"signal_type": "WAIT", "confidence": 50})),
            )
            .mount(&server)
            .await;

        let client = HttpAdvisoryClient::new(
            format!("{}/advise", server.uri()),
            Some("key".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();

        let body = client.advise(&request()).await.unwrap();
        assert_eq!(parse_opinion(&body).unwrap().signal_type, SignalType::Wait);
    }

    #[tokio::test]
    async fn test_client_error_status_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = HttpAdvisoryClient::new(server.uri(), None, Duration::from_secs(5)).unwrap();
        let err = client.advise(&request()).await.unwrap_err();
        assert!(matches!(err, AdvisoryError::Unavailable(_)));
    }
}
