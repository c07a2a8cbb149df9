//! Provider call log model.

use serde::{Deserialize, Serialize};

/// Outcome of one provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiCallStatus {
    Ok,
    Error,
    Timeout,
}

impl ApiCallStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Timeout => "timeout",
        }
    }
}

/// One recorded provider attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCallLog {
    pub provider: String,
    /// Logical endpoint: "ticker", "candles", "news", ...
    pub endpoint: String,
    pub symbol: Option<String>,
    pub status: ApiCallStatus,
    pub status_code: Option<u16>,
    pub rows_returned: i64,
    pub latency_ms: i64,
    pub error: Option<String>,
}

impl ApiCallLog {
    /// Log entry for a successful call.
    #[must_use]
    pub fn ok(
        provider: impl Into<String>,
        endpoint: impl Into<String>,
        symbol: Option<&str>,
        rows_returned: i64,
        latency_ms: i64,
    ) -> Self {
        Self {
            provider: provider.into(),
            endpoint: endpoint.into(),
            symbol: symbol.map(str::to_string),
            status: ApiCallStatus::Ok,
            status_code: Some(200),
            rows_returned,
            latency_ms,
            error: None,
        }
    }

    /// Log entry for a failed call.
    #[must_use]
    pub fn failed(
        provider: impl Into<String>,
        endpoint: impl Into<String>,
        symbol: Option<&str>,
        status: ApiCallStatus,
        status_code: Option<u16>,
        error: impl Into<String>,
        latency_ms: i64,
    ) -> Self {
        Self {
            provider: provider.into(),
            endpoint: endpoint.into(),
            symbol: symbol.map(str::to_string),
            status,
            status_code,
            rows_returned: 0,
            latency_ms,
            error: Some(error.into()),
        }
    }
}

/// Per-provider call statistics over a window.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ProviderCallStats {
    pub provider: String,
    pub total: i64,
    pub ok: i64,
    pub errors: i64,
    pub timeouts: i64,
    pub avg_latency_ms: f64,
}

impl ProviderCallStats {
    /// Fraction of calls that succeeded, in percent.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.ok as f64 / self.total as f64 * 100.0
    }

    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{}: {}/{} ok ({:.0}%), {} timeouts, avg {:.0}ms",
            self.provider,
            self.ok,
            self.total,
            self.success_rate(),
            self.timeouts,
            self.avg_latency_ms
        )
    }
}
