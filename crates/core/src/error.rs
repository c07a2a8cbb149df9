//! Error taxonomy for the signal pipeline.
//!
//! Only [`PipelineError::NoMarketDataAvailable`] is escalated as an alert; every
//! other variant degrades to WAIT or a skipped cycle.

use thiserror::Error;

/// Failure of a single provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Non-2xx HTTP response
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Provider asked us to back off (HTTP 429)
    #[error("Rate limited by provider")]
    RateLimited,

    /// Request did not complete within the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// Connection or transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Payload did not have the expected shape
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// Provider has no mapping for the symbol
    #[error("Unsupported symbol: {0}")]
    UnsupportedSymbol(String),
}

impl ProviderError {
    /// Maps an HTTP status code to an error.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        if status == 429 {
            Self::RateLimited
        } else {
            Self::Http {
                status,
                message: message.into(),
            }
        }
    }

    /// HTTP status, when the provider answered at all.
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::RateLimited => Some(429),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Failure talking to, or trusting, the advisory service.
#[derive(Debug, Error)]
pub enum AdvisoryError {
    /// Service unreachable, timed out or answered non-2xx
    #[error("Advisory unavailable: {0}")]
    Unavailable(String),

    /// Response could not be validated as a candidate signal
    #[error("Advisory response malformed: {0}")]
    Malformed(String),
}

/// Pipeline-level error taxonomy.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Every live provider failed for this request
    #[error("All providers failed for {symbol} after {attempts} attempts")]
    ProviderUnavailable { symbol: String, attempts: usize },

    /// Live providers and cache both came up empty
    #[error("No market data available for {symbol}")]
    NoMarketDataAvailable { symbol: String },

    /// Not enough candles to compute indicators
    #[error("Insufficient history for {symbol}: have {have} candles, need {need}")]
    InsufficientHistory {
        symbol: String,
        have: usize,
        need: usize,
    },

    #[error(transparent)]
    Advisory(#[from] AdvisoryError),

    /// Price targets violated the direction invariant (corrected in place)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Cooldown or unique-key conflict on insert
    #[error("Duplicate suppressed for {symbol} at horizon {horizon_minutes}m")]
    PersistenceConflict {
        symbol: String,
        horizon_minutes: i64,
    },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl PipelineError {
    /// Whether this error should raise an operational alert.
    #[must_use]
    pub const fn is_alert(&self) -> bool {
        matches!(self, Self::NoMarketDataAvailable { .. })
    }

    /// Message safe to show to end users.
    #[must_use]
    pub const fn public_message(&self) -> &'static str {
        match self {
            Self::ProviderUnavailable { .. } | Self::NoMarketDataAvailable { .. } => {
                "data temporarily unavailable"
            }
            Self::InsufficientHistory { .. } => "not enough market history yet",
            Self::PersistenceConflict { .. } => "duplicate suppressed",
            _ => "internal error",
        }
    }
}
