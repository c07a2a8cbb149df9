//! Row models for the pipeline tables.
//!
//! Rows mirror the `SQLite` columns (text enums, epoch-millisecond timestamps)
//! and convert into the typed domain structs from `cryptopulse-core`.

pub mod api_call;
pub mod backtest;
pub mod cache;
pub mod learning;
pub mod risk;
pub mod signal;

pub use api_call::{ApiCallLog, ApiCallStatus, ProviderCallStats};
pub use backtest::{BacktestRunRow, BacktestTradeRow, StoredBacktestRun};
pub use cache::CacheEntry;
pub use learning::{PatternRow, ReputationRow};
pub use risk::RiskStateRow;
pub use signal::{OutcomeRow, SignalRow};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

/// Converts a timestamp to the stored epoch-millisecond form.
#[must_use]
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Converts a stored epoch-millisecond value back to a timestamp.
///
/// # Errors
/// Returns an error if the value is out of chrono's range.
pub fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| anyhow!("timestamp out of range: {ms}"))
}
