use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::from_millis;

/// Cached provider response.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CacheEntry {
    pub cache_key: String,
    pub provider: String,
    /// JSON payload
    pub payload: String,
    pub fetched_at: i64,
    pub expires_at: i64,
}

impl CacheEntry {
    /// Returns true while `now` is before the expiry.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() < self.expires_at
    }

    /// Age of the entry in whole seconds.
    #[must_use]
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now.timestamp_millis() - self.fetched_at) / 1000
    }

    /// Deserializes the payload.
    ///
    /// # Errors
    /// Returns an error if the payload does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        Ok(serde_json::from_str(&self.payload)?)
    }

    /// Fetch time as a timestamp.
    ///
    /// # Errors
    /// Returns an error if the stored value is out of range.
    pub fn fetched_at(&self) -> anyhow::Result<DateTime<Utc>> {
        from_millis(self.fetched_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_freshness_and_age() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 10, 0).unwrap();
        let entry = CacheEntry {
            cache_key: "ticker:BTCUSDT".to_string(),
            provider: "binance".to_string(),
            payload: "{\"price\":1.0}".to_string(),
            fetched_at: now.timestamp_millis() - 600_000,
            expires_at: now.timestamp_millis() + 1,
        };
        assert!(entry.is_fresh(now));
        assert_eq!(entry.age_secs(now), 600);

        let value: serde_json::Value = entry.decode().unwrap();
        assert_eq!(value["price"], 1.0);
    }
}
