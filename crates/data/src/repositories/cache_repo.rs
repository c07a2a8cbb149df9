//! Provider response cache.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::models::{to_millis, CacheEntry};

/// Repository for cached provider payloads.
#[derive(Debug, Clone)]
pub struct CacheRepository {
    pool: SqlitePool,
}

impl CacheRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stores a payload under `key`, overwriting any previous entry.
    ///
    /// # Errors
    /// Returns an error if serialization or the database operation fails.
    pub async fn put<T: Serialize + Sync>(
        &self,
        key: &str,
        provider: &str,
        payload: &T,
        fetched_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<()> {
        let payload = serde_json::to_string(payload)?;

        sqlx::query(
            r"
            INSERT INTO cache_entries (cache_key, provider, payload, fetched_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(cache_key) DO UPDATE SET
                provider = excluded.provider,
                payload = excluded.payload,
                fetched_at = excluded.fetched_at,
                expires_at = excluded.expires_at
            ",
        )
        .bind(key)
        .bind(provider)
        .bind(payload)
        .bind(to_millis(fetched_at))
        .bind(to_millis(fetched_at + ttl))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns the entry for `key` if it has not expired at `now`.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get_fresh(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CacheEntry>> {
        let entry = sqlx::query_as::<_, CacheEntry>(
            r"
            SELECT cache_key, provider, payload, fetched_at, expires_at
            FROM cache_entries
            WHERE cache_key = ?1 AND expires_at > ?2
            ",
        )
        .bind(key)
        .bind(to_millis(now))
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Deletes entries that expired before `now`; returns how many were removed.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let done = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= ?1")
            .bind(to_millis(now))
            .execute(&self.pool)
            .await?;

        Ok(done.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_fresh_entry_until_ttl_then_purged() {
        let db = Database::in_memory().await.unwrap();
        let cache = db.repositories().cache;
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        cache
            .put("ticker:BTCUSDT", "binance", &vec![1, 2, 3], t, Duration::minutes(10))
            .await
            .unwrap();

        let hit = cache
            .get_fresh("ticker:BTCUSDT", t + Duration::minutes(9))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.decode::<Vec<i32>>().unwrap(), vec![1, 2, 3]);
        assert_eq!(hit.provider, "binance");

        assert!(cache
            .get_fresh("ticker:BTCUSDT", t + Duration::minutes(10))
            .await
            .unwrap()
            .is_none());

        cache
            .put("ticker:ETHUSDT", "binance", &vec![4], t, Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(cache.purge_expired(t + Duration::minutes(11)).await.unwrap(), 1);
        assert_eq!(cache.purge_expired(t + Duration::minutes(11)).await.unwrap(), 0);
        assert!(cache
            .get_fresh("ticker:ETHUSDT", t + Duration::minutes(11))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let db = Database::in_memory().await.unwrap();
        let cache = db.repositories().cache;
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        cache.put("k", "a", &1, t, Duration::minutes(5)).await.unwrap();
        cache.put("k", "b", &2, t, Duration::minutes(5)).await.unwrap();

        let hit = cache.get_fresh("k", t).await.unwrap().unwrap();
        assert_eq!(hit.provider, "b");
        assert_eq!(hit.decode::<i32>().unwrap(), 2);
    }
}
