use anyhow::Result;
use chrono::{Duration, Utc};
use sqlx::types::Json;

use crate::Store;

impl Store {
    /// Fetch a cached response by key if it has not expired.
    pub async fn cache_get(&self, cache_key: &str) -> Result<Option<serde_json::Value>> {
        let row: Option<(Json<serde_json::Value>,)> = sqlx::query_as(
            "SELECT response FROM llm_cache WHERE cache_key = $1 AND expires_at > $2",
        )
        .bind(cache_key)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(json,)| json.0))
    }

    /// Store a response. Collisions overwrite: the second writer carries an
    /// equivalent value.
    pub async fn cache_put(
        &self,
        cache_key: &str,
        model: &str,
        response: &serde_json::Value,
        ttl_hours: i64,
    ) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO llm_cache (cache_key, model, response, created_at, expires_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (cache_key) DO UPDATE SET
                model = EXCLUDED.model,
                response = EXCLUDED.response,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at",
        )
        .bind(cache_key)
        .bind(model)
        .bind(Json(response))
        .bind(now)
        .bind(now + Duration::hours(ttl_hours))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Purge expired entries (Postgres has no TTL index; this runs on the
    /// maintenance cadence).
    pub async fn cache_clear_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM llm_cache WHERE expires_at < $1")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// (total entries, unexpired entries).
    pub async fn cache_entry_counts(&self) -> Result<(i64, i64)> {
        let (total, active): (i64, i64) = sqlx::query_as(
            "SELECT count(*), count(*) FILTER (WHERE expires_at > $1) FROM llm_cache",
        )
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok((total, active))
    }
}
