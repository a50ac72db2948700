use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use chainpulse_common::{SentimentStats, SignalScore, Window};

use crate::Store;

#[derive(sqlx::FromRow)]
struct SignalRow {
    entity: String,
    entity_type: String,
    score_24h: f64,
    score_7d: f64,
    score_30d: f64,
    velocity_24h: f64,
    velocity_7d: f64,
    velocity_30d: f64,
    mentions_24h: i64,
    mentions_7d: i64,
    mentions_30d: i64,
    recency_24h: f64,
    recency_7d: f64,
    recency_30d: f64,
    score: f64,
    velocity: f64,
    source_count: i64,
    sentiment: Json<SentimentStats>,
    narrative_ids: Json<Vec<Uuid>>,
    is_emerging: bool,
    first_seen: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

impl From<SignalRow> for SignalScore {
    fn from(row: SignalRow) -> Self {
        SignalScore {
            entity: row.entity,
            entity_type: row.entity_type,
            score_24h: row.score_24h,
            score_7d: row.score_7d,
            score_30d: row.score_30d,
            velocity_24h: row.velocity_24h,
            velocity_7d: row.velocity_7d,
            velocity_30d: row.velocity_30d,
            mentions_24h: row.mentions_24h,
            mentions_7d: row.mentions_7d,
            mentions_30d: row.mentions_30d,
            recency_24h: row.recency_24h,
            recency_7d: row.recency_7d,
            recency_30d: row.recency_30d,
            score: row.score,
            velocity: row.velocity,
            source_count: row.source_count,
            sentiment: row.sentiment.0,
            narrative_ids: row.narrative_ids.0,
            is_emerging: row.is_emerging,
            first_seen: row.first_seen,
            last_updated: row.last_updated,
        }
    }
}

const SELECT_SIGNAL: &str = "SELECT entity, entity_type, \
     score_24h, score_7d, score_30d, velocity_24h, velocity_7d, velocity_30d, \
     mentions_24h, mentions_7d, mentions_30d, recency_24h, recency_7d, recency_30d, \
     score, velocity, source_count, sentiment, narrative_ids, is_emerging, \
     first_seen, last_updated FROM signal_scores";

fn score_column(window: Window) -> &'static str {
    match window {
        Window::H24 => "score_24h",
        Window::D7 => "score_7d",
        Window::D30 => "score_30d",
    }
}

impl Store {
    /// Upsert by entity. All per-window fields roll over in one statement;
    /// `first_seen` survives updates.
    pub async fn upsert_signal_score(&self, signal: &SignalScore) -> Result<()> {
        crate::with_retry("upsert_signal_score", || async {
            sqlx::query(
                "INSERT INTO signal_scores (
                    entity, entity_type,
                    score_24h, score_7d, score_30d,
                    velocity_24h, velocity_7d, velocity_30d,
                    mentions_24h, mentions_7d, mentions_30d,
                    recency_24h, recency_7d, recency_30d,
                    score, velocity, source_count, sentiment,
                    narrative_ids, is_emerging, first_seen, last_updated
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                           $15, $16, $17, $18, $19, $20, $21, $22)
                 ON CONFLICT (entity) DO UPDATE SET
                    entity_type = EXCLUDED.entity_type,
                    score_24h = EXCLUDED.score_24h,
                    score_7d = EXCLUDED.score_7d,
                    score_30d = EXCLUDED.score_30d,
                    velocity_24h = EXCLUDED.velocity_24h,
                    velocity_7d = EXCLUDED.velocity_7d,
                    velocity_30d = EXCLUDED.velocity_30d,
                    mentions_24h = EXCLUDED.mentions_24h,
                    mentions_7d = EXCLUDED.mentions_7d,
                    mentions_30d = EXCLUDED.mentions_30d,
                    recency_24h = EXCLUDED.recency_24h,
                    recency_7d = EXCLUDED.recency_7d,
                    recency_30d = EXCLUDED.recency_30d,
                    score = EXCLUDED.score,
                    velocity = EXCLUDED.velocity,
                    source_count = EXCLUDED.source_count,
                    sentiment = EXCLUDED.sentiment,
                    narrative_ids = EXCLUDED.narrative_ids,
                    is_emerging = EXCLUDED.is_emerging,
                    last_updated = EXCLUDED.last_updated",
            )
            .bind(&signal.entity)
            .bind(&signal.entity_type)
            .bind(signal.score_24h)
            .bind(signal.score_7d)
            .bind(signal.score_30d)
            .bind(signal.velocity_24h)
            .bind(signal.velocity_7d)
            .bind(signal.velocity_30d)
            .bind(signal.mentions_24h)
            .bind(signal.mentions_7d)
            .bind(signal.mentions_30d)
            .bind(signal.recency_24h)
            .bind(signal.recency_7d)
            .bind(signal.recency_30d)
            .bind(signal.score)
            .bind(signal.velocity)
            .bind(signal.source_count)
            .bind(Json(&signal.sentiment))
            .bind(Json(&signal.narrative_ids))
            .bind(signal.is_emerging)
            .bind(signal.first_seen)
            .bind(signal.last_updated)
            .execute(&self.pool)
            .await
        })
        .await?;

        Ok(())
    }

    /// Top candidates for a window, oversampled 2× so the caller can drop
    /// stale entries and still fill the page.
    pub async fn trending_candidates(
        &self,
        window: Window,
        limit: i64,
        min_score: f64,
    ) -> Result<Vec<SignalScore>> {
        let column = score_column(window);
        let rows = sqlx::query_as::<_, SignalRow>(&format!(
            "{SELECT_SIGNAL} WHERE {column} >= $1 ORDER BY {column} DESC LIMIT $2"
        ))
        .bind(min_score)
        .bind(limit * 2)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SignalScore::from).collect())
    }

    pub async fn get_signal(&self, entity: &str) -> Result<Option<SignalScore>> {
        let row = sqlx::query_as::<_, SignalRow>(&format!("{SELECT_SIGNAL} WHERE entity = $1"))
            .bind(entity)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(SignalScore::from))
    }

    pub async fn signals_updated_since(&self, since: DateTime<Utc>) -> Result<Vec<SignalScore>> {
        let rows =
            sqlx::query_as::<_, SignalRow>(&format!("{SELECT_SIGNAL} WHERE last_updated >= $1"))
                .bind(since)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(SignalScore::from).collect())
    }

    pub async fn delete_signal(&self, entity: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM signal_scores WHERE entity = $1")
            .bind(entity)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every signal score with no remaining entity mention (I4).
    pub async fn delete_stale_signal_scores(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM signal_scores s
             WHERE NOT EXISTS (SELECT 1 FROM entity_mentions m WHERE m.entity = s.entity)",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
