use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use chainpulse_common::{EntityMention, SentimentLabel};

use crate::Store;

#[derive(sqlx::FromRow)]
struct MentionRow {
    id: Uuid,
    entity: String,
    entity_type: String,
    article_id: Uuid,
    sentiment: String,
    confidence: f64,
    is_primary: bool,
    source: String,
    created_at: DateTime<Utc>,
    metadata: Json<serde_json::Value>,
}

impl From<MentionRow> for EntityMention {
    fn from(row: MentionRow) -> Self {
        EntityMention {
            id: row.id,
            entity: row.entity,
            entity_type: row.entity_type,
            article_id: row.article_id,
            sentiment: row.sentiment.parse().unwrap_or(SentimentLabel::Neutral),
            confidence: row.confidence,
            is_primary: row.is_primary,
            source: row.source,
            created_at: row.created_at,
            metadata: row.metadata.0,
        }
    }
}

impl Store {
    /// Insert one article's mentions as a single batch, after the article
    /// update has committed. Retries rebuild the statement; the id-keyed
    /// rows make a replay after a half-applied attempt fail loudly rather
    /// than double-insert.
    pub async fn insert_mentions(&self, mentions: &[EntityMention]) -> Result<u64> {
        if mentions.is_empty() {
            return Ok(0);
        }

        let result = crate::with_retry("insert_mentions", || async {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO entity_mentions \
                 (id, entity, entity_type, article_id, sentiment, confidence, is_primary, source, created_at, metadata) ",
            );
            builder.push_values(mentions, |mut b, m| {
                b.push_bind(m.id)
                    .push_bind(&m.entity)
                    .push_bind(&m.entity_type)
                    .push_bind(m.article_id)
                    .push_bind(m.sentiment.to_string())
                    .push_bind(m.confidence)
                    .push_bind(m.is_primary)
                    .push_bind(&m.source)
                    .push_bind(m.created_at)
                    .push_bind(Json(&m.metadata));
            });

            builder.build().execute(&self.pool).await
        })
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn count_primary_mentions_since(
        &self,
        entity: &str,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT count(*) FROM entity_mentions
             WHERE entity = $1 AND is_primary AND created_at >= $2",
        )
        .bind(entity)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Distinct source labels across all primary mentions of an entity
    /// (windowless by design — diversity is a property of the entity).
    pub async fn distinct_source_count(&self, entity: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT count(DISTINCT source) FROM entity_mentions
             WHERE entity = $1 AND is_primary",
        )
        .bind(entity)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Sentiment labels of all primary mentions of an entity.
    pub async fn primary_mention_sentiments(&self, entity: &str) -> Result<Vec<SentimentLabel>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT sentiment FROM entity_mentions WHERE entity = $1 AND is_primary",
        )
        .bind(entity)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(s,)| s.parse().ok())
            .collect())
    }

    pub async fn latest_primary_mention(&self, entity: &str) -> Result<Option<DateTime<Utc>>> {
        let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
            "SELECT created_at FROM entity_mentions
             WHERE entity = $1 AND is_primary
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(entity)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(ts,)| ts))
    }

    /// Existence probe used to filter stale signals out of trending results.
    pub async fn entity_has_mentions(&self, entity: &str) -> Result<bool> {
        let row: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM entity_mentions WHERE entity = $1 LIMIT 1")
                .bind(entity)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.is_some())
    }

    /// Distinct (entity, entity_type) pairs with primary mentions since the
    /// cutoff — the signal scorer's work list.
    pub async fn entities_with_primary_mentions_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT DISTINCT entity, entity_type FROM entity_mentions
             WHERE is_primary AND created_at >= $1",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn mentions_for_article(&self, article_id: Uuid) -> Result<Vec<EntityMention>> {
        let rows = sqlx::query_as::<_, MentionRow>(
            "SELECT id, entity, entity_type, article_id, sentiment, confidence, is_primary,
                    source, created_at, metadata
             FROM entity_mentions WHERE article_id = $1",
        )
        .bind(article_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(EntityMention::from).collect())
    }

    /// Delete mentions whose article no longer exists. Removal is the only
    /// remediation for orphan mentions.
    pub async fn delete_orphan_mentions(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM entity_mentions m
             WHERE NOT EXISTS (SELECT 1 FROM articles a WHERE a.id = m.article_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
