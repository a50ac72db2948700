use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use chainpulse_common::{Article, ArticleEntity, NarrativeElements, SentimentLabel};

use crate::Store;

/// An article as delivered by ingestion, before enrichment.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub id: Uuid,
    pub source: String,
    pub url: String,
    pub title: String,
    pub text: String,
    pub published_at: DateTime<Utc>,
}

/// Enrichment output applied to one article in a single update.
#[derive(Debug, Clone)]
pub struct EnrichmentUpdate {
    pub relevance_tier: i32,
    pub relevance_score: f64,
    pub relevance_reason: String,
    pub sentiment_score: f64,
    pub sentiment_label: SentimentLabel,
    pub themes: Vec<String>,
    pub keywords: Vec<String>,
    pub entities: Vec<ArticleEntity>,
}

#[derive(sqlx::FromRow)]
struct ArticleRow {
    id: Uuid,
    source: String,
    url: String,
    title: String,
    text: String,
    published_at: DateTime<Utc>,
    relevance_tier: Option<i32>,
    relevance_score: Option<f64>,
    relevance_reason: Option<String>,
    sentiment_score: Option<f64>,
    sentiment_label: Option<String>,
    themes: Json<Vec<String>>,
    keywords: Json<Vec<String>>,
    entities: Json<Vec<ArticleEntity>>,
    narrative_summary: Option<Json<NarrativeElements>>,
    nucleus_entity: Option<String>,
    narrative_id: Option<Uuid>,
}

impl From<ArticleRow> for Article {
    fn from(row: ArticleRow) -> Self {
        Article {
            id: row.id,
            source: row.source,
            url: row.url,
            title: row.title,
            text: row.text,
            published_at: row.published_at,
            relevance_tier: row.relevance_tier,
            relevance_score: row.relevance_score,
            relevance_reason: row.relevance_reason,
            sentiment_score: row.sentiment_score,
            sentiment_label: row.sentiment_label.and_then(|s| s.parse().ok()),
            themes: row.themes.0,
            keywords: row.keywords.0,
            entities: row.entities.0,
            narrative_summary: row.narrative_summary.map(|j| j.0),
            nucleus_entity: row.nucleus_entity,
            narrative_id: row.narrative_id,
        }
    }
}

const SELECT_ARTICLE: &str = "SELECT id, source, url, title, text, published_at, \
     relevance_tier, relevance_score, relevance_reason, sentiment_score, sentiment_label, \
     themes, keywords, entities, narrative_summary, nucleus_entity, narrative_id \
     FROM articles";

impl Store {
    /// Insert an article, deduplicating on canonical URL.
    /// Returns false when the URL was already present.
    pub async fn insert_article(&self, article: &NewArticle) -> Result<bool> {
        let result = crate::with_retry("insert_article", || async {
            sqlx::query(
                "INSERT INTO articles (id, source, url, title, text, published_at)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (url) DO NOTHING",
            )
            .bind(article.id)
            .bind(&article.source)
            .bind(&article.url)
            .bind(&article.title)
            .bind(&article.text)
            .bind(article.published_at)
            .execute(&self.pool)
            .await
        })
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Articles missing any enrichment field. The filter doubles as the
    /// progress cursor: re-running the query after a partial cycle picks up
    /// exactly the unfinished articles.
    pub async fn find_unenriched_articles(&self, limit: i64) -> Result<Vec<Article>> {
        let rows = sqlx::query_as::<_, ArticleRow>(&format!(
            "{SELECT_ARTICLE}
             WHERE relevance_score IS NULL OR relevance_tier IS NULL
                OR sentiment_score IS NULL OR sentiment_label IS NULL
             ORDER BY published_at DESC
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Article::from).collect())
    }

    pub async fn apply_enrichment(&self, article_id: Uuid, update: &EnrichmentUpdate) -> Result<()> {
        crate::with_retry("apply_enrichment", || async {
            sqlx::query(
                "UPDATE articles SET
                    relevance_tier = $2,
                    relevance_score = $3,
                    relevance_reason = $4,
                    sentiment_score = $5,
                    sentiment_label = $6,
                    themes = $7,
                    keywords = $8,
                    entities = $9
                 WHERE id = $1",
            )
            .bind(article_id)
            .bind(update.relevance_tier)
            .bind(update.relevance_score)
            .bind(&update.relevance_reason)
            .bind(update.sentiment_score)
            .bind(update.sentiment_label.to_string())
            .bind(Json(&update.themes))
            .bind(Json(&update.keywords))
            .bind(Json(&update.entities))
            .execute(&self.pool)
            .await
        })
        .await?;

        Ok(())
    }

    /// Relevant articles in the window still missing narrative elements.
    /// Tier 3 articles are noise by definition and are not annotated.
    pub async fn articles_missing_elements(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Article>> {
        let rows = sqlx::query_as::<_, ArticleRow>(&format!(
            "{SELECT_ARTICLE}
             WHERE published_at >= $1
               AND narrative_summary IS NULL
               AND (relevance_tier IS NULL OR relevance_tier < 3)
             ORDER BY published_at DESC
             LIMIT $2"
        ))
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Article::from).collect())
    }

    pub async fn set_narrative_elements(
        &self,
        article_id: Uuid,
        elements: &NarrativeElements,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE articles SET narrative_summary = $2, nucleus_entity = $3 WHERE id = $1",
        )
        .bind(article_id)
        .bind(Json(elements))
        .bind(&elements.nucleus_entity)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Articles in the lookback window that carry narrative elements —
    /// the clustering input set.
    pub async fn articles_with_elements(&self, cutoff: DateTime<Utc>) -> Result<Vec<Article>> {
        let rows = sqlx::query_as::<_, ArticleRow>(&format!(
            "{SELECT_ARTICLE}
             WHERE published_at >= $1 AND narrative_summary IS NOT NULL
             ORDER BY published_at ASC"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Article::from).collect())
    }

    pub async fn articles_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Article>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, ArticleRow>(&format!(
            "{SELECT_ARTICLE} WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Article::from).collect())
    }

    /// Publication timestamps for a set of member articles, ascending.
    pub async fn published_dates(&self, ids: &[Uuid]) -> Result<Vec<DateTime<Utc>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(DateTime<Utc>,)> = sqlx::query_as(
            "SELECT published_at FROM articles WHERE id = ANY($1) ORDER BY published_at ASC",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(ts,)| ts).collect())
    }

    /// Which of the given ids actually exist (I3 integrity checks).
    pub async fn existing_article_ids(&self, ids: &[Uuid]) -> Result<Vec<Uuid>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM articles WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn set_article_narrative(&self, ids: &[Uuid], narrative_id: Uuid) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query("UPDATE articles SET narrative_id = $2 WHERE id = ANY($1)")
            .bind(ids)
            .bind(narrative_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Repoint articles from a merged narrative to its survivor.
    pub async fn repoint_article_narratives(&self, from: Uuid, to: Uuid) -> Result<u64> {
        let result = sqlx::query("UPDATE articles SET narrative_id = $2 WHERE narrative_id = $1")
            .bind(from)
            .bind(to)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
