//! Enrichment pipeline worker.
//!
//! Selects articles missing enrichment fields, classifies and scores them,
//! runs selective entity extraction, and persists the article update
//! followed by its entity mentions. A failing article is logged and
//! skipped; the cycle always runs to completion.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use chainpulse_common::{normalize_entity_name, Article, EntityMention, SentimentLabel};
use chainpulse_llm::LlmGateway;
use chainpulse_store::{EnrichmentUpdate, Store};

use crate::keywords;
use crate::relevance::RelevanceClassifier;
use crate::selective::{ArticleExtraction, ExtractionMethod, SelectiveProcessor};

/// Stats from one enrichment cycle.
#[derive(Debug, Default)]
pub struct EnrichStats {
    pub processed: u32,
    pub skipped: u32,
    pub failed: u32,
    pub tier_counts: [u32; 3],
    pub llm_extracted: u32,
    pub rule_extracted: u32,
    pub mentions_inserted: u64,
}

impl std::fmt::Display for EnrichStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Enrichment Cycle Complete ===")?;
        writeln!(f, "Processed:         {}", self.processed)?;
        writeln!(f, "Skipped:           {}", self.skipped)?;
        writeln!(f, "Failed:            {}", self.failed)?;
        writeln!(f, "Tier 1 / 2 / 3:    {} / {} / {}",
            self.tier_counts[0], self.tier_counts[1], self.tier_counts[2])?;
        writeln!(f, "LLM extracted:     {}", self.llm_extracted)?;
        writeln!(f, "Rule extracted:    {}", self.rule_extracted)?;
        writeln!(f, "Mentions inserted: {}", self.mentions_inserted)?;
        Ok(())
    }
}

pub struct EnrichmentPipeline {
    store: Store,
    gateway: LlmGateway,
    classifier: RelevanceClassifier,
    selective: SelectiveProcessor,
    batch_size: usize,
}

impl EnrichmentPipeline {
    pub fn new(store: Store, gateway: LlmGateway, batch_size: usize) -> Self {
        Self {
            store,
            gateway,
            classifier: RelevanceClassifier::new(),
            selective: SelectiveProcessor::new(),
            batch_size,
        }
    }

    pub async fn run_cycle(&self) -> Result<EnrichStats> {
        let mut stats = EnrichStats::default();

        let articles = self
            .store
            .find_unenriched_articles(self.batch_size as i64)
            .await
            .context("querying unenriched articles")?;

        if articles.is_empty() {
            return Ok(stats);
        }
        info!(count = articles.len(), "enriching articles");

        // One batched LLM pass for the articles that qualify; rule-based
        // extraction for the rest.
        let extractions = self
            .selective
            .batch_extract(&articles, &self.gateway)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "batch entity extraction failed, continuing without entities");
                Default::default()
            });

        for article in &articles {
            match self.enrich_article(article, extractions.get(&article.id)).await {
                Ok(Some(outcome)) => {
                    stats.processed += 1;
                    let tier = outcome.tier.clamp(1, 3) as usize;
                    stats.tier_counts[tier - 1] += 1;
                    stats.mentions_inserted += outcome.mentions_inserted;
                    match outcome.method {
                        Some(ExtractionMethod::Llm) => stats.llm_extracted += 1,
                        Some(ExtractionMethod::RuleBased) => stats.rule_extracted += 1,
                        None => {}
                    }
                }
                Ok(None) => stats.skipped += 1,
                Err(e) => {
                    stats.failed += 1;
                    warn!(article = %article.id, error = %e, "article enrichment failed, skipping");
                }
            }
        }

        self.log_cache_and_cost_stats().await;
        info!("{stats}");
        Ok(stats)
    }

    async fn enrich_article(
        &self,
        article: &Article,
        extraction: Option<&ArticleExtraction>,
    ) -> Result<Option<ArticleOutcome>> {
        let combined = format!("{} {}", article.title, article.text);
        let combined = combined.trim();
        if combined.is_empty() {
            return Ok(None);
        }

        let classification =
            self.classifier
                .classify(&article.title, Some(&article.text), Some(&article.source));

        // Each LLM-backed field fails closed to a neutral default; no
        // single failure aborts the article.
        let relevance_score = match self.gateway.score_relevance(combined).await {
            Ok(score) => score,
            Err(e) => {
                warn!(article = %article.id, error = %e, "relevance scoring failed");
                0.0
            }
        };
        let sentiment_score = match self.gateway.analyze_sentiment(combined).await {
            Ok(score) => score,
            Err(e) => {
                warn!(article = %article.id, error = %e, "sentiment analysis failed");
                0.0
            }
        };
        let themes = match self.gateway.extract_themes(combined).await {
            Ok(themes) => themes,
            Err(e) => {
                warn!(article = %article.id, error = %e, "theme extraction failed");
                Vec::new()
            }
        };

        let sentiment_label = SentimentLabel::from_score(sentiment_score);

        let tokens = keywords::tokenize(combined);
        let mut keyword_list = keywords::select_keywords(&tokens);
        keywords::merge_themes(&mut keyword_list, &themes);

        let entities = extraction.map(|e| e.entities.clone()).unwrap_or_default();

        let update = EnrichmentUpdate {
            relevance_tier: classification.tier,
            relevance_score,
            relevance_reason: classification.reason.to_string(),
            sentiment_score,
            sentiment_label,
            themes,
            keywords: keyword_list,
            entities: entities.clone(),
        };

        // The article update commits before mentions are inserted, so a
        // cancellation mid-article never leaves mentions without their
        // enriched article.
        self.store
            .apply_enrichment(article.id, &update)
            .await
            .context("persisting enrichment")?;

        let mentions = build_mentions(article, &entities, extraction, sentiment_label);
        let mentions_inserted = if mentions.is_empty() {
            0
        } else {
            self.store
                .insert_mentions(&mentions)
                .await
                .context("inserting entity mentions")?
        };

        Ok(Some(ArticleOutcome {
            tier: classification.tier,
            method: extraction.map(|e| e.method),
            mentions_inserted,
        }))
    }

    async fn log_cache_and_cost_stats(&self) {
        match self.gateway.cache_stats().await {
            Ok(stats) => info!(
                entries = stats.active_entries,
                hit_rate = format!("{:.1}%", stats.hit_rate_percent),
                "llm cache stats"
            ),
            Err(e) => warn!(error = %e, "failed to read cache stats"),
        }
        match self.gateway.cost_summary().await {
            Ok(summary) => info!(
                month_to_date = format!("${:.4}", summary.month_to_date),
                projected = format!("${:.2}", summary.projected_monthly),
                "llm cost stats"
            ),
            Err(e) => warn!(error = %e, "failed to read cost summary"),
        }
    }
}

struct ArticleOutcome {
    tier: i32,
    method: Option<ExtractionMethod>,
    mentions_inserted: u64,
}

/// Build mention rows from the article's extracted entities. Entity names
/// pass through normalization once more on the way to persistence.
fn build_mentions(
    article: &Article,
    entities: &[chainpulse_common::ArticleEntity],
    extraction: Option<&ArticleExtraction>,
    article_sentiment: SentimentLabel,
) -> Vec<EntityMention> {
    let sentiment = extraction
        .and_then(|e| e.sentiment)
        .unwrap_or(article_sentiment);
    let now = Utc::now();

    entities
        .iter()
        .map(|entity| EntityMention {
            id: Uuid::new_v4(),
            entity: normalize_entity_name(&entity.name),
            entity_type: entity.entity_type.clone(),
            article_id: article.id,
            sentiment,
            confidence: entity.confidence,
            is_primary: entity.is_primary,
            source: article.source.clone(),
            created_at: now,
            metadata: serde_json::json!({}),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainpulse_common::ArticleEntity;

    fn article() -> Article {
        Article {
            id: Uuid::new_v4(),
            source: "coindesk".into(),
            url: "https://example.com/a".into(),
            title: "BTC rallies".into(),
            text: "Bitcoin climbed".into(),
            published_at: Utc::now(),
            relevance_tier: None,
            relevance_score: None,
            relevance_reason: None,
            sentiment_score: None,
            sentiment_label: None,
            themes: vec![],
            keywords: vec![],
            entities: vec![],
            narrative_summary: None,
            nucleus_entity: None,
            narrative_id: None,
        }
    }

    #[test]
    fn mentions_are_normalized_and_carry_article_source() {
        let article = article();
        let entities = vec![ArticleEntity {
            name: "btc".into(),
            entity_type: "cryptocurrency".into(),
            ticker: None,
            confidence: 0.85,
            is_primary: true,
        }];

        let mentions = build_mentions(&article, &entities, None, SentimentLabel::Positive);
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].entity, "Bitcoin");
        assert_eq!(mentions[0].source, "coindesk");
        assert_eq!(mentions[0].sentiment, SentimentLabel::Positive);
        assert!(mentions[0].is_primary);
    }

    #[test]
    fn entity_level_sentiment_overrides_article_sentiment() {
        let article = article();
        let entities = vec![ArticleEntity {
            name: "Ethereum".into(),
            entity_type: "cryptocurrency".into(),
            ticker: None,
            confidence: 0.9,
            is_primary: false,
        }];
        let extraction = ArticleExtraction {
            article_id: article.id,
            method: ExtractionMethod::Llm,
            entities: entities.clone(),
            sentiment: Some(SentimentLabel::Negative),
        };

        let mentions = build_mentions(&article, &entities, Some(&extraction), SentimentLabel::Neutral);
        assert_eq!(mentions[0].sentiment, SentimentLabel::Negative);
    }
}
