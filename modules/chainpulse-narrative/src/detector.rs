//! Narrative detection driver: one end-to-end cycle over the rolling
//! lookback window.
//!
//! Backfill elements, cluster, fold shallow clusters, then match each
//! cluster against existing narratives — merging, reactivating a dormant
//! story, or creating a fresh narrative with an LLM-written title and
//! summary. Every cluster is processed under per-item recovery; no single
//! failure aborts the cycle.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use chainpulse_common::{
    Article, EntityRelationship, Fingerprint, LifecycleState, Narrative,
};
use chainpulse_llm::LlmGateway;
use chainpulse_store::Store;

use crate::cluster::{cluster_articles, merge_shallow_clusters, Cluster, ClusterConfig};
use crate::elements::ElementBackfill;
use crate::lifecycle::{
    determine_lifecycle_state, momentum, recency_score, recent_velocity,
    update_lifecycle_history, LifecycleInputs,
};
use crate::matcher::{is_blacklisted_nucleus, NarrativeMatcher};

/// Top co-occurrence pairs kept per narrative.
const MAX_ENTITY_RELATIONSHIPS: usize = 5;
/// Articles quoted in the cluster-summary prompt.
const SUMMARY_SNIPPET_COUNT: usize = 5;
const SUMMARY_SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub lookback_hours: i64,
    pub cluster: ClusterConfig,
    pub dormant_days_threshold: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            lookback_hours: 48,
            cluster: ClusterConfig::default(),
            dormant_days_threshold: 7.0,
        }
    }
}

#[derive(Debug, Default)]
pub struct DetectionStats {
    pub backfilled: u32,
    pub eligible_articles: usize,
    pub clusters: usize,
    pub merged: u32,
    pub reactivated: u32,
    pub created: u32,
    pub skipped_no_nucleus: u32,
    pub skipped_blacklisted: u32,
    pub failed: u32,
    pub lifecycle_updates: u32,
}

impl std::fmt::Display for DetectionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Narrative Detection Complete ===")?;
        writeln!(f, "Backfilled elements: {}", self.backfilled)?;
        writeln!(f, "Eligible articles:   {}", self.eligible_articles)?;
        writeln!(f, "Clusters:            {}", self.clusters)?;
        writeln!(f, "Merged:              {}", self.merged)?;
        writeln!(f, "Reactivated:         {}", self.reactivated)?;
        writeln!(f, "Created:             {}", self.created)?;
        writeln!(f, "Skipped (nucleus):   {}", self.skipped_no_nucleus)?;
        writeln!(f, "Skipped (blacklist): {}", self.skipped_blacklisted)?;
        writeln!(f, "Failed:              {}", self.failed)?;
        writeln!(f, "Lifecycle updates:   {}", self.lifecycle_updates)?;
        Ok(())
    }
}

pub struct NarrativeDetector {
    store: Store,
    gateway: LlmGateway,
    matcher: NarrativeMatcher,
    backfill: ElementBackfill,
    config: DetectorConfig,
}

impl NarrativeDetector {
    pub fn new(
        store: Store,
        gateway: LlmGateway,
        config: DetectorConfig,
        reactivation_window_days: i64,
    ) -> Self {
        Self {
            matcher: NarrativeMatcher::new(store.clone(), reactivation_window_days),
            backfill: ElementBackfill::new(store.clone(), gateway.clone()),
            store,
            gateway,
            config,
        }
    }

    pub async fn run_cycle(&self) -> Result<DetectionStats> {
        let mut stats = DetectionStats::default();
        let now = Utc::now();

        stats.backfilled = self
            .backfill
            .run(self.config.lookback_hours)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "element backfill failed, clustering existing annotations");
                0
            });

        let cutoff = now - Duration::hours(self.config.lookback_hours);
        let articles = self
            .store
            .articles_with_elements(cutoff)
            .await
            .context("loading eligible articles")?;
        stats.eligible_articles = articles.len();

        if articles.is_empty() {
            info!("no articles with narrative elements in window");
            return Ok(stats);
        }

        let clusters = cluster_articles(articles, &self.config.cluster);
        let clusters = merge_shallow_clusters(clusters, &self.config.cluster);
        stats.clusters = clusters.len();
        info!(clusters = clusters.len(), "narrative clusters formed");

        for cluster in clusters {
            match self.process_cluster(&cluster, now, &mut stats).await {
                Ok(()) => {}
                Err(e) => {
                    stats.failed += 1;
                    warn!(error = %e, "cluster processing failed, continuing");
                }
            }
        }

        stats.lifecycle_updates = self.refresh_lifecycles(now).await.unwrap_or_else(|e| {
            warn!(error = %e, "lifecycle refresh failed");
            0
        });

        info!("{stats}");
        Ok(stats)
    }

    /// Re-derive the lifecycle state of every live narrative from its
    /// stored metrics. Narratives that fell silent cross into cooling and
    /// dormant here even when no cluster touches them. The write leaves
    /// `last_updated` alone — dormancy is driven by real update recency.
    async fn refresh_lifecycles(&self, now: DateTime<Utc>) -> Result<u32> {
        let narratives = self.store.all_live_narratives().await?;

        let mut updated = 0u32;
        for mut narrative in narratives {
            let state = determine_lifecycle_state(
                &LifecycleInputs {
                    article_count: narrative.article_count,
                    mention_velocity: narrative.mention_velocity,
                    first_seen: narrative.first_seen,
                    last_updated: narrative.last_updated,
                    previous_state: narrative.previous_state(),
                },
                now,
                self.config.dormant_days_threshold,
            );
            if state == narrative.lifecycle_state {
                continue;
            }

            narrative.lifecycle_state = state;
            let resurrection = update_lifecycle_history(
                &mut narrative.lifecycle_history,
                narrative.reawakening_count,
                state,
                narrative.article_count,
                narrative.mention_velocity,
                now,
            );
            if let Some(resurrection) = resurrection {
                narrative.reawakening_count = resurrection.reawakening_count;
                narrative.reawakened_from = resurrection.reawakened_from;
                narrative.resurrection_velocity = Some(resurrection.resurrection_velocity);
            }
            if state == LifecycleState::Dormant && narrative.dormant_since.is_none() {
                narrative.dormant_since = Some(now);
            }

            if let Err(e) = self.store.write_narrative(&narrative).await {
                warn!(narrative = %narrative.id, error = %e, "lifecycle refresh write failed");
            } else {
                updated += 1;
            }
        }

        Ok(updated)
    }

    async fn process_cluster(
        &self,
        cluster: &Cluster,
        now: DateTime<Utc>,
        stats: &mut DetectionStats,
    ) -> Result<()> {
        let fingerprint = cluster.fingerprint();

        if fingerprint.nucleus_entity.is_empty() {
            stats.skipped_no_nucleus += 1;
            error!("refusing narrative with empty nucleus entity");
            return Ok(());
        }
        if is_blacklisted_nucleus(&fingerprint.nucleus_entity) {
            stats.skipped_blacklisted += 1;
            debug!(nucleus = fingerprint.nucleus_entity.as_str(), "blacklisted nucleus, skipping");
            return Ok(());
        }

        let cluster_velocity = cluster.velocity(self.config.lookback_hours);

        if let Some(narrative) = self
            .matcher
            .find_match(&fingerprint, cluster_velocity, now)
            .await?
        {
            self.merge_into_existing(narrative, cluster, now).await?;
            stats.merged += 1;
            return Ok(());
        }

        if let Some(dormant) = self.matcher.find_reactivation_target(&fingerprint, now).await? {
            let cluster_ids: Vec<Uuid> = cluster.articles.iter().map(|a| a.id).collect();
            let mut union_ids = dormant.article_ids.clone();
            for id in &cluster_ids {
                if !union_ids.contains(id) {
                    union_ids.push(*id);
                }
            }
            let dates = self.store.published_dates(&union_ids).await?;
            let velocity = recent_velocity(&dates, 7, now);

            self.matcher
                .reactivate(dormant, cluster_ids, cluster_sentiment(cluster), velocity, now)
                .await?;
            stats.reactivated += 1;
            return Ok(());
        }

        self.create_narrative(cluster, fingerprint, now).await?;
        stats.created += 1;
        Ok(())
    }

    /// Merge a cluster's articles into a matched narrative and recompute
    /// its activity metrics over the combined membership.
    async fn merge_into_existing(
        &self,
        mut narrative: Narrative,
        cluster: &Cluster,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut appended = 0usize;
        for article in &cluster.articles {
            if !narrative.article_ids.contains(&article.id) {
                narrative.article_ids.push(article.id);
                appended += 1;
            }
        }
        narrative.article_count = narrative.article_ids.len() as i64;

        let members = self.store.articles_by_ids(&narrative.article_ids).await?;
        let mut dates: Vec<DateTime<Utc>> = members.iter().map(|a| a.published_at).collect();
        dates.sort();

        narrative.mention_velocity = recent_velocity(&dates, 7, now);
        narrative.momentum = momentum(&dates);
        narrative.recency_score = recency_score(dates.last().copied(), now);
        narrative.avg_sentiment = mean_sentiment(&members);
        narrative.entity_relationships = entity_relationships(&members);

        let previous_state = narrative.previous_state();
        let state = determine_lifecycle_state(
            &LifecycleInputs {
                article_count: narrative.article_count,
                mention_velocity: narrative.mention_velocity,
                first_seen: narrative.first_seen,
                last_updated: now,
                previous_state,
            },
            now,
            self.config.dormant_days_threshold,
        );
        narrative.lifecycle_state = state;

        let resurrection = update_lifecycle_history(
            &mut narrative.lifecycle_history,
            narrative.reawakening_count,
            state,
            narrative.article_count,
            narrative.mention_velocity,
            now,
        );
        if let Some(resurrection) = resurrection {
            narrative.reawakening_count = resurrection.reawakening_count;
            narrative.reawakened_from = resurrection.reawakened_from;
            narrative.resurrection_velocity = Some(resurrection.resurrection_velocity);
        }
        if state == LifecycleState::Dormant && narrative.dormant_since.is_none() {
            narrative.dormant_since = Some(now);
        }

        // Appending articles without regenerating the summary leaves it
        // stale until the next summary pass.
        if appended > 0 {
            narrative.needs_summary_update = true;
        }
        narrative.last_updated = now;

        self.store.upsert_narrative(&mut narrative).await?;
        self.store
            .set_article_narrative(&narrative.article_ids, narrative.id)
            .await?;
        Ok(())
    }

    /// Create a fresh narrative from a cluster, with the capable model
    /// writing the title and summary.
    async fn create_narrative(
        &self,
        cluster: &Cluster,
        fingerprint: Fingerprint,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let snippets: Vec<String> = cluster
            .articles
            .iter()
            .take(SUMMARY_SNIPPET_COUNT)
            .map(|a| {
                let body: String = a.text.chars().take(SUMMARY_SNIPPET_CHARS).collect();
                format!("- {}: {}", a.title, body)
            })
            .collect();

        let generated = match self.gateway.summarize_cluster(&snippets).await {
            Ok(generated) => generated,
            Err(e) => {
                warn!(error = %e, "cluster summary generation failed, using fallback");
                None
            }
        };
        let (title, summary) = match generated {
            Some(generated) => (generated.title, generated.summary),
            None => {
                // Headline generation is best-effort; the first member's
                // title stands in until the next summary pass.
                let fallback = cluster
                    .articles
                    .first()
                    .map(|a| a.title.chars().take(60).collect::<String>())
                    .unwrap_or_else(|| fingerprint.nucleus_entity.clone());
                (fallback, "Cluster of related articles.".to_string())
            }
        };

        let mut dates: Vec<DateTime<Utc>> =
            cluster.articles.iter().map(|a| a.published_at).collect();
        dates.sort();

        let mention_velocity = recent_velocity(&dates, 7, now);
        let article_ids: Vec<Uuid> = cluster.articles.iter().map(|a| a.id).collect();

        let state = determine_lifecycle_state(
            &LifecycleInputs {
                article_count: article_ids.len() as i64,
                mention_velocity,
                first_seen: now,
                last_updated: now,
                previous_state: None,
            },
            now,
            self.config.dormant_days_threshold,
        );

        let mut lifecycle_history = Vec::new();
        update_lifecycle_history(
            &mut lifecycle_history,
            0,
            state,
            article_ids.len() as i64,
            mention_velocity,
            now,
        );

        let mut narrative = Narrative {
            id: Uuid::new_v4(),
            nucleus_entity: fingerprint.nucleus_entity.clone(),
            title,
            summary,
            entities: fingerprint.top_actors.clone(),
            article_count: article_ids.len() as i64,
            article_ids,
            mention_velocity,
            avg_sentiment: cluster_sentiment(cluster),
            momentum: momentum(&dates),
            recency_score: recency_score(dates.last().copied(), now),
            entity_relationships: entity_relationships(&cluster.articles),
            lifecycle_state: state,
            lifecycle_history,
            fingerprint,
            first_seen: now,
            last_updated: now,
            timeline_data: Vec::new(),
            peak_activity: None,
            days_active: 1,
            reawakening_count: 0,
            reawakened_from: None,
            resurrection_velocity: None,
            dormant_since: None,
            reactivated_count: 0,
            merged_into: None,
            needs_summary_update: false,
        };

        self.store.upsert_narrative(&mut narrative).await?;
        self.store
            .set_article_narrative(&narrative.article_ids, narrative.id)
            .await?;

        info!(title = narrative.title.as_str(), articles = narrative.article_count, "narrative created");
        Ok(())
    }
}

/// Mean sentiment across member articles that carry a score.
fn mean_sentiment(articles: &[Article]) -> f64 {
    let scores: Vec<f64> = articles.iter().filter_map(|a| a.sentiment_score).collect();
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

fn cluster_sentiment(cluster: &Cluster) -> f64 {
    mean_sentiment(&cluster.articles)
}

/// Top co-occurrence pairs among member articles' extracted entities,
/// weighted by the number of articles both appear in.
pub fn entity_relationships(articles: &[Article]) -> Vec<EntityRelationship> {
    let mut pair_counts: HashMap<(String, String), i64> = HashMap::new();

    for article in articles {
        let mut names: Vec<&str> = article.entities.iter().map(|e| e.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();

        for i in 0..names.len() {
            for j in (i + 1)..names.len() {
                *pair_counts
                    .entry((names[i].to_string(), names[j].to_string()))
                    .or_insert(0) += 1;
            }
        }
    }

    let mut ranked: Vec<((String, String), i64)> = pair_counts.into_iter().collect();
    ranked.sort_by(|x, y| y.1.cmp(&x.1).then_with(|| x.0.cmp(&y.0)));

    ranked
        .into_iter()
        .take(MAX_ENTITY_RELATIONSHIPS)
        .map(|((a, b), weight)| EntityRelationship { a, b, weight })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainpulse_common::ArticleEntity;

    fn article_with_entities(names: &[&str], sentiment: Option<f64>) -> Article {
        Article {
            id: Uuid::new_v4(),
            source: "coindesk".into(),
            url: format!("https://example.com/{}", Uuid::new_v4()),
            title: "t".into(),
            text: String::new(),
            published_at: Utc::now(),
            relevance_tier: Some(2),
            relevance_score: Some(0.5),
            relevance_reason: None,
            sentiment_score: sentiment,
            sentiment_label: None,
            themes: vec![],
            keywords: vec![],
            entities: names
                .iter()
                .map(|n| ArticleEntity {
                    name: n.to_string(),
                    entity_type: "cryptocurrency".into(),
                    ticker: None,
                    confidence: 0.9,
                    is_primary: true,
                })
                .collect(),
            narrative_summary: None,
            nucleus_entity: None,
            narrative_id: None,
        }
    }

    #[test]
    fn entity_relationships_rank_by_cooccurrence() {
        let articles = vec![
            article_with_entities(&["SEC", "Binance"], None),
            article_with_entities(&["SEC", "Binance"], None),
            article_with_entities(&["SEC", "Coinbase"], None),
        ];

        let relationships = entity_relationships(&articles);
        assert_eq!(relationships[0].a, "Binance");
        assert_eq!(relationships[0].b, "SEC");
        assert_eq!(relationships[0].weight, 2);
        assert_eq!(relationships.len(), 2);
    }

    #[test]
    fn entity_relationships_cap_at_five() {
        let articles = vec![article_with_entities(&["A", "B", "C", "D", "E"], None)];
        // C(5,2) = 10 pairs, capped to 5.
        assert_eq!(entity_relationships(&articles).len(), 5);
    }

    #[test]
    fn mean_sentiment_ignores_missing_scores() {
        let articles = vec![
            article_with_entities(&[], Some(0.6)),
            article_with_entities(&[], None),
            article_with_entities(&[], Some(-0.2)),
        ];
        assert!((mean_sentiment(&articles) - 0.2).abs() < 1e-9);
        assert_eq!(mean_sentiment(&[]), 0.0);
    }
}
