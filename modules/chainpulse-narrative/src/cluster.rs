//! Salience-weighted clustering of enriched articles, plus the
//! shallow-cluster merge pass that folds thin clusters into substantial
//! ones.

use std::collections::{HashMap, HashSet};

use chainpulse_common::{Article, Fingerprint};

use crate::fingerprint::{compute_fingerprint, jaccard};

/// Nuclei too broad to anchor a narrative on their own. Clusters built
/// around them need extra articles before they count as substantial.
const UBIQUITOUS_ENTITIES: &[&str] =
    &["Bitcoin", "Ethereum", "crypto", "blockchain", "cryptocurrency"];

#[derive(Debug, Clone, Copy)]
pub struct ClusterConfig {
    /// Minimum link strength for joining an existing cluster.
    pub link_strength_threshold: f64,
    /// Salience at or above which an actor counts as core.
    pub core_actor_salience: f64,
    /// Clusters below this size are dropped after clustering.
    pub min_cluster_size: usize,
    /// Jaccard above which (strictly) a shallow cluster merges.
    pub shallow_merge_similarity: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            link_strength_threshold: 0.8,
            core_actor_salience: 4.5,
            min_cluster_size: 3,
            shallow_merge_similarity: 0.5,
        }
    }
}

/// A group of articles telling one story. Tracks the unions of actors,
/// core actors, and tensions for link-strength comparisons as members
/// accumulate.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub articles: Vec<Article>,
    nucleus: Option<String>,
    actors: HashSet<String>,
    core_actors: HashSet<String>,
    tensions: HashSet<String>,
}

impl Cluster {
    fn seed(article: Article, core_salience: f64) -> Self {
        let mut cluster = Self {
            nucleus: article.nucleus_entity.clone().filter(|n| !n.is_empty()),
            articles: Vec::new(),
            actors: HashSet::new(),
            core_actors: HashSet::new(),
            tensions: HashSet::new(),
        };
        cluster.absorb(article, core_salience);
        cluster
    }

    fn absorb(&mut self, article: Article, core_salience: f64) {
        for actor in article.actors() {
            self.actors.insert(actor.clone());
            if article.actor_salience(actor) >= core_salience {
                self.core_actors.insert(actor.clone());
            }
        }
        for tension in article.tensions() {
            self.tensions.insert(tension.clone());
        }
        self.articles.push(article);
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    pub fn nucleus(&self) -> Option<&str> {
        self.nucleus.as_deref()
    }

    pub fn actors(&self) -> &HashSet<String> {
        &self.actors
    }

    /// Articles-per-day velocity over the detection window.
    pub fn velocity(&self, window_hours: i64) -> f64 {
        let days = window_hours as f64 / 24.0;
        if days <= 0.0 {
            return 0.0;
        }
        self.len() as f64 / days
    }

    /// Aggregate member fields into a fingerprint.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut nucleus_counts: HashMap<String, usize> = HashMap::new();
        let mut actor_salience: HashMap<String, f64> = HashMap::new();
        let mut actions: Vec<String> = Vec::new();
        let mut tension_counts: HashMap<String, usize> = HashMap::new();

        for article in &self.articles {
            if let Some(nucleus) = article.nucleus_entity.as_deref().filter(|n| !n.is_empty()) {
                *nucleus_counts.entry(nucleus.to_string()).or_insert(0) += 1;
            }
            for actor in article.actors() {
                let salience = article.actor_salience(actor).max(3.0);
                let entry = actor_salience.entry(actor.clone()).or_insert(0.0);
                *entry = entry.max(salience);
            }
            if let Some(elements) = &article.narrative_summary {
                actions.extend(elements.actions.iter().cloned());
            }
            for tension in article.tensions() {
                *tension_counts.entry(tension.clone()).or_insert(0) += 1;
            }
        }

        let nucleus_counts: Vec<(String, usize)> = nucleus_counts.into_iter().collect();
        let actor_salience: Vec<(String, f64)> = actor_salience.into_iter().collect();
        let tension_counts: Vec<(String, usize)> = tension_counts.into_iter().collect();

        compute_fingerprint(&nucleus_counts, &actor_salience, &actions, &tension_counts)
    }
}

/// Weighted link strength between an article and an existing cluster.
///
/// Shared nucleus +1.0; two or more shared core actors +0.7, exactly one
/// +0.4; any shared tension +0.3.
pub fn link_strength(article: &Article, cluster: &Cluster, core_salience: f64) -> f64 {
    let mut strength = 0.0;

    let nucleus = article.nucleus_entity.as_deref().filter(|n| !n.is_empty());
    if let (Some(a), Some(c)) = (nucleus, cluster.nucleus()) {
        if a == c {
            strength += 1.0;
        }
    }

    let article_core: HashSet<&str> = article
        .actors()
        .iter()
        .filter(|actor| article.actor_salience(actor) >= core_salience)
        .map(String::as_str)
        .collect();
    let shared_core = article_core
        .iter()
        .filter(|actor| cluster.core_actors.contains(**actor))
        .count();
    if shared_core >= 2 {
        strength += 0.7;
    } else if shared_core == 1 {
        strength += 0.4;
    }

    let shared_tensions = article
        .tensions()
        .iter()
        .filter(|t| cluster.tensions.contains(*t))
        .count();
    if shared_tensions >= 1 {
        strength += 0.3;
    }

    strength
}

/// Cluster articles in arrival order: each article joins the strongest
/// existing cluster at or above the threshold, otherwise opens a new one.
/// Clusters below `min_cluster_size` are dropped at the end.
pub fn cluster_articles(articles: Vec<Article>, config: &ClusterConfig) -> Vec<Cluster> {
    let mut clusters: Vec<Cluster> = Vec::new();

    for article in articles {
        let mut best: Option<(usize, f64)> = None;
        for (i, cluster) in clusters.iter().enumerate() {
            let strength = link_strength(&article, cluster, config.core_actor_salience);
            if best.map_or(true, |(_, s)| strength > s) {
                best = Some((i, strength));
            }
        }

        match best {
            Some((i, strength)) if strength >= config.link_strength_threshold => {
                clusters[i].absorb(article, config.core_actor_salience);
            }
            _ => clusters.push(Cluster::seed(article, config.core_actor_salience)),
        }
    }

    clusters.retain(|c| c.len() >= config.min_cluster_size);
    clusters
}

/// A cluster is shallow when it is a single article with fewer than three
/// actors, or when its nucleus is ubiquitous and it has fewer than three
/// articles.
fn is_shallow(cluster: &Cluster) -> bool {
    if cluster.len() == 1 && cluster.actors.len() < 3 {
        return true;
    }
    if let Some(nucleus) = cluster.nucleus() {
        if UBIQUITOUS_ENTITIES.contains(&nucleus) && cluster.len() < 3 {
            return true;
        }
    }
    false
}

/// Fold shallow clusters into the best-matching substantial cluster when
/// actor Jaccard is strictly above the threshold. Shallow clusters with no
/// qualifying target stay standalone.
pub fn merge_shallow_clusters(clusters: Vec<Cluster>, config: &ClusterConfig) -> Vec<Cluster> {
    let (shallow, mut substantial): (Vec<Cluster>, Vec<Cluster>) =
        clusters.into_iter().partition(is_shallow);

    for cluster in shallow {
        let shallow_actors: HashSet<&str> = cluster.actors.iter().map(String::as_str).collect();

        let mut best: Option<(usize, f64)> = None;
        for (i, target) in substantial.iter().enumerate() {
            let target_actors: HashSet<&str> = target.actors.iter().map(String::as_str).collect();
            let similarity = jaccard(&shallow_actors, &target_actors);
            if similarity > config.shallow_merge_similarity
                && best.map_or(true, |(_, s)| similarity > s)
            {
                best = Some((i, similarity));
            }
        }

        match best {
            Some((i, _)) => {
                let target = &mut substantial[i];
                let existing_ids: HashSet<uuid::Uuid> =
                    target.articles.iter().map(|a| a.id).collect();
                for article in cluster.articles {
                    if !existing_ids.contains(&article.id) {
                        // Salience threshold no longer matters for core
                        // actors here; reuse the default.
                        target.absorb(article, ClusterConfig::default().core_actor_salience);
                    }
                }
            }
            None => substantial.push(cluster),
        }
    }

    substantial
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainpulse_common::NarrativeElements;
    use chrono::Utc;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn article(nucleus: &str, actors: &[(&str, f64)], tensions: &[&str]) -> Article {
        let salience: HashMap<String, f64> =
            actors.iter().map(|(a, s)| (a.to_string(), *s)).collect();
        Article {
            id: Uuid::new_v4(),
            source: "coindesk".into(),
            url: format!("https://example.com/{}", Uuid::new_v4()),
            title: format!("{nucleus} story"),
            text: String::new(),
            published_at: Utc::now(),
            relevance_tier: Some(1),
            relevance_score: Some(0.8),
            relevance_reason: None,
            sentiment_score: Some(0.1),
            sentiment_label: None,
            themes: vec![],
            keywords: vec![],
            entities: vec![],
            narrative_summary: Some(NarrativeElements {
                nucleus_entity: nucleus.to_string(),
                actors: actors.iter().map(|(a, _)| a.to_string()).collect(),
                actor_salience: salience,
                actions: vec![format!("{nucleus} acted")],
                tensions: tensions.iter().map(|t| t.to_string()).collect(),
                implications: String::new(),
                narrative_summary: String::new(),
            }),
            nucleus_entity: Some(nucleus.to_string()),
            narrative_id: None,
        }
    }

    #[test]
    fn shared_nucleus_clusters_three_articles() {
        // Three SEC articles with distinct secondary actors form one cluster.
        let articles = vec![
            article("SEC", &[("SEC", 5.0), ("Binance", 4.5)], &["regulation"]),
            article("SEC", &[("SEC", 5.0), ("Coinbase", 4.5)], &["regulation"]),
            article("SEC", &[("SEC", 5.0), ("Ripple", 4.5)], &["regulation"]),
        ];
        let clusters = cluster_articles(articles, &ClusterConfig::default());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 3);
    }

    #[test]
    fn disjoint_articles_form_no_clusters() {
        let articles = vec![
            article("Bitcoin", &[("Bitcoin", 5.0)], &["supply"]),
            article("Ethereum", &[("Ethereum", 5.0)], &["staking"]),
            article("Solana", &[("Solana", 5.0)], &["outage"]),
        ];
        let clusters = cluster_articles(articles, &ClusterConfig::default());
        assert!(clusters.is_empty());
    }

    #[test]
    fn link_strength_of_exactly_threshold_clusters() {
        // One shared core actor (0.4) + nothing else would not cluster, but
        // shared tension (0.3) + one core actor (0.4) = 0.7 < 0.8, while a
        // shared nucleus alone (1.0) does. Verify the >= boundary with a
        // constructed 0.8.
        let base = article("SEC", &[("SEC", 5.0), ("Binance", 4.5)], &["regulation"]);
        let cluster = Cluster::seed(base, 4.5);

        // Two shared core actors (0.7) + no nucleus + no tension = 0.7.
        let near = article("Binance", &[("SEC", 4.5), ("Binance", 4.5)], &[]);
        assert!((link_strength(&near, &cluster, 4.5) - 0.7).abs() < 1e-9);

        // Adding a shared tension lifts it to 1.0 >= 0.8.
        let joined = article("Binance", &[("SEC", 4.5), ("Binance", 4.5)], &["regulation"]);
        assert!(link_strength(&joined, &cluster, 4.5) >= 0.8);
    }

    #[test]
    fn link_strength_at_threshold_joins_cluster() {
        // One shared core actor (0.4) + one shared tension (0.3) = 0.7;
        // with the threshold tuned to 0.7 the article joins on equality.
        let config = ClusterConfig {
            link_strength_threshold: 0.7,
            min_cluster_size: 2,
            ..ClusterConfig::default()
        };
        let articles = vec![
            article("SEC", &[("SEC", 5.0)], &["regulation"]),
            article("CFTC", &[("SEC", 4.5), ("CFTC", 5.0)], &["regulation"]),
        ];
        let clusters = cluster_articles(articles, &config);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 2);
    }

    #[test]
    fn salience_below_core_threshold_is_excluded() {
        // 4.1 salience actors are tangential and must not count as core.
        let base = article("SEC", &[("SEC", 5.0), ("Binance", 4.1)], &[]);
        let cluster = Cluster::seed(base, 4.5);

        let other = article("Kraken", &[("Binance", 4.1), ("Kraken", 5.0)], &[]);
        assert_eq!(link_strength(&other, &cluster, 4.5), 0.0);
    }

    #[test]
    fn clusters_below_min_size_are_dropped() {
        let articles = vec![
            article("SEC", &[("SEC", 5.0), ("Binance", 4.5)], &["regulation"]),
            article("SEC", &[("SEC", 5.0), ("Coinbase", 4.5)], &["regulation"]),
        ];
        let clusters = cluster_articles(articles, &ClusterConfig::default());
        assert!(clusters.is_empty());
    }

    fn cluster_of(articles: Vec<Article>) -> Cluster {
        let mut iter = articles.into_iter();
        let mut cluster = Cluster::seed(iter.next().unwrap(), 4.5);
        for article in iter {
            cluster.absorb(article, 4.5);
        }
        cluster
    }

    #[test]
    fn shallow_single_article_cluster_merges_into_best_match() {
        let substantial = cluster_of(vec![
            article("SEC", &[("SEC", 5.0), ("Binance", 4.5), ("Coinbase", 4.0)], &[]),
            article("SEC", &[("SEC", 5.0), ("Binance", 4.5)], &[]),
            article("SEC", &[("SEC", 5.0)], &[]),
        ]);
        let shallow = cluster_of(vec![article("Binance", &[("Binance", 5.0), ("SEC", 4.5)], &[])]);

        // Jaccard({Binance,SEC}, {SEC,Binance,Coinbase}) = 2/3 > 0.5.
        let merged = merge_shallow_clusters(vec![substantial, shallow], &ClusterConfig::default());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].len(), 4);
    }

    #[test]
    fn jaccard_of_exactly_half_does_not_merge() {
        let substantial = cluster_of(vec![
            article("SEC", &[("SEC", 5.0), ("Binance", 4.5), ("Bitcoin", 4.0), ("Ethereum", 3.0)], &[]),
            article("SEC", &[("SEC", 5.0)], &[]),
            article("SEC", &[("SEC", 5.0)], &[]),
        ]);
        // Shallow ubiquitous-nucleus cluster with actors {Bitcoin, Ethereum}:
        // overlap 2, union 4, Jaccard exactly 0.5 -> stays standalone.
        let shallow = cluster_of(vec![article(
            "Bitcoin",
            &[("Bitcoin", 5.0), ("Ethereum", 4.0)],
            &[],
        )]);

        let merged = merge_shallow_clusters(vec![substantial, shallow], &ClusterConfig::default());
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn ubiquitous_nucleus_with_few_articles_is_shallow() {
        let c = cluster_of(vec![
            article("Bitcoin", &[("Bitcoin", 5.0), ("MicroStrategy", 4.5), ("Tesla", 3.0)], &[]),
            article("Bitcoin", &[("Bitcoin", 5.0), ("MicroStrategy", 4.5)], &[]),
        ]);
        assert!(is_shallow(&c));

        let specific = cluster_of(vec![article(
            "MicroStrategy",
            &[("MicroStrategy", 5.0), ("Bitcoin", 4.0), ("Saylor", 3.0)],
            &[],
        )]);
        assert!(!is_shallow(&specific));
    }

    #[test]
    fn shallow_cluster_without_match_stays_standalone() {
        let substantial = cluster_of(vec![
            article("SEC", &[("SEC", 5.0), ("Binance", 4.5), ("Coinbase", 4.0)], &[]),
            article("SEC", &[("SEC", 5.0)], &[]),
            article("SEC", &[("SEC", 5.0)], &[]),
        ]);
        let unrelated = cluster_of(vec![article("Uniswap", &[("Uniswap", 5.0), ("Aave", 4.0)], &[])]);

        let merged = merge_shallow_clusters(vec![substantial, unrelated], &ClusterConfig::default());
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn cluster_fingerprint_aggregates_members() {
        let cluster = cluster_of(vec![
            article("SEC", &[("SEC", 5.0), ("Binance", 4.5)], &["Regulation vs Innovation"]),
            article("SEC", &[("SEC", 5.0), ("Coinbase", 4.0)], &["Regulation vs Innovation"]),
            article("Binance", &[("Binance", 5.0)], &[]),
        ]);
        let fingerprint = cluster.fingerprint();
        assert_eq!(fingerprint.nucleus_entity, "SEC");
        assert_eq!(
            fingerprint.narrative_focus.as_deref(),
            Some("regulation_vs_innovation")
        );
        assert!(fingerprint.top_actors.contains(&"SEC".to_string()));
    }
}
