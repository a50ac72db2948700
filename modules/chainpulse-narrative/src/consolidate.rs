//! Periodic consolidation of near-duplicate narratives.
//!
//! Within active narratives sharing a nucleus entity, pairs whose
//! fingerprints agree at >= 0.9 (and both carry a focus label) merge: the
//! smaller folds into the larger, the loser is terminally marked merged,
//! and its articles repoint to the survivor. A concurrent writer on the
//! survivor aborts that one merge; the pass continues.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use chainpulse_common::{Narrative, TimelineSnapshot};
use chainpulse_store::Store;

use crate::fingerprint::fingerprint_similarity;
use crate::lifecycle::update_lifecycle_history;

/// Fingerprint similarity at or above which two same-nucleus narratives are
/// duplicates.
const CONSOLIDATION_SIMILARITY: f64 = 0.9;

#[derive(Debug, Default)]
pub struct ConsolidationStats {
    pub groups_examined: u32,
    pub merges: u32,
    pub conflicts: u32,
    pub articles_repointed: u64,
}

impl std::fmt::Display for ConsolidationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Consolidation Complete ===")?;
        writeln!(f, "Groups examined:    {}", self.groups_examined)?;
        writeln!(f, "Merges:             {}", self.merges)?;
        writeln!(f, "Conflicts:          {}", self.conflicts)?;
        writeln!(f, "Articles repointed: {}", self.articles_repointed)?;
        Ok(())
    }
}

/// Survivor selection: higher article_count wins; ties go to the more
/// advanced lifecycle state.
pub fn select_survivor(a: Narrative, b: Narrative) -> (Narrative, Narrative) {
    let a_wins = match a.article_count.cmp(&b.article_count) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => a.lifecycle_state.rank() >= b.lifecycle_state.rank(),
    };
    if a_wins {
        (a, b)
    } else {
        (b, a)
    }
}

/// Sentiment of the merged narrative, weighted by article counts.
pub fn weighted_sentiment(a_avg: f64, a_count: i64, b_avg: f64, b_count: i64) -> f64 {
    let total = a_count + b_count;
    if total <= 0 {
        return 0.0;
    }
    (a_avg * a_count as f64 + b_avg * b_count as f64) / total as f64
}

/// Merge two daily timelines: same-date entries sum article counts and
/// velocities and union their entities; output stays sorted by date.
pub fn merge_timelines(a: &[TimelineSnapshot], b: &[TimelineSnapshot]) -> Vec<TimelineSnapshot> {
    let mut by_date: HashMap<&str, TimelineSnapshot> = HashMap::new();

    for snapshot in a.iter().chain(b) {
        match by_date.get_mut(snapshot.date.as_str()) {
            Some(merged) => {
                merged.article_count += snapshot.article_count;
                merged.velocity += snapshot.velocity;
                for entity in &snapshot.entities {
                    if !merged.entities.contains(entity) {
                        merged.entities.push(entity.clone());
                    }
                }
            }
            None => {
                by_date.insert(snapshot.date.as_str(), snapshot.clone());
            }
        }
    }

    let mut merged: Vec<TimelineSnapshot> = by_date.into_values().collect();
    merged.sort_by(|x, y| x.date.cmp(&y.date));
    merged
}

/// Fold `loser` into `survivor` in memory. Returns the updated survivor.
pub fn merge_narratives(mut survivor: Narrative, loser: &Narrative) -> Narrative {
    let survivor_count = survivor.article_count;

    let existing: HashSet<Uuid> = survivor.article_ids.iter().copied().collect();
    survivor
        .article_ids
        .extend(loser.article_ids.iter().filter(|id| !existing.contains(id)).copied());
    survivor.article_count = survivor.article_ids.len() as i64;

    survivor.avg_sentiment = weighted_sentiment(
        survivor.avg_sentiment,
        survivor_count,
        loser.avg_sentiment,
        loser.article_count,
    );

    survivor.timeline_data = merge_timelines(&survivor.timeline_data, &loser.timeline_data);

    for entity in &loser.entities {
        if !survivor.entities.contains(entity) {
            survivor.entities.push(entity.clone());
        }
    }

    // The survivor keeps the most advanced lifecycle state of the pair.
    if loser.lifecycle_state.rank() > survivor.lifecycle_state.rank() {
        survivor.lifecycle_state = loser.lifecycle_state;
    }

    survivor
}

pub struct Consolidator {
    store: Store,
}

impl Consolidator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// One consolidation pass over all active narratives.
    pub async fn run(&self) -> Result<ConsolidationStats> {
        let mut stats = ConsolidationStats::default();
        let now = Utc::now();

        let narratives = self.store.narratives_for_consolidation().await?;

        let mut by_nucleus: HashMap<String, Vec<Narrative>> = HashMap::new();
        for narrative in narratives {
            by_nucleus
                .entry(narrative.nucleus_entity.clone())
                .or_default()
                .push(narrative);
        }

        for (nucleus, group) in by_nucleus {
            if group.len() < 2 {
                continue;
            }
            stats.groups_examined += 1;

            let mut consumed: HashSet<Uuid> = HashSet::new();
            let mut pool = group;

            // Pairwise scan; a merged loser drops out of later pairs, and a
            // surviving winner keeps its updated membership for them.
            loop {
                let mut merged_this_round = false;

                'pairs: for i in 0..pool.len() {
                    for j in (i + 1)..pool.len() {
                        let a = &pool[i];
                        let b = &pool[j];
                        if consumed.contains(&a.id) || consumed.contains(&b.id) {
                            continue;
                        }
                        if a.fingerprint.narrative_focus.is_none()
                            || b.fingerprint.narrative_focus.is_none()
                        {
                            continue;
                        }

                        let similarity = fingerprint_similarity(&a.fingerprint, &b.fingerprint);
                        if similarity < CONSOLIDATION_SIMILARITY {
                            continue;
                        }

                        let (survivor, loser) = select_survivor(a.clone(), b.clone());
                        match self.apply_merge(survivor, &loser, now, &mut stats).await {
                            Ok(Some(updated)) => {
                                consumed.insert(loser.id);
                                let survivor_idx = pool
                                    .iter()
                                    .position(|n| n.id == updated.id)
                                    .expect("survivor came from the pool");
                                pool[survivor_idx] = updated;
                                merged_this_round = true;
                                break 'pairs;
                            }
                            Ok(None) => {
                                stats.conflicts += 1;
                                warn!(nucleus = nucleus.as_str(), "consolidation merge conflicted, skipping pair");
                            }
                            Err(e) => {
                                warn!(nucleus = nucleus.as_str(), error = %e, "consolidation merge failed");
                            }
                        }
                    }
                }

                if !merged_this_round {
                    break;
                }
            }
        }

        info!("{stats}");
        Ok(stats)
    }

    /// Persist one merge. Returns the updated survivor, or None on a
    /// version conflict (concurrent writer won; this merge aborts).
    async fn apply_merge(
        &self,
        survivor: Narrative,
        loser: &Narrative,
        now: chrono::DateTime<Utc>,
        stats: &mut ConsolidationStats,
    ) -> Result<Option<Narrative>> {
        let expected_last_updated = survivor.last_updated;

        let mut updated = merge_narratives(survivor, loser);
        update_lifecycle_history(
            &mut updated.lifecycle_history,
            updated.reawakening_count,
            updated.lifecycle_state,
            updated.article_count,
            updated.mention_velocity,
            now,
        );
        updated.last_updated = now;

        let wrote = self
            .store
            .write_narrative_versioned(&updated, expected_last_updated)
            .await?;
        if !wrote {
            return Ok(None);
        }

        self.store.mark_narrative_merged(loser.id, updated.id).await?;
        let repointed = self
            .store
            .repoint_article_narratives(loser.id, updated.id)
            .await?;
        self.store.set_article_narrative(&loser.article_ids, updated.id).await?;

        stats.merges += 1;
        stats.articles_repointed += repointed;
        info!(
            survivor = updated.title.as_str(),
            merged = loser.title.as_str(),
            "narratives consolidated"
        );

        Ok(Some(updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainpulse_common::{Fingerprint, LifecycleState, Momentum};
    use chrono::Duration;

    fn narrative(nucleus: &str, focus: Option<&str>, article_count: i64, state: LifecycleState) -> Narrative {
        let now = Utc::now();
        Narrative {
            id: Uuid::new_v4(),
            nucleus_entity: nucleus.to_string(),
            title: format!("{nucleus} ({state})"),
            summary: String::new(),
            entities: vec![nucleus.to_string()],
            article_ids: (0..article_count).map(|_| Uuid::new_v4()).collect(),
            article_count,
            mention_velocity: 1.0,
            avg_sentiment: 0.0,
            momentum: Momentum::Unknown,
            recency_score: 0.5,
            entity_relationships: vec![],
            lifecycle_state: state,
            lifecycle_history: vec![],
            fingerprint: Fingerprint {
                nucleus_entity: nucleus.to_string(),
                narrative_focus: focus.map(str::to_string),
                top_actors: vec![nucleus.to_string()],
                key_actions: vec![],
                key_entities: vec![nucleus.to_string()],
            },
            first_seen: now - Duration::days(10),
            last_updated: now,
            timeline_data: vec![],
            peak_activity: None,
            days_active: 10,
            reawakening_count: 0,
            reawakened_from: None,
            resurrection_velocity: None,
            dormant_since: None,
            reactivated_count: 0,
            merged_into: None,
            needs_summary_update: false,
        }
    }

    #[test]
    fn survivor_is_larger_narrative() {
        let big = narrative("Dogecoin", Some("price surge"), 5, LifecycleState::Rising);
        let small = narrative("Dogecoin", Some("price surge"), 2, LifecycleState::Hot);
        let big_id = big.id;

        let (survivor, loser) = select_survivor(big, small);
        assert_eq!(survivor.id, big_id);
        assert_eq!(loser.article_count, 2);
    }

    #[test]
    fn equal_size_tie_breaks_on_lifecycle_rank() {
        let hot = narrative("Dogecoin", Some("price surge"), 2, LifecycleState::Hot);
        let emerging = narrative("Dogecoin", Some("price surge"), 2, LifecycleState::Emerging);
        let hot_id = hot.id;

        let (survivor, _) = select_survivor(emerging, hot);
        assert_eq!(survivor.id, hot_id);
    }

    #[test]
    fn merge_unions_articles_and_dedups() {
        let mut a = narrative("Bitcoin", Some("price surge"), 2, LifecycleState::Hot);
        let mut b = narrative("Bitcoin", Some("price surge"), 2, LifecycleState::Rising);
        // One shared article.
        b.article_ids[0] = a.article_ids[0];

        a.avg_sentiment = 0.8;
        b.avg_sentiment = 0.2;

        let merged = merge_narratives(a, &b);
        assert_eq!(merged.article_ids.len(), 3);
        assert_eq!(merged.article_count, 3);
        // Weighted by pre-merge counts: (0.8*2 + 0.2*2) / 4 = 0.5.
        assert!((merged.avg_sentiment - 0.5).abs() < 1e-9);
    }

    #[test]
    fn merge_keeps_most_advanced_state() {
        let rising = narrative("Dogecoin", Some("price surge"), 3, LifecycleState::Rising);
        let hot = narrative("Dogecoin", Some("price surge"), 1, LifecycleState::Hot);

        let (survivor, loser) = select_survivor(rising, hot);
        let merged = merge_narratives(survivor, &loser);
        assert_eq!(merged.lifecycle_state, LifecycleState::Hot);
    }

    #[test]
    fn timelines_merge_per_utc_date() {
        let a = vec![
            TimelineSnapshot { date: "2026-01-05".into(), article_count: 2, entities: vec!["Solana".into()], velocity: 1.5 },
            TimelineSnapshot { date: "2026-01-06".into(), article_count: 1, entities: vec!["Solana".into()], velocity: 0.5 },
        ];
        let b = vec![
            TimelineSnapshot { date: "2026-01-06".into(), article_count: 1, entities: vec!["Validators".into()], velocity: 0.8 },
            TimelineSnapshot { date: "2026-01-07".into(), article_count: 2, entities: vec!["Solana".into()], velocity: 2.0 },
        ];

        let merged = merge_timelines(&a, &b);
        assert_eq!(merged.len(), 3);

        let jan6 = merged.iter().find(|s| s.date == "2026-01-06").unwrap();
        assert_eq!(jan6.article_count, 2);
        assert!((jan6.velocity - 1.3).abs() < 1e-9);
        assert_eq!(jan6.entities.len(), 2);
    }

    #[test]
    fn weighted_sentiment_handles_empty() {
        assert_eq!(weighted_sentiment(0.5, 0, 0.5, 0), 0.0);
        assert!((weighted_sentiment(0.8, 2, 0.2, 1) - 0.6).abs() < 1e-9);
    }
}
