//! Matching freshly formed clusters against existing narratives, including
//! the stricter reactivation path for dormant stories.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use chainpulse_common::{Fingerprint, LifecycleState, Narrative};
use chainpulse_store::Store;

use crate::fingerprint::fingerprint_similarity;
use crate::lifecycle::{grace_period_days, update_lifecycle_history};

/// Nuclei that must never anchor a narrative (promotional sources that leak
/// into extraction).
pub const NUCLEUS_BLACKLIST: &[&str] = &["Benzinga", "Sarah Edwards"];

/// Matching thresholds: narratives updated within the last 48 h accept a
/// looser match than older ones.
const RECENT_MATCH_THRESHOLD: f64 = 0.5;
const OLDER_MATCH_THRESHOLD: f64 = 0.6;
const RECENT_WINDOW_HOURS: i64 = 48;

/// Reactivating a dormant narrative demands a much stronger match.
const REACTIVATION_SIMILARITY_THRESHOLD: f64 = 0.8;

pub fn is_blacklisted_nucleus(nucleus: &str) -> bool {
    NUCLEUS_BLACKLIST.contains(&nucleus)
}

/// Pick the best-matching candidate under the adaptive threshold scheme.
///
/// Each candidate is judged against *its own* threshold: 0.5 when
/// last_updated is within the last 48 hours (strictly), 0.6 otherwise.
/// Returns the highest-similarity candidate that clears its bar.
pub fn find_best_match<'a>(
    fingerprint: &Fingerprint,
    candidates: &'a [Narrative],
    now: DateTime<Utc>,
) -> Option<(&'a Narrative, f64)> {
    let recent_cutoff = now - Duration::hours(RECENT_WINDOW_HOURS);

    let mut best: Option<(&Narrative, f64)> = None;
    for candidate in candidates {
        let similarity = fingerprint_similarity(fingerprint, &candidate.fingerprint);
        let threshold = if candidate.last_updated > recent_cutoff {
            RECENT_MATCH_THRESHOLD
        } else {
            OLDER_MATCH_THRESHOLD
        };

        debug!(
            narrative = candidate.title.as_str(),
            similarity,
            threshold,
            "match candidate evaluated"
        );

        if similarity >= threshold && best.map_or(true, |(_, s)| similarity > s) {
            best = Some((candidate, similarity));
        }
    }

    best
}

/// Pick the dormant narrative to reactivate, if any: candidates must have
/// gone dormant within the reactivation window (strictly newer than the
/// cutoff) and match the cluster fingerprint at >= 0.80. Ties resolve to
/// the highest similarity.
pub fn select_reactivation_candidate<'a>(
    fingerprint: &Fingerprint,
    dormant: &'a [Narrative],
    now: DateTime<Utc>,
    window_days: i64,
) -> Option<(&'a Narrative, f64)> {
    let cutoff = now - Duration::days(window_days);

    let mut best: Option<(&Narrative, f64)> = None;
    for candidate in dormant {
        let Some(dormant_since) = candidate.dormant_since else {
            continue;
        };
        if dormant_since <= cutoff {
            continue;
        }

        let similarity = fingerprint_similarity(fingerprint, &candidate.fingerprint);
        if similarity >= REACTIVATION_SIMILARITY_THRESHOLD
            && best.map_or(true, |(_, s)| similarity > s)
        {
            best = Some((candidate, similarity));
        }
    }

    best
}

pub struct NarrativeMatcher {
    store: Store,
    reactivation_window_days: i64,
}

impl NarrativeMatcher {
    pub fn new(store: Store, reactivation_window_days: i64) -> Self {
        Self {
            store,
            reactivation_window_days,
        }
    }

    /// Find an existing narrative for a cluster fingerprint. The search
    /// window adapts to the cluster's velocity via the grace period.
    pub async fn find_match(
        &self,
        fingerprint: &Fingerprint,
        cluster_velocity: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<Narrative>> {
        let grace_days = grace_period_days(cluster_velocity);
        let cutoff = now - Duration::days(grace_days);

        let candidates = self.store.matchable_narratives(cutoff).await?;
        if candidates.is_empty() {
            debug!(grace_days, "no candidate narratives in window");
            return Ok(None);
        }

        match find_best_match(fingerprint, &candidates, now) {
            Some((narrative, similarity)) => {
                info!(
                    title = narrative.title.as_str(),
                    similarity, "matched cluster to existing narrative"
                );
                Ok(Some(narrative.clone()))
            }
            None => Ok(None),
        }
    }

    /// Decide whether a would-be new narrative should instead reactivate a
    /// dormant one with the same nucleus.
    pub async fn find_reactivation_target(
        &self,
        fingerprint: &Fingerprint,
        now: DateTime<Utc>,
    ) -> Result<Option<Narrative>> {
        if fingerprint.nucleus_entity.is_empty() {
            return Ok(None);
        }

        let cutoff = now - Duration::days(self.reactivation_window_days);
        let dormant = self
            .store
            .dormant_candidates(&fingerprint.nucleus_entity, cutoff)
            .await?;

        Ok(
            select_reactivation_candidate(fingerprint, &dormant, now, self.reactivation_window_days)
                .map(|(n, _)| n.clone()),
        )
    }

    /// Reactivate a dormant narrative with a cluster's articles: union the
    /// memberships, fold in sentiment weighted by article counts, move the
    /// lifecycle to reactivated with full resurrection bookkeeping, and
    /// clear dormancy.
    pub async fn reactivate(
        &self,
        mut narrative: Narrative,
        cluster_article_ids: Vec<uuid::Uuid>,
        cluster_sentiment: f64,
        mention_velocity: f64,
        now: DateTime<Utc>,
    ) -> Result<Narrative> {
        let previous_count = narrative.article_count.max(0);
        let new_ids: Vec<uuid::Uuid> = cluster_article_ids
            .into_iter()
            .filter(|id| !narrative.article_ids.contains(id))
            .collect();
        let added = new_ids.len() as i64;
        narrative.article_ids.extend(new_ids);
        narrative.article_count = narrative.article_ids.len() as i64;

        if previous_count + added > 0 {
            narrative.avg_sentiment = (narrative.avg_sentiment * previous_count as f64
                + cluster_sentiment * added as f64)
                / (previous_count + added) as f64;
        }

        narrative.lifecycle_state = LifecycleState::Reactivated;
        let resurrection = update_lifecycle_history(
            &mut narrative.lifecycle_history,
            narrative.reawakening_count,
            LifecycleState::Reactivated,
            narrative.article_count,
            mention_velocity,
            now,
        );
        if let Some(resurrection) = resurrection {
            narrative.reawakening_count = resurrection.reawakening_count;
            narrative.reawakened_from = resurrection.reawakened_from;
            narrative.resurrection_velocity = Some(resurrection.resurrection_velocity);
        }

        narrative.dormant_since = None;
        narrative.reactivated_count += 1;
        narrative.mention_velocity = mention_velocity;
        narrative.needs_summary_update = added > 0;
        narrative.last_updated = now;

        self.store.upsert_narrative(&mut narrative).await?;
        info!(
            title = narrative.title.as_str(),
            reactivated_count = narrative.reactivated_count,
            "narrative reactivated"
        );
        Ok(narrative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainpulse_common::Fingerprint;

    fn narrative(
        nucleus: &str,
        focus: Option<&str>,
        actors: &[&str],
        last_updated_hours_ago: i64,
        state: LifecycleState,
        dormant_days_ago: Option<i64>,
    ) -> Narrative {
        let now = Utc::now();
        Narrative {
            id: uuid::Uuid::new_v4(),
            nucleus_entity: nucleus.to_string(),
            title: format!("{nucleus} narrative"),
            summary: String::new(),
            entities: actors.iter().map(|s| s.to_string()).collect(),
            article_ids: vec![uuid::Uuid::new_v4()],
            article_count: 1,
            mention_velocity: 1.0,
            avg_sentiment: 0.0,
            momentum: chainpulse_common::Momentum::Unknown,
            recency_score: 0.5,
            entity_relationships: vec![],
            lifecycle_state: state,
            lifecycle_history: vec![],
            fingerprint: Fingerprint {
                nucleus_entity: nucleus.to_string(),
                narrative_focus: focus.map(str::to_string),
                top_actors: actors.iter().map(|s| s.to_string()).collect(),
                key_actions: vec![],
                key_entities: actors.iter().map(|s| s.to_string()).collect(),
            },
            first_seen: now - Duration::days(30),
            last_updated: now - Duration::hours(last_updated_hours_ago),
            timeline_data: vec![],
            peak_activity: None,
            days_active: 30,
            reawakening_count: 0,
            reawakened_from: None,
            resurrection_velocity: None,
            dormant_since: dormant_days_ago.map(|d| now - Duration::days(d)),
            reactivated_count: 0,
            merged_into: None,
            needs_summary_update: false,
        }
    }

    fn fp(nucleus: &str, focus: Option<&str>, actors: &[&str]) -> Fingerprint {
        Fingerprint {
            nucleus_entity: nucleus.to_string(),
            narrative_focus: focus.map(str::to_string),
            top_actors: actors.iter().map(|s| s.to_string()).collect(),
            key_actions: vec![],
            key_entities: actors.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn recent_candidate_matches_at_half() {
        let candidate = narrative(
            "Binance",
            None,
            &["SEC", "Binance", "Coinbase", "Kraken", "Gemini", "OKX", "Bybit", "Huobi"],
            12,
            LifecycleState::Hot,
            None,
        );
        let fingerprint = fp("Binance", None, &["Binance", "SEC"]);
        let (matched, similarity) =
            find_best_match(&fingerprint, std::slice::from_ref(&candidate), Utc::now()).unwrap();
        assert_eq!(matched.nucleus_entity, "Binance");
        // nucleus 0.6 + 0.4 * (2/8) = 0.7 >= 0.5 (recent threshold).
        assert!((similarity - 0.7).abs() < 1e-9);
    }

    #[test]
    fn same_similarity_passes_recent_but_not_old() {
        // focus match 0.5 + jaccard 0.2 * (1/4) = 0.55 with nucleus mismatch.
        let actors_a = ["SEC", "Binance", "Coinbase", "Kraken"];
        let actors_b = ["SEC"];
        let recent = narrative("Binance", Some("enforcement"), &actors_a, 12, LifecycleState::Hot, None);
        let old = narrative("Binance", Some("enforcement"), &actors_a, 24 * 10, LifecycleState::Cooling, None);
        let fingerprint = fp("SEC", Some("enforcement"), &actors_b);

        let sim = fingerprint_similarity(&fingerprint, &recent.fingerprint);
        assert!((sim - 0.55).abs() < 1e-9);

        assert!(find_best_match(&fingerprint, std::slice::from_ref(&recent), Utc::now()).is_some());
        assert!(find_best_match(&fingerprint, std::slice::from_ref(&old), Utc::now()).is_none());
    }

    #[test]
    fn candidate_exactly_48h_old_uses_strict_threshold() {
        let now = Utc::now();
        let mut candidate = narrative("SEC", Some("enforcement"), &["SEC", "B", "C", "D"], 0, LifecycleState::Hot, None);
        candidate.last_updated = now - Duration::hours(48);

        // Similarity 0.55 as above: passes 0.5 but not 0.6.
        let fingerprint = fp("CFTC", Some("enforcement"), &["SEC"]);
        let sim = fingerprint_similarity(&fingerprint, &candidate.fingerprint);
        assert!((sim - 0.55).abs() < 1e-9);

        assert!(find_best_match(&fingerprint, std::slice::from_ref(&candidate), now).is_none());
    }

    #[test]
    fn best_of_multiple_matches_wins() {
        let weak = narrative("SEC", None, &["SEC", "Ripple"], 12, LifecycleState::Hot, None);
        let strong = narrative("SEC", None, &["SEC", "Binance"], 12, LifecycleState::Rising, None);
        let fingerprint = fp("SEC", None, &["SEC", "Binance"]);

        let candidates = [weak, strong];
        let (matched, _) =
            find_best_match(&fingerprint, &candidates, Utc::now()).unwrap();
        assert_eq!(matched.lifecycle_state, LifecycleState::Rising);
    }

    #[test]
    fn reactivation_requires_point_eight() {
        let now = Utc::now();
        // Same nucleus and focus: 0.3 + 0.5 = 0.8 exactly (jaccard 0).
        let dormant = narrative(
            "BlackRock",
            Some("institutional_adoption"),
            &["BlackRock", "Fidelity"],
            24 * 6,
            LifecycleState::Dormant,
            Some(5),
        );
        let fingerprint = fp("BlackRock", Some("institutional_adoption"), &["Vanguard"]);

        let selected =
            select_reactivation_candidate(&fingerprint, std::slice::from_ref(&dormant), now, 30);
        assert!(selected.is_some());

        // Focus mismatch drops below 0.8.
        let weaker = fp("BlackRock", Some("etf_flows"), &["Vanguard"]);
        assert!(
            select_reactivation_candidate(&weaker, std::slice::from_ref(&dormant), now, 30).is_none()
        );
    }

    #[test]
    fn dormant_exactly_thirty_days_is_not_eligible() {
        let now = Utc::now();
        let mut dormant = narrative(
            "BlackRock",
            Some("institutional_adoption"),
            &["BlackRock"],
            24 * 20,
            LifecycleState::Dormant,
            None,
        );
        dormant.dormant_since = Some(now - Duration::days(30));

        let fingerprint = fp("BlackRock", Some("institutional_adoption"), &["BlackRock"]);
        assert!(
            select_reactivation_candidate(&fingerprint, std::slice::from_ref(&dormant), now, 30)
                .is_none()
        );

        dormant.dormant_since = Some(now - Duration::days(29));
        assert!(
            select_reactivation_candidate(&fingerprint, std::slice::from_ref(&dormant), now, 30)
                .is_some()
        );
    }

    #[test]
    fn reactivation_picks_highest_similarity() {
        let now = Utc::now();
        let close = narrative(
            "BlackRock",
            Some("institutional_adoption"),
            &["BlackRock", "Fidelity"],
            24 * 6,
            LifecycleState::Dormant,
            Some(5),
        );
        let exact = narrative(
            "BlackRock",
            Some("institutional_adoption"),
            &["BlackRock", "Vanguard"],
            24 * 6,
            LifecycleState::Dormant,
            Some(4),
        );
        let fingerprint = fp("BlackRock", Some("institutional_adoption"), &["BlackRock", "Vanguard"]);

        let candidates = [close, exact];
        let (selected, similarity) =
            select_reactivation_candidate(&fingerprint, &candidates, now, 30).unwrap();
        assert!((similarity - 1.0).abs() < 1e-9);
        assert!(selected.fingerprint.top_actors.contains(&"Vanguard".to_string()));
    }

    #[test]
    fn blacklisted_nuclei_are_rejected() {
        assert!(is_blacklisted_nucleus("Benzinga"));
        assert!(!is_blacklisted_nucleus("SEC"));
    }
}
