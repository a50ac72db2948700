//! Narrative fingerprints and their similarity metric.
//!
//! A fingerprint digests a cluster or narrative into the fields that matter
//! for identity: nucleus entity, a short focus label, and the top actors,
//! actions, and entities. Similarity is a weighted sum in [0, 1], symmetric
//! by construction.

use std::collections::HashSet;
use std::hash::Hash;

use chainpulse_common::Fingerprint;

/// Weights when both fingerprints carry a focus label.
const FOCUS_WEIGHT: f64 = 0.5;
const NUCLEUS_WEIGHT: f64 = 0.3;
const OVERLAP_WEIGHT: f64 = 0.2;

/// Redistributed weights when either side lacks a focus label.
const NUCLEUS_WEIGHT_NO_FOCUS: f64 = 0.6;
const OVERLAP_WEIGHT_NO_FOCUS: f64 = 0.4;

/// Bounds on the fingerprint's actor and action lists.
const MAX_TOP_ACTORS: usize = 10;
const MAX_KEY_ACTIONS: usize = 5;

pub fn jaccard<T: Eq + Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

/// Compute a fingerprint from a cluster's aggregated fields: the most
/// frequent nucleus, salience-ranked actors, deduplicated actions, and the
/// dominant tension as the focus label.
pub fn compute_fingerprint(
    nucleus_counts: &[(String, usize)],
    actor_salience: &[(String, f64)],
    actions: &[String],
    tensions: &[(String, usize)],
) -> Fingerprint {
    let nucleus_entity = nucleus_counts
        .iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(n, _)| n.clone())
        .unwrap_or_default();

    let mut ranked_actors: Vec<(String, f64)> = actor_salience.to_vec();
    ranked_actors.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    let top_actors: Vec<String> = ranked_actors
        .iter()
        .take(MAX_TOP_ACTORS)
        .map(|(a, _)| a.clone())
        .collect();

    let mut key_actions: Vec<String> = Vec::new();
    for action in actions {
        if !key_actions.contains(action) {
            key_actions.push(action.clone());
        }
        if key_actions.len() >= MAX_KEY_ACTIONS {
            break;
        }
    }

    let narrative_focus = tensions
        .iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(t, _)| focus_label(t));

    let key_entities: Vec<String> = ranked_actors.iter().map(|(a, _)| a.clone()).collect();

    Fingerprint {
        nucleus_entity,
        narrative_focus,
        top_actors,
        key_actions,
        key_entities,
    }
}

/// Canonical focus label: lowercase, whitespace collapsed to underscores.
fn focus_label(tension: &str) -> String {
    tension
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Weighted similarity between two fingerprints.
///
/// focus match 0.5 + nucleus match 0.3 + actor/entity Jaccard 0.2; when
/// either fingerprint has no focus the weights redistribute to nucleus 0.6,
/// Jaccard 0.4. Symmetric and idempotent.
pub fn fingerprint_similarity(a: &Fingerprint, b: &Fingerprint) -> f64 {
    let has_focus = matches!(
        (&a.narrative_focus, &b.narrative_focus),
        (Some(fa), Some(fb)) if !fa.is_empty() && !fb.is_empty()
    );

    let (nucleus_weight, overlap_weight) = if has_focus {
        (NUCLEUS_WEIGHT, OVERLAP_WEIGHT)
    } else {
        (NUCLEUS_WEIGHT_NO_FOCUS, OVERLAP_WEIGHT_NO_FOCUS)
    };

    let mut similarity = 0.0;

    if has_focus {
        let fa = a.narrative_focus.as_deref().unwrap_or_default();
        let fb = b.narrative_focus.as_deref().unwrap_or_default();
        if fa.eq_ignore_ascii_case(fb) {
            similarity += FOCUS_WEIGHT;
        }
    }

    if !a.nucleus_entity.is_empty() && a.nucleus_entity == b.nucleus_entity {
        similarity += nucleus_weight;
    }

    let set_a = overlap_set(a);
    let set_b = overlap_set(b);
    similarity += overlap_weight * jaccard(&set_a, &set_b);

    similarity
}

/// Entity set used for the Jaccard term: key_entities when present, falling
/// back to top_actors for fingerprints built before key_entities existed.
fn overlap_set(fingerprint: &Fingerprint) -> HashSet<&str> {
    if !fingerprint.key_entities.is_empty() {
        fingerprint.key_entities.iter().map(String::as_str).collect()
    } else {
        fingerprint.top_actors.iter().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn identical_fingerprints_score_one() {
        let a = fp("SEC", Some("enforcement"), &["SEC", "Binance"]);
        assert!((fingerprint_similarity(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn self_similarity_without_focus_is_still_high() {
        let a = fp("SEC", None, &["SEC", "Binance"]);
        // nucleus 0.6 + jaccard 0.4 = 1.0
        assert!(fingerprint_similarity(&a, &a) >= 0.8);
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = fp("SEC", Some("enforcement"), &["SEC", "Binance", "Coinbase"]);
        let b = fp("Binance", Some("compliance"), &["Binance", "Kraken"]);
        assert_eq!(fingerprint_similarity(&a, &b), fingerprint_similarity(&b, &a));
    }

    #[test]
    fn focus_match_is_case_insensitive() {
        let a = fp("SEC", Some("Enforcement"), &[]);
        let b = fp("SEC", Some("enforcement"), &[]);
        // focus 0.5 + nucleus 0.3 + jaccard 0 = 0.8
        assert!((fingerprint_similarity(&a, &b) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn missing_focus_redistributes_weights() {
        let a = fp("SEC", None, &["SEC", "Binance"]);
        let b = fp("SEC", Some("enforcement"), &["SEC", "Binance"]);
        // nucleus 0.6 + jaccard 0.4 * 1.0 = 1.0
        assert!((fingerprint_similarity(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn partial_actor_overlap_scales_jaccard_term() {
        let a = fp("SEC", Some("enforcement"), &["SEC", "Binance", "Coinbase"]);
        let b = fp("SEC", Some("enforcement"), &["SEC", "Ripple"]);
        // focus 0.5 + nucleus 0.3 + 0.2 * (1/4) = 0.85
        assert!((fingerprint_similarity(&a, &b) - 0.85).abs() < 1e-9);
    }

    #[test]
    fn jaccard_edge_cases() {
        let empty: HashSet<&str> = HashSet::new();
        let set: HashSet<&str> = ["a", "b"].into_iter().collect();
        assert_eq!(jaccard(&empty, &empty), 0.0);
        assert_eq!(jaccard(&set, &empty), 0.0);
        assert!((jaccard(&set, &set) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn compute_fingerprint_picks_dominant_nucleus_and_ranks_actors() {
        let fingerprint = compute_fingerprint(
            &[("SEC".into(), 3), ("Binance".into(), 1)],
            &[("Binance".into(), 4.5), ("SEC".into(), 5.0), ("Ripple".into(), 2.0)],
            &["filed lawsuit".into(), "filed lawsuit".into(), "appealed".into()],
            &[("Regulation vs Innovation".into(), 2)],
        );

        assert_eq!(fingerprint.nucleus_entity, "SEC");
        assert_eq!(fingerprint.top_actors[0], "SEC");
        assert_eq!(fingerprint.top_actors[1], "Binance");
        assert_eq!(
            fingerprint.key_actions,
            vec!["filed lawsuit".to_string(), "appealed".to_string()]
        );
        assert_eq!(
            fingerprint.narrative_focus.as_deref(),
            Some("regulation_vs_innovation")
        );
    }

    #[test]
    fn compute_fingerprint_with_no_tensions_has_no_focus() {
        let fingerprint = compute_fingerprint(&[("Bitcoin".into(), 1)], &[], &[], &[]);
        assert!(fingerprint.narrative_focus.is_none());
        assert!(fingerprint.top_actors.is_empty());
    }
}
