//! Narrative lifecycle: state classification, history bookkeeping,
//! resurrection tracking, and the activity metrics that feed them.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use chainpulse_common::{LifecycleEntry, LifecycleState, Momentum};

/// Days without updates before a narrative cools, then goes dormant.
const COOLING_DAYS: f64 = 3.0;
pub const DEFAULT_DORMANT_DAYS: f64 = 7.0;

/// Hot thresholds.
const HOT_ARTICLE_COUNT: i64 = 7;
const HOT_VELOCITY: f64 = 3.0;
/// Rising threshold.
const RISING_VELOCITY: f64 = 1.5;

/// Sustained reactivation needs at least this many articles in 48 h.
const REACTIVATION_48H_ARTICLES: f64 = 4.0;

/// Momentum ratio bounds.
const MOMENTUM_GROWING_RATIO: f64 = 1.3;
const MOMENTUM_DECLINING_RATIO: f64 = 0.7;

/// Classification inputs for one narrative.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleInputs {
    pub article_count: i64,
    /// Articles/day over the recent window.
    pub mention_velocity: f64,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Last state in lifecycle_history, if any.
    pub previous_state: Option<LifecycleState>,
}

/// Deterministic lifecycle classification, rules evaluated in order.
///
/// Recent activity over 24 h / 48 h is estimated from `mention_velocity`
/// (articles/day, so ×1 and ×2). Reactivation takes precedence over echo:
/// echo is a brief pulse on a dormant narrative, never a sustained return.
pub fn determine_lifecycle_state(
    inputs: &LifecycleInputs,
    now: DateTime<Utc>,
    dormant_days_threshold: f64,
) -> LifecycleState {
    let days_since_update = (now - inputs.last_updated).num_seconds() as f64 / 86_400.0;

    let articles_last_24h = inputs.mention_velocity;
    let articles_last_48h = inputs.mention_velocity * 2.0;

    if matches!(
        inputs.previous_state,
        Some(LifecycleState::Echo) | Some(LifecycleState::Dormant)
    ) && articles_last_48h >= REACTIVATION_48H_ARTICLES
    {
        return LifecycleState::Reactivated;
    }

    if inputs.previous_state == Some(LifecycleState::Dormant)
        && (1.0..=3.0).contains(&articles_last_24h)
        && articles_last_48h < REACTIVATION_48H_ARTICLES
    {
        return LifecycleState::Echo;
    }

    if days_since_update >= dormant_days_threshold {
        return LifecycleState::Dormant;
    }
    if days_since_update >= COOLING_DAYS {
        return LifecycleState::Cooling;
    }

    if inputs.article_count >= HOT_ARTICLE_COUNT || inputs.mention_velocity >= HOT_VELOCITY {
        return LifecycleState::Hot;
    }

    if inputs.mention_velocity >= RISING_VELOCITY && inputs.article_count < HOT_ARTICLE_COUNT {
        return LifecycleState::Rising;
    }

    // Small or slow narratives default to emerging.
    LifecycleState::Emerging
}

/// Resurrection bookkeeping produced when a narrative transitions into
/// the reactivated state.
#[derive(Debug, Clone, PartialEq)]
pub struct Resurrection {
    pub reawakening_count: i64,
    /// Timestamp of the most recent dormant/echo history entry.
    pub reawakened_from: Option<DateTime<Utc>>,
    /// Articles-in-48h proxy: velocity × 2.
    pub resurrection_velocity: f64,
}

/// Append a history entry when the state changed (or history is empty).
/// History is append-only and never truncated. Returns resurrection fields
/// when the transition lands on `reactivated`.
pub fn update_lifecycle_history(
    history: &mut Vec<LifecycleEntry>,
    prior_reawakening_count: i64,
    state: LifecycleState,
    article_count: i64,
    mention_velocity: f64,
    now: DateTime<Utc>,
) -> Option<Resurrection> {
    let last_state = history.last().map(|e| e.state);
    if last_state == Some(state) {
        return None;
    }

    let resurrection = if state == LifecycleState::Reactivated && last_state.is_some() {
        let reawakened_from = history
            .iter()
            .rev()
            .find(|e| matches!(e.state, LifecycleState::Dormant | LifecycleState::Echo))
            .map(|e| e.timestamp);
        let resurrection = Resurrection {
            reawakening_count: prior_reawakening_count + 1,
            reawakened_from,
            resurrection_velocity: mention_velocity * 2.0,
        };
        info!(
            count = resurrection.reawakening_count,
            velocity = resurrection.resurrection_velocity,
            "narrative resurrection detected"
        );
        Some(resurrection)
    } else {
        None
    };

    history.push(LifecycleEntry {
        state,
        timestamp: now,
        article_count,
        mention_velocity,
    });
    debug!(state = %state, article_count, "lifecycle history entry appended");

    resurrection
}

/// Adaptive matching window in days, inversely proportional to velocity:
/// clamp(14 / max(velocity, 0.5), 7, 30). Fast stories expire quickly;
/// slow stories hold a longer window open.
pub fn grace_period_days(mention_velocity: f64) -> i64 {
    ((14.0 / mention_velocity.max(0.5)) as i64).clamp(7, 30)
}

/// Articles/day over the last `lookback_days`, always against the full
/// window so the measure is comparable across narratives.
pub fn recent_velocity(
    article_dates: &[DateTime<Utc>],
    lookback_days: i64,
    now: DateTime<Utc>,
) -> f64 {
    if article_dates.is_empty() || lookback_days <= 0 {
        return 0.0;
    }
    let cutoff = now - Duration::days(lookback_days);
    let recent = article_dates.iter().filter(|d| **d >= cutoff).count();
    recent as f64 / lookback_days as f64
}

/// Momentum from publication dates (must be sorted ascending): split at the
/// midpoint, compare per-hour velocities of the halves.
pub fn momentum(article_dates: &[DateTime<Utc>]) -> Momentum {
    if article_dates.len() < 3 {
        return Momentum::Unknown;
    }

    let midpoint = article_dates.len() / 2;
    let older = &article_dates[..midpoint];
    let recent = &article_dates[midpoint..];

    let span_hours = |dates: &[DateTime<Utc>]| -> f64 {
        let span = (*dates.last().expect("non-empty") - dates[0]).num_seconds() as f64 / 3600.0;
        span.max(1.0)
    };

    let older_velocity = older.len() as f64 / span_hours(older);
    let recent_velocity = recent.len() as f64 / span_hours(recent);

    let change = if older_velocity > 0.0 {
        recent_velocity / older_velocity
    } else {
        1.0
    };

    if change >= MOMENTUM_GROWING_RATIO {
        Momentum::Growing
    } else if change <= MOMENTUM_DECLINING_RATIO {
        Momentum::Declining
    } else {
        Momentum::Stable
    }
}

/// Freshness in [0, 1]: exp(−hours_since_newest / 24), a 24-hour half-life
/// style decay of the newest member article.
pub fn recency_score(newest_article: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match newest_article {
        Some(newest) => {
            let hours = (now - newest).num_seconds() as f64 / 3600.0;
            (-hours.max(0.0) / 24.0).exp()
        }
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hours_ago: i64) -> DateTime<Utc> {
        Utc::now() - Duration::hours(hours_ago)
    }

    fn inputs(
        article_count: i64,
        velocity: f64,
        days_since_update: i64,
        previous_state: Option<LifecycleState>,
    ) -> LifecycleInputs {
        LifecycleInputs {
            article_count,
            mention_velocity: velocity,
            first_seen: at(24 * 30),
            last_updated: at(24 * days_since_update),
            previous_state,
        }
    }

    fn classify(i: &LifecycleInputs) -> LifecycleState {
        determine_lifecycle_state(i, Utc::now(), DEFAULT_DORMANT_DAYS)
    }

    #[test]
    fn dormant_with_sustained_activity_reactivates() {
        // velocity 2.0 -> 4 articles in 48h, the reactivation bar.
        let state = classify(&inputs(10, 2.0, 0, Some(LifecycleState::Dormant)));
        assert_eq!(state, LifecycleState::Reactivated);
    }

    #[test]
    fn echo_also_reactivates_on_sustained_activity() {
        let state = classify(&inputs(10, 2.5, 0, Some(LifecycleState::Echo)));
        assert_eq!(state, LifecycleState::Reactivated);
    }

    #[test]
    fn dormant_with_light_pulse_echoes() {
        // velocity 1.5 -> 1.5 articles/24h in [1,3], 3 in 48h < 4.
        let state = classify(&inputs(10, 1.5, 0, Some(LifecycleState::Dormant)));
        assert_eq!(state, LifecycleState::Echo);
    }

    #[test]
    fn reactivation_takes_precedence_over_echo() {
        // velocity 2.0 satisfies the echo 24h range but also the 48h bar;
        // reactivated must win.
        let state = classify(&inputs(10, 2.0, 0, Some(LifecycleState::Dormant)));
        assert_eq!(state, LifecycleState::Reactivated);
    }

    #[test]
    fn stale_narratives_go_dormant_then_cool() {
        assert_eq!(classify(&inputs(10, 0.0, 8, None)), LifecycleState::Dormant);
        assert_eq!(classify(&inputs(10, 0.0, 4, None)), LifecycleState::Cooling);
    }

    #[test]
    fn hot_on_article_count_or_velocity() {
        assert_eq!(classify(&inputs(7, 0.5, 0, None)), LifecycleState::Hot);
        assert_eq!(classify(&inputs(3, 3.0, 0, None)), LifecycleState::Hot);
    }

    #[test]
    fn rising_on_moderate_velocity() {
        assert_eq!(classify(&inputs(5, 2.0, 0, None)), LifecycleState::Rising);
    }

    #[test]
    fn small_slow_narratives_emerge() {
        assert_eq!(classify(&inputs(3, 0.5, 0, None)), LifecycleState::Emerging);
        // The 4-6 article, low-velocity fallback is also emerging.
        assert_eq!(classify(&inputs(5, 0.2, 0, None)), LifecycleState::Emerging);
    }

    #[test]
    fn history_appends_only_on_state_change() {
        let mut history = Vec::new();
        update_lifecycle_history(&mut history, 0, LifecycleState::Emerging, 3, 1.0, Utc::now());
        assert_eq!(history.len(), 1);

        update_lifecycle_history(&mut history, 0, LifecycleState::Emerging, 4, 1.2, Utc::now());
        assert_eq!(history.len(), 1);

        update_lifecycle_history(&mut history, 0, LifecycleState::Rising, 5, 1.8, Utc::now());
        assert_eq!(history.len(), 2);
        assert_eq!(history.last().unwrap().state, LifecycleState::Rising);
    }

    #[test]
    fn reactivation_transition_collects_resurrection_fields() {
        let dormant_at = at(24 * 10);
        let mut history = vec![
            LifecycleEntry {
                state: LifecycleState::Hot,
                timestamp: at(24 * 20),
                article_count: 8,
                mention_velocity: 3.5,
            },
            LifecycleEntry {
                state: LifecycleState::Dormant,
                timestamp: dormant_at,
                article_count: 8,
                mention_velocity: 0.0,
            },
        ];

        let resurrection = update_lifecycle_history(
            &mut history,
            0,
            LifecycleState::Reactivated,
            12,
            2.5,
            Utc::now(),
        )
        .expect("transition into reactivated yields resurrection fields");

        assert_eq!(resurrection.reawakening_count, 1);
        assert_eq!(resurrection.reawakened_from, Some(dormant_at));
        assert!((resurrection.resurrection_velocity - 5.0).abs() < 1e-9);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn grace_period_tracks_velocity() {
        assert_eq!(grace_period_days(3.0), 7);
        assert_eq!(grace_period_days(1.0), 14);
        assert_eq!(grace_period_days(0.3), 28);
        // Extremes clamp into [7, 30].
        assert_eq!(grace_period_days(100.0), 7);
        assert_eq!(grace_period_days(0.0), 28);
    }

    #[test]
    fn recent_velocity_counts_only_the_window() {
        let now = Utc::now();
        let dates = vec![at(24 * 10), at(24 * 2), at(12), at(1)];
        // Three of four articles fall in the last 7 days.
        let v = recent_velocity(&dates, 7, now);
        assert!((v - 3.0 / 7.0).abs() < 1e-9);
        assert_eq!(recent_velocity(&[], 7, now), 0.0);
    }

    #[test]
    fn momentum_needs_three_articles() {
        assert_eq!(momentum(&[at(5), at(1)]), Momentum::Unknown);
    }

    #[test]
    fn accelerating_articles_grow() {
        // Older half spread over days, recent half packed into hours.
        let dates = vec![at(96), at(48), at(3), at(2), at(1)];
        assert_eq!(momentum(&dates), Momentum::Growing);
    }

    #[test]
    fn decelerating_articles_decline() {
        let dates = vec![at(100), at(99), at(98), at(50), at(1)];
        assert_eq!(momentum(&dates), Momentum::Declining);
    }

    #[test]
    fn recency_score_boundaries() {
        let now = Utc::now();
        // T = 0 -> 1.0
        assert!((recency_score(Some(now), now) - 1.0).abs() < 1e-9);
        // T = 24h -> 1/e
        let day_old = recency_score(Some(now - Duration::hours(24)), now);
        assert!((day_old - (-1.0f64).exp()).abs() < 1e-6);
        assert_eq!(recency_score(None, now), 0.0);
    }
}
