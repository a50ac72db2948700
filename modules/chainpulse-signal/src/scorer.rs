//! Per-entity signal scoring across the 24h / 7d / 30d windows.
//!
//! Components: mention velocity (last hour vs window baseline), source
//! diversity (windowless), and sentiment strength over primary mentions.
//! Scores normalize into [0, 10] against a calibration ceiling of 40.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use chainpulse_common::{SentimentLabel, SentimentStats, SignalScore, Window};
use chainpulse_store::Store;

/// Component weights for the raw score.
const VELOCITY_WEIGHT: f64 = 0.4;
const DIVERSITY_WEIGHT: f64 = 0.3;
const SENTIMENT_SCALE: f64 = 30.0;

/// Calibration ceiling: a raw score of 40 maps to the maximum of 10.
const MAX_EXPECTED_RAW: f64 = 40.0;

/// Mention velocity for one window: last-hour mentions against the
/// window's hourly baseline. With no baseline the last-hour count stands
/// on its own.
pub fn velocity(mentions_last_hour: i64, mentions_window: i64, window_hours: i64) -> f64 {
    if mentions_window == 0 {
        return mentions_last_hour as f64;
    }
    let expected_per_hour = mentions_window as f64 / window_hours as f64;
    if expected_per_hour == 0.0 {
        return mentions_last_hour as f64;
    }
    mentions_last_hour as f64 / expected_per_hour
}

/// Sentiment stats over primary-mention labels mapped to {+1, 0, -1}.
/// Divergence is the population standard deviation.
pub fn sentiment_stats(labels: &[SentimentLabel]) -> SentimentStats {
    if labels.is_empty() {
        return SentimentStats::default();
    }

    let polarities: Vec<f64> = labels.iter().map(|l| l.polarity()).collect();
    let avg = polarities.iter().sum::<f64>() / polarities.len() as f64;
    let min = polarities.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = polarities.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let variance =
        polarities.iter().map(|p| (p - avg).powi(2)).sum::<f64>() / polarities.len() as f64;

    SentimentStats {
        avg,
        min,
        max,
        divergence: variance.sqrt(),
    }
}

/// Composite score in [0, 10].
pub fn signal_score(velocity: f64, source_count: i64, sentiment_avg: f64) -> f64 {
    let raw = velocity * VELOCITY_WEIGHT
        + source_count as f64 * DIVERSITY_WEIGHT
        + sentiment_avg.abs() * SENTIMENT_SCALE;
    (raw / MAX_EXPECTED_RAW * 10.0).min(10.0)
}

/// Freshness of the newest primary mention relative to the window span.
pub fn recency(last_mention: Option<DateTime<Utc>>, now: DateTime<Utc>, window_hours: i64) -> f64 {
    match last_mention {
        Some(ts) => {
            let age_hours = (now - ts).num_minutes() as f64 / 60.0;
            (-age_hours.max(0.0) / window_hours as f64).exp()
        }
        None => 0.0,
    }
}

/// Stats from one scoring cycle.
#[derive(Debug, Default)]
pub struct SignalStats {
    pub entities_scored: u32,
    pub failed: u32,
    pub stale_deleted: u64,
}

impl std::fmt::Display for SignalStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Signal Cycle Complete ===")?;
        writeln!(f, "Entities scored: {}", self.entities_scored)?;
        writeln!(f, "Failed:          {}", self.failed)?;
        writeln!(f, "Stale deleted:   {}", self.stale_deleted)?;
        Ok(())
    }
}

pub struct SignalScorer {
    store: Store,
}

impl SignalScorer {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Score every entity with a primary mention in the last 30 days.
    /// A failing entity is logged and skipped.
    pub async fn run_cycle(&self) -> Result<SignalStats> {
        let mut stats = SignalStats::default();
        let now = Utc::now();

        let entities = self
            .store
            .entities_with_primary_mentions_since(now - Duration::hours(Window::D30.hours()))
            .await?;
        info!(count = entities.len(), "scoring entities");

        for (entity, entity_type) in entities {
            match self.compute_signal(&entity, &entity_type, now).await {
                Ok(signal) => {
                    if let Err(e) = self.store.upsert_signal_score(&signal).await {
                        stats.failed += 1;
                        warn!(entity, error = %e, "signal upsert failed");
                    } else {
                        stats.entities_scored += 1;
                    }
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!(entity, error = %e, "signal computation failed");
                }
            }
        }

        info!("{stats}");
        Ok(stats)
    }

    /// Compute the full multi-window signal for one entity.
    pub async fn compute_signal(
        &self,
        entity: &str,
        entity_type: &str,
        now: DateTime<Utc>,
    ) -> Result<SignalScore> {
        let mentions_last_hour = self
            .store
            .count_primary_mentions_since(entity, now - Duration::hours(1))
            .await?;
        let source_count = self.store.distinct_source_count(entity).await?;
        let sentiments = self.store.primary_mention_sentiments(entity).await?;
        let sentiment = sentiment_stats(&sentiments);
        let last_mention = self.store.latest_primary_mention(entity).await?;

        let mut mentions = [0i64; 3];
        let mut velocities = [0f64; 3];
        let mut scores = [0f64; 3];
        let mut recencies = [0f64; 3];
        for (i, window) in Window::ALL.iter().enumerate() {
            let count = self
                .store
                .count_primary_mentions_since(entity, now - Duration::hours(window.hours()))
                .await?;
            mentions[i] = count;
            velocities[i] = velocity(mentions_last_hour, count, window.hours());
            scores[i] = signal_score(velocities[i], source_count, sentiment.avg);
            recencies[i] = recency(last_mention, now, window.hours());
        }

        let narrative_ids = self.store.narrative_ids_for_entity(entity).await?;
        let is_emerging = narrative_ids.is_empty();

        Ok(SignalScore {
            entity: entity.to_string(),
            entity_type: entity_type.to_string(),
            score_24h: scores[0],
            score_7d: scores[1],
            score_30d: scores[2],
            velocity_24h: velocities[0],
            velocity_7d: velocities[1],
            velocity_30d: velocities[2],
            mentions_24h: mentions[0],
            mentions_7d: mentions[1],
            mentions_30d: mentions[2],
            recency_24h: recencies[0],
            recency_7d: recencies[1],
            recency_30d: recencies[2],
            score: scores[0],
            velocity: velocities[0],
            source_count,
            sentiment,
            narrative_ids,
            is_emerging,
            first_seen: now,
            last_updated: now,
        })
    }

    /// Top-N entities for a window, verified live against entity mentions.
    /// Candidates are oversampled 2× in the store query to absorb the
    /// staleness filtering.
    pub async fn trending(
        &self,
        window: Window,
        limit: usize,
        min_score: f64,
    ) -> Result<Vec<SignalScore>> {
        let candidates = self
            .store
            .trending_candidates(window, limit as i64, min_score)
            .await?;

        let mut results = Vec::with_capacity(limit);
        for signal in candidates {
            if self.store.entity_has_mentions(&signal.entity).await? {
                results.push(signal);
                if results.len() >= limit {
                    break;
                }
            }
        }
        Ok(results)
    }

    /// Delete signal scores whose entity has no remaining mentions.
    pub async fn cleanup_stale(&self) -> Result<u64> {
        let deleted = self.store.delete_stale_signal_scores().await?;
        if deleted > 0 {
            info!(deleted, "removed stale signal scores");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn velocity_is_ratio_of_last_hour_to_window_baseline() {
        // 48 mentions over 24h = 2/hour baseline; 6 in the last hour = 3.0.
        assert!((velocity(6, 48, 24) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn velocity_with_empty_window_is_last_hour_count() {
        assert_eq!(velocity(5, 0, 24), 5.0);
        assert_eq!(velocity(0, 0, 168), 0.0);
    }

    #[test]
    fn sentiment_stats_over_mixed_labels() {
        use SentimentLabel::*;
        let stats = sentiment_stats(&[Positive, Negative, Neutral, Positive]);
        assert!((stats.avg - 0.25).abs() < 1e-9);
        assert_eq!(stats.min, -1.0);
        assert_eq!(stats.max, 1.0);
        // Population stddev of [1, -1, 0, 1] around 0.25.
        let expected = (((0.75f64).powi(2) + (1.25f64).powi(2) + (0.25f64).powi(2)
            + (0.75f64).powi(2))
            / 4.0)
            .sqrt();
        assert!((stats.divergence - expected).abs() < 1e-9);
    }

    #[test]
    fn sentiment_stats_empty_is_zeroed() {
        let stats = sentiment_stats(&[]);
        assert_eq!(stats.avg, 0.0);
        assert_eq!(stats.divergence, 0.0);
    }

    #[test]
    fn score_normalizes_against_calibration_ceiling() {
        // velocity 10, 20 sources, |sentiment| 1.0 -> raw 40 -> exactly 10.
        assert!((signal_score(10.0, 20, 1.0) - 10.0).abs() < 1e-9);
        // Raw above the ceiling clamps.
        assert_eq!(signal_score(100.0, 100, 1.0), 10.0);
        // Sentiment strength counts in both directions.
        assert!((signal_score(0.0, 0, -1.0) - signal_score(0.0, 0, 1.0)).abs() < 1e-12);
    }

    #[test]
    fn score_of_quiet_entity_is_zero() {
        assert_eq!(signal_score(0.0, 0, 0.0), 0.0);
    }

    #[test]
    fn recency_decays_with_mention_age() {
        let now = Utc::now();
        let fresh = recency(Some(now), now, 24);
        let day_old = recency(Some(now - Duration::hours(24)), now, 24);
        assert!((fresh - 1.0).abs() < 1e-6);
        assert!((day_old - (-1.0f64).exp()).abs() < 1e-6);
        assert_eq!(recency(None, now, 24), 0.0);
    }
}
