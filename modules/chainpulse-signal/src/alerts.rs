//! Entity alert detection over fresh signal scores.
//!
//! Three alert shapes: a brand-new entity arriving with a strong score, a
//! velocity spike, and sentiment divergence across sources. Alerts
//! deduplicate against unresolved alerts from the last day.

use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use chainpulse_common::{AlertSeverity, EntityAlert, SignalScore};
use chainpulse_store::Store;

/// New entities need at least this 24h score to alert.
const NEW_ENTITY_MIN_SCORE: f64 = 7.0;
/// Absolute 24h velocity that counts as a spike.
const VELOCITY_SPIKE_THRESHOLD: f64 = 10.0;
/// Sentiment divergence threshold, with a source floor to rule out noise.
const DIVERGENCE_THRESHOLD: f64 = 0.6;
const DIVERGENCE_MIN_SOURCES: i64 = 3;

/// How long an unresolved alert suppresses re-firing.
const DEDUP_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Default)]
pub struct AlertStats {
    pub signals_checked: u32,
    pub alerts_created: u32,
}

impl std::fmt::Display for AlertStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Alert Cycle Complete ===")?;
        writeln!(f, "Signals checked: {}", self.signals_checked)?;
        writeln!(f, "Alerts created:  {}", self.alerts_created)?;
        Ok(())
    }
}

/// A candidate alert derived from one signal score.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertCandidate {
    pub alert_type: &'static str,
    pub severity: AlertSeverity,
    pub details: serde_json::Value,
}

/// Pure detection rules for one signal score.
pub fn detect_for_signal(signal: &SignalScore, now: chrono::DateTime<Utc>) -> Vec<AlertCandidate> {
    let mut alerts = Vec::new();

    let is_new = now - signal.first_seen < Duration::hours(24);
    if is_new && signal.score_24h >= NEW_ENTITY_MIN_SCORE {
        alerts.push(AlertCandidate {
            alert_type: "new_entity",
            severity: AlertSeverity::High,
            details: serde_json::json!({
                "score_24h": signal.score_24h,
                "first_seen": signal.first_seen.to_rfc3339(),
            }),
        });
    }

    if signal.velocity_24h >= VELOCITY_SPIKE_THRESHOLD {
        alerts.push(AlertCandidate {
            alert_type: "velocity_spike",
            severity: AlertSeverity::Medium,
            details: serde_json::json!({
                "velocity_24h": signal.velocity_24h,
                "threshold": VELOCITY_SPIKE_THRESHOLD,
            }),
        });
    }

    if signal.sentiment.divergence >= DIVERGENCE_THRESHOLD
        && signal.source_count >= DIVERGENCE_MIN_SOURCES
    {
        alerts.push(AlertCandidate {
            alert_type: "sentiment_divergence",
            severity: AlertSeverity::Medium,
            details: serde_json::json!({
                "divergence": signal.sentiment.divergence,
                "source_count": signal.source_count,
            }),
        });
    }

    alerts
}

pub struct AlertDetector {
    store: Store,
}

impl AlertDetector {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn run_cycle(&self) -> Result<AlertStats> {
        let mut stats = AlertStats::default();
        let now = Utc::now();

        let signals = self
            .store
            .signals_updated_since(now - Duration::hours(24))
            .await?;

        for signal in &signals {
            stats.signals_checked += 1;
            for candidate in detect_for_signal(signal, now) {
                let already_fired = self
                    .store
                    .alert_exists_since(
                        &signal.entity,
                        candidate.alert_type,
                        now - Duration::hours(DEDUP_WINDOW_HOURS),
                    )
                    .await
                    .unwrap_or(false);
                if already_fired {
                    continue;
                }

                let alert = EntityAlert {
                    id: Uuid::new_v4(),
                    entity: signal.entity.clone(),
                    alert_type: candidate.alert_type.to_string(),
                    severity: candidate.severity,
                    details: candidate.details,
                    resolved: false,
                    created_at: now,
                };
                match self.store.insert_alert(&alert).await {
                    Ok(()) => stats.alerts_created += 1,
                    Err(e) => warn!(entity = signal.entity.as_str(), error = %e, "alert insert failed"),
                }
            }
        }

        if stats.alerts_created > 0 {
            info!("{stats}");
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainpulse_common::SentimentStats;

    fn signal(score_24h: f64, velocity_24h: f64, divergence: f64, source_count: i64, age_hours: i64) -> SignalScore {
        let now = Utc::now();
        SignalScore {
            entity: "TestCoin".into(),
            entity_type: "cryptocurrency".into(),
            score_24h,
            score_7d: 0.0,
            score_30d: 0.0,
            velocity_24h,
            velocity_7d: 0.0,
            velocity_30d: 0.0,
            mentions_24h: 0,
            mentions_7d: 0,
            mentions_30d: 0,
            recency_24h: 0.0,
            recency_7d: 0.0,
            recency_30d: 0.0,
            score: score_24h,
            velocity: velocity_24h,
            source_count,
            sentiment: SentimentStats { avg: 0.0, min: -1.0, max: 1.0, divergence },
            narrative_ids: vec![],
            is_emerging: true,
            first_seen: now - Duration::hours(age_hours),
            last_updated: now,
        }
    }

    #[test]
    fn fresh_high_score_entity_fires_high_severity() {
        let alerts = detect_for_signal(&signal(8.0, 0.0, 0.0, 1, 2), Utc::now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, "new_entity");
        assert_eq!(alerts[0].severity, AlertSeverity::High);
    }

    #[test]
    fn old_entity_does_not_fire_new_entity_alert() {
        let alerts = detect_for_signal(&signal(8.0, 0.0, 0.0, 1, 72), Utc::now());
        assert!(alerts.iter().all(|a| a.alert_type != "new_entity"));
    }

    #[test]
    fn velocity_spike_fires_medium() {
        let alerts = detect_for_signal(&signal(1.0, 12.0, 0.0, 1, 72), Utc::now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, "velocity_spike");
        assert_eq!(alerts[0].severity, AlertSeverity::Medium);
    }

    #[test]
    fn divergence_requires_source_floor() {
        let too_few = detect_for_signal(&signal(1.0, 0.0, 0.9, 2, 72), Utc::now());
        assert!(too_few.is_empty());

        let enough = detect_for_signal(&signal(1.0, 0.0, 0.9, 3, 72), Utc::now());
        assert_eq!(enough.len(), 1);
        assert_eq!(enough[0].alert_type, "sentiment_divergence");
    }

    #[test]
    fn quiet_signal_fires_nothing() {
        assert!(detect_for_signal(&signal(0.5, 0.2, 0.1, 1, 72), Utc::now()).is_empty());
    }
}
