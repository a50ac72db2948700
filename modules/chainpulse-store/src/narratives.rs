use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use chainpulse_common::{
    EntityRelationship, Fingerprint, LifecycleEntry, LifecycleState, Momentum, Narrative,
    PeakActivity, TimelineSnapshot,
};
use tracing::warn;

use crate::Store;

#[derive(sqlx::FromRow)]
struct NarrativeRow {
    id: Uuid,
    nucleus_entity: String,
    title: String,
    summary: String,
    entities: Json<Vec<String>>,
    article_ids: Json<Vec<Uuid>>,
    article_count: i64,
    mention_velocity: f64,
    avg_sentiment: f64,
    momentum: String,
    recency_score: f64,
    entity_relationships: Json<Vec<EntityRelationship>>,
    lifecycle_state: String,
    lifecycle_history: Json<Vec<LifecycleEntry>>,
    fingerprint: Json<Fingerprint>,
    first_seen: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    timeline_data: Json<Vec<TimelineSnapshot>>,
    peak_activity: Option<Json<PeakActivity>>,
    days_active: i64,
    reawakening_count: i64,
    reawakened_from: Option<DateTime<Utc>>,
    resurrection_velocity: Option<f64>,
    dormant_since: Option<DateTime<Utc>>,
    reactivated_count: i64,
    merged_into: Option<Uuid>,
    needs_summary_update: bool,
}

impl From<NarrativeRow> for Narrative {
    fn from(row: NarrativeRow) -> Self {
        Narrative {
            id: row.id,
            nucleus_entity: row.nucleus_entity,
            title: row.title,
            summary: row.summary,
            entities: row.entities.0,
            article_ids: row.article_ids.0,
            article_count: row.article_count,
            mention_velocity: row.mention_velocity,
            avg_sentiment: row.avg_sentiment,
            momentum: match row.momentum.as_str() {
                "growing" => Momentum::Growing,
                "declining" => Momentum::Declining,
                "stable" => Momentum::Stable,
                _ => Momentum::Unknown,
            },
            recency_score: row.recency_score,
            entity_relationships: row.entity_relationships.0,
            lifecycle_state: row
                .lifecycle_state
                .parse()
                .unwrap_or(LifecycleState::Emerging),
            lifecycle_history: row.lifecycle_history.0,
            fingerprint: row.fingerprint.0,
            first_seen: row.first_seen,
            last_updated: row.last_updated,
            timeline_data: row.timeline_data.0,
            peak_activity: row.peak_activity.map(|j| j.0),
            days_active: row.days_active,
            reawakening_count: row.reawakening_count,
            reawakened_from: row.reawakened_from,
            resurrection_velocity: row.resurrection_velocity,
            dormant_since: row.dormant_since,
            reactivated_count: row.reactivated_count,
            merged_into: row.merged_into,
            needs_summary_update: row.needs_summary_update,
        }
    }
}

const SELECT_NARRATIVE: &str = "SELECT id, nucleus_entity, title, summary, entities, \
     article_ids, article_count, mention_velocity, avg_sentiment, momentum, recency_score, \
     entity_relationships, lifecycle_state, lifecycle_history, fingerprint, first_seen, \
     last_updated, timeline_data, peak_activity, days_active, reawakening_count, \
     reawakened_from, resurrection_velocity, dormant_since, reactivated_count, merged_into, \
     needs_summary_update FROM narratives";

/// Repair reversed or corrupted timestamps before a write.
///
/// Rules: a first_seen in the future collapses to now (clock corruption);
/// a last_updated earlier than first_seen collapses onto first_seen. Both
/// repairs are logged at warn and never fail the write.
pub fn validate_timestamps(
    narrative_id: Uuid,
    first_seen: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let first_seen = if first_seen > now {
        warn!(
            narrative = %narrative_id,
            %first_seen,
            "first_seen is in the future; resetting to now"
        );
        now
    } else {
        first_seen
    };

    let last_updated = if last_updated < first_seen {
        warn!(
            narrative = %narrative_id,
            %last_updated,
            %first_seen,
            "last_updated precedes first_seen; clamping to first_seen"
        );
        first_seen
    } else {
        last_updated
    };

    (first_seen, last_updated)
}

/// Apply today's snapshot to timeline data: overwrite an existing entry for
/// the same UTC date, append otherwise.
pub fn apply_timeline_snapshot(timeline: &mut Vec<TimelineSnapshot>, snapshot: TimelineSnapshot) {
    match timeline.iter_mut().find(|s| s.date == snapshot.date) {
        Some(existing) => *existing = snapshot,
        None => timeline.push(snapshot),
    }
}

/// Update peak activity when today's count exceeds the recorded maximum.
pub fn apply_peak_activity(
    peak: &mut Option<PeakActivity>,
    date: &str,
    article_count: i64,
    velocity: f64,
) {
    let current_peak = peak.as_ref().map(|p| p.article_count).unwrap_or(0);
    if article_count > current_peak {
        *peak = Some(PeakActivity {
            date: date.to_string(),
            article_count,
            velocity,
        });
    }
}

/// Days a narrative has been active, counting partial days (minimum 1).
pub fn days_active(first_seen: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - first_seen).num_days().max(0) + 1
}

impl Store {
    /// Write the full narrative document as one upsert.
    ///
    /// Timestamp repair, the daily timeline snapshot, peak activity, and
    /// days_active are applied here so every caller path maintains the same
    /// invariants.
    pub async fn upsert_narrative(&self, narrative: &mut Narrative) -> Result<()> {
        let now = Utc::now();
        let (first_seen, last_updated) =
            validate_timestamps(narrative.id, narrative.first_seen, narrative.last_updated, now);
        narrative.first_seen = first_seen;
        narrative.last_updated = last_updated;
        narrative.article_count = narrative.article_ids.len() as i64;
        narrative.days_active = days_active(narrative.first_seen, now);

        let today = now.date_naive().to_string();
        apply_timeline_snapshot(
            &mut narrative.timeline_data,
            TimelineSnapshot {
                date: today.clone(),
                article_count: narrative.article_count,
                entities: narrative.entities.iter().take(10).cloned().collect(),
                velocity: narrative.mention_velocity,
            },
        );
        apply_peak_activity(
            &mut narrative.peak_activity,
            &today,
            narrative.article_count,
            narrative.mention_velocity,
        );

        self.write_narrative(narrative).await
    }

    /// Raw document write without snapshot/peak maintenance. Used by
    /// consolidation, which merges timelines itself.
    pub async fn write_narrative(&self, narrative: &Narrative) -> Result<()> {
        crate::with_retry("write_narrative", || async {
            sqlx::query(
                "INSERT INTO narratives (
                    id, nucleus_entity, title, summary, entities, article_ids, article_count,
                    mention_velocity, avg_sentiment, momentum, recency_score, entity_relationships,
                    lifecycle_state, lifecycle_history, fingerprint, first_seen, last_updated,
                    timeline_data, peak_activity, days_active, reawakening_count, reawakened_from,
                    resurrection_velocity, dormant_since, reactivated_count, merged_into,
                    needs_summary_update
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                           $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27)
                 ON CONFLICT (id) DO UPDATE SET
                    nucleus_entity = EXCLUDED.nucleus_entity,
                    title = EXCLUDED.title,
                    summary = EXCLUDED.summary,
                    entities = EXCLUDED.entities,
                    article_ids = EXCLUDED.article_ids,
                    article_count = EXCLUDED.article_count,
                    mention_velocity = EXCLUDED.mention_velocity,
                    avg_sentiment = EXCLUDED.avg_sentiment,
                    momentum = EXCLUDED.momentum,
                    recency_score = EXCLUDED.recency_score,
                    entity_relationships = EXCLUDED.entity_relationships,
                    lifecycle_state = EXCLUDED.lifecycle_state,
                    lifecycle_history = EXCLUDED.lifecycle_history,
                    fingerprint = EXCLUDED.fingerprint,
                    first_seen = EXCLUDED.first_seen,
                    last_updated = EXCLUDED.last_updated,
                    timeline_data = EXCLUDED.timeline_data,
                    peak_activity = EXCLUDED.peak_activity,
                    days_active = EXCLUDED.days_active,
                    reawakening_count = EXCLUDED.reawakening_count,
                    reawakened_from = EXCLUDED.reawakened_from,
                    resurrection_velocity = EXCLUDED.resurrection_velocity,
                    dormant_since = EXCLUDED.dormant_since,
                    reactivated_count = EXCLUDED.reactivated_count,
                    merged_into = EXCLUDED.merged_into,
                    needs_summary_update = EXCLUDED.needs_summary_update",
            )
            .bind(narrative.id)
            .bind(&narrative.nucleus_entity)
            .bind(&narrative.title)
            .bind(&narrative.summary)
            .bind(Json(&narrative.entities))
            .bind(Json(&narrative.article_ids))
            .bind(narrative.article_count)
            .bind(narrative.mention_velocity)
            .bind(narrative.avg_sentiment)
            .bind(narrative.momentum.to_string())
            .bind(narrative.recency_score)
            .bind(Json(&narrative.entity_relationships))
            .bind(narrative.lifecycle_state.to_string())
            .bind(Json(&narrative.lifecycle_history))
            .bind(Json(&narrative.fingerprint))
            .bind(narrative.first_seen)
            .bind(narrative.last_updated)
            .bind(Json(&narrative.timeline_data))
            .bind(narrative.peak_activity.as_ref().map(Json))
            .bind(narrative.days_active)
            .bind(narrative.reawakening_count)
            .bind(narrative.reawakened_from)
            .bind(narrative.resurrection_velocity)
            .bind(narrative.dormant_since)
            .bind(narrative.reactivated_count)
            .bind(narrative.merged_into)
            .bind(narrative.needs_summary_update)
            .execute(&self.pool)
            .await
        })
        .await?;

        Ok(())
    }

    /// Version-checked write for consolidation: succeeds only when the row's
    /// last_updated still matches what the caller read. A lost race returns
    /// false and the caller aborts that merge.
    pub async fn write_narrative_versioned(
        &self,
        narrative: &Narrative,
        expected_last_updated: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE narratives SET
                entities = $2, article_ids = $3, article_count = $4, avg_sentiment = $5,
                lifecycle_state = $6, lifecycle_history = $7, timeline_data = $8,
                last_updated = $9
             WHERE id = $1 AND last_updated = $10",
        )
        .bind(narrative.id)
        .bind(Json(&narrative.entities))
        .bind(Json(&narrative.article_ids))
        .bind(narrative.article_count)
        .bind(narrative.avg_sentiment)
        .bind(narrative.lifecycle_state.to_string())
        .bind(Json(&narrative.lifecycle_history))
        .bind(Json(&narrative.timeline_data))
        .bind(narrative.last_updated)
        .bind(expected_last_updated)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_narrative(&self, id: Uuid) -> Result<Option<Narrative>> {
        let row = sqlx::query_as::<_, NarrativeRow>(&format!("{SELECT_NARRATIVE} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Narrative::from))
    }

    /// Active narratives, most recently updated first. Dormant, echo, and
    /// merged narratives are excluded.
    pub async fn active_narratives(
        &self,
        limit: i64,
        offset: i64,
        lifecycle_filter: Option<LifecycleState>,
    ) -> Result<Vec<Narrative>> {
        let states: Vec<String> = match lifecycle_filter {
            Some(state) => vec![state.to_string()],
            None => LifecycleState::ACTIVE.iter().map(|s| s.to_string()).collect(),
        };

        let rows = sqlx::query_as::<_, NarrativeRow>(&format!(
            "{SELECT_NARRATIVE}
             WHERE lifecycle_state = ANY($1) AND merged_into IS NULL
             ORDER BY last_updated DESC
             LIMIT $2 OFFSET $3"
        ))
        .bind(&states)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Narrative::from).collect())
    }

    /// Candidates for cluster matching: recently updated, in the
    /// active-or-dormant set.
    pub async fn matchable_narratives(&self, cutoff: DateTime<Utc>) -> Result<Vec<Narrative>> {
        let states: Vec<String> = LifecycleState::MATCHABLE
            .iter()
            .map(|s| s.to_string())
            .collect();

        let rows = sqlx::query_as::<_, NarrativeRow>(&format!(
            "{SELECT_NARRATIVE}
             WHERE last_updated >= $1 AND lifecycle_state = ANY($2) AND merged_into IS NULL"
        ))
        .bind(cutoff)
        .bind(&states)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Narrative::from).collect())
    }

    /// Dormant narratives for a nucleus entity whose dormancy began after
    /// the cutoff (the reactivation window).
    pub async fn dormant_candidates(
        &self,
        nucleus_entity: &str,
        dormant_cutoff: DateTime<Utc>,
    ) -> Result<Vec<Narrative>> {
        let rows = sqlx::query_as::<_, NarrativeRow>(&format!(
            "{SELECT_NARRATIVE}
             WHERE lifecycle_state = 'dormant'
               AND nucleus_entity = $1
               AND dormant_since IS NOT NULL
               AND dormant_since > $2"
        ))
        .bind(nucleus_entity)
        .bind(dormant_cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Narrative::from).collect())
    }

    /// All active narratives, for the consolidation pass.
    pub async fn narratives_for_consolidation(&self) -> Result<Vec<Narrative>> {
        let states: Vec<String> = LifecycleState::ACTIVE.iter().map(|s| s.to_string()).collect();
        let rows = sqlx::query_as::<_, NarrativeRow>(&format!(
            "{SELECT_NARRATIVE} WHERE lifecycle_state = ANY($1) AND merged_into IS NULL"
        ))
        .bind(&states)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Narrative::from).collect())
    }

    /// Every non-merged narrative, for integrity maintenance.
    pub async fn all_live_narratives(&self) -> Result<Vec<Narrative>> {
        let rows = sqlx::query_as::<_, NarrativeRow>(&format!(
            "{SELECT_NARRATIVE} WHERE merged_into IS NULL"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Narrative::from).collect())
    }

    /// Mark a narrative as consumed by consolidation. Terminal.
    pub async fn mark_narrative_merged(&self, id: Uuid, survivor: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE narratives
             SET lifecycle_state = 'merged', merged_into = $2, last_updated = $3
             WHERE id = $1",
        )
        .bind(id)
        .bind(survivor)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Dormant narratives within the lookback, most recent first.
    pub async fn archived_narratives(&self, limit: i64, cutoff: DateTime<Utc>) -> Result<Vec<Narrative>> {
        let rows = sqlx::query_as::<_, NarrativeRow>(&format!(
            "{SELECT_NARRATIVE}
             WHERE lifecycle_state IN ('dormant', 'echo') AND last_updated >= $1
             ORDER BY last_updated DESC LIMIT $2"
        ))
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Narrative::from).collect())
    }

    /// Narratives that have come back from dormancy at least once.
    pub async fn resurrected_narratives(
        &self,
        limit: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Narrative>> {
        let rows = sqlx::query_as::<_, NarrativeRow>(&format!(
            "{SELECT_NARRATIVE}
             WHERE reawakening_count > 0 AND last_updated >= $1
             ORDER BY last_updated DESC LIMIT $2"
        ))
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Narrative::from).collect())
    }

    pub async fn narrative_timeline(&self, id: Uuid) -> Result<Option<Vec<TimelineSnapshot>>> {
        let row: Option<(Json<Vec<TimelineSnapshot>>,)> =
            sqlx::query_as("SELECT timeline_data FROM narratives WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(json,)| json.0))
    }

    /// Active narrative ids that list the entity among their participants.
    pub async fn narrative_ids_for_entity(&self, entity: &str) -> Result<Vec<Uuid>> {
        let states: Vec<String> = LifecycleState::ACTIVE.iter().map(|s| s.to_string()).collect();
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM narratives
             WHERE lifecycle_state = ANY($1) AND merged_into IS NULL AND entities @> $2",
        )
        .bind(&states)
        .bind(Json(vec![entity]))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Retention: drop narratives whose last_updated fell past the cutoff.
    pub async fn delete_narratives_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM narratives WHERE last_updated < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ts(offset_hours: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-08-01T12:00:00Z").unwrap().with_timezone(&Utc)
            + Duration::hours(offset_hours)
    }

    #[test]
    fn reversed_last_updated_clamps_to_first_seen() {
        let id = Uuid::new_v4();
        let (first, last) = validate_timestamps(id, ts(0), ts(-5), ts(1));
        assert_eq!(first, ts(0));
        assert_eq!(last, ts(0));
    }

    #[test]
    fn future_first_seen_resets_to_now() {
        let id = Uuid::new_v4();
        let (first, last) = validate_timestamps(id, ts(10), ts(12), ts(0));
        assert_eq!(first, ts(0));
        assert_eq!(last, ts(12));
    }

    #[test]
    fn wellformed_timestamps_pass_through() {
        let id = Uuid::new_v4();
        let (first, last) = validate_timestamps(id, ts(-48), ts(-1), ts(0));
        assert_eq!(first, ts(-48));
        assert_eq!(last, ts(-1));
    }

    #[test]
    fn timeline_snapshot_overwrites_same_day() {
        let mut timeline = vec![TimelineSnapshot {
            date: "2026-08-01".into(),
            article_count: 2,
            entities: vec![],
            velocity: 1.0,
        }];
        apply_timeline_snapshot(
            &mut timeline,
            TimelineSnapshot {
                date: "2026-08-01".into(),
                article_count: 5,
                entities: vec!["SEC".into()],
                velocity: 2.5,
            },
        );
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].article_count, 5);

        apply_timeline_snapshot(
            &mut timeline,
            TimelineSnapshot {
                date: "2026-08-02".into(),
                article_count: 1,
                entities: vec![],
                velocity: 0.5,
            },
        );
        assert_eq!(timeline.len(), 2);
    }

    #[test]
    fn peak_activity_only_moves_up() {
        let mut peak = Some(PeakActivity {
            date: "2026-07-30".into(),
            article_count: 6,
            velocity: 3.0,
        });
        apply_peak_activity(&mut peak, "2026-08-01", 4, 2.0);
        assert_eq!(peak.as_ref().unwrap().article_count, 6);

        apply_peak_activity(&mut peak, "2026-08-01", 9, 4.5);
        let peak = peak.unwrap();
        assert_eq!(peak.article_count, 9);
        assert_eq!(peak.date, "2026-08-01");
    }

    #[test]
    fn days_active_counts_partial_days() {
        assert_eq!(days_active(ts(0), ts(0)), 1);
        assert_eq!(days_active(ts(-30), ts(0)), 2);
        assert_eq!(days_active(ts(-24 * 6), ts(0)), 7);
    }
}
