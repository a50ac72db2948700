use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Scoring windows ---

/// Time window for signal scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    #[serde(rename = "24h")]
    H24,
    #[serde(rename = "7d")]
    D7,
    #[serde(rename = "30d")]
    D30,
}

impl Window {
    pub const ALL: [Window; 3] = [Window::H24, Window::D7, Window::D30];

    pub fn hours(&self) -> i64 {
        match self {
            Window::H24 => 24,
            Window::D7 => 7 * 24,
            Window::D30 => 30 * 24,
        }
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Window::H24 => write!(f, "24h"),
            Window::D7 => write!(f, "7d"),
            Window::D30 => write!(f, "30d"),
        }
    }
}

impl std::str::FromStr for Window {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "24h" => Ok(Self::H24),
            "7d" => Ok(Self::D7),
            "30d" => Ok(Self::D30),
            other => Err(format!("unknown Window: {other}")),
        }
    }
}

// --- Sentiment ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    /// Derive the label from a score in [-1, 1]: >= 0.4 positive,
    /// <= -0.4 negative, otherwise neutral.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.4 {
            SentimentLabel::Positive
        } else if score <= -0.4 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    /// Numeric polarity used by signal sentiment stats.
    pub fn polarity(&self) -> f64 {
        match self {
            SentimentLabel::Positive => 1.0,
            SentimentLabel::Neutral => 0.0,
            SentimentLabel::Negative => -1.0,
        }
    }
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SentimentLabel::Positive => write!(f, "positive"),
            SentimentLabel::Neutral => write!(f, "neutral"),
            SentimentLabel::Negative => write!(f, "negative"),
        }
    }
}

impl std::str::FromStr for SentimentLabel {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "positive" => Ok(Self::Positive),
            "neutral" => Ok(Self::Neutral),
            "negative" => Ok(Self::Negative),
            other => Err(format!("unknown SentimentLabel: {other}")),
        }
    }
}

/// Aggregate sentiment metrics for an entity's primary mentions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SentimentStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation of polarities.
    pub divergence: f64,
}

// --- Entities ---

/// Entity types that qualify an extracted entity as *primary*; everything
/// else is context.
pub const PRIMARY_ENTITY_TYPES: &[&str] = &[
    "cryptocurrency",
    "blockchain",
    "protocol",
    "company",
    "organization",
];

pub fn is_primary_entity_type(entity_type: &str) -> bool {
    PRIMARY_ENTITY_TYPES.contains(&entity_type)
}

/// A structured entity attached to an article after enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleEntity {
    pub name: String,
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    pub confidence: f64,
    pub is_primary: bool,
}

/// One row per (article, entity) emission. Created during enrichment;
/// deleted only when its article is deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMention {
    pub id: Uuid,
    pub entity: String,
    pub entity_type: String,
    pub article_id: Uuid,
    pub sentiment: SentimentLabel,
    pub confidence: f64,
    pub is_primary: bool,
    pub source: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

// --- Articles ---

/// Narrative elements extracted from a single article.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NarrativeElements {
    pub nucleus_entity: String,
    pub actors: Vec<String>,
    #[serde(default)]
    pub actor_salience: HashMap<String, f64>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub tensions: Vec<String>,
    #[serde(default)]
    pub implications: String,
    #[serde(default)]
    pub narrative_summary: String,
}

/// An ingested news article. Immutable once ingested except for the
/// enrichment fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    /// Lowercase source label, e.g. "coindesk".
    pub source: String,
    pub url: String,
    pub title: String,
    pub text: String,
    pub published_at: DateTime<Utc>,

    // Enrichment-added fields
    pub relevance_tier: Option<i32>,
    pub relevance_score: Option<f64>,
    pub relevance_reason: Option<String>,
    pub sentiment_score: Option<f64>,
    pub sentiment_label: Option<SentimentLabel>,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub entities: Vec<ArticleEntity>,
    pub narrative_summary: Option<NarrativeElements>,
    /// Denormalized from `narrative_summary` for indexing.
    pub nucleus_entity: Option<String>,
    pub narrative_id: Option<Uuid>,
}

impl Article {
    pub fn actors(&self) -> &[String] {
        self.narrative_summary
            .as_ref()
            .map(|n| n.actors.as_slice())
            .unwrap_or(&[])
    }

    pub fn tensions(&self) -> &[String] {
        self.narrative_summary
            .as_ref()
            .map(|n| n.tensions.as_slice())
            .unwrap_or(&[])
    }

    pub fn actor_salience(&self, actor: &str) -> f64 {
        self.narrative_summary
            .as_ref()
            .and_then(|n| n.actor_salience.get(actor).copied())
            .unwrap_or(0.0)
    }
}

// --- Signal scores ---

/// Per-entity trending signal across the three scoring windows.
/// A score with zero matching entity mentions is stale and must be deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalScore {
    pub entity: String,
    pub entity_type: String,

    pub score_24h: f64,
    pub score_7d: f64,
    pub score_30d: f64,
    pub velocity_24h: f64,
    pub velocity_7d: f64,
    pub velocity_30d: f64,
    pub mentions_24h: i64,
    pub mentions_7d: i64,
    pub mentions_30d: i64,
    pub recency_24h: f64,
    pub recency_7d: f64,
    pub recency_30d: f64,

    // Legacy single-window fields, kept in step with the 24h window.
    pub score: f64,
    pub velocity: f64,

    pub source_count: i64,
    pub sentiment: SentimentStats,
    #[serde(default)]
    pub narrative_ids: Vec<Uuid>,
    /// True iff the entity is not part of any narrative.
    pub is_emerging: bool,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl SignalScore {
    pub fn score_for(&self, window: Window) -> f64 {
        match window {
            Window::H24 => self.score_24h,
            Window::D7 => self.score_7d,
            Window::D30 => self.score_30d,
        }
    }
}

// --- Narratives ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Emerging,
    Rising,
    Hot,
    Cooling,
    Dormant,
    Echo,
    Reactivated,
    /// Terminal; set by consolidation only.
    Merged,
}

impl LifecycleState {
    /// States eligible for narrative matching: everything still alive,
    /// including dormant and echo stories that may come back.
    pub const MATCHABLE: [LifecycleState; 7] = [
        LifecycleState::Emerging,
        LifecycleState::Rising,
        LifecycleState::Hot,
        LifecycleState::Cooling,
        LifecycleState::Dormant,
        LifecycleState::Echo,
        LifecycleState::Reactivated,
    ];

    /// States shown in active queries (dormant/echo belong to the archive).
    pub const ACTIVE: [LifecycleState; 5] = [
        LifecycleState::Emerging,
        LifecycleState::Rising,
        LifecycleState::Hot,
        LifecycleState::Cooling,
        LifecycleState::Reactivated,
    ];

    /// Ordered rank for consolidation survivor tiebreaks:
    /// emerging < rising < hot < cooling < reactivated.
    /// Consolidation only compares active states; the rest rank lowest.
    pub fn rank(&self) -> u8 {
        match self {
            LifecycleState::Emerging => 1,
            LifecycleState::Rising => 2,
            LifecycleState::Hot => 3,
            LifecycleState::Cooling => 4,
            LifecycleState::Reactivated => 5,
            LifecycleState::Dormant
            | LifecycleState::Echo
            | LifecycleState::Merged => 0,
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Emerging => "emerging",
            LifecycleState::Rising => "rising",
            LifecycleState::Hot => "hot",
            LifecycleState::Cooling => "cooling",
            LifecycleState::Dormant => "dormant",
            LifecycleState::Echo => "echo",
            LifecycleState::Reactivated => "reactivated",
            LifecycleState::Merged => "merged",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for LifecycleState {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "emerging" => Ok(Self::Emerging),
            "rising" => Ok(Self::Rising),
            "hot" => Ok(Self::Hot),
            "cooling" => Ok(Self::Cooling),
            "dormant" => Ok(Self::Dormant),
            "echo" => Ok(Self::Echo),
            "reactivated" => Ok(Self::Reactivated),
            "merged" => Ok(Self::Merged),
            other => Err(format!("unknown LifecycleState: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Momentum {
    Growing,
    Declining,
    Stable,
    Unknown,
}

impl std::fmt::Display for Momentum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Momentum::Growing => "growing",
            Momentum::Declining => "declining",
            Momentum::Stable => "stable",
            Momentum::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Similarity-comparable digest of a narrative or cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub nucleus_entity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative_focus: Option<String>,
    #[serde(default)]
    pub top_actors: Vec<String>,
    #[serde(default)]
    pub key_actions: Vec<String>,
    #[serde(default)]
    pub key_entities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEntry {
    pub state: LifecycleState,
    pub timestamp: DateTime<Utc>,
    pub article_count: i64,
    pub mention_velocity: f64,
}

/// One snapshot per UTC day; same-day updates overwrite in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSnapshot {
    /// ISO date, e.g. "2026-08-01".
    pub date: String,
    pub article_count: i64,
    #[serde(default)]
    pub entities: Vec<String>,
    pub velocity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakActivity {
    pub date: String,
    pub article_count: i64,
    pub velocity: f64,
}

/// Top co-occurrence pair among member articles' entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRelationship {
    pub a: String,
    pub b: String,
    pub weight: i64,
}

/// A tracked multi-article story.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Narrative {
    pub id: Uuid,
    pub nucleus_entity: String,
    pub title: String,
    pub summary: String,
    /// Top participating entities, bounded.
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub article_ids: Vec<Uuid>,
    /// Invariant: equals `article_ids.len()` after every mutation.
    pub article_count: i64,
    /// Articles/day over the last 7 days of member articles.
    pub mention_velocity: f64,
    pub avg_sentiment: f64,
    pub momentum: Momentum,
    /// 24h half-life decay of the newest member article, in [0, 1].
    pub recency_score: f64,
    #[serde(default)]
    pub entity_relationships: Vec<EntityRelationship>,
    pub lifecycle_state: LifecycleState,
    /// Append-only; the last entry always reflects `lifecycle_state`.
    #[serde(default)]
    pub lifecycle_history: Vec<LifecycleEntry>,
    pub fingerprint: Fingerprint,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub timeline_data: Vec<TimelineSnapshot>,
    pub peak_activity: Option<PeakActivity>,
    pub days_active: i64,

    // Resurrection bookkeeping
    pub reawakening_count: i64,
    pub reawakened_from: Option<DateTime<Utc>>,
    pub resurrection_velocity: Option<f64>,

    // Dormancy bookkeeping
    pub dormant_since: Option<DateTime<Utc>>,
    pub reactivated_count: i64,

    /// Present iff `lifecycle_state == Merged`.
    pub merged_into: Option<Uuid>,
    /// True when articles were appended without regenerating the summary.
    pub needs_summary_update: bool,
}

impl Narrative {
    pub fn previous_state(&self) -> Option<LifecycleState> {
        self.lifecycle_history.last().map(|e| e.state)
    }
}

// --- Entity alerts ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AlertSeverity {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown AlertSeverity: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityAlert {
    pub id: Uuid,
    pub entity: String,
    pub alert_type: String,
    pub severity: AlertSeverity,
    #[serde(default)]
    pub details: serde_json::Value,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_label_thresholds() {
        assert_eq!(SentimentLabel::from_score(0.4), SentimentLabel::Positive);
        assert_eq!(SentimentLabel::from_score(0.39), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(-0.4), SentimentLabel::Negative);
        assert_eq!(SentimentLabel::from_score(-0.39), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(0.0), SentimentLabel::Neutral);
    }

    #[test]
    fn primary_entity_types_are_the_fixed_set() {
        assert!(is_primary_entity_type("cryptocurrency"));
        assert!(is_primary_entity_type("organization"));
        assert!(!is_primary_entity_type("person"));
        assert!(!is_primary_entity_type("event"));
    }

    #[test]
    fn lifecycle_rank_orders_active_states() {
        use LifecycleState::*;
        assert!(Emerging.rank() < Rising.rank());
        assert!(Rising.rank() < Hot.rank());
        assert!(Hot.rank() < Cooling.rank());
        assert!(Cooling.rank() < Reactivated.rank());
        assert_eq!(Merged.rank(), 0);
    }

    #[test]
    fn lifecycle_state_round_trips_through_strings() {
        for state in LifecycleState::MATCHABLE {
            let parsed: LifecycleState = state.to_string().parse().unwrap();
            assert_eq!(parsed, state);
        }
    }

    #[test]
    fn window_hours() {
        assert_eq!(Window::H24.hours(), 24);
        assert_eq!(Window::D7.hours(), 168);
        assert_eq!(Window::D30.hours(), 720);
    }
}
