//! Narrative detection: fingerprinting, salience-weighted clustering,
//! lifecycle tracking, matching against existing narratives, and periodic
//! consolidation of near-duplicates.

pub mod cluster;
pub mod consolidate;
pub mod detector;
pub mod elements;
pub mod fingerprint;
pub mod lifecycle;
pub mod maintenance;
pub mod matcher;

pub use cluster::{cluster_articles, merge_shallow_clusters, Cluster, ClusterConfig};
pub use consolidate::{ConsolidationStats, Consolidator};
pub use detector::{DetectionStats, DetectorConfig, NarrativeDetector};
pub use elements::ElementBackfill;
pub use fingerprint::{compute_fingerprint, fingerprint_similarity, jaccard};
pub use lifecycle::{
    determine_lifecycle_state, grace_period_days, momentum, recency_score, recent_velocity,
    update_lifecycle_history, LifecycleInputs, Resurrection,
};
pub use maintenance::NarrativeMaintenance;
pub use matcher::{find_best_match, select_reactivation_candidate, NarrativeMatcher};
