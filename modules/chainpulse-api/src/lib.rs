//! HTTP query and admin surface.
//!
//! Read paths degrade to empty lists when the store is unreadable for that
//! query; 5xx is reserved for outright unavailability. Admin triggers nudge
//! the background workers through per-worker notify handles.

pub mod rest;

use std::sync::Arc;

use tokio::sync::Notify;

use chainpulse_llm::LlmGateway;
use chainpulse_signal::SignalScorer;
use chainpulse_store::Store;

/// One notify handle per background worker; admin triggers fire them.
#[derive(Default)]
pub struct WorkerTriggers {
    pub rss: Notify,
    pub enrichment: Notify,
    pub signals: Notify,
    pub narratives: Notify,
    pub consolidation: Notify,
    pub alerts: Notify,
}

pub struct AppState {
    pub store: Store,
    pub gateway: LlmGateway,
    pub scorer: SignalScorer,
    pub triggers: Arc<WorkerTriggers>,
}

pub fn router(state: Arc<AppState>) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/api/narratives", get(rest::list_narratives))
        .route("/api/narratives/archived", get(rest::archived_narratives))
        .route("/api/narratives/resurrected", get(rest::resurrected_narratives))
        .route("/api/narratives/{id}/timeline", get(rest::narrative_timeline))
        .route("/api/signals/trending", get(rest::trending_entities))
        .route("/api/alerts", get(rest::list_alerts))
        .route("/api/admin/trigger/{task}", post(rest::trigger_task))
        .route("/api/admin/cache/stats", get(rest::cache_stats))
        .route("/api/admin/costs/summary", get(rest::cost_summary))
        .route("/api/admin/costs/daily", get(rest::daily_costs))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
