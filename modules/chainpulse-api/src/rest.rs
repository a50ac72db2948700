use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use chainpulse_common::{AlertSeverity, LifecycleState, Narrative, Window};

use crate::AppState;

// --- Query structs ---

#[derive(Deserialize)]
pub struct NarrativesQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    lifecycle: Option<String>,
}

#[derive(Deserialize)]
pub struct ArchiveQuery {
    limit: Option<i64>,
    days: Option<i64>,
}

#[derive(Deserialize)]
pub struct TrendingQuery {
    window: Option<String>,
    limit: Option<usize>,
    min_score: Option<f64>,
}

#[derive(Deserialize)]
pub struct AlertsQuery {
    limit: Option<i64>,
    severity: Option<String>,
    resolved: Option<bool>,
}

#[derive(Deserialize)]
pub struct DailyCostsQuery {
    days: Option<i64>,
}

// --- Views ---

/// Narrative as served to consumers. Carries the legacy `theme`,
/// `lifecycle`, and `status` aliases alongside the authoritative fields.
#[derive(Serialize)]
pub struct NarrativeView {
    #[serde(flatten)]
    narrative: Narrative,
    theme: String,
    lifecycle: String,
    status: String,
}

impl From<Narrative> for NarrativeView {
    fn from(narrative: Narrative) -> Self {
        let theme = narrative.nucleus_entity.clone();
        let lifecycle = narrative.lifecycle_state.to_string();
        let status = lifecycle.clone();
        Self {
            narrative,
            theme,
            lifecycle,
            status,
        }
    }
}

fn narrative_views(narratives: Vec<Narrative>) -> Json<Vec<NarrativeView>> {
    Json(narratives.into_iter().map(NarrativeView::from).collect())
}

/// Store trouble on a read path degrades to an empty list, never a 5xx.
fn empty_on_error<T>(context: &str) -> impl FnOnce(anyhow::Error) -> Vec<T> + '_ {
    move |e| {
        warn!(error = %e, "{context} query failed");
        Vec::new()
    }
}

// --- Handlers ---

pub async fn list_narratives(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NarrativesQuery>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(10).clamp(1, 100);
    let offset = params.offset.unwrap_or(0).max(0);
    let lifecycle = params
        .lifecycle
        .as_deref()
        .and_then(|s| s.parse::<LifecycleState>().ok());

    let narratives = state
        .store
        .active_narratives(limit, offset, lifecycle)
        .await
        .unwrap_or_else(empty_on_error("active narratives"));

    narrative_views(narratives)
}

pub async fn archived_narratives(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ArchiveQuery>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let cutoff = Utc::now() - Duration::days(params.days.unwrap_or(30));

    let narratives = state
        .store
        .archived_narratives(limit, cutoff)
        .await
        .unwrap_or_else(empty_on_error("archived narratives"));

    narrative_views(narratives)
}

pub async fn resurrected_narratives(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ArchiveQuery>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let cutoff = Utc::now() - Duration::days(params.days.unwrap_or(7));

    let narratives = state
        .store
        .resurrected_narratives(limit, cutoff)
        .await
        .unwrap_or_else(empty_on_error("resurrected narratives"));

    narrative_views(narratives)
}

pub async fn narrative_timeline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.store.narrative_timeline(id).await {
        Ok(Some(timeline)) => Json(timeline).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(error = %e, "narrative timeline query failed");
            Json(Vec::<chainpulse_common::TimelineSnapshot>::new()).into_response()
        }
    }
}

pub async fn trending_entities(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrendingQuery>,
) -> impl IntoResponse {
    let window = params
        .window
        .as_deref()
        .and_then(|w| w.parse::<Window>().ok())
        .unwrap_or(Window::D7);
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let min_score = params.min_score.unwrap_or(0.0);

    let entities = state
        .scorer
        .trending(window, limit, min_score)
        .await
        .unwrap_or_else(empty_on_error("trending entities"));

    Json(entities)
}

pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertsQuery>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let severity = params
        .severity
        .as_deref()
        .and_then(|s| s.parse::<AlertSeverity>().ok());

    let alerts = state
        .store
        .recent_alerts(limit, severity, params.resolved)
        .await
        .unwrap_or_else(empty_on_error("entity alerts"));

    Json(alerts)
}

pub async fn trigger_task(
    State(state): State<Arc<AppState>>,
    Path(task): Path<String>,
) -> impl IntoResponse {
    let triggers = &state.triggers;
    let notify = match task.as_str() {
        "rss" => &triggers.rss,
        "enrichment" => &triggers.enrichment,
        "signals" => &triggers.signals,
        "narratives" => &triggers.narratives,
        "consolidation" => &triggers.consolidation,
        "alerts" => &triggers.alerts,
        _ => return StatusCode::NOT_FOUND.into_response(),
    };

    notify.notify_one();
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "triggered": task })),
    )
        .into_response()
}

pub async fn cache_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.gateway.cache_stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => {
            warn!(error = %e, "cache stats query failed");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

pub async fn cost_summary(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.gateway.cost_summary().await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => {
            warn!(error = %e, "cost summary query failed");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

pub async fn daily_costs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DailyCostsQuery>,
) -> impl IntoResponse {
    let days = params.days.unwrap_or(7).clamp(1, 90);
    let costs = state
        .store
        .daily_costs(days)
        .await
        .unwrap_or_else(empty_on_error("daily costs"));

    Json(costs)
}
