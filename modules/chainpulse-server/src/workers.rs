//! Background workers. Each runs on its own cadence, shares the store and
//! LLM cache, and can be nudged early through its admin trigger. A failing
//! cycle is logged and the worker keeps its schedule.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use chainpulse_api::WorkerTriggers;
use chainpulse_common::Config;
use chainpulse_enrich::EnrichmentPipeline;
use chainpulse_ingest::RssFetcher;
use chainpulse_llm::LlmGateway;
use chainpulse_narrative::{
    ClusterConfig, Consolidator, DetectorConfig, NarrativeDetector, NarrativeMaintenance,
};
use chainpulse_signal::{AlertDetector, SignalScorer};
use chainpulse_store::Store;

/// Soft retention bound on narratives whose last_updated has expired.
const NARRATIVE_RETENTION_DAYS: i64 = 7;

pub fn spawn_all(
    store: Store,
    gateway: LlmGateway,
    config: &Config,
    triggers: Arc<WorkerTriggers>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    let fetcher = Arc::new(RssFetcher::new(store.clone()));
    handles.push(spawn_worker(
        "rss",
        config.rss_interval_secs,
        triggers.clone(),
        |t| &t.rss,
        move || {
            let fetcher = fetcher.clone();
            async move { fetcher.run_cycle().await.map(|_| ()) }
        },
    ));

    let pipeline = Arc::new(EnrichmentPipeline::new(
        store.clone(),
        gateway.clone(),
        config.entity_extraction_batch_size,
    ));
    handles.push(spawn_worker(
        "enrichment",
        config.enrichment_interval_secs,
        triggers.clone(),
        |t| &t.enrichment,
        move || {
            let pipeline = pipeline.clone();
            async move { pipeline.run_cycle().await.map(|_| ()) }
        },
    ));

    let scorer = Arc::new(SignalScorer::new(store.clone()));
    handles.push(spawn_worker(
        "signals",
        config.signal_interval_secs,
        triggers.clone(),
        |t| &t.signals,
        move || {
            let scorer = scorer.clone();
            async move {
                scorer.run_cycle().await?;
                scorer.cleanup_stale().await.map(|_| ())
            }
        },
    ));

    let detector = Arc::new(NarrativeDetector::new(
        store.clone(),
        gateway.clone(),
        DetectorConfig {
            lookback_hours: config.narrative_lookback_hours,
            cluster: ClusterConfig {
                link_strength_threshold: config.link_strength_threshold,
                core_actor_salience: config.core_actor_salience,
                min_cluster_size: config.min_cluster_size,
                shallow_merge_similarity: config.shallow_merge_similarity,
            },
            dormant_days_threshold: config.dormant_days_threshold as f64,
        },
        config.reactivation_window_days,
    ));
    handles.push(spawn_worker(
        "narratives",
        config.narrative_interval_secs,
        triggers.clone(),
        |t| &t.narratives,
        move || {
            let detector = detector.clone();
            async move { detector.run_cycle().await.map(|_| ()) }
        },
    ));

    let consolidator = Arc::new(Consolidator::new(store.clone()));
    let maintenance = Arc::new(NarrativeMaintenance::new(
        store.clone(),
        NARRATIVE_RETENTION_DAYS,
    ));
    handles.push(spawn_worker(
        "consolidation",
        config.consolidation_interval_secs,
        triggers.clone(),
        |t| &t.consolidation,
        move || {
            let consolidator = consolidator.clone();
            let maintenance = maintenance.clone();
            async move {
                consolidator.run().await?;
                maintenance.run().await.map(|_| ())
            }
        },
    ));

    let alerts = Arc::new(AlertDetector::new(store));
    handles.push(spawn_worker(
        "alerts",
        config.alert_interval_secs,
        triggers,
        |t| &t.alerts,
        move || {
            let alerts = alerts.clone();
            async move { alerts.run_cycle().await.map(|_| ()) }
        },
    ));

    handles
}

/// Run a worker on an interval, waking early when its trigger fires.
fn spawn_worker<F, Fut, S>(
    name: &'static str,
    interval_secs: u64,
    triggers: Arc<WorkerTriggers>,
    select_trigger: S,
    cycle: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    S: Fn(&WorkerTriggers) -> &Notify + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = select_trigger(&triggers).notified() => {
                    info!(worker = name, "manual trigger received");
                }
            }

            if let Err(e) = cycle().await {
                warn!(worker = name, error = %e, "worker cycle failed");
            }
        }
    })
}
