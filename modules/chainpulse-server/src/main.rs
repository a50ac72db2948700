use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chainpulse_api::{AppState, WorkerTriggers};
use chainpulse_common::Config;
use chainpulse_llm::LlmGateway;
use chainpulse_signal::SignalScorer;
use chainpulse_store::Store;

mod workers;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("chainpulse=info".parse()?),
        )
        .init();

    info!("ChainPulse server starting...");

    let config = Config::from_env();
    config.log_redacted();

    let store = Store::connect(&config.database_url).await?;
    store.migrate().await?;

    let gateway = LlmGateway::new(
        &config.anthropic_api_key,
        store.clone(),
        &config.llm_cheap_model,
        &config.llm_capable_model,
        config.llm_fallback_models.clone(),
        config.llm_cache_ttl_hours,
    );

    let triggers = Arc::new(WorkerTriggers::default());

    let worker_handles =
        workers::spawn_all(store.clone(), gateway.clone(), &config, triggers.clone());

    let state = Arc::new(AppState {
        store: store.clone(),
        gateway,
        scorer: SignalScorer::new(store),
        triggers,
    });
    let app = chainpulse_api::router(state);

    let addr = format!("{}:{}", config.api_host, config.api_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = addr.as_str(), "API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Workers hold no in-flight state worth finishing after the API is
    // down; cancelled cycles resume from the missing-field queries.
    for handle in worker_handles {
        handle.abort();
    }
    info!("ChainPulse server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, draining");
}
