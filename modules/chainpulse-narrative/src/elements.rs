//! Narrative element backfill: the first stage of each detection cycle.
//!
//! Annotates every relevant article in the lookback window that has no
//! `narrative_summary` yet. Idempotent per article — the missing-field
//! query is the progress cursor.

use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use chainpulse_llm::LlmGateway;
use chainpulse_store::Store;

/// Bound on how many articles one backfill pass annotates.
const BACKFILL_LIMIT: i64 = 100;

pub struct ElementBackfill {
    store: Store,
    gateway: LlmGateway,
}

impl ElementBackfill {
    pub fn new(store: Store, gateway: LlmGateway) -> Self {
        Self { store, gateway }
    }

    /// Annotate articles missing narrative elements. Articles with no
    /// extractable nucleus are skipped (and retried next cycle). Returns
    /// the number of articles annotated.
    pub async fn run(&self, lookback_hours: i64) -> Result<u32> {
        let cutoff = Utc::now() - Duration::hours(lookback_hours);
        let articles = self
            .store
            .articles_missing_elements(cutoff, BACKFILL_LIMIT)
            .await?;

        if articles.is_empty() {
            return Ok(0);
        }

        let mut annotated = 0u32;
        for article in &articles {
            match self.gateway.discover_narrative(&article.title, &article.text).await {
                Ok(Some(elements)) => {
                    if let Err(e) = self.store.set_narrative_elements(article.id, &elements).await {
                        warn!(article = %article.id, error = %e, "failed to persist narrative elements");
                        continue;
                    }
                    annotated += 1;
                }
                Ok(None) => {
                    debug!(article = %article.id, "no extractable narrative elements");
                }
                Err(e) => {
                    warn!(article = %article.id, error = %e, "narrative discovery failed, skipping");
                }
            }
        }

        info!(annotated, total = articles.len(), "narrative element backfill complete");
        Ok(annotated)
    }
}
