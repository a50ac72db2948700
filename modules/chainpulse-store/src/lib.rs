//! Document store backed by Postgres.
//!
//! Each table plays the role of one collection from the data model:
//! articles, entity_mentions, signal_scores, narratives, llm_cache,
//! api_costs, entity_alerts. Typed columns carry the indexed fields; nested
//! structures live in JSONB. Invariants are maintained by computing the full
//! updated document in memory and writing it as a single upsert — no
//! multi-statement transactional guarantees are assumed.

pub mod alerts;
pub mod articles;
pub mod costs;
pub mod llm_cache;
pub mod mentions;
pub mod migrate;
pub mod narratives;
pub mod signals;

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::warn;

pub use articles::{EnrichmentUpdate, NewArticle};
pub use costs::{CostRecord, CostSummary, DailyCost};

/// Shared handle to the document store. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run boot migrations (idempotent).
    pub async fn migrate(&self) -> Result<()> {
        migrate::migrate(&self.pool).await
    }
}

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Retry a transient store operation with exponential backoff (3 attempts,
/// base 1 s). The error surfaces to the caller on exhaustion.
pub async fn with_retry<T, F, Fut>(op: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut delay = RETRY_BASE_DELAY;
    for attempt in 1..=RETRY_ATTEMPTS {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < RETRY_ATTEMPTS => {
                warn!(op, attempt, error = %e, "store operation failed, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => {
                return Err(anyhow::anyhow!("store operation '{op}' exhausted retries: {e}"))
            }
        }
    }
    unreachable!("retry loop always returns")
}
