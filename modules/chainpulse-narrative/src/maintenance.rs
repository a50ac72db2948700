//! Integrity and retention maintenance for narratives and their
//! dependents: pruning references to deleted articles, removing orphan
//! mentions, expiring old narratives and cache entries.

use std::collections::HashSet;

use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use chainpulse_store::Store;

#[derive(Debug, Default)]
pub struct MaintenanceStats {
    pub narratives_pruned: u32,
    pub invalid_refs_removed: u64,
    pub narratives_expired: u64,
    pub orphan_mentions_removed: u64,
    pub cache_entries_expired: u64,
}

impl std::fmt::Display for MaintenanceStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Maintenance Complete ===")?;
        writeln!(f, "Narratives pruned:   {}", self.narratives_pruned)?;
        writeln!(f, "Invalid refs:        {}", self.invalid_refs_removed)?;
        writeln!(f, "Narratives expired:  {}", self.narratives_expired)?;
        writeln!(f, "Orphan mentions:     {}", self.orphan_mentions_removed)?;
        writeln!(f, "Cache expired:       {}", self.cache_entries_expired)?;
        Ok(())
    }
}

pub struct NarrativeMaintenance {
    store: Store,
    retention_days: i64,
}

impl NarrativeMaintenance {
    pub fn new(store: Store, retention_days: i64) -> Self {
        Self {
            store,
            retention_days,
        }
    }

    pub async fn run(&self) -> Result<MaintenanceStats> {
        let mut stats = MaintenanceStats::default();

        match self.prune_invalid_article_refs().await {
            Ok((narratives, refs)) => {
                stats.narratives_pruned = narratives;
                stats.invalid_refs_removed = refs;
            }
            Err(e) => warn!(error = %e, "article reference pruning failed"),
        }

        let cutoff = Utc::now() - Duration::days(self.retention_days);
        stats.narratives_expired = self
            .store
            .delete_narratives_older_than(cutoff)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "narrative retention sweep failed");
                0
            });

        stats.orphan_mentions_removed = self.store.delete_orphan_mentions().await.unwrap_or_else(|e| {
            warn!(error = %e, "orphan mention cleanup failed");
            0
        });

        stats.cache_entries_expired = self.store.cache_clear_expired().await.unwrap_or_else(|e| {
            warn!(error = %e, "cache expiry sweep failed");
            0
        });

        info!("{stats}");
        Ok(stats)
    }

    /// Remove article ids that no longer resolve to an article, and fix up
    /// the article_count. Removal is the only remediation for dangling
    /// references.
    pub async fn prune_invalid_article_refs(&self) -> Result<(u32, u64)> {
        let narratives = self.store.all_live_narratives().await?;

        let mut narratives_updated = 0u32;
        let mut refs_removed = 0u64;

        for mut narrative in narratives {
            if narrative.article_ids.is_empty() {
                continue;
            }

            let existing: HashSet<Uuid> = self
                .store
                .existing_article_ids(&narrative.article_ids)
                .await?
                .into_iter()
                .collect();

            let before = narrative.article_ids.len();
            narrative.article_ids.retain(|id| existing.contains(id));
            let removed = before - narrative.article_ids.len();
            if removed == 0 {
                continue;
            }

            refs_removed += removed as u64;
            narratives_updated += 1;
            narrative.article_count = narrative.article_ids.len() as i64;

            if let Err(e) = self.store.write_narrative(&narrative).await {
                warn!(narrative = %narrative.id, error = %e, "failed to persist pruned narrative");
            } else {
                info!(
                    narrative = %narrative.id,
                    removed,
                    remaining = narrative.article_ids.len(),
                    "pruned invalid article references"
                );
            }
        }

        Ok((narratives_updated, refs_removed))
    }
}
