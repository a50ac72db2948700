use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use anyhow::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use chainpulse_store::Store;

/// Purge dead single-flight entries once the map grows past this.
const INFLIGHT_PURGE_THRESHOLD: usize = 256;

/// Shared LLM response cache.
///
/// The store is shared across workers; hit/miss counters are in-process.
/// `lock_key` gives at-most-one concurrent recomputation per fingerprint
/// within this process — cross-process duplication is tolerated, the second
/// writer overwrites with an equivalent value.
pub struct LlmCache {
    store: Store,
    ttl_hours: i64,
    hits: AtomicU64,
    misses: AtomicU64,
    inflight: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_entries: i64,
    pub active_entries: i64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub hit_rate_percent: f64,
}

/// Deterministic request fingerprint: sha256 over model and canonicalized
/// prompt.
pub fn cache_key(model: &str, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update(b":");
    hasher.update(prompt.trim().as_bytes());
    hex::encode(hasher.finalize())
}

impl LlmCache {
    pub fn new(store: Store, ttl_hours: i64) -> Self {
        Self {
            store,
            ttl_hours,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the single-flight guard for a cache key. Holders of the same
    /// key serialize; distinct keys proceed in parallel.
    pub async fn lock_key(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inflight.lock().expect("inflight map poisoned");
            if map.len() > INFLIGHT_PURGE_THRESHOLD {
                map.retain(|_, weak| weak.strong_count() > 0);
            }
            match map.get(key).and_then(Weak::upgrade) {
                Some(existing) => existing,
                None => {
                    let fresh = Arc::new(AsyncMutex::new(()));
                    map.insert(key.to_string(), Arc::downgrade(&fresh));
                    fresh
                }
            }
        };
        mutex.lock_owned().await
    }

    pub async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let cached = self.store.cache_get(key).await?;
        if cached.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key, "llm cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(cached)
    }

    pub async fn put(&self, key: &str, model: &str, response: &serde_json::Value) -> Result<()> {
        self.store.cache_put(key, model, response, self.ttl_hours).await
    }

    pub async fn clear_expired(&self) -> Result<u64> {
        self.store.cache_clear_expired().await
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let (total_entries, active_entries) = self.store.cache_entry_counts().await?;
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let requests = hits + misses;
        let hit_rate_percent = if requests > 0 {
            hits as f64 / requests as f64 * 100.0
        } else {
            0.0
        };

        Ok(CacheStats {
            total_entries,
            active_entries,
            cache_hits: hits,
            cache_misses: misses,
            hit_rate_percent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_deterministic_and_model_scoped() {
        let a = cache_key("haiku", "extract entities from: Bitcoin rallies");
        let b = cache_key("haiku", "extract entities from: Bitcoin rallies");
        let c = cache_key("sonnet", "extract entities from: Bitcoin rallies");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn cache_key_canonicalizes_prompt_whitespace() {
        assert_eq!(cache_key("m", "  prompt  "), cache_key("m", "prompt"));
    }
}
