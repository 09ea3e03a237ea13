//! TTL cache for resolved keys
//!
//! Sits between the verifier and the HTTP resolver so repeated requests
//! from one actor cost a single fetch per TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::resolver::{KeyResolveError, KeyResolver, ResolvedKey};
use crate::metrics::{KEY_CACHE_ENTRIES, KEY_CACHE_HITS_TOTAL, KEY_CACHE_MISSES_TOTAL};

const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct Entry {
    key: ResolvedKey,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Caching key resolver
///
/// Only successful resolutions are stored; failures always reach the
/// inner resolver again.
pub struct CachingKeyResolver {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    inner: Arc<dyn KeyResolver>,
    ttl: Duration,
}

impl CachingKeyResolver {
    /// Wrap `inner`, keeping keys for `ttl` (one hour when `None`)
    pub fn new(inner: Arc<dyn KeyResolver>, ttl: Option<Duration>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            inner,
            ttl: ttl.unwrap_or(DEFAULT_TTL),
        }
    }

    /// Drop one key, e.g. after the remote announced a rotation
    pub async fn invalidate(&self, key_id: &str) {
        let mut entries = self.entries.write().await;
        if entries.remove(key_id).is_some() {
            tracing::debug!(key_id, "Key cache entry invalidated");
        }
        KEY_CACHE_ENTRIES.set(entries.len() as i64);
    }

    /// Drop every key owned by `actor_id`
    pub async fn invalidate_actor(&self, actor_id: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.key.actor_id != actor_id);
        let removed = before - entries.len();
        KEY_CACHE_ENTRIES.set(entries.len() as i64);

        tracing::debug!(actor_id, removed, "Key cache entries invalidated for actor");
        removed
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
        KEY_CACHE_ENTRIES.set(0);
    }

    pub async fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let live = entries.values().filter(|e| e.is_live(now)).count();

        CacheStats {
            total_entries: entries.len(),
            valid_entries: live,
            expired_entries: entries.len() - live,
        }
    }

    /// Remove expired entries, returning how many were dropped
    pub async fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        let removed = before - entries.len();
        KEY_CACHE_ENTRIES.set(entries.len() as i64);

        if removed > 0 {
            tracing::info!(removed, remaining = entries.len(), "Pruned expired keys");
        }
        removed
    }

    async fn lookup(&self, key_id: &str) -> Option<ResolvedKey> {
        let entries = self.entries.read().await;
        entries
            .get(key_id)
            .filter(|e| e.is_live(Instant::now()))
            .map(|e| e.key.clone())
    }
}

#[async_trait]
impl KeyResolver for CachingKeyResolver {
    async fn resolve(&self, key_id: &str) -> Result<ResolvedKey, KeyResolveError> {
        if let Some(key) = self.lookup(key_id).await {
            tracing::debug!(key_id, "Key cache hit");
            KEY_CACHE_HITS_TOTAL.inc();
            return Ok(key);
        }

        tracing::debug!(key_id, "Key cache miss");
        KEY_CACHE_MISSES_TOTAL.inc();
        let key = self.inner.resolve(key_id).await?;

        let mut entries = self.entries.write().await;
        entries.insert(
            key_id.to_string(),
            Entry {
                key: key.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        KEY_CACHE_ENTRIES.set(entries.len() as i64);

        Ok(key)
    }
}

/// Snapshot of cache occupancy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
}
