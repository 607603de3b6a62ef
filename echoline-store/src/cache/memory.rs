//! In-process history cache with TTL expiry, LRU eviction and memory limits

use crate::cache::{
    config::CacheConfig,
    decode_turns, encode_turns,
    entry::{CacheEntry, CacheKey},
    stats::CacheStats,
    CacheResult, CacheStore,
};
use crate::error::CacheUnavailable;
use crate::schema::Turn;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// History cache living inside the server process
///
/// This implementation provides:
/// - Thread-safe async access via RwLock
/// - Expiry checked on every read, plus an optional background sweep
/// - LRU eviction when entry-count or byte limits are reached
/// - Hit/miss/eviction statistics
pub struct MemoryCache {
    config: CacheConfig,
    state: Arc<RwLock<CacheState>>,
}

struct CacheState {
    /// Main storage: key -> entry
    entries: HashMap<CacheKey, CacheEntry>,

    /// LRU tracking: front is least recently used
    lru_queue: VecDeque<CacheKey>,

    stats: CacheStats,

    /// Total size of cached data in bytes
    current_size_bytes: usize,
}

impl CacheState {
    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.lru_queue.retain(|k| k != key);
        self.current_size_bytes = self.current_size_bytes.saturating_sub(entry.size_bytes());
        Some(entry)
    }

    fn touch(&mut self, key: &str) {
        self.lru_queue.retain(|k| k != key);
        self.lru_queue.push_back(key.to_string());
    }

    fn refresh_stats(&mut self) {
        self.stats.entries = self.entries.len();
        self.stats.size_bytes = self.current_size_bytes;
    }
}

impl MemoryCache {
    /// Create a new cache with the given configuration
    pub fn new(config: CacheConfig) -> Self {
        info!("Initializing memory history cache with config: {:?}", config);

        let state = CacheState {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            stats: CacheStats::default(),
            current_size_bytes: 0,
        };

        Self {
            config,
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Drop the cached history for a user
    pub async fn remove(&self, user_id: &str) -> bool {
        let key = self.config.history_key(user_id);
        let mut state = self.state.write().await;
        let removed = state.remove_entry(&key).is_some();
        state.refresh_stats();
        removed
    }

    /// Clear all entries from the cache
    pub async fn clear(&self) {
        let mut state = self.state.write().await;

        let count = state.entries.len();
        state.entries.clear();
        state.lru_queue.clear();
        state.current_size_bytes = 0;
        state.refresh_stats();

        info!("Cleared {} entries from history cache", count);
    }

    /// Remove all expired entries, returning how many were dropped
    pub async fn cleanup_expired(&self) -> usize {
        let mut state = self.state.write().await;
        let now = Instant::now();

        let expired_keys: Vec<CacheKey> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            state.remove_entry(key);
        }

        state.stats.expired += expired_keys.len() as u64;
        state.refresh_stats();

        if !expired_keys.is_empty() {
            debug!("Cleaned up {} expired entries", expired_keys.len());
        }

        expired_keys.len()
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        self.state.read().await.stats.clone()
    }

    /// Get number of entries in cache (expired entries not yet swept included)
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Check if cache is empty
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    /// Make room for an entry of `needed_size` bytes
    fn evict_if_needed(&self, state: &mut CacheState, needed_size: usize) -> CacheResult<()> {
        if needed_size > self.config.max_bytes {
            warn!(
                "History entry of {} bytes exceeds cache limit of {} bytes",
                needed_size, self.config.max_bytes
            );
            return Err(CacheUnavailable::new("entry exceeds cache size limit"));
        }

        while state.entries.len() >= self.config.max_entries
            || state.current_size_bytes + needed_size > self.config.max_bytes
        {
            let victim = if self.config.evict_lru {
                state.lru_queue.front().cloned()
            } else {
                // Without LRU ordering, prefer whatever expires first
                state
                    .entries
                    .values()
                    .min_by_key(|e| e.expires_at)
                    .map(|e| e.key.clone())
            };

            let Some(key) = victim else {
                break;
            };

            debug!("Evicting cache entry to make room: {}", key);
            state.remove_entry(&key);
            state.stats.evicted += 1;
        }

        Ok(())
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, user_id: &str) -> CacheResult<Option<Vec<Turn>>> {
        let key = self.config.history_key(user_id);
        let mut state = self.state.write().await;

        let Some(entry) = state.entries.get(&key) else {
            debug!("Cache miss: {}", key);
            state.stats.misses += 1;
            return Ok(None);
        };

        if entry.is_expired() {
            debug!("Cache entry expired: {}", key);
            state.remove_entry(&key);
            state.stats.misses += 1;
            state.stats.expired += 1;
            state.refresh_stats();
            return Ok(None);
        }

        let payload = entry.payload.clone();
        state.stats.hits += 1;

        if self.config.evict_lru {
            state.touch(&key);
        }

        debug!("Cache hit: {}", key);
        decode_turns(&payload).map(Some)
    }

    async fn set(&self, user_id: &str, turns: &[Turn], ttl: Duration) -> CacheResult<()> {
        let key = self.config.history_key(user_id);
        let payload = encode_turns(turns)?;
        let entry = CacheEntry::new(key.clone(), payload, ttl);
        let size = entry.size_bytes();

        let mut state = self.state.write().await;

        // Replacing: release the old entry's slot before sizing the new one
        state.remove_entry(&key);
        self.evict_if_needed(&mut state, size)?;

        state.entries.insert(key.clone(), entry);
        state.lru_queue.push_back(key.clone());
        state.current_size_bytes += size;
        state.stats.writes += 1;
        state.refresh_stats();

        debug!("Cached {} turns under {} for {:?}", turns.len(), key, ttl);
        Ok(())
    }

    async fn invalidate(&self, user_id: &str) -> CacheResult<()> {
        if self.remove(user_id).await {
            debug!("Invalidated cached history for {}", user_id);
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Background task for automatic cache cleanup
pub async fn start_auto_cleanup(cache: Arc<MemoryCache>) {
    let interval = cache.config.sweep_interval;

    info!("Starting automatic cache cleanup task (interval: {:?})", interval);

    loop {
        tokio::time::sleep(interval).await;

        let removed = cache.cleanup_expired().await;
        if removed > 0 {
            debug!("Auto cleanup removed {} entries", removed);
        }
        debug!("History cache: {}", cache.stats().await);
    }
}
