//! Stored form of one user's cached history

use std::time::{Duration, Instant};

/// Namespaced cache key, e.g. `chat_history:u1`
pub type CacheKey = String;

/// JSON-encoded turn list
pub type CacheValue = String;

/// Fallback lifetime when `now + ttl` does not fit in an `Instant`
const MAX_LIFETIME: Duration = Duration::from_secs(365 * 24 * 3600);

/// One cached history with its expiry bookkeeping
///
/// Expiry uses the monotonic clock, so wall-clock jumps never resurrect or
/// prematurely drop an entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub payload: CacheValue,
    pub written_at: Instant,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn new(key: CacheKey, payload: CacheValue, ttl: Duration) -> Self {
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).unwrap_or(now + MAX_LIFETIME);

        Self {
            key,
            payload,
            written_at: now,
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Approximate memory footprint: key + payload + bookkeeping
    pub fn size_bytes(&self) -> usize {
        self.key.len() + self.payload.len() + std::mem::size_of::<Self>()
    }
}
