//! Counters for the in-process history cache

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    /// Lookups that found nothing or an expired entry
    pub misses: u64,
    pub writes: u64,
    /// Entries dropped because their TTL ran out
    pub expired: u64,
    /// Entries dropped to respect entry-count or byte limits
    pub evicted: u64,
    pub entries: usize,
    pub size_bytes: usize,
}

impl CacheStats {
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Fraction of lookups served from the cache (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            total => self.hits as f64 / total as f64,
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} hit_rate={:.1}% writes={} entries={} bytes={} expired={} evicted={}",
            self.hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.writes,
            self.entries,
            self.size_bytes,
            self.expired,
            self.evicted
        )
    }
}
