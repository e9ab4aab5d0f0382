//! Report caching keyed by window size and bucketed reference instant
//!
//! The engine only needs a get/set collaborator: a miss simply recomputes the
//! report, which is idempotent for a given snapshot. Entries carry invalidation
//! tags so a change to the membership list can drop every dependent report.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;

/// Tag attached to anything derived from the membership list
pub const MEMBERSHIP_LIST_TAG: &str = "membership_list";

/// Tag attached to cached retention reports
pub const RETENTION_REPORT_TAG: &str = "retention_report";

/// Cache collaborator consulted before a run
pub trait MetricCache {
    /// Fetch a live entry
    fn get(&mut self, key: &str) -> Option<Value>;

    /// Store an entry for `ttl` under the given invalidation tags
    fn set(&mut self, key: &str, value: Value, ttl: Duration, tags: &[&str]);

    /// Drop every entry carrying any of the tags, returning how many were removed
    fn invalidate_tags(&mut self, tags: &[&str]) -> usize;
}

/// Floor a reference instant to the cache granularity
pub fn bucket_instant(reference_instant: i64, granularity_seconds: i64) -> i64 {
    if granularity_seconds <= 1 {
        return reference_instant;
    }
    reference_instant
        .div_euclid(granularity_seconds)
        .checked_mul(granularity_seconds)
        .unwrap_or(reference_instant)
}

/// Cache key for a retention report
pub fn report_key(months_back: u32, reference_instant: i64, granularity_seconds: i64) -> String {
    format!(
        "retention:report:{}:{}",
        months_back,
        bucket_instant(reference_instant, granularity_seconds)
    )
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
    tags: Vec<String>,
}

/// Process-local cache with TTL expiry and tag invalidation
#[derive(Debug, Default)]
pub struct InMemoryMetricCache {
    entries: HashMap<String, CacheEntry>,

    /// Statistics
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl InMemoryMetricCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including any not yet evicted after expiry
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all entries and statistics
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cache_hits = 0;
        self.cache_misses = 0;
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

impl MetricCache for InMemoryMetricCache {
    fn get(&mut self, key: &str) -> Option<Value> {
        let live = match self.entries.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        };

        if live.is_some() {
            self.cache_hits += 1;
        } else {
            self.cache_misses += 1;
        }
        live
    }

    fn set(&mut self, key: &str, value: Value, ttl: Duration, tags: &[&str]) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        };
        self.entries.insert(key.to_string(), entry);
    }

    fn invalidate_tags(&mut self, tags: &[&str]) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.tags.iter().any(|t| tags.contains(&t.as_str())));
        before - self.entries.len()
    }
}
