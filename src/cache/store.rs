//! Result cache backends

use super::entry::CacheEntry;
use super::fingerprint::CacheKey;
use moka::sync::Cache as MokaCache;
use std::sync::Arc;
use tracing::debug;

/// Shared key/entry store, safe for concurrent use from independent requests
pub trait ResultCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>>;

    /// Insert or replace. An entry the cache declines to admit is simply a
    /// future miss.
    fn set(&self, key: CacheKey, entry: Arc<CacheEntry>);

    /// Drop every entry
    fn shutdown(&self) {}

    /// Backend identifier for logs
    fn name(&self) -> &'static str;
}

/// Largest entry cost the weigher can express
pub const MAX_ENTRY_COST: u64 = u32::MAX as u64;

/// Cost-bounded in-memory cache.
///
/// Entries are weighed by [`CacheEntry::cost`]. Eviction is TinyLFU
/// (admission by frequency, eviction by recency) and runs as maintenance on
/// later operations, so the weighted size may briefly overshoot the budget.
/// Entries costing more than the budget or [`MAX_ENTRY_COST`] are not stored.
pub struct MemoryCache {
    inner: MokaCache<CacheKey, Arc<CacheEntry>>,
    budget: u64,
}

impl MemoryCache {
    /// Create a cache holding at most `budget` bytes of entries
    pub fn new(budget: u64) -> Self {
        let inner = MokaCache::builder()
            .max_capacity(budget)
            .weigher(|_key: &CacheKey, entry: &Arc<CacheEntry>| -> u32 {
                // `set` keeps out anything wider
                u32::try_from(entry.cost()).unwrap_or(u32::MAX)
            })
            .build();

        Self { inner, budget }
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Total cost of live entries, as of the last maintenance run
    pub fn weighted_size(&self) -> u64 {
        self.inner.weighted_size()
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Whether an entry of `cost` bytes can be stored at all
    pub fn admits(&self, cost: usize) -> bool {
        let cost = cost as u64;
        cost <= MAX_ENTRY_COST && cost <= self.budget
    }

    /// Apply pending admissions and evictions now
    pub fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks();
    }
}

impl ResultCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        self.inner.get(key)
    }

    fn set(&self, key: CacheKey, entry: Arc<CacheEntry>) {
        if !self.admits(entry.cost()) {
            debug!(
                key = %key,
                cost = entry.cost(),
                budget = self.budget,
                "Response too large to cache"
            );
            return;
        }
        debug!(key = %key, cost = entry.cost(), "Caching response");
        self.inner.insert(key, entry);
    }

    fn shutdown(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks();
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Cache that never holds anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl ResultCache for NoCache {
    fn get(&self, _key: &CacheKey) -> Option<Arc<CacheEntry>> {
        None
    }

    fn set(&self, _key: CacheKey, _entry: Arc<CacheEntry>) {}

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Build the cache for a byte budget; a zero budget disables caching
pub fn new_cache(budget: u64) -> Arc<dyn ResultCache> {
    if budget == 0 {
        debug!("Response cache disabled");
        Arc::new(NoCache)
    } else {
        debug!(budget, "Response cache enabled");
        Arc::new(MemoryCache::new(budget))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::ENTRY_OVERHEAD;

    const ENTRY_COST: usize = 1024;

    fn entry() -> Arc<CacheEntry> {
        let data = vec![vec![0u8; 512]];
        let metadata = vec![0u8; ENTRY_COST - 512 - ENTRY_OVERHEAD];
        Arc::new(CacheEntry::new(metadata, data))
    }

    fn random_key() -> CacheKey {
        CacheKey::digest(uuid::Uuid::new_v4().as_bytes())
    }

    #[test]
    fn entry_cost_is_exact() {
        assert_eq!(entry().cost(), ENTRY_COST);
    }

    #[test]
    fn admission_is_bounded_by_weigher_width() {
        let large = MemoryCache::new(u64::MAX);
        assert!(large.admits(MAX_ENTRY_COST as usize));
        assert!(!large.admits(MAX_ENTRY_COST as usize + 1));
    }

    #[test]
    fn get_after_set() {
        let cache = MemoryCache::new(1024 * 1024);
        let key = random_key();
        let stored = entry();

        assert!(cache.get(&key).is_none());
        cache.set(key, Arc::clone(&stored));
        let hit = cache.get(&key).unwrap();
        assert!(Arc::ptr_eq(&hit, &stored));
    }

    #[test]
    fn eviction_respects_budget() {
        let budget = 1024 * 1024;
        let max_entries = budget as usize / ENTRY_COST;
        let cache = MemoryCache::new(budget);

        let keys: Vec<CacheKey> = (0..max_entries + 100).map(|_| random_key()).collect();
        for key in &keys {
            cache.set(*key, entry());
        }
        cache.run_pending_tasks();

        let hits = keys.iter().filter(|k| cache.get(k).is_some()).count();
        assert!(hits > 0);
        assert!(hits <= max_entries, "{} entries retained, at most {} fit", hits, max_entries);
        assert!(cache.weighted_size() <= budget);
    }

    #[test]
    fn oversized_entry_is_never_served() {
        let cache = MemoryCache::new(ENTRY_COST as u64 - 1);
        assert!(!cache.admits(ENTRY_COST));

        let key = random_key();
        cache.set(key, entry());
        cache.run_pending_tasks();
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn shutdown_drops_entries() {
        let cache = MemoryCache::new(1024 * 1024);
        let key = random_key();
        cache.set(key, entry());
        cache.shutdown();
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn disabled_cache_never_hits() {
        let cache = new_cache(0);
        assert_eq!(cache.name(), "disabled");

        let key = random_key();
        cache.set(key, entry());
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn nonzero_budget_enables_memory_cache() {
        assert_eq!(new_cache(1024).name(), "memory");
    }
}
