//! LRU page cache model.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use arbor_common::{PageId, DEFAULT_CACHE_SIZE};

/// Outcome of one page access through the cache model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOutcome {
    /// The page was already resident.
    Hit,
    /// The page had to be loaded; `evicted` names the least-recently-used
    /// page that was dropped to make room, if the cache was full.
    Miss { evicted: Option<PageId> },
}

/// Snapshot of the cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Pages currently resident.
    pub size: usize,
    /// Configured capacity in pages.
    pub capacity: usize,
    /// Cumulative hits.
    pub hits: u64,
    /// Cumulative misses.
    pub misses: u64,
    /// Cumulative evictions.
    pub evictions: u64,
}

/// LRU cache over page ids.
///
/// Tracks which pages would be resident in a buffer pool of the configured
/// capacity: a touch of a resident page is a hit and refreshes its
/// recency; a touch of an absent page is a miss that loads it, evicting
/// the least-recently-used page when the cache is full.
pub struct PageCache {
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    capacity: usize,
    /// Resident page ids, most recently used at the front.
    resident: VecDeque<PageId>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl PageCache {
    /// Creates a cache with the given capacity. A zero capacity falls back
    /// to the default, matching tree-creation behavior for unset configs.
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_CACHE_SIZE
        } else {
            capacity
        };
        Self {
            inner: Mutex::new(CacheInner {
                capacity,
                resident: VecDeque::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// Returns the configured capacity.
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Records an access to `page_id` and returns whether it hit.
    pub fn touch(&self, page_id: PageId) -> AccessOutcome {
        let mut inner = self.inner.lock();

        if let Some(pos) = inner.resident.iter().position(|&id| id == page_id) {
            inner.resident.remove(pos);
            inner.resident.push_front(page_id);
            inner.hits += 1;
            return AccessOutcome::Hit;
        }

        inner.misses += 1;
        inner.resident.push_front(page_id);

        let evicted = if inner.resident.len() > inner.capacity {
            let victim = inner.resident.pop_back();
            if let Some(victim) = victim {
                inner.evictions += 1;
                debug!(page_id = victim, "cache eviction");
            }
            victim
        } else {
            None
        };

        AccessOutcome::Miss { evicted }
    }

    /// Drops a page from the cache without counting an eviction, for pages
    /// freed by merges.
    pub fn discard(&self, page_id: PageId) {
        let mut inner = self.inner.lock();
        if let Some(pos) = inner.resident.iter().position(|&id| id == page_id) {
            inner.resident.remove(pos);
        }
    }

    /// Returns true if the page is currently resident.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.inner.lock().resident.contains(&page_id)
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            size: inner.resident.len(),
            capacity: inner.capacity,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }

    /// Empties the cache, keeping cumulative counters.
    pub fn clear(&self) {
        self.inner.lock().resident.clear();
    }
}
