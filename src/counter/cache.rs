use crate::metrics::CacheMetrics;
use crate::types::PageId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// A memoized visit total and the instant it stops being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    pub value: u64,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Time-bounded cache of computed visit totals.
///
/// Entries are keyed by page and live on a sharded map, so lookups for
/// different pages rarely contend. Expired entries are treated as misses and
/// overwritten lazily; [`VisitCache::purge_expired`] sweeps them when called.
///
/// Callers pass `now` explicitly. All instants come from `tokio::time`, which
/// lets tests drive expiry with a paused clock.
pub struct VisitCache {
    entries: DashMap<PageId, CacheEntry>,
    metrics: Arc<CacheMetrics>,
}

impl VisitCache {
    pub fn new(metrics: Arc<CacheMetrics>) -> Self {
        Self {
            entries: DashMap::new(),
            metrics,
        }
    }

    /// Cached total for `page` if an entry exists and `now < expires_at`.
    pub fn get(&self, page: &PageId, now: Instant) -> Option<u64> {
        let fresh = self
            .entries
            .get(page)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.value);

        match fresh {
            Some(value) => {
                trace!(page_id = %page, "Cache hit");
                self.metrics.record_hit();
                Some(value)
            }
            None => {
                trace!(page_id = %page, "Cache miss");
                self.metrics.record_miss();
                None
            }
        }
    }

    /// Store `value` for `page` until `now + ttl`, replacing any prior entry.
    pub fn put(&self, page: PageId, value: u64, now: Instant, ttl: Duration) {
        self.entries.insert(
            page,
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
        self.metrics.update_size(self.entries.len());
    }

    /// Store `value` only if `admit` still holds.
    ///
    /// `admit` runs while the page's shard is write-locked, so an
    /// [`VisitCache::invalidate`] for the same page cannot slip between the
    /// check and the insert. Returns whether the entry was stored.
    pub fn put_if<F>(&self, page: PageId, value: u64, now: Instant, ttl: Duration, admit: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        let stored = match self.entries.entry(page) {
            Entry::Occupied(mut occupied) => {
                if admit() {
                    occupied.insert(CacheEntry {
                        value,
                        expires_at: now + ttl,
                    });
                    true
                } else {
                    occupied.remove();
                    false
                }
            }
            Entry::Vacant(vacant) => {
                if admit() {
                    vacant.insert(CacheEntry {
                        value,
                        expires_at: now + ttl,
                    });
                    true
                } else {
                    false
                }
            }
        };

        if stored {
            self.metrics.update_size(self.entries.len());
        } else {
            self.metrics.record_rejected_insert();
        }
        stored
    }

    /// Drop the entry for `page`. Returns whether one existed.
    pub fn invalidate(&self, page: &PageId) -> bool {
        let removed = self.entries.remove(page).is_some();
        if removed {
            trace!(page_id = %page, "Cache entry invalidated");
            self.metrics.record_invalidation();
            self.metrics.update_size(self.entries.len());
        }
        removed
    }

    /// Remove every entry that is no longer fresh at `now`.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            self.metrics.record_purged(purged);
            self.metrics.update_size(self.entries.len());
        }
        purged
    }

    /// Entry for `page` regardless of freshness.
    #[cfg(test)]
    fn entry(&self, page: &PageId) -> Option<CacheEntry> {
        self.entries.get(page).map(|entry| *entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
