//! Write buffer for visits that have not reached the store yet.
//!
//! Every operation takes the single buffer lock for its whole critical
//! section and never holds it across an await point.

use crate::types::PageId;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Visits drained from the buffer, keyed by page.
pub type Deltas = HashMap<PageId, u64>;

#[derive(Debug, Default, Clone, Copy)]
struct Slot {
    /// Visits received since the last drain.
    pending: u64,
    /// Visits drained but not yet acknowledged by the store.
    in_flight: u64,
    /// Write sequence of the latest increment for this page.
    version: u64,
}

impl Slot {
    fn unpersisted(&self) -> u64 {
        self.pending + self.in_flight
    }

    fn is_idle(&self) -> bool {
        self.pending == 0 && self.in_flight == 0
    }
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<PageId, Slot>,
    write_seq: u64,
}

/// Point-in-time view of a page's unpersisted visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeltaSnapshot {
    /// Visits not yet acknowledged by the store, in flight or not.
    pub delta: u64,
    /// Write version observed together with `delta`.
    pub version: u64,
}

/// Accumulates increments per page until the flusher drains them.
///
/// A drained delta stays visible to [`WriteBuffer::peek_delta`] as
/// *in flight* until the store acknowledges it ([`WriteBuffer::settle`]) or
/// the flush fails and it is returned ([`WriteBuffer::merge_back`]). Reads
/// therefore see the same unpersisted total before, during and after a
/// drain.
#[derive(Debug, Default)]
pub struct WriteBuffer {
    inner: Mutex<Inner>,
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every critical section leaves the map consistent, so a panic in
        // another holder does not invalidate it.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one visit. Returns the pending delta after the increment.
    pub fn increment(&self, page: &PageId) -> u64 {
        let mut inner = self.lock();
        inner.write_seq += 1;
        let seq = inner.write_seq;
        let slot = inner.slots.entry(page.clone()).or_default();
        slot.pending += 1;
        slot.version = seq;
        trace!(page_id = %page, pending = slot.pending, "buffered visit");
        slot.pending
    }

    /// Take every pending delta, leaving the buffer with nothing pending.
    ///
    /// Drained amounts move to the in-flight set. An increment racing with
    /// the drain lands either in the returned map or in the post-drain
    /// buffer.
    pub fn drain_all(&self) -> Deltas {
        let mut inner = self.lock();
        let mut drained = HashMap::new();
        for (page, slot) in inner.slots.iter_mut() {
            if slot.pending > 0 {
                drained.insert(page.clone(), slot.pending);
                slot.in_flight += slot.pending;
                slot.pending = 0;
            }
        }
        drained
    }

    /// Acknowledge that `delta` drained visits for `page` reached the store.
    pub fn settle(&self, page: &PageId, delta: u64) {
        let mut inner = self.lock();
        if let Some(slot) = inner.slots.get_mut(page) {
            slot.in_flight = slot.in_flight.saturating_sub(delta);
            if slot.is_idle() {
                inner.slots.remove(page);
            }
        }
    }

    /// Return drained deltas to the buffer after a failed flush.
    ///
    /// Each delta is added to whatever accumulated for the page in the
    /// meantime, so no visit is lost or counted twice.
    pub fn merge_back(&self, deltas: Deltas) {
        if deltas.is_empty() {
            return;
        }
        let mut inner = self.lock();
        for (page, delta) in deltas {
            if delta == 0 {
                continue;
            }
            let slot = inner.slots.entry(page).or_default();
            slot.in_flight = slot.in_flight.saturating_sub(delta);
            slot.pending += delta;
        }
    }

    /// Visits for `page` that the store has not acknowledged yet.
    pub fn peek_delta(&self, page: &PageId) -> u64 {
        self.snapshot(page).delta
    }

    /// Unpersisted visits and write version for `page`, read atomically.
    pub fn snapshot(&self, page: &PageId) -> DeltaSnapshot {
        let inner = self.lock();
        inner
            .slots
            .get(page)
            .map(|slot| DeltaSnapshot {
                delta: slot.unpersisted(),
                version: slot.version,
            })
            .unwrap_or_default()
    }

    /// Write version of the latest increment for `page`, 0 if none is tracked.
    pub fn version(&self, page: &PageId) -> u64 {
        self.lock().slots.get(page).map_or(0, |slot| slot.version)
    }

    /// Total visits waiting for the next drain, across all pages.
    pub fn pending_total(&self) -> u64 {
        self.lock().slots.values().map(|slot| slot.pending).sum()
    }

    /// Number of pages with unpersisted visits.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
