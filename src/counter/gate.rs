use crate::types::PageId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Per-page gates ordering store reads against flushes of the same page.
///
/// A read holds the shared side while it fetches the store value and
/// snapshots the buffer. The flusher holds the exclusive side while it
/// applies a page's delta and settles it. Buffer increments never touch a
/// gate, and pages never share one.
#[derive(Debug, Default)]
pub struct FlushGates {
    gates: DashMap<PageId, Arc<RwLock<()>>>,
}

impl FlushGates {
    pub fn new() -> Self {
        Self::default()
    }

    fn gate(&self, page: &PageId) -> Arc<RwLock<()>> {
        if let Some(gate) = self.gates.get(page) {
            return gate.value().clone();
        }
        self.gates.entry(page.clone()).or_default().value().clone()
    }

    pub async fn read(&self, page: &PageId) -> OwnedRwLockReadGuard<()> {
        self.gate(page).read_owned().await
    }

    pub async fn write(&self, page: &PageId) -> OwnedRwLockWriteGuard<()> {
        self.gate(page).write_owned().await
    }

    /// Drop gates nobody currently holds.
    pub fn prune(&self) -> usize {
        let before = self.gates.len();
        self.gates.retain(|_, gate| Arc::strong_count(gate) > 1);
        before.saturating_sub(self.gates.len())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.gates.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}
