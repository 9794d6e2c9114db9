//! Visit counting core: write buffer, read cache, flusher and the service
//! composing them.

pub mod buffer;
pub mod cache;
pub mod flusher;
pub mod gate;
pub mod service;

pub use buffer::{DeltaSnapshot, Deltas, WriteBuffer};
pub use cache::{CacheEntry, VisitCache};
pub use flusher::{FlushReport, FlushWorker};
pub use gate::FlushGates;
pub use service::{CounterSettings, VisitCounter};

use crate::metrics::Metrics;
use crate::store::CounterStore;
use std::sync::Arc;

/// State shared between the service and its flusher task.
pub(crate) struct CounterCore {
    pub(crate) store: Arc<dyn CounterStore>,
    pub(crate) buffer: WriteBuffer,
    pub(crate) cache: VisitCache,
    pub(crate) gates: FlushGates,
    pub(crate) settings: CounterSettings,
    pub(crate) metrics: Arc<Metrics>,
}

impl CounterCore {
    pub(crate) fn new(
        store: Arc<dyn CounterStore>,
        settings: CounterSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            buffer: WriteBuffer::new(),
            cache: VisitCache::new(Arc::clone(&metrics.cache)),
            gates: FlushGates::new(),
            settings,
            metrics,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_core(store: impl CounterStore + 'static) -> CounterCore {
    CounterCore::new(
        Arc::new(store),
        CounterSettings::default(),
        Arc::new(Metrics::new()),
    )
}
