use super::CounterStore;
use crate::error::VisitCounterResult;
use async_trait::async_trait;
use dashmap::DashMap;

/// In-process counter store on a sharded map.
///
/// Useful for local runs, benches and tests. Nothing is persisted past the
/// lifetime of the value.
#[derive(Debug, Default)]
pub struct MemoryStore {
    counters: DashMap<String, u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `entries`.
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, u64)>,
        K: Into<String>,
    {
        let store = Self::new();
        for (key, value) in entries {
            store.counters.insert(key.into(), value);
        }
        store
    }

    /// Current value without going through the async trait.
    pub fn value(&self, key: &str) -> u64 {
        self.counters.get(key).map_or(0, |v| *v)
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> VisitCounterResult<u64> {
        Ok(self.value(key))
    }

    async fn increment_by(&self, key: &str, delta: u64) -> VisitCounterResult<u64> {
        let mut counter = self.counters.entry(key.to_string()).or_insert(0);
        *counter = counter.saturating_add(delta);
        Ok(*counter)
    }
}
