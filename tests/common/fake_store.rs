//! Scriptable counter store for exercising failure paths.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use visit_counter::{CounterStore, VisitCounterError, VisitCounterResult};

/// In-memory store whose reads and writes can be made to fail or stall.
#[derive(Default)]
pub struct FakeStore {
    values: Mutex<HashMap<String, u64>>,
    failing_keys: Mutex<HashSet<String>>,
    fail_all_increments: AtomicBool,
    fail_gets: AtomicBool,
    increment_delay: Mutex<Option<Duration>>,
    get_delay: Mutex<Option<Duration>>,
    pub get_calls: AtomicU64,
    pub increment_calls: AtomicU64,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: u64) -> Self {
        let store = Self::new();
        store.set(key, value);
        store
    }

    pub fn set(&self, key: &str, value: u64) {
        self.values.lock().unwrap().insert(key.to_string(), value);
    }

    pub fn value(&self, key: &str) -> u64 {
        self.values.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    /// Make `increment_by` fail for `key` until [`FakeStore::heal_key`].
    pub fn fail_key(&self, key: &str) {
        self.failing_keys.lock().unwrap().insert(key.to_string());
    }

    pub fn heal_key(&self, key: &str) {
        self.failing_keys.lock().unwrap().remove(key);
    }

    pub fn fail_increments(&self, fail: bool) {
        self.fail_all_increments.store(fail, Ordering::SeqCst);
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn delay_increments(&self, delay: Option<Duration>) {
        *self.increment_delay.lock().unwrap() = delay;
    }

    pub fn delay_gets(&self, delay: Option<Duration>) {
        *self.get_delay.lock().unwrap() = delay;
    }

    pub fn increments(&self) -> u64 {
        self.increment_calls.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> u64 {
        self.get_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CounterStore for FakeStore {
    async fn get(&self, key: &str) -> VisitCounterResult<u64> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.get_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(VisitCounterError::StoreUnavailable(
                "connection refused".to_string(),
            ));
        }
        Ok(self.value(key))
    }

    async fn increment_by(&self, key: &str, delta: u64) -> VisitCounterResult<u64> {
        self.increment_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.increment_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_all_increments.load(Ordering::SeqCst)
            || self.failing_keys.lock().unwrap().contains(key)
        {
            return Err(VisitCounterError::StoreUnavailable(
                "connection refused".to_string(),
            ));
        }
        let mut values = self.values.lock().unwrap();
        let value = values.entry(key.to_string()).or_insert(0);
        *value += delta;
        Ok(*value)
    }
}
