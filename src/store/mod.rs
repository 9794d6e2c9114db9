//! Counter store backends.
//!
//! The store is the durable, shared source of truth. The core only relies
//! on the two operations of [`CounterStore`]; everything about durability
//! and replication belongs to the backend.

pub mod circuit_breaker;
pub mod http;
pub mod memory;
pub mod types;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use http::HttpStore;
pub use memory::MemoryStore;

use crate::error::VisitCounterResult;
use async_trait::async_trait;

/// Persistent counter store contract.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current value for `key`. A missing key reads as 0.
    async fn get(&self, key: &str) -> VisitCounterResult<u64>;

    /// Atomically add `delta` to `key`, creating it at `delta` if absent.
    /// Returns the new total.
    async fn increment_by(&self, key: &str, delta: u64) -> VisitCounterResult<u64>;
}
