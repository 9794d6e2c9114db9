//! Settings and counter fixtures.

use std::sync::Arc;
use std::time::Duration;
use visit_counter::{CounterSettings, CounterStore, Metrics, VisitCounter};

/// Cache TTL used by the fixtures
pub const TTL: Duration = Duration::from_secs(5);

/// Flush interval used by the fixtures
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Store call deadline used by the fixtures
pub const STORE_TIMEOUT: Duration = Duration::from_secs(2);

pub fn test_settings() -> CounterSettings {
    CounterSettings {
        cache_ttl: TTL,
        flush_interval: FLUSH_INTERVAL,
        store_timeout: STORE_TIMEOUT,
        flush_concurrency: 4,
    }
}

/// Build a counter over `store` with the fixture settings.
pub fn create_counter(store: Arc<dyn CounterStore>) -> VisitCounter {
    create_counter_with(store, test_settings())
}

pub fn create_counter_with(store: Arc<dyn CounterStore>, settings: CounterSettings) -> VisitCounter {
    VisitCounter::new(store, settings, Arc::new(Metrics::new())).expect("valid settings")
}
