use crate::error::VisitCounterError;
use crate::types::ReadSource;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Metrics for caller-facing counter operations
#[derive(Debug, Default)]
pub struct CounterMetrics {
    /// Total number of accepted increments
    pub increments: AtomicU64,
    /// Total number of rejected page ids
    pub invalid_keys: AtomicU64,
    /// Reads answered from the cache
    pub reads_cache: AtomicU64,
    /// Reads answered from the store alone
    pub reads_store: AtomicU64,
    /// Reads answered from store plus buffered visits
    pub reads_buffer_store: AtomicU64,
    /// Reads answered without the store
    pub reads_degraded: AtomicU64,
}

impl CounterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_increment(&self) {
        self.increments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid_key(&self) {
        self.invalid_keys.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read(&self, source: ReadSource) {
        let counter = match source {
            ReadSource::Cache => &self.reads_cache,
            ReadSource::Store => &self.reads_store,
            ReadSource::BufferAndStore => &self.reads_buffer_store,
            ReadSource::Degraded => &self.reads_degraded,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        trace!(counter_op = "read", source = %source);
    }

    pub fn total_reads(&self) -> u64 {
        self.reads_cache.load(Ordering::Relaxed)
            + self.reads_store.load(Ordering::Relaxed)
            + self.reads_buffer_store.load(Ordering::Relaxed)
            + self.reads_degraded.load(Ordering::Relaxed)
    }

    /// Log a summary of counter metrics
    pub fn log_summary(&self, elapsed_secs: f64) {
        let increments = self.increments.load(Ordering::Relaxed);
        let reads = self.total_reads();
        let increments_per_sec = if elapsed_secs > 0.0 {
            increments as f64 / elapsed_secs
        } else {
            0.0
        };

        info!(
            operation = "counter_metrics_summary",
            increments = increments,
            increments_per_sec = increments_per_sec,
            invalid_keys = self.invalid_keys.load(Ordering::Relaxed),
            reads = reads,
            reads_cache = self.reads_cache.load(Ordering::Relaxed),
            reads_store = self.reads_store.load(Ordering::Relaxed),
            reads_buffer_store = self.reads_buffer_store.load(Ordering::Relaxed),
            reads_degraded = self.reads_degraded.load(Ordering::Relaxed),
            duration_secs = elapsed_secs,
        );
    }
}

/// Metrics for counter store calls
///
/// Every call that passes the circuit breaker ends in exactly one of
/// success, failure or abandoned, so `request_count` always balances.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    /// Calls admitted by the circuit breaker
    pub request_count: AtomicU64,
    /// `get` calls admitted
    pub get_count: AtomicU64,
    /// `increment_by` calls admitted
    pub increment_count: AtomicU64,
    pub success_count: AtomicU64,
    /// Calls that returned an error, timeouts included
    pub failure_count: AtomicU64,
    /// Failures caused by a request timing out
    pub timeout_count: AtomicU64,
    /// Calls dropped by the caller before the store answered
    pub abandoned_count: AtomicU64,
    /// Calls failed fast by an open circuit breaker
    pub rejected_count: AtomicU64,
    pub retry_count: AtomicU64,
    /// Total time spent in successful store calls (nanoseconds)
    pub total_latency_ns: AtomicU64,
    pub circuit_breaker_opens: AtomicU64,
    pub circuit_breaker_closes: AtomicU64,
}

impl StoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, endpoint: &str) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        match endpoint {
            "get" => self.get_count.fetch_add(1, Ordering::Relaxed),
            _ => self.increment_count.fetch_add(1, Ordering::Relaxed),
        };
        trace!(store_op = endpoint, "Store call started");
    }

    pub fn record_success(&self, endpoint: &str, latency: Duration) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
        trace!(
            store_op = endpoint,
            latency_ms = latency.as_millis() as u64,
            "Store call succeeded"
        );
    }

    pub fn record_failure(&self, endpoint: &str, error: &VisitCounterError) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        if matches!(error, VisitCounterError::TimedOut(_)) {
            self.timeout_count.fetch_add(1, Ordering::Relaxed);
        }
        debug!(store_op = endpoint, error = %error, "Store call failed");
    }

    pub fn record_abandoned(&self, endpoint: &str, elapsed: Duration) {
        self.abandoned_count.fetch_add(1, Ordering::Relaxed);
        debug!(
            store_op = endpoint,
            elapsed_ms = elapsed.as_millis() as u64,
            "Store call abandoned by caller deadline"
        );
    }

    pub fn record_rejected(&self, endpoint: &str) {
        self.rejected_count.fetch_add(1, Ordering::Relaxed);
        trace!(store_op = endpoint, "Store call rejected by open circuit");
    }

    pub fn record_retry(&self, endpoint: &str, attempt: u32) {
        self.retry_count.fetch_add(1, Ordering::Relaxed);
        debug!(store_op = endpoint, attempt, "Retrying store call");
    }

    pub fn record_circuit_breaker_open(&self) {
        self.circuit_breaker_opens.fetch_add(1, Ordering::Relaxed);
        warn!(operation = "circuit_breaker", state = "opened");
    }

    pub fn record_circuit_breaker_close(&self) {
        self.circuit_breaker_closes.fetch_add(1, Ordering::Relaxed);
        info!(operation = "circuit_breaker", state = "closed");
    }

    /// Average latency of successful calls in milliseconds
    pub fn avg_latency_ms(&self) -> f64 {
        let count = self.success_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let total_ns = self.total_latency_ns.load(Ordering::Relaxed);
        (total_ns as f64 / count as f64) / 1_000_000.0
    }

    /// Share of admitted calls that succeeded, as a percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.request_count.load(Ordering::Relaxed);
        if total == 0 {
            return 100.0;
        }
        let success = self.success_count.load(Ordering::Relaxed);
        (success as f64 / total as f64) * 100.0
    }

    /// Calls that ended without an answer: failed, abandoned or rejected
    pub fn unanswered(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
            + self.abandoned_count.load(Ordering::Relaxed)
            + self.rejected_count.load(Ordering::Relaxed)
    }

    pub fn log_summary(&self) {
        info!(
            operation = "store_metrics_summary",
            gets = self.get_count.load(Ordering::Relaxed),
            increments = self.increment_count.load(Ordering::Relaxed),
            failed = self.failure_count.load(Ordering::Relaxed),
            timed_out = self.timeout_count.load(Ordering::Relaxed),
            abandoned = self.abandoned_count.load(Ordering::Relaxed),
            rejected = self.rejected_count.load(Ordering::Relaxed),
            retries = self.retry_count.load(Ordering::Relaxed),
            breaker_opens = self.circuit_breaker_opens.load(Ordering::Relaxed),
            success_rate_pct = self.success_rate(),
            avg_latency_ms = self.avg_latency_ms(),
        );
    }
}

/// Metrics for the read cache
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Total number of cache hits
    pub hits: AtomicU64,
    /// Total number of cache misses (absent or expired)
    pub misses: AtomicU64,
    /// Entries dropped because a write arrived for the page
    pub invalidations: AtomicU64,
    /// Computed totals refused because a write raced the read
    pub rejected_inserts: AtomicU64,
    /// Expired entries removed by the janitor
    pub purged: AtomicU64,
    /// Current cache size (entries)
    pub current_size: AtomicU64,
    /// Peak cache size observed
    pub peak_size: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_insert(&self) {
        self.rejected_inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_purged(&self, count: usize) {
        self.purged.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Update current cache size and track peak
    pub fn update_size(&self, size: usize) {
        let size = size as u64;
        self.current_size.store(size, Ordering::Relaxed);
        self.peak_size.fetch_max(size, Ordering::Relaxed);
    }

    /// Get hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        (hits as f64 / total as f64) * 100.0
    }

    /// Log a summary of cache metrics
    pub fn log_summary(&self) {
        info!(
            operation = "cache_metrics_summary",
            hits = self.hits.load(Ordering::Relaxed),
            misses = self.misses.load(Ordering::Relaxed),
            hit_rate_pct = self.hit_rate(),
            invalidations = self.invalidations.load(Ordering::Relaxed),
            rejected_inserts = self.rejected_inserts.load(Ordering::Relaxed),
            purged = self.purged.load(Ordering::Relaxed),
            current_size = self.current_size.load(Ordering::Relaxed),
            peak_size = self.peak_size.load(Ordering::Relaxed),
        );
    }
}

/// Metrics for the background flusher
#[derive(Debug, Default)]
pub struct FlushMetrics {
    /// Flush cycles run, including empty ones
    pub cycles: AtomicU64,
    /// Cycles that found nothing to flush
    pub empty_cycles: AtomicU64,
    /// Page deltas acknowledged by the store
    pub keys_flushed: AtomicU64,
    /// Visits acknowledged by the store
    pub visits_flushed: AtomicU64,
    /// Page deltas that failed and were merged back
    pub keys_failed: AtomicU64,
    /// Visits merged back after a failed flush
    pub visits_requeued: AtomicU64,
}

impl FlushMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cycle(&self, empty: bool) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        if empty {
            self.empty_cycles.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_flushed(&self, delta: u64) {
        self.keys_flushed.fetch_add(1, Ordering::Relaxed);
        self.visits_flushed.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn record_requeued(&self, delta: u64) {
        self.keys_failed.fetch_add(1, Ordering::Relaxed);
        self.visits_requeued.fetch_add(delta, Ordering::Relaxed);
    }

    /// Log a summary of flush metrics
    pub fn log_summary(&self) {
        info!(
            operation = "flush_metrics_summary",
            cycles = self.cycles.load(Ordering::Relaxed),
            empty_cycles = self.empty_cycles.load(Ordering::Relaxed),
            keys_flushed = self.keys_flushed.load(Ordering::Relaxed),
            visits_flushed = self.visits_flushed.load(Ordering::Relaxed),
            keys_failed = self.keys_failed.load(Ordering::Relaxed),
            visits_requeued = self.visits_requeued.load(Ordering::Relaxed),
        );
    }
}

/// Combined metrics for the entire system
pub struct Metrics {
    pub counter: Arc<CounterMetrics>,
    pub store: Arc<StoreMetrics>,
    pub cache: Arc<CacheMetrics>,
    pub flush: Arc<FlushMetrics>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            counter: Arc::new(CounterMetrics::new()),
            store: Arc::new(StoreMetrics::new()),
            cache: Arc::new(CacheMetrics::new()),
            flush: Arc::new(FlushMetrics::new()),
            start_time: Instant::now(),
        }
    }

    /// Log a complete metrics summary
    pub fn log_full_summary(&self) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        info!("=== visit-counter Metrics Summary ===");
        self.counter.log_summary(elapsed);
        self.cache.log_summary();
        self.flush.log_summary();
        self.store.log_summary();
        info!("=====================================");
    }

    /// Log periodic metrics summary (for background task)
    pub fn log_periodic(&self) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        info!("--- visit-counter Metrics (periodic) ---");
        self.counter.log_summary(elapsed);
        self.cache.log_summary();
        self.flush.log_summary();
        self.store.log_summary();
        info!("----------------------------------------");
    }

    /// Get elapsed time since metrics creation
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Create a periodic logging background task
    pub fn spawn_periodic_logging(
        self: &Arc<Self>,
        interval_secs: u64,
        stop: Arc<std::sync::atomic::AtomicBool>,
    ) -> tokio::task::JoinHandle<()> {
        let metrics = Arc::clone(self);
        tokio::spawn(async move {
            use tokio::time::{interval, Duration};

            let mut ticker = interval(Duration::from_secs(interval_secs));

            loop {
                ticker.tick().await;

                if stop.load(std::sync::atomic::Ordering::Relaxed) {
                    break;
                }

                metrics.log_periodic();
            }
        })
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_metrics_reads_by_source() {
        let metrics = CounterMetrics::new();

        metrics.record_increment();
        metrics.record_increment();
        metrics.record_read(ReadSource::Cache);
        metrics.record_read(ReadSource::BufferAndStore);
        metrics.record_read(ReadSource::Degraded);

        assert_eq!(metrics.increments.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.reads_cache.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.reads_store.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.reads_degraded.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.total_reads(), 3);
    }

    #[test]
    fn test_store_metrics_balance_per_call() {
        let metrics = StoreMetrics::new();

        metrics.record_request("get");
        metrics.record_success("get", Duration::from_millis(50));

        metrics.record_request("increment_by");
        metrics.record_failure(
            "increment_by",
            &VisitCounterError::TimedOut("request".to_string()),
        );

        metrics.record_request("get");
        metrics.record_abandoned("get", Duration::from_millis(200));

        metrics.record_rejected("get");

        assert_eq!(metrics.request_count.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.get_count.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.increment_count.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.success_count.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.failure_count.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.timeout_count.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.abandoned_count.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.unanswered(), 3);
        // Rejected calls never reached the store
        assert_eq!(
            metrics.success_count.load(Ordering::Relaxed)
                + metrics.failure_count.load(Ordering::Relaxed)
                + metrics.abandoned_count.load(Ordering::Relaxed),
            metrics.request_count.load(Ordering::Relaxed)
        );
    }

    #[test]
    fn test_store_avg_latency() {
        let metrics = StoreMetrics::new();
        assert_eq!(metrics.avg_latency_ms(), 0.0);

        metrics.record_success("get", Duration::from_millis(100));
        metrics.record_success("get", Duration::from_millis(300));

        let avg = metrics.avg_latency_ms();
        assert!(avg > 199.0 && avg < 201.0);
    }

    #[test]
    fn test_cache_metrics() {
        let metrics = CacheMetrics::new();

        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();
        metrics.update_size(4);
        metrics.update_size(2);

        assert_eq!(metrics.hit_rate(), 66.66666666666667);
        assert_eq!(metrics.current_size.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.peak_size.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn test_flush_metrics() {
        let metrics = FlushMetrics::new();

        metrics.record_cycle(true);
        metrics.record_cycle(false);
        metrics.record_flushed(3);
        metrics.record_flushed(2);
        metrics.record_requeued(7);

        assert_eq!(metrics.cycles.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.empty_cycles.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.keys_flushed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.visits_flushed.load(Ordering::Relaxed), 5);
        assert_eq!(metrics.visits_requeued.load(Ordering::Relaxed), 7);
    }
}
