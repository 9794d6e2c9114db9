use super::flusher::{flush_once, FlushReport, FlushWorker};
use super::CounterCore;
use crate::config::CounterConfig;
use crate::error::{ValidationIssue, VisitCounterError, VisitCounterResult};
use crate::metrics::Metrics;
use crate::store::CounterStore;
use crate::types::{PageId, ReadSource, VisitCount};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, instrument, warn};

/// Timing and concurrency knobs fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSettings {
    /// How long a computed total is served from the cache
    pub cache_ttl: Duration,
    /// Pause between flush cycles
    pub flush_interval: Duration,
    /// Deadline for any single store call
    pub store_timeout: Duration,
    /// Store calls a flush cycle may have outstanding at once
    pub flush_concurrency: usize,
}

impl Default for CounterSettings {
    fn default() -> Self {
        Self::from(&CounterConfig::default())
    }
}

impl From<&CounterConfig> for CounterSettings {
    fn from(config: &CounterConfig) -> Self {
        Self {
            cache_ttl: config.cache_ttl(),
            flush_interval: config.flush_interval(),
            store_timeout: config.store_timeout(),
            flush_concurrency: config.flush_concurrency,
        }
    }
}

impl CounterSettings {
    pub fn validate(&self) -> VisitCounterResult<()> {
        let checks = [
            ("cache_ttl", self.cache_ttl.is_zero()),
            ("flush_interval", self.flush_interval.is_zero()),
            ("store_timeout", self.store_timeout.is_zero()),
            ("flush_concurrency", self.flush_concurrency == 0),
        ];
        let issues: Vec<_> = checks
            .iter()
            .filter(|(_, invalid)| *invalid)
            .map(|(field, _)| ValidationIssue {
                field: field.to_string(),
                message: "must be positive".to_string(),
            })
            .collect();

        if issues.is_empty() {
            Ok(())
        } else {
            Err(VisitCounterError::Validation(issues))
        }
    }
}

/// Page visit counter in front of a shared counter store.
///
/// Increments only touch the in-memory buffer. Reads are served from a
/// short-lived cache, or computed as store value plus buffered visits on a
/// miss. A background task started by [`VisitCounter::new`] pushes buffered
/// visits to the store every flush interval until
/// [`VisitCounter::shutdown`] is called.
///
/// # Consistency
///
/// For a single page, an increment that returned before a read starts is
/// always reflected in that read. A read racing an increment sees the total
/// either before or after it. Totals only reach the cache if no increment
/// for the page landed while they were being computed.
pub struct VisitCounter {
    core: Arc<CounterCore>,
    flusher: Mutex<Option<FlushWorker>>,
}

impl VisitCounter {
    /// Build a counter over `store` and start its flusher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        store: Arc<dyn CounterStore>,
        settings: CounterSettings,
        metrics: Arc<Metrics>,
    ) -> VisitCounterResult<Self> {
        settings.validate()?;

        let core = Arc::new(CounterCore::new(store, settings, metrics));
        let flusher = FlushWorker::spawn(Arc::clone(&core), settings.flush_interval);

        info!(
            cache_ttl_ms = settings.cache_ttl.as_millis() as u64,
            flush_interval_ms = settings.flush_interval.as_millis() as u64,
            store_timeout_ms = settings.store_timeout.as_millis() as u64,
            "Visit counter started"
        );

        Ok(Self {
            core,
            flusher: Mutex::new(Some(flusher)),
        })
    }

    pub fn from_config(
        config: &CounterConfig,
        store: Arc<dyn CounterStore>,
        metrics: Arc<Metrics>,
    ) -> VisitCounterResult<Self> {
        Self::new(store, CounterSettings::from(config), metrics)
    }

    fn parse_page(&self, page_id: &str) -> VisitCounterResult<PageId> {
        PageId::parse(page_id).inspect_err(|_| {
            self.core.metrics.counter.record_invalid_key();
        })
    }

    /// Record one visit to `page_id`.
    ///
    /// Never touches the store; the visit is persisted by the next flush.
    pub fn increment_visit(&self, page_id: &str) -> VisitCounterResult<()> {
        let page = self.parse_page(page_id)?;
        self.core.buffer.increment(&page);
        self.core.cache.invalidate(&page);
        self.core.metrics.counter.record_increment();
        Ok(())
    }

    /// Current visit total for `page_id`.
    ///
    /// Only fails for an invalid page id. If the store cannot be read the
    /// result carries the buffered visits alone with
    /// [`ReadSource::Degraded`] and is not cached.
    #[instrument(skip(self), fields(counter_op = "get_visit_count"))]
    pub async fn get_visit_count(&self, page_id: &str) -> VisitCounterResult<VisitCount> {
        let page = self.parse_page(page_id)?;
        let core = &self.core;

        if let Some(visits) = core.cache.get(&page, Instant::now()) {
            core.metrics.counter.record_read(ReadSource::Cache);
            return Ok(VisitCount::new(visits, ReadSource::Cache));
        }

        // Held until the total is cached so a flush of this page cannot
        // land between the store read and the buffer snapshot.
        let _gate = core.gates.read(&page).await;

        let stored = match timeout(core.settings.store_timeout, core.store.get(page.as_str())).await {
            Ok(result) => result.map_err(VisitCounterError::into_store_unavailable),
            Err(_) => Err(VisitCounterError::StoreUnavailable(format!(
                "get timed out after {:?}",
                core.settings.store_timeout
            ))),
        };
        let snapshot = core.buffer.snapshot(&page);

        let count = match stored {
            Ok(value) => {
                let total = value.saturating_add(snapshot.delta);
                let source = if snapshot.delta > 0 {
                    ReadSource::BufferAndStore
                } else {
                    ReadSource::Store
                };
                let cached = core.cache.put_if(
                    page.clone(),
                    total,
                    Instant::now(),
                    core.settings.cache_ttl,
                    || core.buffer.version(&page) == snapshot.version,
                );
                if !cached {
                    debug!(page_id = %page, "Visit raced the read, total not cached");
                }
                VisitCount::new(total, source)
            }
            Err(e) => {
                warn!(
                    page_id = %page,
                    buffered = snapshot.delta,
                    error = %e,
                    "Store read failed, answering from buffer only"
                );
                VisitCount::new(snapshot.delta, ReadSource::Degraded)
            }
        };

        core.metrics.counter.record_read(count.source);
        Ok(count)
    }

    /// Run a flush cycle now, independent of the background schedule.
    pub async fn flush_now(&self) -> FlushReport {
        flush_once(&self.core).await
    }

    /// Visits for `page_id` not yet acknowledged by the store.
    pub fn pending_visits(&self, page_id: &str) -> VisitCounterResult<u64> {
        let page = self.parse_page(page_id)?;
        Ok(self.core.buffer.peek_delta(&page))
    }

    /// Visits waiting for the next flush, across all pages.
    pub fn pending_total(&self) -> u64 {
        self.core.buffer.pending_total()
    }

    pub fn settings(&self) -> &CounterSettings {
        &self.core.settings
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.core.metrics
    }

    pub fn is_running(&self) -> bool {
        self.flusher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(FlushWorker::is_running)
    }

    /// Stop the flusher after a final flush and log the metrics summary.
    ///
    /// Returns the final flush report, or `None` if the counter was already
    /// shut down. Visits that still fail to flush stay in the buffer; they
    /// are lost only if the process exits.
    pub async fn shutdown(&self) -> Option<FlushReport> {
        let worker = self
            .flusher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        info!("Visit counter shutting down");
        let report = worker.stop().await;
        self.core.metrics.log_full_summary();
        report
    }
}
