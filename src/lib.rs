pub mod config;
pub mod counter;
pub mod error;
pub mod metrics;
pub mod store;
pub mod types;

pub use config::{CliArgs, Config};
pub use counter::{CounterSettings, FlushReport, VisitCounter};
pub use error::{VisitCounterError, VisitCounterResult};
pub use metrics::Metrics;
pub use store::{CounterStore, HttpStore, MemoryStore};
pub use types::{PageId, ReadSource, VisitCount};

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// URL scheme selecting the in-process [`MemoryStore`].
pub const MEMORY_STORE_SCHEME: &str = "memory";

/// Open the store named by `[store].url`.
///
/// `memory://` selects an in-process store, anything else is treated as the
/// base URL of an HTTP counter store.
pub fn open_store(config: &Config, metrics: &Metrics) -> Result<Arc<dyn CounterStore>> {
    if config
        .store
        .url
        .starts_with(&format!("{}://", MEMORY_STORE_SCHEME))
    {
        info!(store = "memory", "Using in-process counter store");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = HttpStore::from_config(&config.store, Some(Arc::clone(&metrics.store)))
        .context("Failed to create counter store client")?;
    info!(store = "http", url = %store.base_url(), "Using HTTP counter store");
    Ok(Arc::new(store))
}

/// Build a running counter from configuration.
pub fn start(config: &Config, metrics: Arc<Metrics>) -> Result<VisitCounter> {
    let store = open_store(config, &metrics)?;
    VisitCounter::from_config(&config.counter, store, metrics).context("Failed to start visit counter")
}

/// Record `times` visits to `page_id`, flush them, and return the total the
/// store reports afterwards.
pub async fn hit(config: Config, page_id: &str, times: u64) -> Result<VisitCount> {
    let counter = start(&config, Arc::new(Metrics::new()))?;

    for _ in 0..times {
        counter
            .increment_visit(page_id)
            .with_context(|| format!("Failed to record visit for {:?}", page_id))?;
    }

    let report = counter.shutdown().await.unwrap_or_default();
    if report.has_failures() {
        warn!(
            visits_requeued = report.visits_requeued,
            "Some visits could not be persisted"
        );
    }

    Ok(counter.get_visit_count(page_id).await?)
}

/// Read the current total for `page_id`.
pub async fn count(config: Config, page_id: &str) -> Result<VisitCount> {
    let counter = start(&config, Arc::new(Metrics::new()))?;
    let count = counter.get_visit_count(page_id).await?;
    counter.shutdown().await;
    Ok(count)
}

/// Load parameters for [`simulate`].
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    pub pages: usize,
    pub writers: usize,
    pub visits_per_writer: u64,
    pub readers: usize,
    pub duration: Duration,
}

/// Per-page totals observed at the end of a simulation.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSummary {
    pub visits_sent: u64,
    pub pages: Vec<(String, VisitCount)>,
}

/// Sleep between visits so `visits` spread over roughly `duration`.
fn writer_pace(duration: Duration, visits: u64) -> Duration {
    let nanos = duration.as_nanos() / u128::from(visits.max(1));
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Drive concurrent writers and readers against the configured store, then
/// shut down and report the final totals.
pub async fn simulate(config: Config, options: SimulateOptions) -> Result<SimulationSummary> {
    let metrics = Arc::new(Metrics::new());
    let counter = Arc::new(start(&config, Arc::clone(&metrics))?);
    let page_ids: Arc<Vec<String>> = Arc::new(
        (0..options.pages.max(1))
            .map(|i| format!("page-{}", i))
            .collect(),
    );

    let stop = Arc::new(AtomicBool::new(false));
    let periodic = (config.logging.metrics_interval_secs > 0).then(|| {
        metrics.spawn_periodic_logging(config.logging.metrics_interval_secs, Arc::clone(&stop))
    });

    let mut writers = Vec::with_capacity(options.writers);
    for writer in 0..options.writers {
        let counter = Arc::clone(&counter);
        let page_ids = Arc::clone(&page_ids);
        let visits = options.visits_per_writer;
        let pace = writer_pace(options.duration, visits);
        writers.push(tokio::spawn(async move {
            for i in 0..visits {
                let page = &page_ids[(writer + i as usize) % page_ids.len()];
                counter.increment_visit(page)?;
                if !pace.is_zero() {
                    tokio::time::sleep(pace).await;
                }
            }
            Ok::<_, VisitCounterError>(visits)
        }));
    }

    let mut readers = Vec::with_capacity(options.readers);
    for reader in 0..options.readers {
        let counter = Arc::clone(&counter);
        let page_ids = Arc::clone(&page_ids);
        let stop = Arc::clone(&stop);
        readers.push(tokio::spawn(async move {
            let mut i = reader;
            while !stop.load(Ordering::Relaxed) {
                let page = &page_ids[i % page_ids.len()];
                if let Ok(count) = counter.get_visit_count(page).await {
                    tracing::trace!(page_id = %page, visits = count.visits, source = %count.source);
                }
                i += 1;
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }));
    }

    let mut visits_sent = 0;
    for writer in writers {
        visits_sent += writer.await.context("Writer task panicked")??;
    }
    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.await.context("Reader task panicked")?;
    }
    if let Some(periodic) = periodic {
        periodic.abort();
    }

    counter.shutdown().await;

    let mut pages = Vec::with_capacity(page_ids.len());
    for page in page_ids.iter() {
        pages.push((page.clone(), counter.get_visit_count(page).await?));
    }

    Ok(SimulationSummary { visits_sent, pages })
}
