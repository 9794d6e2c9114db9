use super::buffer::Deltas;
use super::CounterCore;
use crate::error::VisitCounterError;
use crate::types::PageId;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

/// Outcome of a single flush cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Pages whose delta the store acknowledged
    pub keys_flushed: usize,
    /// Visits the store acknowledged
    pub visits_flushed: u64,
    /// Pages whose delta was merged back for the next cycle
    pub keys_failed: usize,
    /// Visits merged back for the next cycle
    pub visits_requeued: u64,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.keys_flushed == 0 && self.keys_failed == 0
    }

    pub fn has_failures(&self) -> bool {
        self.keys_failed > 0
    }
}

/// Apply one drained page delta under the page's exclusive flush gate.
async fn apply_delta(
    core: &CounterCore,
    page: &PageId,
    delta: u64,
) -> Result<u64, VisitCounterError> {
    let _gate = core.gates.write(page).await;
    let result = timeout(
        core.settings.store_timeout,
        core.store.increment_by(page.as_str(), delta),
    )
    .await;

    match result {
        Ok(Ok(total)) => {
            core.buffer.settle(page, delta);
            Ok(total)
        }
        Ok(Err(e)) => Err(e.into_store_unavailable()),
        Err(_) => Err(VisitCounterError::StoreUnavailable(format!(
            "increment_by timed out after {:?}",
            core.settings.store_timeout
        ))),
    }
}

/// Drain the buffer and push every delta to the store.
///
/// Deltas the store rejects (or that time out) are merged back into the
/// buffer and retried on the next cycle. Also sweeps expired cache entries
/// and idle flush gates.
pub(crate) async fn flush_once(core: &CounterCore) -> FlushReport {
    core.cache.purge_expired(Instant::now());
    core.gates.prune();

    let drained = core.buffer.drain_all();
    if drained.is_empty() {
        core.metrics.flush.record_cycle(true);
        debug!(operation = "flush", "Nothing to flush");
        return FlushReport::default();
    }
    core.metrics.flush.record_cycle(false);

    let outcomes: Vec<_> = stream::iter(drained)
        .map(|(page, delta)| async move {
            let outcome = apply_delta(core, &page, delta).await;
            (page, delta, outcome)
        })
        .buffer_unordered(core.settings.flush_concurrency.max(1))
        .collect()
        .await;

    let mut report = FlushReport::default();
    let mut failed = Deltas::new();
    for (page, delta, outcome) in outcomes {
        match outcome {
            Ok(total) => {
                debug!(page_id = %page, delta, total, "Flushed visits");
                core.metrics.flush.record_flushed(delta);
                report.keys_flushed += 1;
                report.visits_flushed += delta;
            }
            Err(e) => {
                warn!(page_id = %page, delta, error = %e, "Flush failed, requeueing visits");
                core.metrics.flush.record_requeued(delta);
                report.keys_failed += 1;
                report.visits_requeued += delta;
                failed.insert(page, delta);
            }
        }
    }
    core.buffer.merge_back(failed);

    info!(
        operation = "flush",
        keys_flushed = report.keys_flushed,
        visits_flushed = report.visits_flushed,
        keys_failed = report.keys_failed,
        visits_requeued = report.visits_requeued,
    );
    report
}

/// Background task flushing the buffer every `interval`.
///
/// Started once per service. An empty cycle is normal and the loop keeps
/// going; only [`FlushWorker::stop`] (or dropping the worker) ends it, after
/// one last best-effort flush.
pub struct FlushWorker {
    handle: Option<JoinHandle<FlushReport>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl FlushWorker {
    /// Spawn the flush loop on the current tokio runtime.
    pub(crate) fn spawn(core: Arc<CounterCore>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            info!(interval_ms = interval.as_millis() as u64, "Flusher started");

            loop {
                tokio::select! {
                    biased;

                    // Sender dropped counts as a shutdown request too
                    _ = &mut shutdown_rx => {
                        info!("Flusher received shutdown signal");
                        break;
                    }

                    _ = sleep(interval) => {}
                }

                // Runs outside select! so a shutdown never cancels a cycle
                // with deltas in flight.
                flush_once(&core).await;
            }

            let report = flush_once(&core).await;
            if report.has_failures() {
                error!(
                    visits_requeued = report.visits_requeued,
                    "Final flush incomplete, visits remain unpersisted"
                );
            }
            info!("Flusher shut down");
            report
        });

        Self {
            handle: Some(handle),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the loop to stop and wait for its final flush.
    pub async fn stop(mut self) -> Option<FlushReport> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let handle = self.handle.take()?;
        match handle.await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(error = %e, "Flusher task failed");
                None
            }
        }
    }
}

impl Drop for FlushWorker {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
