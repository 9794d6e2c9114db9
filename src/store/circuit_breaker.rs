use crate::metrics::StoreMetrics;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed,
    Open { since: Instant },
    HalfOpen,
}

/// Fails store calls fast after a run of consecutive failures.
///
/// Opens once `failure_threshold` consecutive calls have failed, rejects
/// calls for `cooldown`, then lets calls through half-open. One success
/// closes it again; a failure while half-open reopens it.
pub struct CircuitBreaker {
    phase: Mutex<Phase>,
    failure_count: AtomicU32,
    failure_threshold: u32,
    cooldown: Duration,
    metrics: Option<Arc<StoreMetrics>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            phase: Mutex::new(Phase::Closed),
            failure_count: AtomicU32::new(0),
            failure_threshold: failure_threshold.max(1),
            cooldown,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<StoreMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn can_execute(&self) -> bool {
        let mut phase = self.phase();
        match *phase {
            Phase::Closed | Phase::HalfOpen => true,
            Phase::Open { since } => {
                if since.elapsed() >= self.cooldown {
                    *phase = Phase::HalfOpen;
                    debug!("Circuit breaker transitioning to half-open");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::SeqCst);
        let mut phase = self.phase();
        if !matches!(*phase, Phase::Closed) {
            debug!("Circuit breaker closing");
            *phase = Phase::Closed;
            if let Some(metrics) = &self.metrics {
                metrics.record_circuit_breaker_close();
            }
        }
    }

    pub fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        let mut phase = self.phase();
        let trip = match *phase {
            Phase::HalfOpen => true,
            Phase::Closed => count >= self.failure_threshold,
            Phase::Open { .. } => false,
        };
        if trip {
            warn!(
                consecutive_failures = count,
                "Circuit breaker opened, store calls will fail fast"
            );
            *phase = Phase::Open {
                since: Instant::now(),
            };
            if let Some(metrics) = &self.metrics {
                metrics.record_circuit_breaker_open();
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        match *self.phase() {
            Phase::Closed => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen => CircuitState::HalfOpen,
        }
    }
}
