use super::circuit_breaker::CircuitBreaker;
use super::types::{CounterResponse, IncrementRequest};
use super::CounterStore;
use crate::config::StoreConfig;
use crate::error::{VisitCounterError, VisitCounterResult};
use crate::metrics::StoreMetrics;
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode, Url};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, instrument, trace, warn};

/// HTTP client for a REST counter store.
///
/// Endpoints:
/// - `GET  {base}/counters/{key}` returns `{"value": n}`, or 404 for an
///   unknown key (read as 0)
/// - `POST {base}/counters/{key}/increment` with `{"delta": n}` returns the
///   new `{"value": n}`
pub struct HttpStore {
    client: Client,
    base_url: Url,
    max_retries: u32,
    retry_delay: Duration,
    auth_credentials: Option<(String, String)>,
    breaker: CircuitBreaker,
    metrics: Option<Arc<StoreMetrics>>,
}

impl HttpStore {
    /// Create a new HttpStore with default retry and timeout settings
    pub fn new(base_url: &str) -> VisitCounterResult<Self> {
        let config = StoreConfig {
            url: base_url.to_string(),
            ..StoreConfig::default()
        };
        Self::from_config(&config, None)
    }

    /// Create a new HttpStore from the `[store]` configuration section
    pub fn from_config(
        config: &StoreConfig,
        metrics: Option<Arc<StoreMetrics>>,
    ) -> VisitCounterResult<Self> {
        // Validate URL at construction time (fail fast on invalid URL)
        let base_url = Url::parse(&config.url)
            .map_err(|e| VisitCounterError::InvalidArgument(format!("Invalid store URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(VisitCounterError::InvalidArgument(format!(
                "Store URL cannot be a base: {}",
                config.url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| VisitCounterError::Io(format!("Failed to create HTTP client: {}", e)))?;

        let auth_credentials = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            (Some(user), None) => Some((user.clone(), String::new())),
            _ => None,
        };

        let mut breaker = CircuitBreaker::new(
            config.circuit_failure_threshold,
            Duration::from_secs(config.circuit_cooldown_secs),
        );
        if let Some(metrics) = &metrics {
            breaker = breaker.with_metrics(Arc::clone(metrics));
        }

        Ok(Self {
            client,
            base_url,
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            auth_credentials,
            breaker,
            metrics,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Create Authorization header for HTTP Basic Auth
    fn create_auth_header(&self) -> Option<String> {
        self.auth_credentials.as_ref().map(|(username, password)| {
            let credentials = format!("{}:{}", username, password);
            let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
            format!("Basic {}", encoded)
        })
    }

    /// `{base}/counters/{key}[/suffix]` with the key percent-encoded as one
    /// path segment.
    fn counter_url(&self, key: &str, suffix: Option<&str>) -> VisitCounterResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                VisitCounterError::InvalidArgument("Store URL cannot be a base".to_string())
            })?;
            segments.pop_if_empty().push("counters").push(key);
            if let Some(suffix) = suffix {
                segments.push(suffix);
            }
        }
        Ok(url)
    }

    /// Execute request with automatic retry for transient failures
    async fn execute_with_retry<F, Fut>(
        &self,
        endpoint: &str,
        operation: F,
    ) -> VisitCounterResult<reqwest::Response>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = reqwest::Result<reqwest::Response>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                if let Some(metrics) = &self.metrics {
                    metrics.record_retry(endpoint, attempt);
                }
            }

            match operation().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_server_error() && attempt < self.max_retries {
                        warn!(
                            endpoint,
                            status = status.as_u16(),
                            attempt = attempt + 1,
                            "Server error, retrying"
                        );
                        last_error = Some(VisitCounterError::Api {
                            status: status.as_u16(),
                            message: "server error".to_string(),
                        });
                        sleep(self.retry_delay * (attempt + 1)).await;
                        continue;
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS && attempt < self.max_retries {
                        let retry_after = response
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .map(Duration::from_secs)
                            .unwrap_or_else(|| self.retry_delay * (attempt + 1));

                        warn!(
                            endpoint,
                            status = status.as_u16(),
                            retry_after_secs = retry_after.as_secs(),
                            attempt = attempt + 1,
                            "Rate limited"
                        );
                        last_error = Some(VisitCounterError::Api {
                            status: status.as_u16(),
                            message: "rate limited".to_string(),
                        });
                        sleep(retry_after).await;
                        continue;
                    }

                    return Ok(response);
                }
                Err(e) => {
                    let store_error: VisitCounterError = e.into();
                    if store_error.is_transient() && attempt < self.max_retries {
                        warn!(endpoint, attempt = attempt + 1, error = %store_error, "Retrying");
                        last_error = Some(store_error);
                        sleep(self.retry_delay * (attempt + 1)).await;
                    } else {
                        return Err(store_error);
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| VisitCounterError::StoreUnavailable("Retry limit exceeded".to_string())))
    }

    /// Helper to check response status and convert errors
    async fn check_response(
        &self,
        response: reqwest::Response,
    ) -> VisitCounterResult<reqwest::Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let message = match response.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
            Err(e) => {
                return Err(VisitCounterError::StoreUnavailable(format!(
                    "Failed to read error response body: {}",
                    e
                )))
            }
        };
        Err(VisitCounterError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Run one logical store call through the breaker, retries and metrics.
    ///
    /// Callers usually bound this future with their own deadline. If it is
    /// dropped before the store answers, the call still counts as a failure
    /// towards the circuit breaker.
    async fn call<F, Fut>(
        &self,
        endpoint: &'static str,
        request: F,
    ) -> VisitCounterResult<reqwest::Response>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = reqwest::Result<reqwest::Response>>,
    {
        if !self.breaker.can_execute() {
            if let Some(metrics) = &self.metrics {
                metrics.record_rejected(endpoint);
            }
            return Err(VisitCounterError::StoreUnavailable(
                "circuit breaker open".to_string(),
            ));
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_request(endpoint);
        }
        let pending = PendingCall::new(self, endpoint);

        let result = match self.execute_with_retry(endpoint, request).await {
            Ok(response) if response.status() == StatusCode::NOT_FOUND => Ok(response),
            Ok(response) => self.check_response(response).await,
            Err(e) => Err(e),
        };
        let elapsed = pending.finish();

        match &result {
            Ok(_) => {
                self.breaker.record_success();
                if let Some(metrics) = &self.metrics {
                    metrics.record_success(endpoint, elapsed);
                }
            }
            Err(e) => {
                if e.is_store_unavailable() || e.is_transient() {
                    self.breaker.record_failure();
                }
                if let Some(metrics) = &self.metrics {
                    metrics.record_failure(endpoint, e);
                }
            }
        }
        result
    }
}

/// Marks a store call as outstanding until [`PendingCall::finish`].
///
/// Dropping it unfinished means the caller gave up on the call, which is
/// recorded as a breaker failure and an abandoned call.
struct PendingCall<'a> {
    store: &'a HttpStore,
    endpoint: &'static str,
    started: Instant,
    finished: bool,
}

impl<'a> PendingCall<'a> {
    fn new(store: &'a HttpStore, endpoint: &'static str) -> Self {
        Self {
            store,
            endpoint,
            started: Instant::now(),
            finished: false,
        }
    }

    fn finish(mut self) -> Duration {
        self.finished = true;
        self.started.elapsed()
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let elapsed = self.started.elapsed();
        warn!(
            store_op = self.endpoint,
            elapsed_ms = elapsed.as_millis() as u64,
            "Store call abandoned before the store answered"
        );
        self.store.breaker.record_failure();
        if let Some(metrics) = &self.store.metrics {
            metrics.record_abandoned(self.endpoint, elapsed);
        }
    }
}

#[async_trait]
impl CounterStore for HttpStore {
    #[instrument(skip(self), fields(store_op = "get"))]
    async fn get(&self, key: &str) -> VisitCounterResult<u64> {
        let url = self.counter_url(key, None)?;
        trace!(store_op = "get", url = %url);

        let response = self
            .call("get", || {
                let mut req = self.client.get(url.clone());
                if let Some(auth_header) = self.create_auth_header() {
                    req = req.header("Authorization", auth_header);
                }
                req.send()
            })
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(store_op = "get", key, "Unknown counter, reading as 0");
            return Ok(0);
        }

        let body: CounterResponse = response.json().await?;
        Ok(body.value)
    }

    #[instrument(skip(self), fields(store_op = "increment_by"))]
    async fn increment_by(&self, key: &str, delta: u64) -> VisitCounterResult<u64> {
        let url = self.counter_url(key, Some("increment"))?;
        let body = IncrementRequest { delta };
        trace!(store_op = "increment_by", url = %url, delta);

        let response = self
            .call("increment_by", || {
                let mut req = self.client.post(url.clone()).json(&body);
                if let Some(auth_header) = self.create_auth_header() {
                    req = req.header("Authorization", auth_header);
                }
                req.send()
            })
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(VisitCounterError::Api {
                status: StatusCode::NOT_FOUND.as_u16(),
                message: format!("increment endpoint missing for {}", key),
            });
        }

        let body: CounterResponse = response.json().await?;
        debug!(store_op = "increment_by", key, delta, value = body.value);
        Ok(body.value)
    }
}
