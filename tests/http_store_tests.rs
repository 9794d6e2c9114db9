//! HTTP counter store tests against a WireMock server
//!
//! These tests verify:
//! - The REST contract for reads and increments
//! - Retry on server errors and circuit breaking on repeated failure
//! - Basic authentication
//! - A full visit counter running over the HTTP store

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use visit_counter::metrics::StoreMetrics;
use visit_counter::store::CircuitState;
use visit_counter::{
    CounterSettings, CounterStore, HttpStore, ReadSource, VisitCount, VisitCounterError,
};

mod common;
use common::fixtures::{create_counter, create_counter_with, test_settings};
use common::mock_server::{
    create_test_store_config, setup_mock_store_with_counter, setup_mock_store_with_error,
};

#[tokio::test]
async fn test_get_existing_counter() {
    let mock_server = setup_mock_store_with_counter("home", 42).await;
    let store = HttpStore::new(&mock_server.uri()).unwrap();

    assert_eq!(store.get("home").await.unwrap(), 42);
}

#[tokio::test]
async fn test_get_missing_counter_reads_as_zero() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/counters/new-page"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let store = HttpStore::new(&mock_server.uri()).unwrap();
    assert_eq!(store.get("new-page").await.unwrap(), 0);
    // A 404 is an answer, not a failure
    assert_eq!(store.circuit_breaker().state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_increment_posts_delta() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/counters/home/increment"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"delta": 3})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "key": "home",
            "value": 13
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = HttpStore::new(&mock_server.uri()).unwrap();
    assert_eq!(store.increment_by("home", 3).await.unwrap(), 13);
}

#[tokio::test]
async fn test_page_id_is_encoded_as_one_segment() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/counters/blog%2Fpost%201"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": 5})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = HttpStore::new(&mock_server.uri()).unwrap();
    assert_eq!(store.get("blog/post 1").await.unwrap(), 5);
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/counters/home"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/counters/home"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": 7})))
        .mount(&mock_server)
        .await;

    let metrics = Arc::new(StoreMetrics::new());
    let config = create_test_store_config(mock_server.uri());
    let store = HttpStore::from_config(&config, Some(Arc::clone(&metrics))).unwrap();

    assert_eq!(store.get("home").await.unwrap(), 7);
    assert_eq!(metrics.retry_count.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.success_count.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_persistent_server_error_surfaces_as_unavailable() {
    let mock_server = setup_mock_store_with_error(500).await;
    let config = create_test_store_config(mock_server.uri());
    let store = HttpStore::from_config(&config, None).unwrap();

    let err = store.increment_by("home", 1).await.unwrap_err();
    assert!(err.is_store_unavailable(), "unexpected error: {:?}", err);

    // One initial attempt plus max_retries
    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let mock_server = setup_mock_store_with_error(400).await;
    let config = create_test_store_config(mock_server.uri());
    let store = HttpStore::from_config(&config, None).unwrap();

    match store.get("home").await {
        Err(VisitCounterError::Api { status, .. }) => assert_eq!(status, 400),
        other => panic!("expected api error, got {:?}", other),
    }
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 1);
    assert_eq!(store.circuit_breaker().state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_circuit_breaker_opens_after_repeated_failures() {
    let mock_server = setup_mock_store_with_error(503).await;
    let mut config = create_test_store_config(mock_server.uri());
    config.max_retries = 0;
    config.circuit_failure_threshold = 2;

    let metrics = Arc::new(StoreMetrics::new());
    let store = HttpStore::from_config(&config, Some(Arc::clone(&metrics))).unwrap();

    assert!(store.get("home").await.is_err());
    assert!(store.get("home").await.is_err());
    assert_eq!(store.circuit_breaker().state(), CircuitState::Open);

    // Rejected without reaching the server
    match store.get("home").await {
        Err(VisitCounterError::StoreUnavailable(message)) => {
            assert!(message.contains("circuit breaker"))
        }
        other => panic!("expected circuit breaker rejection, got {:?}", other),
    }
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 2);
    assert_eq!(metrics.circuit_breaker_opens.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_hung_store_trips_circuit_breaker() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/counters/home"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"value": 10}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let mut config = create_test_store_config(mock_server.uri());
    config.max_retries = 0;
    config.circuit_failure_threshold = 2;
    let metrics = Arc::new(StoreMetrics::new());
    let store = Arc::new(HttpStore::from_config(&config, Some(Arc::clone(&metrics))).unwrap());

    // The counter gives up on the store long before the HTTP client would
    let settings = CounterSettings {
        store_timeout: Duration::from_millis(200),
        ..test_settings()
    };
    let counter = create_counter_with(store.clone(), settings);
    counter.increment_visit("home").unwrap();

    for _ in 0..5 {
        assert_eq!(
            counter.get_visit_count("home").await.unwrap(),
            VisitCount::new(1, ReadSource::Degraded)
        );
    }

    assert_eq!(store.circuit_breaker().state(), CircuitState::Open);
    assert_eq!(metrics.abandoned_count.load(Ordering::Relaxed), 2);
    assert_eq!(metrics.rejected_count.load(Ordering::Relaxed), 3);
    assert_eq!(metrics.circuit_breaker_opens.load(Ordering::Relaxed), 1);

    // Every admitted call is accounted for
    let admitted = metrics.request_count.load(Ordering::Relaxed);
    assert_eq!(admitted, 2);
    assert_eq!(
        metrics.success_count.load(Ordering::Relaxed)
            + metrics.failure_count.load(Ordering::Relaxed)
            + metrics.abandoned_count.load(Ordering::Relaxed),
        admitted
    );

    counter.shutdown().await;
}

#[tokio::test]
async fn test_basic_auth_header_is_sent() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/counters/home"))
        .and(header("authorization", "Basic YWRtaW46c2VjcmV0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": 1})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = create_test_store_config(mock_server.uri());
    config.username = Some("admin".to_string());
    config.password = Some("secret".to_string());
    let store = HttpStore::from_config(&config, None).unwrap();

    assert_eq!(store.get("home").await.unwrap(), 1);
}

#[tokio::test]
async fn test_visit_counter_over_http_store() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/counters/home"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": 10})))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/counters/home/increment"))
        .and(body_json(json!({"delta": 3})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": 13})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_store_config(mock_server.uri());
    let store = Arc::new(HttpStore::from_config(&config, None).unwrap());
    let counter = create_counter(store);

    for _ in 0..3 {
        counter.increment_visit("home").unwrap();
    }
    assert_eq!(
        counter.get_visit_count("home").await.unwrap(),
        VisitCount::new(13, ReadSource::BufferAndStore)
    );

    let report = counter.flush_now().await;
    assert_eq!(report.visits_flushed, 3);
    assert_eq!(counter.pending_total(), 0);

    counter.shutdown().await;
}

#[tokio::test]
async fn test_visit_counter_degrades_when_http_store_is_down() {
    let mock_server = setup_mock_store_with_error(503).await;
    let mut config = create_test_store_config(mock_server.uri());
    config.max_retries = 0;
    let store = Arc::new(HttpStore::from_config(&config, None).unwrap());
    let counter = create_counter(store);

    counter.increment_visit("home").unwrap();
    assert_eq!(
        counter.get_visit_count("home").await.unwrap(),
        VisitCount::new(1, ReadSource::Degraded)
    );

    let report = counter.flush_now().await;
    assert_eq!(report.visits_requeued, 1);
    assert_eq!(counter.pending_visits("home").unwrap(), 1);

    // Shutting down with the store still down keeps the visit buffered
    let report = counter.shutdown().await.unwrap();
    assert!(report.has_failures());
}
