//! WireMock server utilities for HTTP store testing
//!
//! Provides helper functions to set up mock counter stores with various
//! configurations for testing different scenarios.

use serde_json::json;
use visit_counter::config::StoreConfig;
use wiremock::matchers::{any, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock store holding `key -> value` for reads
pub async fn setup_mock_store_with_counter(key: &str, value: u64) -> MockServer {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("/counters/{}", key)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "key": key,
            "value": value
        })))
        .mount(&mock_server)
        .await;

    mock_server
}

/// Mock store answering every request with `status_code`
pub async fn setup_mock_store_with_error(status_code: u16) -> MockServer {
    let mock_server = MockServer::start().await;

    Mock::given(any())
        .respond_with(
            ResponseTemplate::new(status_code).set_body_json(json!({"error": "unavailable"})),
        )
        .mount(&mock_server)
        .await;

    mock_server
}

/// Store configuration pointing at the mock server with fast retries
pub fn create_test_store_config(mock_uri: String) -> StoreConfig {
    StoreConfig {
        url: mock_uri,
        max_retries: 2,
        retry_delay_ms: 10,
        request_timeout_ms: 1000,
        ..StoreConfig::default()
    }
}
