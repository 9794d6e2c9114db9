//! Wire types of the HTTP counter store.

use serde::{Deserialize, Serialize};

/// Body of `POST /counters/{key}/increment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementRequest {
    pub delta: u64,
}

/// Response of both counter endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterResponse {
    #[serde(default)]
    pub key: Option<String>,
    pub value: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_response_without_key() {
        let response: CounterResponse = serde_json::from_str(r#"{"value": 42}"#).unwrap();
        assert_eq!(response.value, 42);
        assert_eq!(response.key, None);
    }

    #[test]
    fn test_increment_request_json() {
        let body = serde_json::to_string(&IncrementRequest { delta: 3 }).unwrap();
        assert_eq!(body, r#"{"delta":3}"#);
    }
}
