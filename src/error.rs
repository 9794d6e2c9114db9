use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single problem found while validating configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Unified error type for the visit counter.
#[derive(Error, Debug, Clone)]
pub enum VisitCounterError {
    /// Empty or malformed page identifier
    #[error("Invalid page id: {0}")]
    InvalidKey(String),

    /// The counter store returned an error or could not be reached
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A store call exceeded its deadline
    #[error("Operation timed out: {0}")]
    TimedOut(String),

    /// Store API returned an error with HTTP status code
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration validation failed
    #[error("Validation error: {}", .0.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("; "))]
    Validation(Vec<ValidationIssue>),

    /// Parse/serialization error
    #[error("Parse error: {0}")]
    Parse(String),
}

impl VisitCounterError {
    /// Check if this error is transient and worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VisitCounterError::TimedOut(_)
                | VisitCounterError::StoreUnavailable(_)
                | VisitCounterError::Api {
                    status: 408 | 429 | 502 | 503 | 504,
                    ..
                }
        )
    }

    /// Check if this error means the store could not answer at all.
    /// Every such error is surfaced to the core as `StoreUnavailable`.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(
            self,
            VisitCounterError::TimedOut(_)
                | VisitCounterError::StoreUnavailable(_)
                | VisitCounterError::Api { status: 500..=599, .. }
        )
    }

    /// Collapse any store-side failure into `StoreUnavailable`.
    pub fn into_store_unavailable(self) -> Self {
        match self {
            VisitCounterError::StoreUnavailable(_) | VisitCounterError::InvalidKey(_) => self,
            other => VisitCounterError::StoreUnavailable(other.to_string()),
        }
    }
}

// === Conversion Implementations ===

macro_rules! impl_from_error {
    ($err_type:ty, $arm:pat => $body:expr) => {
        impl From<$err_type> for VisitCounterError {
            fn from(err: $err_type) -> Self {
                match err {
                    $arm => $body,
                }
            }
        }
    };
}

impl_from_error!(std::io::Error, e => match e.kind() {
    std::io::ErrorKind::TimedOut => VisitCounterError::TimedOut(e.to_string()),
    std::io::ErrorKind::InvalidInput => VisitCounterError::InvalidArgument(e.to_string()),
    _ => VisitCounterError::Io(e.to_string()),
});

impl_from_error!(reqwest::Error, e => if e.is_timeout() {
    VisitCounterError::TimedOut(e.to_string())
} else if e.is_connect() {
    VisitCounterError::StoreUnavailable(format!("Server disconnected: {}", e))
} else if e.is_request() {
    VisitCounterError::StoreUnavailable(e.to_string())
} else if e.is_decode() {
    VisitCounterError::Parse(e.to_string())
} else {
    VisitCounterError::Io(format!("HTTP error: {}", e))
});

impl_from_error!(serde_json::Error, e => VisitCounterError::Parse(e.to_string()));
impl_from_error!(toml::de::Error, e => VisitCounterError::Parse(e.to_string()));
impl_from_error!(tokio::time::error::Elapsed, e => VisitCounterError::TimedOut(e.to_string()));

/// Result type alias for operations that can fail with VisitCounterError.
pub type VisitCounterResult<T> = Result<T, VisitCounterError>;
