use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Where the answer to a visit-count read came from.
///
/// Exists for observability and tests; callers should not branch on it for
/// anything except detecting [`ReadSource::Degraded`] answers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
pub enum ReadSource {
    /// Served from a fresh cache entry.
    #[serde(rename = "cache")]
    #[strum(serialize = "cache")]
    Cache,
    /// Store value with nothing buffered for the page.
    #[serde(rename = "store")]
    #[strum(serialize = "store")]
    Store,
    /// Store value plus visits not yet flushed.
    #[serde(rename = "buffer+store")]
    #[strum(serialize = "buffer+store")]
    BufferAndStore,
    /// Store unreachable; only the buffered visits are known.
    #[serde(rename = "degraded")]
    #[strum(serialize = "degraded")]
    Degraded,
}

/// Result of a visit-count read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitCount {
    pub visits: u64,
    pub source: ReadSource,
}

impl VisitCount {
    pub fn new(visits: u64, source: ReadSource) -> Self {
        Self { visits, source }
    }

    pub fn is_degraded(&self) -> bool {
        self.source == ReadSource::Degraded
    }
}
