use crate::error::{VisitCounterError, VisitCounterResult};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Longest accepted page identifier, in bytes.
pub const MAX_PAGE_ID_LEN: usize = 512;

/// Validated page identifier.
///
/// The key under which visits are buffered, cached and persisted. Only
/// constructed through [`PageId::parse`], so holding one means the key has
/// already been checked and can be handed to the buffer, cache or store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PageId(String);

impl PageId {
    /// Validate a raw identifier.
    ///
    /// Rejects empty, whitespace-only and over-long identifiers with
    /// [`VisitCounterError::InvalidKey`].
    pub fn parse(raw: impl Into<String>) -> VisitCounterResult<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(VisitCounterError::InvalidKey(
                "page id must not be empty".to_string(),
            ));
        }
        if raw.len() > MAX_PAGE_ID_LEN {
            return Err(VisitCounterError::InvalidKey(format!(
                "page id is {} bytes, limit is {}",
                raw.len(),
                MAX_PAGE_ID_LEN
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PageId {
    type Error = VisitCounterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<PageId> for String {
    fn from(value: PageId) -> Self {
        value.0
    }
}

impl AsRef<str> for PageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PageId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
