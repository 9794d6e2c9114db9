//! Core data types for page identifiers and visit counts.

pub mod page;
pub mod visit;

pub use page::{PageId, MAX_PAGE_ID_LEN};
pub use visit::{ReadSource, VisitCount};
