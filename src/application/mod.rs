//! Application boundary: the storage-facing trait, reports, and top-level errors.

pub mod error;
pub mod report;
pub mod source;
