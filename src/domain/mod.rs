//! Domain layer types and invariants.

pub mod changes;
pub mod entities;
pub mod error;
pub mod types;
