use thiserror::Error;

use super::types::{ContentKind, NodeId};

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{kind} node {id} not found")]
    NotFound { kind: ContentKind, id: NodeId },
    #[error("invalid node record: {message}")]
    Validation { message: String },
    #[error("content tree invariant violated: {message}")]
    Invariant { message: String },
}

impl DomainError {
    pub fn not_found(kind: ContentKind, id: NodeId) -> Self {
        Self::NotFound { kind, id }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }
}
