//! Boundary to the storage layer that owns the content tree.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{
    entities::NodeRecord,
    types::{ContentKind, NodeId, NodeKey},
};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("content storage unavailable: {message}")]
    Unavailable { message: String },
    #[error("content storage returned malformed data: {message}")]
    Malformed { message: String },
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

/// Read access the cache needs from storage: a full enumeration per kind for
/// cold loads and rebuilds, plus the id/key lookups behind the identifier map.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn load_all_nodes(&self, kind: ContentKind) -> Result<Vec<NodeRecord>, SourceError>;

    fn resolve_identifier(&self, kind: ContentKind, id: NodeId) -> Option<NodeKey>;

    fn resolve_key(&self, kind: ContentKind, key: NodeKey) -> Option<NodeId>;
}
