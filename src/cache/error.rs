use std::time::Duration;

use thiserror::Error;

use crate::application::source::SourceError;
use crate::domain::{
    error::DomainError,
    types::{ContentKind, Epoch, Generation, NodeId},
};

/// Change-set rejections. A rejected change set leaves the store untouched.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} change set stamped generation {actual}, expected {expected}")]
    SequencingFault {
        kind: ContentKind,
        expected: Generation,
        actual: Generation,
    },
    #[error("{kind} node {id} references missing parent {parent}")]
    MissingParent {
        kind: ContentKind,
        id: NodeId,
        parent: NodeId,
    },
    #[error("{kind} node {id} would become its own ancestor")]
    Cycle { kind: ContentKind, id: NodeId },
    #[error("{kind} node {id} cannot change key from {existing} to {proposed}")]
    KeyConflict {
        kind: ContentKind,
        id: NodeId,
        existing: String,
        proposed: String,
    },
    #[error("{kind} full refresh must go through a rebuild")]
    RefreshAllNotApplicable { kind: ContentKind },
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl StoreError {
    pub fn is_sequencing_fault(&self) -> bool {
        matches!(self, Self::SequencingFault { .. })
    }
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("write section not acquired within {waited:?}")]
    Timeout { waited: Duration },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Read failures; absence is `None`, never an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("{kind} snapshot from epoch {pinned} invalidated by rebuild (now epoch {current})")]
    SnapshotInvalidated {
        kind: ContentKind,
        pinned: Epoch,
        current: Epoch,
    },
    #[error("snapshot was already released")]
    Released,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdMapError {
    #[error("identifier resolvers for {kind} are already registered")]
    AlreadyRegistered { kind: ContentKind },
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{kind} cache has not completed a cold load")]
    NotReady { kind: ContentKind },
    #[error("loading {kind} from storage failed: {source}")]
    Load {
        kind: ContentKind,
        #[source]
        source: SourceError,
    },
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error(transparent)]
    Config(#[from] IdMapError),
    #[error("change feed closed")]
    FeedClosed,
}

impl ServiceError {
    pub fn load(kind: ContentKind, source: SourceError) -> Self {
        Self::Load { kind, source }
    }
}
