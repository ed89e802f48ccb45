//! Change batches pushed by the storage layer after a write transaction commits.

use serde::{Deserialize, Serialize};

use crate::domain::{
    entities::NodeRecord,
    types::{ContentKind, Generation, NodeId},
};

/// One tree mutation.
///
/// Inserts, updates and moves all arrive as `Upsert`: the record carries the
/// node's full new state, including its (possibly new) parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Change {
    Upsert { node: NodeRecord },
    /// Removes the node and every live descendant.
    Remove { id: NodeId },
    /// Replaces the subtree rooted at `root`; live descendants missing from
    /// `nodes` are removed.
    RefreshBranch { root: NodeId, nodes: Vec<NodeRecord> },
    /// The whole kind must be reloaded from storage.
    RefreshAll,
}

impl Change {
    pub fn upsert(node: NodeRecord) -> Self {
        Self::Upsert { node }
    }

    pub fn remove(id: impl Into<NodeId>) -> Self {
        Self::Remove { id: id.into() }
    }
}

/// The changes of one committed write transaction for one content kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeBatch {
    pub kind: ContentKind,
    /// Generation the storage layer expects this batch to produce, when it
    /// tracks one. A mismatch means a notification was missed.
    #[serde(default)]
    pub expected_generation: Option<Generation>,
    pub changes: Vec<Change>,
}

impl ChangeBatch {
    pub fn new(kind: ContentKind, changes: Vec<Change>) -> Self {
        Self {
            kind,
            expected_generation: None,
            changes,
        }
    }

    pub fn with_expected_generation(mut self, generation: Generation) -> Self {
        self.expected_generation = Some(generation);
        self
    }

    /// True when the batch asks for a full reload instead of an incremental apply.
    pub fn requires_rebuild(&self) -> bool {
        self.changes
            .iter()
            .any(|change| matches!(change, Change::RefreshAll))
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
