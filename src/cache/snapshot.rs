//! Generation-pinned snapshots.
//!
//! A [`Snapshot`] records one `(epoch, generation)` pin per content kind and
//! answers every read at that pin. Releasing it (explicitly or on drop) lets
//! the manager reclaim revisions nobody can observe anymore.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::domain::{
    entities::ContentNode,
    types::{ContentKind, Epoch, Generation, NodeId},
};

use super::error::ReadError;
use super::manager::SnapshotManager;
use super::store::ContentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pin {
    pub kind: ContentKind,
    pub epoch: Epoch,
    pub generation: Generation,
}

pub struct Snapshot {
    manager: Arc<SnapshotManager>,
    pins: [Pin; 3],
    released: AtomicBool,
}

impl Snapshot {
    pub(crate) fn new(manager: Arc<SnapshotManager>, pins: [Pin; 3]) -> Self {
        Self {
            manager,
            pins,
            released: AtomicBool::new(false),
        }
    }

    pub fn pin(&self, kind: ContentKind) -> Pin {
        self.pins[kind.index()]
    }

    pub fn generation(&self, kind: ContentKind) -> Generation {
        self.pin(kind).generation
    }

    pub fn epoch(&self, kind: ContentKind) -> Epoch {
        self.pin(kind).epoch
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    fn store(&self, kind: ContentKind) -> Result<Arc<ContentStore>, ReadError> {
        if self.is_released() {
            return Err(ReadError::Released);
        }
        self.manager.store_for(&self.pin(kind))
    }

    pub fn read(&self, kind: ContentKind, id: NodeId) -> Result<Option<Arc<ContentNode>>, ReadError> {
        let generation = self.generation(kind);
        Ok(self.store(kind)?.read_at(id, generation))
    }

    /// Children of `parent` (`None` for roots), ordered by sort order.
    pub fn children(
        &self,
        kind: ContentKind,
        parent: Option<NodeId>,
    ) -> Result<Vec<Arc<ContentNode>>, ReadError> {
        let generation = self.generation(kind);
        Ok(self.store(kind)?.child_nodes_at(parent, generation))
    }

    pub fn all(&self, kind: ContentKind) -> Result<Vec<Arc<ContentNode>>, ReadError> {
        let generation = self.generation(kind);
        Ok(self.store(kind)?.all_at(generation))
    }

    /// Drops the pins. Idempotent.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        for pin in self.pins {
            self.manager.unpin(pin);
        }
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("pins", &self.pins)
            .field("released", &self.is_released())
            .finish()
    }
}
