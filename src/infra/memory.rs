//! In-memory [`ContentSource`] for embedding, fixtures, and tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::application::source::{ContentSource, SourceError};
use crate::cache::lock::{rw_read, rw_write};
use crate::domain::{
    changes::Change,
    entities::NodeRecord,
    types::{ContentKind, NodeId, NodeKey},
};

const SOURCE: &str = "infra::memory";

type Tree = BTreeMap<NodeId, NodeRecord>;

/// Content tree held in process memory, keyed by kind then id.
///
/// Can be switched offline to exercise load-failure paths.
#[derive(Debug, Default)]
pub struct MemorySource {
    trees: RwLock<HashMap<ContentKind, Tree>>,
    offline: AtomicBool,
    loads: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nodes(kind: ContentKind, records: impl IntoIterator<Item = NodeRecord>) -> Self {
        let source = Self::new();
        source.replace(kind, records);
        source
    }

    fn trees(&self) -> RwLockReadGuard<'_, HashMap<ContentKind, Tree>> {
        rw_read(&self.trees, SOURCE, "trees")
    }

    fn trees_mut(&self) -> RwLockWriteGuard<'_, HashMap<ContentKind, Tree>> {
        rw_write(&self.trees, SOURCE, "trees_mut")
    }

    /// Replaces every node of `kind`.
    pub fn replace(&self, kind: ContentKind, records: impl IntoIterator<Item = NodeRecord>) {
        let tree = records.into_iter().map(|record| (record.id, record)).collect();
        self.trees_mut().insert(kind, tree);
    }

    pub fn upsert(&self, kind: ContentKind, record: NodeRecord) {
        self.trees_mut()
            .entry(kind)
            .or_default()
            .insert(record.id, record);
    }

    /// Removes `id` and every node beneath it.
    pub fn remove(&self, kind: ContentKind, id: NodeId) {
        let mut trees = self.trees_mut();
        let Some(tree) = trees.get_mut(&kind) else {
            return;
        };
        let mut doomed = vec![id];
        while let Some(current) = doomed.pop() {
            if tree.remove(&current).is_some() {
                doomed.extend(
                    tree.values()
                        .filter(|record| record.parent == Some(current))
                        .map(|record| record.id),
                );
            }
        }
    }

    /// Mirrors a change batch into the stored tree, as the storage layer
    /// would have committed it.
    pub fn apply(&self, kind: ContentKind, changes: &[Change]) {
        for change in changes {
            match change {
                Change::Upsert { node } => self.upsert(kind, node.clone()),
                Change::Remove { id } => self.remove(kind, *id),
                Change::RefreshBranch { root, nodes } => {
                    self.remove(kind, *root);
                    for node in nodes {
                        self.upsert(kind, node.clone());
                    }
                }
                Change::RefreshAll => {}
            }
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Completed and failed enumerations so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn len(&self, kind: ContentKind) -> usize {
        self.trees().get(&kind).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, kind: ContentKind) -> bool {
        self.len(kind) == 0
    }
}

#[async_trait]
impl ContentSource for MemorySource {
    async fn load_all_nodes(&self, kind: ContentKind) -> Result<Vec<NodeRecord>, SourceError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(SourceError::unavailable(format!(
                "{kind} storage is offline"
            )));
        }
        Ok(self
            .trees()
            .get(&kind)
            .map(|tree| tree.values().cloned().collect())
            .unwrap_or_default())
    }

    fn resolve_identifier(&self, kind: ContentKind, id: NodeId) -> Option<NodeKey> {
        self.trees()
            .get(&kind)
            .and_then(|tree| tree.get(&id))
            .map(|record| record.key)
    }

    fn resolve_key(&self, kind: ContentKind, key: NodeKey) -> Option<NodeId> {
        self.trees()
            .get(&kind)?
            .values()
            .find(|record| record.key == key)
            .map(|record| record.id)
    }
}
