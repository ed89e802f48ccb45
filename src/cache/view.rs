//! Reader-facing snapshot handle and node views.
//!
//! [`SnapshotHandle`] wraps a pinned [`Snapshot`] with identifier resolution
//! and two memo caches: one private to the snapshot, one shared by every
//! snapshot that observes the same generations.

use std::sync::Arc;

use serde_json::Value;

use crate::domain::{
    entities::{ContentData, ContentNode},
    types::{ContentKind, Epoch, Generation, NodeId, NodeKey},
};

use super::error::ReadError;
use super::id_map::IdentifierMap;
use super::scratch::ScratchCache;
use super::snapshot::Snapshot;

/// Either identifier of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Id(NodeId),
    Key(NodeKey),
}

impl From<NodeId> for NodeRef {
    fn from(id: NodeId) -> Self {
        Self::Id(id)
    }
}

impl From<NodeKey> for NodeRef {
    fn from(key: NodeKey) -> Self {
        Self::Key(key)
    }
}

/// A node as seen by one snapshot.
#[derive(Clone)]
pub struct ContentView {
    node: Arc<ContentNode>,
    generation: Generation,
    scratch: ScratchCache,
}

impl ContentView {
    fn new(node: Arc<ContentNode>, generation: Generation, scratch: ScratchCache) -> Self {
        Self {
            node,
            generation,
            scratch,
        }
    }

    pub fn id(&self) -> NodeId {
        self.node.id
    }

    pub fn key(&self) -> NodeKey {
        self.node.key
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.node.parent
    }

    pub fn sort_order(&self) -> i32 {
        self.node.sort_order
    }

    pub fn kind(&self) -> ContentKind {
        self.node.kind
    }

    pub fn content_type(&self) -> &str {
        &self.node.content_type
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn name(&self, culture: Option<&str>) -> &str {
        self.node.data.name_for(culture)
    }

    pub fn data(&self) -> &ContentData {
        &self.node.data
    }

    pub fn node(&self) -> &Arc<ContentNode> {
        &self.node
    }

    /// Property value with culture/segment fallback, memoized for the snapshot.
    pub fn value(
        &self,
        alias: &str,
        culture: Option<&str>,
        segment: Option<&str>,
    ) -> Option<Arc<Value>> {
        // Debug output quotes each field and keeps `None` apart from `Some("")`.
        let key = format!(
            "value{:?}",
            (self.node.kind, self.node.id, alias, culture, segment)
        );
        self.scratch.get_or_create(&key, || {
            self.node.data.value_for(alias, culture, segment).cloned()
        })
    }
}

impl std::fmt::Debug for ContentView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentView")
            .field("kind", &self.node.kind)
            .field("id", &self.node.id)
            .field("generation", &self.generation)
            .finish()
    }
}

pub struct SnapshotHandle {
    snapshot: Snapshot,
    id_map: Arc<IdentifierMap>,
    scratch: ScratchCache,
    elements: ScratchCache,
}

impl SnapshotHandle {
    pub(crate) fn new(snapshot: Snapshot, id_map: Arc<IdentifierMap>, elements: ScratchCache) -> Self {
        Self {
            snapshot,
            id_map,
            scratch: ScratchCache::new(),
            elements,
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn generation(&self, kind: ContentKind) -> Generation {
        self.snapshot.generation(kind)
    }

    pub fn epoch(&self, kind: ContentKind) -> Epoch {
        self.snapshot.epoch(kind)
    }

    /// Memo cache private to this snapshot; emptied on release.
    pub fn scratch(&self) -> &ScratchCache {
        &self.scratch
    }

    /// Memo cache shared with snapshots of the same generations.
    pub fn elements(&self) -> &ScratchCache {
        &self.elements
    }

    fn resolve(&self, kind: ContentKind, node: NodeRef) -> Option<NodeId> {
        match node {
            NodeRef::Id(id) => Some(id),
            NodeRef::Key(key) => self.id_map.get_id_for_key(kind, key),
        }
    }

    fn view(&self, kind: ContentKind, node: Arc<ContentNode>) -> ContentView {
        ContentView::new(node, self.generation(kind), self.scratch.clone())
    }

    pub fn get(
        &self,
        kind: ContentKind,
        node: impl Into<NodeRef>,
    ) -> Result<Option<ContentView>, ReadError> {
        let Some(id) = self.resolve(kind, node.into()) else {
            return Ok(None);
        };
        Ok(self
            .snapshot
            .read(kind, id)?
            .map(|node| self.view(kind, node)))
    }

    pub fn get_by_id(&self, kind: ContentKind, id: NodeId) -> Result<Option<ContentView>, ReadError> {
        self.get(kind, id)
    }

    pub fn get_by_key(
        &self,
        kind: ContentKind,
        key: NodeKey,
    ) -> Result<Option<ContentView>, ReadError> {
        self.get(kind, key)
    }

    /// Children ordered by sort order; empty when the parent is unknown.
    pub fn children(
        &self,
        kind: ContentKind,
        parent: impl Into<NodeRef>,
    ) -> Result<Vec<ContentView>, ReadError> {
        let Some(parent) = self.resolve(kind, parent.into()) else {
            return Ok(Vec::new());
        };
        self.collect(kind, self.snapshot.children(kind, Some(parent))?)
    }

    pub fn roots(&self, kind: ContentKind) -> Result<Vec<ContentView>, ReadError> {
        self.collect(kind, self.snapshot.children(kind, None)?)
    }

    pub fn all(&self, kind: ContentKind) -> Result<Vec<ContentView>, ReadError> {
        self.collect(kind, self.snapshot.all(kind)?)
    }

    fn collect(
        &self,
        kind: ContentKind,
        nodes: Vec<Arc<ContentNode>>,
    ) -> Result<Vec<ContentView>, ReadError> {
        Ok(nodes.into_iter().map(|node| self.view(kind, node)).collect())
    }

    /// Ancestor chain from the root down to `node`, inclusive.
    pub fn ancestry(
        &self,
        kind: ContentKind,
        node: impl Into<NodeRef>,
    ) -> Result<Vec<ContentView>, ReadError> {
        let mut chain = Vec::new();
        let mut cursor = self.resolve(kind, node.into());
        while let Some(id) = cursor {
            let Some(view) = self.get(kind, id)? else {
                break;
            };
            cursor = view.parent();
            chain.push(view);
        }
        chain.reverse();
        Ok(chain)
    }

    /// Slash-joined names from the root, shared through the elements cache.
    pub fn path(
        &self,
        kind: ContentKind,
        node: impl Into<NodeRef>,
    ) -> Result<Option<Arc<String>>, ReadError> {
        let Some(id) = self.resolve(kind, node.into()) else {
            return Ok(None);
        };
        let key = format!("path:{kind}:{id}");
        if let Some(hit) = self.elements.get::<String>(&key) {
            return Ok(Some(hit));
        }

        let ancestry = self.ancestry(kind, id)?;
        if ancestry.is_empty() {
            return Ok(None);
        }
        let path = ancestry.iter().fold(String::new(), |mut path, view| {
            path.push('/');
            path.push_str(view.name(None));
            path
        });
        Ok(self.elements.get_or_create(&key, || Some(path)))
    }

    /// Clears the private scratch cache and drops the pins. Idempotent.
    pub fn release(&self) {
        self.scratch.clear();
        self.snapshot.release();
    }
}

impl Drop for SnapshotHandle {
    fn drop(&mut self) {
        self.scratch.clear();
    }
}

impl std::fmt::Debug for SnapshotHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotHandle")
            .field("snapshot", &self.snapshot)
            .finish()
    }
}
