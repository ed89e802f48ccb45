//! Serializable views of a snapshot, printed by the binary.

use serde::Serialize;

use crate::{
    cache::{ContentView, KindStats, ReadError, SnapshotHandle, SnapshotService},
    domain::types::{ContentKind, Epoch, Generation, NodeId, NodeKey},
};

#[derive(Debug, Clone, Serialize)]
pub struct TreeEntry {
    pub id: NodeId,
    pub key: NodeKey,
    pub name: String,
    pub content_type: String,
    pub sort_order: i32,
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KindReport {
    pub kind: ContentKind,
    pub epoch: Epoch,
    pub generation: Generation,
    pub nodes: usize,
    pub tree: Vec<TreeEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub kinds: Vec<KindReport>,
    pub stats: Vec<KindStats>,
}

/// Walks the tree of `kind` as seen by `handle`, roots first.
pub fn kind_report(handle: &SnapshotHandle, kind: ContentKind) -> Result<KindReport, ReadError> {
    let tree = handle
        .roots(kind)?
        .iter()
        .map(|root| tree_entry(handle, root))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(KindReport {
        kind,
        epoch: handle.epoch(kind),
        generation: handle.generation(kind),
        nodes: handle.all(kind)?.len(),
        tree,
    })
}

fn tree_entry(handle: &SnapshotHandle, view: &ContentView) -> Result<TreeEntry, ReadError> {
    let children = handle
        .children(view.kind(), view.id())?
        .iter()
        .map(|child| tree_entry(handle, child))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TreeEntry {
        id: view.id(),
        key: view.key(),
        name: view.name(None).to_string(),
        content_type: view.content_type().to_string(),
        sort_order: view.sort_order(),
        path: handle
            .path(view.kind(), view.id())?
            .map(|path| path.as_ref().clone()),
        children,
    })
}

/// Report for every kind, or only `filter` when given, plus manager statistics.
pub fn cache_report(
    service: &SnapshotService,
    handle: &SnapshotHandle,
    filter: Option<ContentKind>,
) -> Result<CacheReport, ReadError> {
    let kinds = ContentKind::ALL
        .into_iter()
        .filter(|kind| filter.is_none_or(|wanted| wanted == *kind))
        .map(|kind| kind_report(handle, kind))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CacheReport {
        kinds,
        stats: service.stats(),
    })
}
