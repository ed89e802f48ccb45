//! Revisioned node storage for one content kind.
//!
//! Every node owns a [`RevisionChain`]; a reader pinned at generation `g`
//! sees the newest revision created at or before `g` that was not removed by
//! then. Writers only append revisions or stamp removals, so readers never
//! block on them.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::{DashMap, mapref::entry::Entry};
use serde::Serialize;
use tracing::debug;

use crate::domain::{
    changes::Change,
    entities::{ContentNode, NodeRecord},
    types::{ContentKind, Epoch, Generation, NodeId},
};

use super::error::StoreError;
use super::lock::{mutex_lock, mutex_try_lock};
use super::revision::{NodeRevision, RevisionChain};

const SOURCE: &str = "cache::store";

/// What a committed change set did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub generation: Generation,
    pub upserted: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneOutcome {
    pub floor: Generation,
    pub revisions: usize,
    pub nodes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub kind: ContentKind,
    pub epoch: Epoch,
    pub generation: Generation,
    pub live_nodes: usize,
    pub chains: usize,
    pub revisions: usize,
    pub pending_garbage: usize,
    pub pruned_through: Generation,
}

pub struct ContentStore {
    kind: ContentKind,
    epoch: Epoch,
    nodes: DashMap<NodeId, RevisionChain>,
    /// Candidate children per parent (`None` is the root level). Entries may
    /// be stale after moves; reads re-check the parent at their generation.
    children: DashMap<Option<NodeId>, BTreeSet<NodeId>>,
    /// Last generation applied to this store.
    generation: AtomicU64,
    pruned_through: AtomicU64,
    /// Nodes with a revision superseded or removed at the keyed generation.
    garbage: Mutex<BTreeMap<Generation, Vec<NodeId>>>,
    prune_lock: Mutex<()>,
}

impl ContentStore {
    pub fn new(kind: ContentKind, epoch: Epoch) -> Self {
        Self {
            kind,
            epoch,
            nodes: DashMap::new(),
            children: DashMap::new(),
            generation: AtomicU64::new(0),
            pruned_through: AtomicU64::new(0),
            garbage: Mutex::new(BTreeMap::new()),
            prune_lock: Mutex::new(()),
        }
    }

    /// Builds a store whose first generation holds exactly `records`.
    pub fn from_records(
        kind: ContentKind,
        epoch: Epoch,
        records: Vec<NodeRecord>,
    ) -> Result<Self, StoreError> {
        Self::from_records_at(kind, epoch, 1, records)
    }

    /// Builds a store holding exactly `records` as of `generation`; no
    /// earlier generation is readable.
    pub fn from_records_at(
        kind: ContentKind,
        epoch: Epoch,
        generation: Generation,
        records: Vec<NodeRecord>,
    ) -> Result<Self, StoreError> {
        let generation = generation.max(1);
        let store = Self::new(kind, epoch);
        store.generation.store(generation - 1, Ordering::Release);
        let changes: Vec<Change> = records.into_iter().map(Change::upsert).collect();
        store.apply_change_set(generation, &changes)?;
        Ok(store)
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn generation(&self) -> Generation {
        self.generation.load(Ordering::Acquire)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn read_at(&self, id: NodeId, generation: Generation) -> Option<Arc<ContentNode>> {
        let chain = self.nodes.get(&id)?;
        chain
            .read_at(generation)
            .map(|revision| Arc::clone(revision.node()))
    }

    /// Children of `parent` at `generation`, ordered by sort order then id.
    pub fn child_nodes_at(
        &self,
        parent: Option<NodeId>,
        generation: Generation,
    ) -> Vec<Arc<ContentNode>> {
        let candidates: Vec<NodeId> = match self.children.get(&parent) {
            Some(set) => set.iter().copied().collect(),
            None => return Vec::new(),
        };

        let mut nodes: Vec<_> = candidates
            .into_iter()
            .filter_map(|id| self.read_at(id, generation))
            .filter(|node| node.parent == parent)
            .collect();
        nodes.sort_by_key(|node| (node.sort_order, node.id));
        nodes
    }

    pub fn children_at(&self, parent: Option<NodeId>, generation: Generation) -> Vec<NodeId> {
        self.child_nodes_at(parent, generation)
            .into_iter()
            .map(|node| node.id)
            .collect()
    }

    pub fn roots_at(&self, generation: Generation) -> Vec<Arc<ContentNode>> {
        self.child_nodes_at(None, generation)
    }

    /// Every node visible at `generation`, ordered by id.
    pub fn all_at(&self, generation: Generation) -> Vec<Arc<ContentNode>> {
        let mut nodes: Vec<_> = self
            .nodes
            .iter()
            .filter_map(|chain| {
                chain
                    .read_at(generation)
                    .map(|revision| Arc::clone(revision.node()))
            })
            .collect();
        nodes.sort_by_key(|node| node.id);
        nodes
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Applies one committed change set as `generation`.
    ///
    /// The set is planned against the latest state first; any rejection
    /// leaves the store exactly as it was.
    pub fn apply_change_set(
        &self,
        generation: Generation,
        changes: &[Change],
    ) -> Result<ApplyOutcome, StoreError> {
        let applied = self.generation();
        let expected = applied + 1;
        if generation != expected {
            return Err(StoreError::SequencingFault {
                kind: self.kind,
                expected,
                actual: generation,
            });
        }

        let mut plan = ChangePlan::new(self, applied);
        for change in changes {
            plan.stage(change)?;
        }
        plan.validate()?;

        let outcome = self.commit(generation, plan.into_staged());
        self.generation.store(generation, Ordering::Release);

        debug!(
            kind = %self.kind,
            generation,
            upserted = outcome.upserted,
            removed = outcome.removed,
            "Applied change set"
        );
        Ok(outcome)
    }

    fn commit(
        &self,
        generation: Generation,
        staged: Vec<(NodeId, Option<Arc<ContentNode>>)>,
    ) -> ApplyOutcome {
        let mut outcome = ApplyOutcome {
            generation,
            ..ApplyOutcome::default()
        };
        let mut superseded = Vec::new();

        for (id, state) in staged {
            match state {
                Some(node) => {
                    let parent = node.parent;
                    let revision = NodeRevision::new(generation, node);
                    let replaced_live = match self.nodes.entry(id) {
                        Entry::Occupied(mut entry) => entry.get_mut().push(revision),
                        Entry::Vacant(entry) => {
                            entry.insert(RevisionChain::new(revision));
                            false
                        }
                    };
                    self.children.entry(parent).or_default().insert(id);
                    if replaced_live {
                        superseded.push(id);
                    }
                    outcome.upserted += 1;
                }
                None => {
                    let removed = self
                        .nodes
                        .get_mut(&id)
                        .is_some_and(|mut chain| chain.mark_removed(generation));
                    if removed {
                        superseded.push(id);
                        outcome.removed += 1;
                    }
                }
            }
        }

        if !superseded.is_empty() {
            mutex_lock(&self.garbage, SOURCE, "commit")
                .entry(generation)
                .or_default()
                .extend(superseded);
        }
        outcome
    }

    // ========================================================================
    // Pruning
    // ========================================================================

    /// Reclaims revisions that no snapshot at or above `floor` can observe.
    pub fn prune(&self, floor: Generation) -> PruneOutcome {
        let _guard = mutex_lock(&self.prune_lock, SOURCE, "prune");
        self.prune_locked(floor)
    }

    /// Like [`prune`](Self::prune) but skips when another prune is running.
    pub fn try_prune(&self, floor: Generation) -> Option<PruneOutcome> {
        let _guard = mutex_try_lock(&self.prune_lock, SOURCE, "try_prune")?;
        Some(self.prune_locked(floor))
    }

    #[cfg(test)]
    pub(crate) fn hold_prune_lock(&self) -> std::sync::MutexGuard<'_, ()> {
        mutex_lock(&self.prune_lock, SOURCE, "hold_prune_lock")
    }

    fn prune_locked(&self, floor: Generation) -> PruneOutcome {
        let ready: Vec<NodeId> = {
            let mut garbage = mutex_lock(&self.garbage, SOURCE, "prune");
            let pending = garbage.split_off(&floor.saturating_add(1));
            std::mem::replace(&mut *garbage, pending)
                .into_values()
                .flatten()
                .collect()
        };

        let mut outcome = PruneOutcome {
            floor,
            ..PruneOutcome::default()
        };
        let mut seen = HashSet::with_capacity(ready.len());

        for id in ready {
            if !seen.insert(id) {
                continue;
            }
            let Some((dropped, unlinked, empty)) = self.prune_chain(id, floor) else {
                continue;
            };
            outcome.revisions += dropped;
            if empty && self.nodes.remove_if(&id, |_, chain| chain.is_empty()).is_some() {
                outcome.nodes += 1;
            }
            for parent in unlinked {
                self.unlink_child(parent, id);
            }
        }

        self.pruned_through.fetch_max(floor, Ordering::AcqRel);
        if outcome.revisions > 0 {
            debug!(
                kind = %self.kind,
                floor,
                revisions = outcome.revisions,
                nodes = outcome.nodes,
                "Pruned revisions"
            );
        }
        outcome
    }

    /// Returns dropped revisions, parents no longer referenced, and emptiness.
    fn prune_chain(
        &self,
        id: NodeId,
        floor: Generation,
    ) -> Option<(usize, Vec<Option<NodeId>>, bool)> {
        let mut chain = self.nodes.get_mut(&id)?;
        let before: BTreeSet<Option<NodeId>> = chain.parents().collect();
        let dropped = chain.prune(floor);
        if dropped == 0 {
            return None;
        }
        let after: BTreeSet<Option<NodeId>> = chain.parents().collect();
        let unlinked = before.difference(&after).copied().collect();
        Some((dropped, unlinked, chain.is_empty()))
    }

    fn unlink_child(&self, parent: Option<NodeId>, id: NodeId) {
        if let Some(mut siblings) = self.children.get_mut(&parent) {
            // A writer may have re-linked the node since the chain was pruned.
            let referenced = self
                .nodes
                .get(&id)
                .is_some_and(|chain| chain.parents().any(|p| p == parent));
            if !referenced {
                siblings.remove(&id);
            }
        }
        self.children
            .remove_if(&parent, |_, siblings| siblings.is_empty());
    }

    pub fn pending_garbage(&self) -> usize {
        mutex_lock(&self.garbage, SOURCE, "pending_garbage")
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn stats(&self) -> StoreStats {
        let (live_nodes, chains, revisions) =
            self.nodes
                .iter()
                .fold((0, 0, 0), |(live, chains, revisions), chain| {
                    (
                        live + usize::from(chain.head().is_some()),
                        chains + 1,
                        revisions + chain.len(),
                    )
                });
        StoreStats {
            kind: self.kind,
            epoch: self.epoch,
            generation: self.generation(),
            live_nodes,
            chains,
            revisions,
            pending_garbage: self.pending_garbage(),
            pruned_through: self.pruned_through.load(Ordering::Acquire),
        }
    }
}

// ============================================================================
// Change planning
// ============================================================================

/// Staged final state of every node a change set touches.
struct ChangePlan<'a> {
    store: &'a ContentStore,
    base: Generation,
    staged: HashMap<NodeId, Option<Arc<ContentNode>>>,
    order: Vec<NodeId>,
    staged_children: HashMap<NodeId, BTreeSet<NodeId>>,
}

impl<'a> ChangePlan<'a> {
    fn new(store: &'a ContentStore, base: Generation) -> Self {
        Self {
            store,
            base,
            staged: HashMap::new(),
            order: Vec::new(),
            staged_children: HashMap::new(),
        }
    }

    fn kind(&self) -> ContentKind {
        self.store.kind
    }

    fn lookup(&self, id: NodeId) -> Option<Arc<ContentNode>> {
        match self.staged.get(&id) {
            Some(state) => state.clone(),
            None => self.store.read_at(id, self.base),
        }
    }

    fn stage_node(&mut self, id: NodeId, state: Option<Arc<ContentNode>>) {
        if let Some(parent) = state.as_ref().and_then(|node| node.parent) {
            self.staged_children.entry(parent).or_default().insert(id);
        }
        if self.staged.insert(id, state).is_none() {
            self.order.push(id);
        }
    }

    fn stage(&mut self, change: &Change) -> Result<(), StoreError> {
        match change {
            Change::Upsert { node } => self.stage_upsert(node),
            Change::Remove { id } => {
                self.stage_remove(*id);
                Ok(())
            }
            Change::RefreshBranch { root, nodes } => self.stage_refresh_branch(*root, nodes),
            Change::RefreshAll => Err(StoreError::RefreshAllNotApplicable { kind: self.kind() }),
        }
    }

    fn stage_upsert(&mut self, record: &NodeRecord) -> Result<(), StoreError> {
        record.validate()?;
        if let Some(existing) = self.lookup(record.id)
            && existing.key != record.key
        {
            return Err(StoreError::KeyConflict {
                kind: self.kind(),
                id: record.id,
                existing: existing.key.to_string(),
                proposed: record.key.to_string(),
            });
        }

        let node = ContentNode::from_record(self.kind(), record.clone());
        self.stage_node(record.id, Some(Arc::new(node)));
        Ok(())
    }

    fn stage_remove(&mut self, id: NodeId) {
        if self.lookup(id).is_none() {
            return;
        }
        for doomed in self.subtree(id) {
            self.stage_node(doomed, None);
        }
    }

    fn stage_refresh_branch(
        &mut self,
        root: NodeId,
        records: &[NodeRecord],
    ) -> Result<(), StoreError> {
        let previous = if self.lookup(root).is_some() {
            self.subtree(root)
        } else {
            Vec::new()
        };

        let mut kept = HashSet::with_capacity(records.len());
        for record in records {
            kept.insert(record.id);
            self.stage_upsert(record)?;
        }
        for id in previous {
            if !kept.contains(&id) {
                self.stage_node(id, None);
            }
        }
        Ok(())
    }

    /// `root` followed by all of its live descendants in the planned state.
    fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            out.push(id);
            stack.extend(self.live_children(id));
        }
        out
    }

    fn live_children(&self, parent: NodeId) -> Vec<NodeId> {
        let mut candidates: BTreeSet<NodeId> = self
            .store
            .children
            .get(&Some(parent))
            .map(|set| set.clone())
            .unwrap_or_default();
        if let Some(staged) = self.staged_children.get(&parent) {
            candidates.extend(staged.iter().copied());
        }
        candidates
            .into_iter()
            .filter(|id| {
                self.lookup(*id)
                    .is_some_and(|node| node.parent == Some(parent))
            })
            .collect()
    }

    /// Tree-level checks on the planned state: parents exist and no cycles.
    fn validate(&self) -> Result<(), StoreError> {
        for &id in &self.order {
            let Some(Some(node)) = self.staged.get(&id) else {
                continue;
            };
            let Some(parent) = node.parent else {
                continue;
            };
            if self.lookup(parent).is_none() {
                return Err(StoreError::MissingParent {
                    kind: self.kind(),
                    id,
                    parent,
                });
            }

            let mut visited = HashSet::new();
            let mut cursor = Some(parent);
            while let Some(ancestor) = cursor {
                if ancestor == id || !visited.insert(ancestor) {
                    return Err(StoreError::Cycle {
                        kind: self.kind(),
                        id,
                    });
                }
                cursor = self.lookup(ancestor).and_then(|node| node.parent);
            }
        }
        Ok(())
    }

    fn into_staged(mut self) -> Vec<(NodeId, Option<Arc<ContentNode>>)> {
        self.order
            .iter()
            .filter_map(|id| self.staged.remove(id).map(|state| (*id, state)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ContentData;
    use crate::domain::types::NodeKey;

    fn record(id: i32, parent: Option<i32>, sort_order: i32, name: &str) -> NodeRecord {
        NodeRecord {
            id: NodeId::new(id),
            key: NodeKey::from_uuid(uuid::Uuid::from_u128(id as u128 + 1)),
            parent: parent.map(NodeId::new),
            sort_order,
            content_type: "page".to_string(),
            data: ContentData {
                name: name.to_string(),
                ..Default::default()
            },
        }
    }

    fn seeded() -> ContentStore {
        ContentStore::from_records(
            ContentKind::Document,
            1,
            vec![
                record(1, None, 0, "home"),
                record(2, Some(1), 1, "blog"),
                record(3, Some(1), 0, "about"),
                record(4, Some(2), 0, "post"),
            ],
        )
        .expect("seed store")
    }

    fn name_at(store: &ContentStore, id: i32, generation: Generation) -> Option<String> {
        store
            .read_at(NodeId::new(id), generation)
            .map(|node| node.data.name.clone())
    }

    fn ids(nodes: Vec<NodeId>) -> Vec<i32> {
        nodes.into_iter().map(NodeId::get).collect()
    }

    #[test]
    fn cold_load_accepts_children_before_parents() {
        let store = ContentStore::from_records(
            ContentKind::Media,
            1,
            vec![record(5, Some(4), 0, "image"), record(4, None, 0, "folder")],
        )
        .expect("load");
        assert_eq!(store.generation(), 1);
        assert_eq!(ids(store.children_at(Some(NodeId::new(4)), 1)), vec![5]);
    }

    #[test]
    fn children_are_ordered_by_sort_order() {
        let store = seeded();
        assert_eq!(ids(store.children_at(Some(NodeId::new(1)), 1)), vec![3, 2]);
        assert_eq!(ids(store.children_at(None, 1)), vec![1]);
    }

    #[test]
    fn update_is_visible_only_from_its_generation() {
        let store = seeded();
        store
            .apply_change_set(2, &[Change::upsert(record(3, Some(1), 0, "about-us"))])
            .expect("apply");

        assert_eq!(name_at(&store, 3, 1).as_deref(), Some("about"));
        assert_eq!(name_at(&store, 3, 2).as_deref(), Some("about-us"));
    }

    #[test]
    fn remove_cascades_to_descendants() {
        let store = seeded();
        let outcome = store
            .apply_change_set(2, &[Change::remove(2)])
            .expect("apply");

        assert_eq!(outcome.removed, 2);
        assert!(store.read_at(NodeId::new(4), 2).is_none());
        assert!(store.read_at(NodeId::new(4), 1).is_some());
        assert_eq!(ids(store.children_at(Some(NodeId::new(1)), 2)), vec![3]);
    }

    #[test]
    fn remove_of_unknown_node_is_a_no_op() {
        let store = seeded();
        let outcome = store
            .apply_change_set(2, &[Change::remove(99)])
            .expect("apply");
        assert_eq!(outcome.removed, 0);
        assert_eq!(store.generation(), 2);
    }

    #[test]
    fn move_updates_both_parents() {
        let store = seeded();
        store
            .apply_change_set(2, &[Change::upsert(record(4, Some(3), 0, "post"))])
            .expect("apply");

        assert_eq!(ids(store.children_at(Some(NodeId::new(2)), 1)), vec![4]);
        assert!(store.children_at(Some(NodeId::new(2)), 2).is_empty());
        assert_eq!(ids(store.children_at(Some(NodeId::new(3)), 2)), vec![4]);
    }

    #[test]
    fn missing_parent_rejects_whole_change_set() {
        let store = seeded();
        let err = store
            .apply_change_set(
                2,
                &[
                    Change::upsert(record(3, Some(1), 0, "renamed")),
                    Change::upsert(record(7, Some(70), 0, "orphan")),
                ],
            )
            .expect_err("orphan rejected");

        assert!(matches!(err, StoreError::MissingParent { .. }));
        assert_eq!(store.generation(), 1);
        assert_eq!(name_at(&store, 3, 5).as_deref(), Some("about"));
        assert!(store.read_at(NodeId::new(7), 5).is_none());
    }

    #[test]
    fn move_under_own_descendant_is_a_cycle() {
        let store = seeded();
        let err = store
            .apply_change_set(2, &[Change::upsert(record(2, Some(4), 0, "blog"))])
            .expect_err("cycle rejected");
        assert!(matches!(err, StoreError::Cycle { .. }));
    }

    #[test]
    fn key_change_is_rejected() {
        let store = seeded();
        let mut changed = record(3, Some(1), 0, "about");
        changed.key = NodeKey::new_v4();
        let err = store
            .apply_change_set(2, &[Change::upsert(changed)])
            .expect_err("key conflict");
        assert!(matches!(err, StoreError::KeyConflict { .. }));
    }

    #[test]
    fn out_of_order_generation_is_a_sequencing_fault() {
        let store = seeded();
        let err = store
            .apply_change_set(3, &[Change::remove(3)])
            .expect_err("gap detected");
        assert!(err.is_sequencing_fault());
        assert!(store.read_at(NodeId::new(3), 3).is_some());
    }

    #[test]
    fn refresh_all_is_not_applied_incrementally() {
        let store = seeded();
        let err = store
            .apply_change_set(2, &[Change::RefreshAll])
            .expect_err("refresh all");
        assert!(matches!(err, StoreError::RefreshAllNotApplicable { .. }));
    }

    #[test]
    fn refresh_branch_replaces_subtree() {
        let store = seeded();
        store
            .apply_change_set(
                2,
                &[Change::RefreshBranch {
                    root: NodeId::new(2),
                    nodes: vec![record(2, Some(1), 1, "blog"), record(5, Some(2), 0, "news")],
                }],
            )
            .expect("apply");

        assert!(store.read_at(NodeId::new(4), 2).is_none());
        assert_eq!(ids(store.children_at(Some(NodeId::new(2)), 2)), vec![5]);
        assert_eq!(ids(store.children_at(Some(NodeId::new(2)), 1)), vec![4]);
    }

    #[test]
    fn repeated_changes_in_one_set_coalesce() {
        let store = seeded();
        store
            .apply_change_set(
                2,
                &[
                    Change::upsert(record(3, Some(1), 0, "a")),
                    Change::upsert(record(3, Some(1), 0, "b")),
                ],
            )
            .expect("apply");
        assert_eq!(name_at(&store, 3, 2).as_deref(), Some("b"));
        assert_eq!(store.stats().revisions, 5);
    }

    #[test]
    fn prune_reclaims_superseded_and_removed_revisions() {
        let store = seeded();
        store
            .apply_change_set(2, &[Change::upsert(record(3, Some(1), 0, "v2"))])
            .expect("gen 2");
        store
            .apply_change_set(3, &[Change::remove(2)])
            .expect("gen 3");
        assert_eq!(store.stats().revisions, 5);

        let outcome = store.prune(2);
        assert_eq!(outcome.revisions, 1);
        assert_eq!(name_at(&store, 3, 2).as_deref(), Some("v2"));
        assert!(store.read_at(NodeId::new(2), 2).is_some());

        let outcome = store.prune(3);
        assert_eq!(outcome.revisions, 2);
        assert_eq!(outcome.nodes, 2);
        assert_eq!(store.stats().chains, 2);
        assert_eq!(store.pending_garbage(), 0);
        assert_eq!(ids(store.children_at(Some(NodeId::new(1)), 3)), vec![3]);
    }

    #[test]
    fn prune_below_superseding_generation_keeps_history() {
        let store = seeded();
        store
            .apply_change_set(2, &[Change::upsert(record(3, Some(1), 0, "v2"))])
            .expect("gen 2");

        assert_eq!(store.prune(1).revisions, 0);
        assert_eq!(name_at(&store, 3, 1).as_deref(), Some("about"));
        assert_eq!(store.pending_garbage(), 1);
    }

    #[test]
    fn prune_unlinks_old_parent_after_move() {
        let store = seeded();
        store
            .apply_change_set(2, &[Change::upsert(record(4, Some(3), 0, "post"))])
            .expect("move");
        store.prune(2);

        assert!(
            store
                .children
                .get(&Some(NodeId::new(2)))
                .is_none_or(|set| !set.contains(&NodeId::new(4)))
        );
        assert_eq!(ids(store.children_at(Some(NodeId::new(3)), 2)), vec![4]);
    }

    #[test]
    fn try_prune_skips_while_prune_lock_is_held() {
        let store = seeded();
        let _held = mutex_lock(&store.prune_lock, SOURCE, "test");
        assert!(store.try_prune(1).is_none());
    }
}
