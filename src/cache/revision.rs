//! Immutable node revisions and the per-node chain that orders them.
//!
//! A chain is a generation-ordered array (oldest first). Snapshots hold only
//! a generation number, so reclaiming memory is index compaction at the front
//! of the array.

use std::sync::Arc;

use crate::domain::{
    entities::ContentNode,
    types::{Generation, NodeId},
};

#[derive(Debug, Clone)]
pub struct NodeRevision {
    created: Generation,
    removed: Option<Generation>,
    node: Arc<ContentNode>,
}

impl NodeRevision {
    pub fn new(created: Generation, node: Arc<ContentNode>) -> Self {
        Self {
            created,
            removed: None,
            node,
        }
    }

    pub fn created(&self) -> Generation {
        self.created
    }

    pub fn removed(&self) -> Option<Generation> {
        self.removed
    }

    pub fn node(&self) -> &Arc<ContentNode> {
        &self.node
    }

    /// Visible to a snapshot pinned at `generation`.
    pub fn live_at(&self, generation: Generation) -> bool {
        self.created <= generation && self.removed.is_none_or(|removed| removed > generation)
    }
}

#[derive(Debug, Clone)]
pub struct RevisionChain {
    revisions: Vec<NodeRevision>,
}

impl RevisionChain {
    pub fn new(first: NodeRevision) -> Self {
        Self {
            revisions: vec![first],
        }
    }

    /// Newest revision created at or before `generation`, if it is still live there.
    pub fn read_at(&self, generation: Generation) -> Option<&NodeRevision> {
        let idx = self
            .revisions
            .partition_point(|revision| revision.created <= generation);
        let candidate = self.revisions.get(idx.checked_sub(1)?)?;
        candidate.live_at(generation).then_some(candidate)
    }

    pub fn newest(&self) -> Option<&NodeRevision> {
        self.revisions.last()
    }

    /// Newest revision when it has not been removed.
    pub fn head(&self) -> Option<&NodeRevision> {
        self.newest().filter(|revision| revision.removed.is_none())
    }

    /// Appends a revision; returns true when it superseded a live head.
    ///
    /// Callers stamp strictly increasing generations.
    pub fn push(&mut self, revision: NodeRevision) -> bool {
        debug_assert!(
            self.newest()
                .is_none_or(|newest| newest.created < revision.created),
            "revision generations must strictly increase"
        );
        let superseded = self.head().is_some();
        self.revisions.push(revision);
        superseded
    }

    /// Stamps the live head as removed at `generation`; false when nothing was live.
    pub fn mark_removed(&mut self, generation: Generation) -> bool {
        match self.revisions.last_mut() {
            Some(newest) if newest.removed.is_none() => {
                newest.removed = Some(generation);
                true
            }
            _ => false,
        }
    }

    /// Drops every revision no snapshot at or above `floor` can reach.
    ///
    /// Keeps the revision current at `floor` unless it was removed by then,
    /// and never touches anything created after `floor`.
    pub fn prune(&mut self, floor: Generation) -> usize {
        let at_or_below = self
            .revisions
            .partition_point(|revision| revision.created <= floor);
        if at_or_below == 0 {
            return 0;
        }

        let mut drop_count = at_or_below - 1;
        if self.revisions[drop_count]
            .removed
            .is_some_and(|removed| removed <= floor)
        {
            drop_count += 1;
        }
        self.revisions.drain(..drop_count);
        drop_count
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    /// Parents referenced by any retained revision.
    pub fn parents(&self) -> impl Iterator<Item = Option<NodeId>> + '_ {
        self.revisions.iter().map(|revision| revision.node.parent)
    }

    pub fn revisions(&self) -> &[NodeRevision] {
        &self.revisions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ContentData;
    use crate::domain::types::{ContentKind, NodeKey};

    fn node(id: i32, parent: Option<i32>, name: &str) -> Arc<ContentNode> {
        Arc::new(ContentNode {
            id: NodeId::new(id),
            key: NodeKey::new_v4(),
            parent: parent.map(NodeId::new),
            sort_order: 0,
            kind: ContentKind::Document,
            content_type: "page".to_string(),
            data: ContentData {
                name: name.to_string(),
                ..Default::default()
            },
        })
    }

    fn names_at(chain: &RevisionChain, generation: Generation) -> Option<String> {
        chain
            .read_at(generation)
            .map(|revision| revision.node().data.name.clone())
    }

    #[test]
    fn read_at_picks_newest_visible_revision() {
        let mut chain = RevisionChain::new(NodeRevision::new(2, node(1, None, "v2")));
        chain.push(NodeRevision::new(5, node(1, None, "v5")));

        assert_eq!(names_at(&chain, 1), None);
        assert_eq!(names_at(&chain, 2).as_deref(), Some("v2"));
        assert_eq!(names_at(&chain, 4).as_deref(), Some("v2"));
        assert_eq!(names_at(&chain, 5).as_deref(), Some("v5"));
        assert_eq!(names_at(&chain, 100).as_deref(), Some("v5"));
    }

    #[test]
    fn removal_hides_node_from_that_generation_on() {
        let mut chain = RevisionChain::new(NodeRevision::new(1, node(1, None, "v1")));
        assert!(chain.mark_removed(3));
        assert!(!chain.mark_removed(4));

        assert_eq!(names_at(&chain, 2).as_deref(), Some("v1"));
        assert_eq!(names_at(&chain, 3), None);
        assert!(chain.head().is_none());
    }

    #[test]
    fn reinsert_after_removal_starts_new_revision() {
        let mut chain = RevisionChain::new(NodeRevision::new(1, node(1, None, "v1")));
        chain.mark_removed(2);
        assert!(!chain.push(NodeRevision::new(4, node(1, None, "v4"))));

        assert_eq!(names_at(&chain, 3), None);
        assert_eq!(names_at(&chain, 4).as_deref(), Some("v4"));
    }

    #[test]
    fn prune_keeps_revision_current_at_floor() {
        let mut chain = RevisionChain::new(NodeRevision::new(1, node(1, None, "v1")));
        chain.push(NodeRevision::new(3, node(1, None, "v3")));
        chain.push(NodeRevision::new(6, node(1, None, "v6")));

        assert_eq!(chain.prune(4), 1);
        assert_eq!(chain.len(), 2);
        assert_eq!(names_at(&chain, 4).as_deref(), Some("v3"));
        assert_eq!(names_at(&chain, 6).as_deref(), Some("v6"));
    }

    #[test]
    fn prune_never_drops_the_newest_live_revision() {
        let mut chain = RevisionChain::new(NodeRevision::new(1, node(1, None, "old")));
        assert_eq!(chain.prune(1_000), 0);
        assert_eq!(names_at(&chain, 1_000).as_deref(), Some("old"));
    }

    #[test]
    fn prune_drops_revisions_removed_at_or_before_floor() {
        let mut chain = RevisionChain::new(NodeRevision::new(1, node(1, None, "v1")));
        chain.mark_removed(2);

        assert_eq!(chain.prune(1), 0);
        assert_eq!(chain.prune(2), 1);
        assert!(chain.is_empty());
    }

    #[test]
    fn prune_ignores_revisions_above_floor() {
        let mut chain = RevisionChain::new(NodeRevision::new(5, node(1, None, "v5")));
        assert_eq!(chain.prune(3), 0);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn parents_cover_moves() {
        let mut chain = RevisionChain::new(NodeRevision::new(1, node(3, Some(1), "a")));
        chain.push(NodeRevision::new(2, node(3, Some(2), "a")));
        let parents: Vec<_> = chain.parents().collect();
        assert_eq!(parents, vec![Some(NodeId::new(1)), Some(NodeId::new(2))]);
    }
}
