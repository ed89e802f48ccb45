//! Lazily populated mapping between integer ids and stable keys.
//!
//! Resolvers are registered once per kind and consulted only on a miss;
//! every resolved pair is cached in both directions for the life of the
//! process (or until [`IdentifierMap::clear`]).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use metrics::counter;
use tracing::debug;

use crate::domain::types::{ContentKind, NodeId, NodeKey};

use super::error::IdMapError;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::id_map";

const METRIC_ID_MAP_HIT: &str = "snapcache_id_map_hit_total";
const METRIC_ID_MAP_MISS: &str = "snapcache_id_map_miss_total";

pub type KeyResolver = Arc<dyn Fn(NodeId) -> Option<NodeKey> + Send + Sync>;
pub type IdResolver = Arc<dyn Fn(NodeKey) -> Option<NodeId> + Send + Sync>;

#[derive(Clone)]
struct Resolvers {
    key_for_id: KeyResolver,
    id_for_key: IdResolver,
}

#[derive(Default)]
pub struct IdentifierMap {
    resolvers: RwLock<HashMap<ContentKind, Resolvers>>,
    keys: DashMap<(ContentKind, NodeId), NodeKey>,
    ids: DashMap<(ContentKind, NodeKey), NodeId>,
}

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the storage lookups for `kind`. Registering twice is an error.
    pub fn register_resolvers(
        &self,
        kind: ContentKind,
        key_for_id: KeyResolver,
        id_for_key: IdResolver,
    ) -> Result<(), IdMapError> {
        let mut resolvers = rw_write(&self.resolvers, SOURCE, "register_resolvers");
        if resolvers.contains_key(&kind) {
            return Err(IdMapError::AlreadyRegistered { kind });
        }
        resolvers.insert(
            kind,
            Resolvers {
                key_for_id,
                id_for_key,
            },
        );
        debug!(kind = %kind, "Registered identifier resolvers");
        Ok(())
    }

    fn resolvers(&self, kind: ContentKind) -> Option<Resolvers> {
        rw_read(&self.resolvers, SOURCE, "resolvers")
            .get(&kind)
            .cloned()
    }

    pub fn get_key_for_id(&self, kind: ContentKind, id: NodeId) -> Option<NodeKey> {
        if let Some(key) = self.keys.get(&(kind, id)) {
            counter!(METRIC_ID_MAP_HIT, "kind" => kind.as_str()).increment(1);
            return Some(*key);
        }
        counter!(METRIC_ID_MAP_MISS, "kind" => kind.as_str()).increment(1);

        let key = (self.resolvers(kind)?.key_for_id)(id)?;
        self.remember(kind, id, key);
        Some(key)
    }

    pub fn get_id_for_key(&self, kind: ContentKind, key: NodeKey) -> Option<NodeId> {
        if let Some(id) = self.ids.get(&(kind, key)) {
            counter!(METRIC_ID_MAP_HIT, "kind" => kind.as_str()).increment(1);
            return Some(*id);
        }
        counter!(METRIC_ID_MAP_MISS, "kind" => kind.as_str()).increment(1);

        let id = (self.resolvers(kind)?.id_for_key)(key)?;
        self.remember(kind, id, key);
        Some(id)
    }

    fn remember(&self, kind: ContentKind, id: NodeId, key: NodeKey) {
        self.keys.insert((kind, id), key);
        self.ids.insert((kind, key), id);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Forgets cached pairs; resolvers stay registered.
    pub fn clear(&self) {
        self.keys.clear();
        self.ids.clear();
    }
}

impl std::fmt::Debug for IdentifierMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifierMap")
            .field("entries", &self.len())
            .finish()
    }
}
