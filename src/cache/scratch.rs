//! Typed key/value memo cache for derived values.
//!
//! Values are stored type-erased and handed back as `Arc<T>`. A prefixed
//! view shares the backing map with its parent but only sees (and clears)
//! its own keys and those of views nested under it. Prefixes are kept as
//! whole segments, so a view under `"a"` never sees one under `"ab"`.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::lock::mutex_lock;

const SOURCE: &str = "cache::scratch";

type Entry = Arc<dyn Any + Send + Sync>;
type Scope = Arc<[Arc<str>]>;

#[derive(Clone)]
pub struct ScratchCache {
    entries: Arc<Mutex<HashMap<(Scope, String), Entry>>>,
    scope: Scope,
}

impl Default for ScratchCache {
    fn default() -> Self {
        Self {
            entries: Arc::default(),
            scope: Arc::from(Vec::new()),
        }
    }
}

impl ScratchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// View over the same backing map restricted to keys under `prefix`.
    pub fn prefixed(&self, prefix: &str) -> Self {
        let mut scope = self.scope.to_vec();
        scope.push(Arc::from(prefix));
        Self {
            entries: Arc::clone(&self.entries),
            scope: Arc::from(scope),
        }
    }

    fn full_key(&self, key: &str) -> (Scope, String) {
        (Arc::clone(&self.scope), key.to_string())
    }

    fn covers(&self, scope: &Scope) -> bool {
        scope.starts_with(&self.scope)
    }

    pub fn get<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let entry = mutex_lock(&self.entries, SOURCE, "get")
            .get(&self.full_key(key))
            .cloned()?;
        entry.downcast::<T>().ok()
    }

    /// Returns the cached value or runs `factory` and caches a `Some` result.
    ///
    /// The factory runs without the cache lock held, so it may itself use
    /// the cache. When two callers race, the first stored value wins.
    pub fn get_or_create<T, F>(&self, key: &str, factory: F) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Option<T>,
    {
        if let Some(hit) = self.get::<T>(key) {
            return Some(hit);
        }

        let created: Entry = Arc::new(factory()?);
        let full_key = self.full_key(key);
        let stored = {
            let mut entries = mutex_lock(&self.entries, SOURCE, "get_or_create");
            match entries.get(&full_key) {
                Some(existing) if existing.is::<T>() => Arc::clone(existing),
                _ => {
                    entries.insert(full_key, Arc::clone(&created));
                    created
                }
            }
        };
        stored.downcast::<T>().ok()
    }

    /// Inserts or replaces a value.
    pub fn insert<T>(&self, key: &str, value: T)
    where
        T: Any + Send + Sync,
    {
        mutex_lock(&self.entries, SOURCE, "insert").insert(self.full_key(key), Arc::new(value));
    }

    pub fn remove(&self, key: &str) -> bool {
        mutex_lock(&self.entries, SOURCE, "remove")
            .remove(&self.full_key(key))
            .is_some()
    }

    /// Clears this view and the views nested under it; the unprefixed root
    /// clears everything.
    pub fn clear(&self) {
        let mut entries = mutex_lock(&self.entries, SOURCE, "clear");
        if self.scope.is_empty() {
            entries.clear();
        } else {
            entries.retain(|(scope, _), _| !self.covers(scope));
        }
    }

    /// Entries visible through this view, nested views included.
    pub fn len(&self) -> usize {
        let entries = mutex_lock(&self.entries, SOURCE, "len");
        if self.scope.is_empty() {
            return entries.len();
        }
        entries.keys().filter(|(scope, _)| self.covers(scope)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ScratchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchCache")
            .field("scope", &self.scope)
            .field("entries", &self.len())
            .finish()
    }
}
