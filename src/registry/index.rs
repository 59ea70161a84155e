use dashmap::DashMap;
use std::sync::{Arc, Weak};

use super::types::StorageNode;

/// Concurrent path -> storage node routing structure.
///
/// Entries hold `Weak` back-references: the registry owns node lifetime, the
/// index only routes to it. `DashMap::insert` publishes each association
/// atomically, so a concurrent lookup sees either the old owner or the new
/// one, never a torn entry.
pub struct PathIndex {
    entries: DashMap<String, Weak<StorageNode>>,
}

impl PathIndex {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Maps `path` to `node`, overwriting any prior owner of that exact path.
    /// Last registration wins.
    pub fn insert(&self, path: &str, node: &Arc<StorageNode>) {
        self.entries.insert(path.to_string(), Arc::downgrade(node));
    }

    /// Returns the current owner of `path`, live or not. `None` means the
    /// path was never registered (or the registry was torn down).
    pub fn lookup(&self, path: &str) -> Option<Arc<StorageNode>> {
        self.entries.get(path)?.value().upgrade()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PathIndex {
    fn default() -> Self {
        Self::new()
    }
}
