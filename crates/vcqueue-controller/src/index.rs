//! Queue membership index
//!
//! Tracks which PodGroups (by `namespace/name` key) belong to which queue.
//! A single read/write lock guards the whole index so that moving a key
//! between queues is never observed half done.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;

#[derive(Default)]
struct IndexInner {
    /// queue name -> PodGroup keys
    members: HashMap<String, BTreeSet<String>>,
    /// PodGroup key -> queue name
    owners: HashMap<String, String>,
}

impl IndexInner {
    fn detach(&mut self, key: &str) -> Option<String> {
        let queue = self.owners.remove(key)?;
        if let Some(set) = self.members.get_mut(&queue) {
            set.remove(key);
            if set.is_empty() {
                self.members.remove(&queue);
            }
        }
        Some(queue)
    }
}

/// Concurrency-safe mapping from queue name to member PodGroup keys.
///
/// Invariant: a key is a member of at most one queue.
#[derive(Default)]
pub struct ResourceIndex {
    inner: RwLock<IndexInner>,
}

impl ResourceIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `key` in `queue`, removing it from any other queue first.
    ///
    /// Returns the queue the key previously belonged to if it moved.
    pub fn assign(&self, key: &str, queue: &str) -> Option<String> {
        let mut inner = self.inner.write();
        if inner.owners.get(key).map(String::as_str) == Some(queue) {
            return None;
        }
        let previous = inner.detach(key);
        inner
            .members
            .entry(queue.to_string())
            .or_default()
            .insert(key.to_string());
        inner.owners.insert(key.to_string(), queue.to_string());
        previous
    }

    /// Remove `key` from whichever queue holds it, returning that queue
    pub fn remove(&self, key: &str) -> Option<String> {
        self.inner.write().detach(key)
    }

    /// Keys of the PodGroups in `queue`, sorted
    pub fn pod_groups(&self, queue: &str) -> Vec<String> {
        self.inner
            .read()
            .members
            .get(queue)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of PodGroups in `queue`
    pub fn count(&self, queue: &str) -> usize {
        self.inner
            .read()
            .members
            .get(queue)
            .map_or(0, BTreeSet::len)
    }

    /// Total number of indexed PodGroups
    pub fn len(&self) -> usize {
        self.inner.read().owners.len()
    }

    /// Whether no PodGroup is indexed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every key for which `keep` returns false.
    ///
    /// Returns the removed `(key, queue)` pairs.
    pub fn retain(&self, keep: impl Fn(&str) -> bool) -> Vec<(String, String)> {
        let mut inner = self.inner.write();
        let stale: Vec<String> = inner
            .owners
            .keys()
            .filter(|key| !keep(key))
            .cloned()
            .collect();
        stale
            .into_iter()
            .filter_map(|key| inner.detach(&key).map(|queue| (key, queue)))
            .collect()
    }
}
