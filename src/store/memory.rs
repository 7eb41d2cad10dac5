//! In-memory store backing the test suite and the CLI self-check.
//!
//! Keeps two structures, mirroring the real store's split between object
//! content and the namespace index: an object map and a parent→children
//! index. A path resolves if it has an object *or* indexed children, so
//! intermediate directories open as containers without an explicit object.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;

use crate::core::errors::{FchError, Result};
use crate::core::paths::NamespacePath;
use crate::store::api::{Artifact, ArtifactKind, ArtifactPayload, CollectionEntry, Store};

#[derive(Debug, Default)]
struct Inner {
    objects: HashMap<String, ArtifactPayload>,
    children: HashMap<String, BTreeSet<String>>,
    flush_count: u64,
}

/// Shared in-memory datastore.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a leaf file and index it under all its ancestors.
    pub fn put_file(&self, path: &NamespacePath, data: impl Into<Vec<u8>>) {
        let mut inner = self.inner.write();
        inner
            .objects
            .insert(path.to_string(), ArtifactPayload::File { data: data.into() });
        Self::index_ancestors(&mut inner, path);
    }

    /// Store an explicit container object.
    pub fn put_container(&self, path: &NamespacePath) {
        let mut inner = self.inner.write();
        inner
            .objects
            .insert(path.to_string(), ArtifactPayload::Container);
        Self::index_ancestors(&mut inner, path);
    }

    /// Store a collection with the given entries.
    pub fn put_collection(&self, path: &NamespacePath, entries: Vec<CollectionEntry>) {
        let mut inner = self.inner.write();
        inner
            .objects
            .insert(path.to_string(), ArtifactPayload::Collection { entries });
        Self::index_ancestors(&mut inner, path);
    }

    /// Append one entry to a collection, creating it if absent. Models the
    /// late-arriving writes the poller is built to tolerate.
    pub fn push_collection_entry(&self, path: &NamespacePath, entry: CollectionEntry) {
        let mut inner = self.inner.write();
        match inner
            .objects
            .entry(path.to_string())
            .or_insert_with(|| ArtifactPayload::Collection {
                entries: Vec::new(),
            }) {
            ArtifactPayload::Collection { entries } => entries.push(entry),
            // Non-collection object at this path: leave it untouched.
            _ => return,
        }
        Self::index_ancestors(&mut inner, path);
    }

    /// Number of `flush` calls observed, for convergence assertions.
    #[must_use]
    pub fn flush_count(&self) -> u64 {
        self.inner.read().flush_count
    }

    fn index_ancestors(inner: &mut Inner, path: &NamespacePath) {
        let mut current = path.clone();
        while let Some(parent) = current.parent() {
            inner
                .children
                .entry(parent.to_string())
                .or_default()
                .insert(current.to_string());
            current = parent;
        }
    }

    fn resolve(inner: &Inner, path: &NamespacePath) -> Option<ArtifactPayload> {
        let key = path.to_string();
        if let Some(payload) = inner.objects.get(&key) {
            return Some(payload.clone());
        }
        // Indexed children make an intermediate path open as a container.
        if inner.children.get(&key).is_some_and(|c| !c.is_empty()) {
            return Some(ArtifactPayload::Container);
        }
        None
    }
}

impl Store for MemoryStore {
    fn open(&self, path: &NamespacePath, expected: Option<ArtifactKind>) -> Result<Artifact> {
        let inner = self.inner.read();
        let payload = Self::resolve(&inner, path).ok_or_else(|| FchError::NotFound {
            path: path.clone(),
        })?;
        let artifact = Artifact {
            path: path.clone(),
            payload,
        };
        if let Some(kind) = expected {
            artifact.expect_kind(kind)?;
        }
        Ok(artifact)
    }

    fn multi_open(&self, paths: &[NamespacePath]) -> Vec<Artifact> {
        let inner = self.inner.read();
        paths
            .iter()
            .filter_map(|path| {
                Self::resolve(&inner, path).map(|payload| Artifact {
                    path: path.clone(),
                    payload,
                })
            })
            .collect()
    }

    fn multi_list_children(
        &self,
        paths: &[NamespacePath],
    ) -> Vec<(NamespacePath, Vec<NamespacePath>)> {
        let inner = self.inner.read();
        paths
            .iter()
            .map(|path| {
                let children = inner
                    .children
                    .get(&path.to_string())
                    .map(|set| set.iter().map(|s| NamespacePath::new(s)).collect())
                    .unwrap_or_default();
                (path.clone(), children)
            })
            .collect()
    }

    fn delete_subject(&self, path: &NamespacePath) -> Result<()> {
        let mut inner = self.inner.write();
        let key = path.to_string();
        inner.objects.remove(&key);
        inner.children.remove(&key);
        Ok(())
    }

    fn remove_from_parent_index(&self, path: &NamespacePath) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(parent) = path.parent()
            && let Some(set) = inner.children.get_mut(&parent.to_string())
        {
            set.remove(&path.to_string());
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.inner.write().flush_count += 1;
        Ok(())
    }
}
