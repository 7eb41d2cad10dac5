//! Breadth-first enumeration of all descendants under a namespace prefix.

use std::collections::BTreeSet;

use crate::core::paths::NamespacePath;
use crate::store::api::Store;

/// Materializes the full descendant set below a prefix, level by level.
///
/// Each round issues a single batched child-listing call for the whole
/// frontier, so the number of store round trips is bounded by tree depth,
/// not node count. Termination relies on the store's tree being finite and
/// acyclic, which the backend guarantees.
pub struct TreeEnumerator<'a> {
    store: &'a dyn Store,
}

impl<'a> TreeEnumerator<'a> {
    /// Bind the enumerator to a store.
    #[must_use]
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// All proper descendants of `prefix`; empty for a leaf. No ordering
    /// guarantee beyond the set's own.
    #[must_use]
    pub fn enumerate(&self, prefix: &NamespacePath) -> BTreeSet<NamespacePath> {
        let mut all: BTreeSet<NamespacePath> = BTreeSet::new();
        let mut frontier: Vec<NamespacePath> = vec![prefix.clone()];

        while !frontier.is_empty() {
            let mut next: BTreeSet<NamespacePath> = BTreeSet::new();
            for (_, children) in self.store.multi_list_children(&frontier) {
                next.extend(children);
            }
            frontier = next.iter().cloned().collect();
            all.append(&mut next);
        }
        all
    }
}
