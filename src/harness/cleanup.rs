//! Pre/post-run cleanup: delete recorded artifact paths and prove they are gone.
//!
//! Every test run owns a delete set: the paths it is responsible for
//! removing. Cleanup runs twice per test — before the task (clearing
//! leftovers from a prior failed run) and after (leaving the namespace clean
//! for the next run). A path that survives deletion invalidates the test's
//! contamination assumptions, so verification failure is fatal, never retried.

use std::collections::BTreeSet;

use crate::core::errors::{FchError, Result};
use crate::core::paths::NamespacePath;
use crate::store::api::Store;

/// Accumulates paths to delete and drives the delete-then-verify protocol.
#[derive(Debug, Default)]
pub struct CleanupManager {
    delete_set: BTreeSet<NamespacePath>,
}

impl CleanupManager {
    /// Manager with an empty delete set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a path this run must remove. Idempotent: duplicates collapse.
    pub fn record_for_deletion(&mut self, path: NamespacePath) {
        self.delete_set.insert(path);
    }

    /// Whether anything has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.delete_set.is_empty()
    }

    /// Recorded paths, in path order.
    #[must_use]
    pub fn paths(&self) -> impl Iterator<Item = &NamespacePath> {
        self.delete_set.iter()
    }

    /// Delete every recorded path, flush, then verify absence.
    ///
    /// Each path is removed from the store and from its parent's index, and
    /// caches are flushed so the verification reads see the deletions. Any
    /// path that still opens afterwards fails the whole call with
    /// `TestStateUnclean` naming that path.
    pub fn clean(&self, store: &dyn Store) -> Result<()> {
        if self.delete_set.is_empty() {
            return Ok(());
        }
        for path in &self.delete_set {
            store.delete_subject(path)?;
            store.remove_from_parent_index(path)?;
        }
        store.flush()?;
        self.verify_absent(store)
    }

    fn verify_absent(&self, store: &dyn Store) -> Result<()> {
        for path in &self.delete_set {
            match store.open(path, None) {
                // Lookup failure is what success looks like here.
                Err(FchError::NotFound { .. }) => {}
                Ok(_) => {
                    return Err(FchError::TestStateUnclean { path: path.clone() });
                }
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }
}
