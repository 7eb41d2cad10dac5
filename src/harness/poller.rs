//! Bounded-retry polling of a result collection.
//!
//! The writer of a result collection and this reader sit on different
//! consistency domains: a task can be marked complete before its results are
//! visible here. Polling with a hard deadline bounds worst-case test latency
//! while tolerating typical replication lag. The unit sleep is deliberately
//! coarse; this is a harness, not a low-latency system.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::core::errors::{FchError, Result};
use crate::core::paths::NamespacePath;
use crate::store::api::{CollectionEntry, Store};

/// Injectable sleep, so tests can count ticks instead of waiting.
pub type SleepFn = Arc<dyn Fn(Duration) + Send + Sync>;

/// Polls a collection until it is non-empty or the SLA window closes.
pub struct ResultPoller<'a> {
    store: &'a dyn Store,
    sleep: SleepFn,
}

impl<'a> ResultPoller<'a> {
    /// Poller with the real one-second sleep.
    #[must_use]
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            sleep: Arc::new(thread::sleep),
        }
    }

    /// Replace the sleep function (used by tests).
    #[must_use]
    pub fn with_sleep_fn(mut self, sleep: SleepFn) -> Self {
        self.sleep = sleep;
        self
    }

    /// Return the collection's entries, waiting up to `sla_seconds` for the
    /// first one to become visible.
    ///
    /// Fast path: if entries are already present, returns without sleeping.
    /// Otherwise sleeps one second per round and re-reads, up to the SLA.
    /// A collection that never populates fails with `EmptyCollection`.
    pub fn wait_non_empty(
        &self,
        path: &NamespacePath,
        sla_seconds: u64,
    ) -> Result<Vec<CollectionEntry>> {
        let entries = self.read(path)?;
        if !entries.is_empty() {
            return Ok(entries);
        }

        for _ in 0..sla_seconds {
            (self.sleep)(Duration::from_secs(1));
            let entries = self.read(path)?;
            if !entries.is_empty() {
                return Ok(entries);
            }
        }
        Err(FchError::EmptyCollection {
            path: path.clone(),
            sla_seconds,
        })
    }

    /// A collection that is not visible yet reads as empty; the deadline, not
    /// the lookup, decides when that becomes a failure.
    fn read(&self, path: &NamespacePath) -> Result<Vec<CollectionEntry>> {
        match self.store.open(path, None) {
            Ok(artifact) => Ok(artifact.entries().to_vec()),
            Err(FchError::NotFound { .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}
