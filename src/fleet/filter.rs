//! Fleet selection: assemble candidate endpoints, then drop stale ones.
//!
//! Stale endpoints (decommissioned test machines that never check in again)
//! are the main source of harness timeouts, so candidates that have not
//! checked in within the liveness threshold are filtered out before any test
//! is scheduled against them.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};

use crate::core::config::FleetConfig;
use crate::core::errors::Result;
use crate::core::paths::{EndpointId, NamespacePath};
use crate::fleet::directory::EndpointDirectory;
use crate::fleet::metadata::EndpointMetadata;
use crate::store::api::{ArtifactPayload, Store};

/// Selects live test targets from explicit ids, hostnames, and defaults.
pub struct FleetFilter<'a> {
    store: &'a dyn Store,
    directory: &'a dyn EndpointDirectory,
    config: &'a FleetConfig,
}

impl<'a> FleetFilter<'a> {
    /// Bind the filter to its collaborators.
    #[must_use]
    pub fn new(
        store: &'a dyn Store,
        directory: &'a dyn EndpointDirectory,
        config: &'a FleetConfig,
    ) -> Self {
        Self {
            store,
            directory,
            config,
        }
    }

    /// Resolve and liveness-filter the target set.
    ///
    /// Candidates are the union of `explicit_ids` (falling back to the
    /// configured default list when empty) and the ids each hostname in
    /// `hostnames` (same fallback) resolves to. A candidate survives only if
    /// its metadata opens, parses, and shows a check-in no older than
    /// `threshold`; the boundary itself is kept. Candidates whose metadata
    /// cannot be fetched are dropped without comment.
    pub fn select_targets(
        &self,
        explicit_ids: &[String],
        hostnames: &[String],
        threshold: Duration,
    ) -> Result<BTreeSet<EndpointId>> {
        self.select_targets_at(explicit_ids, hostnames, threshold, Utc::now())
    }

    fn select_targets_at(
        &self,
        explicit_ids: &[String],
        hostnames: &[String],
        threshold: Duration,
        now: DateTime<Utc>,
    ) -> Result<BTreeSet<EndpointId>> {
        let mut candidates: BTreeSet<EndpointId> = if explicit_ids.is_empty() {
            self.config
                .default_endpoint_ids
                .iter()
                .map(|raw| EndpointId::new(raw))
                .collect()
        } else {
            explicit_ids.iter().map(|raw| EndpointId::new(raw)).collect()
        };

        let hosts: Vec<String> = if hostnames.is_empty() {
            self.config.default_hostnames.clone()
        } else {
            hostnames.to_vec()
        };
        if !hosts.is_empty() {
            for ids in self.directory.resolve_hostnames(&hosts)?.into_values() {
                candidates.extend(ids);
            }
        }

        let roots: Vec<NamespacePath> = candidates.iter().map(EndpointId::root).collect();
        let mut live = BTreeSet::new();
        for artifact in self.store.multi_open(&roots) {
            // Metadata that is missing, has the wrong shape, or does not parse
            // leaves its endpoint out of the kept set.
            let ArtifactPayload::File { data } = &artifact.payload else {
                continue;
            };
            let Ok(metadata) = serde_json::from_slice::<EndpointMetadata>(data) else {
                continue;
            };
            if now - metadata.last_checkin <= threshold {
                live.insert(EndpointId::new(&artifact.path.to_string()));
            }
        }
        Ok(live)
    }
}
