//! Endpoint directory: hostname → endpoint id resolution.

use std::collections::BTreeMap;

use crate::core::errors::Result;
use crate::core::paths::EndpointId;

/// Index collaborator resolving hostnames to endpoint ids.
///
/// A hostname may map to several ids (machines get re-enrolled), and a
/// hostname nobody has seen simply does not appear in the returned map.
pub trait EndpointDirectory {
    /// Resolve each hostname to zero or more endpoint ids.
    fn resolve_hostnames(
        &self,
        hostnames: &[String],
    ) -> Result<BTreeMap<String, Vec<EndpointId>>>;
}

/// Fixed in-memory directory for tests and self-checks.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    map: BTreeMap<String, Vec<EndpointId>>,
}

impl StaticDirectory {
    /// An empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the ids a hostname resolves to.
    pub fn insert(&mut self, hostname: impl Into<String>, ids: Vec<EndpointId>) {
        self.map.insert(hostname.into(), ids);
    }
}

impl EndpointDirectory for StaticDirectory {
    fn resolve_hostnames(
        &self,
        hostnames: &[String],
    ) -> Result<BTreeMap<String, Vec<EndpointId>>> {
        Ok(hostnames
            .iter()
            .filter_map(|h| self.map.get(h).map(|ids| (h.clone(), ids.clone())))
            .collect())
    }
}
