//! Endpoint metadata: check-in records, agent versions, and the agent
//! configuration map, read from the endpoint's root object in the store.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::{FchError, Result};
use crate::core::paths::EndpointId;
use crate::engine::{ExecutionEngine, TaskSpec};
use crate::store::api::{ArtifactKind, Store};

/// Task that refreshes an endpoint's metadata object, including its config.
pub const INTERROGATE_TASK: &str = "Interrogate";

/// Preferred config key for the agent binary name.
pub const BINARY_NAME_KEY: &str = "agent.binary_name";

/// Fallback config key when the binary name is not set explicitly.
pub const AGENT_NAME_KEY: &str = "agent.name";

/// Metadata object stored at an endpoint's root path, serialized as JSON.
///
/// `last_checkin` is the check-in record the fleet filter keys liveness on;
/// the harness never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointMetadata {
    /// Last time the endpoint contacted the infrastructure.
    pub last_checkin: DateTime<Utc>,
    /// Installed agent version, for minimum-version skip gates.
    pub agent_version: u64,
    /// Agent configuration as reported by the last Interrogate, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<BTreeMap<String, String>>,
}

impl EndpointMetadata {
    /// Read and parse the metadata object for `endpoint`.
    pub fn fetch(store: &dyn Store, endpoint: &EndpointId) -> Result<Self> {
        let artifact = store.open(&endpoint.root(), Some(ArtifactKind::File))?;
        Ok(serde_json::from_slice(artifact.read(usize::MAX))?)
    }

    /// Serialize for storage at the endpoint root.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Resolve the agent binary name from the endpoint's config map.
///
/// If the config is missing entirely, run Interrogate exactly once to let the
/// endpoint repopulate it, then re-read. The bound is an explicit flag, so a
/// second miss fails instead of looping.
pub fn agent_binary_name(
    store: &dyn Store,
    engine: &dyn ExecutionEngine,
    endpoint: &EndpointId,
    timeout: Duration,
) -> Result<String> {
    let mut interrogated = false;
    loop {
        let metadata = EndpointMetadata::fetch(store, endpoint)?;
        if let Some(config) = metadata.config {
            return config
                .get(BINARY_NAME_KEY)
                .or_else(|| config.get(AGENT_NAME_KEY))
                .cloned()
                .ok_or_else(|| FchError::MissingAgentConfig {
                    endpoint: endpoint.to_string(),
                });
        }
        if interrogated {
            return Err(FchError::MissingAgentConfig {
                endpoint: endpoint.to_string(),
            });
        }
        engine.start_and_wait(endpoint, &TaskSpec::new(INTERROGATE_TASK), timeout)?;
        interrogated = true;
    }
}
