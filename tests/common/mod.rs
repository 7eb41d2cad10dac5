//! Shared fixtures: simulated fleets with seeded metadata and scripted flows.

use std::sync::Arc;

use chrono::{Duration, Utc};
use flow_conformance_harness::prelude::*;

/// Store an endpoint whose agent last checked in `minutes_ago` minutes ago.
pub fn seed_endpoint(store: &MemoryStore, id: &str, minutes_ago: i64) -> EndpointId {
    seed_endpoint_versioned(store, id, minutes_ago, 3400)
}

/// Like [`seed_endpoint`] with an explicit agent version.
pub fn seed_endpoint_versioned(
    store: &MemoryStore,
    id: &str,
    minutes_ago: i64,
    agent_version: u64,
) -> EndpointId {
    let endpoint = EndpointId::new(id);
    let metadata = EndpointMetadata {
        last_checkin: Utc::now() - Duration::minutes(minutes_ago),
        agent_version,
        config: None,
    };
    store.put_file(&endpoint.root(), metadata.to_json().unwrap());
    endpoint
}

/// Engine whose `task` writes a single file under the endpoint root.
pub fn engine_writing_file(
    store: &Arc<MemoryStore>,
    task: &str,
    relative_path: &str,
    data: &[u8],
) -> ScriptedEngine {
    let engine = ScriptedEngine::new();
    let effect_store = Arc::clone(store);
    let relative_path = relative_path.to_owned();
    let data = data.to_vec();
    engine.script(task, move |endpoint, _task| {
        effect_store.put_file(&endpoint.root().join(&relative_path), data.clone());
        Ok(())
    });
    engine
}
