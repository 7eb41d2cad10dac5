//! Scripted engine: deterministic task effects for tests and self-checks.
//!
//! Each task name maps to a closure that applies the task's side effects
//! (typically writes into a shared [`MemoryStore`](crate::store::memory::MemoryStore))
//! at launch time, so "task complete" and "results visible" can be staged
//! independently by the fixture.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;

use crate::core::errors::{FchError, Result};
use crate::core::paths::EndpointId;
use crate::engine::{ExecutionEngine, TaskHandle, TaskSpec};

type ScriptFn = Arc<dyn Fn(&EndpointId, &TaskSpec) -> Result<()> + Send + Sync>;

/// Execution engine with pre-registered per-task effects.
#[derive(Default)]
pub struct ScriptedEngine {
    scripts: RwLock<HashMap<String, ScriptFn>>,
    timing_out: RwLock<HashSet<String>>,
    launches: RwLock<Vec<LaunchRecord>>,
    next_handle: AtomicU64,
}

/// One observed launch, for fixture assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRecord {
    /// Target endpoint id.
    pub endpoint: String,
    /// Task name.
    pub task: String,
    /// Whether the local-debug path was used.
    pub local: bool,
}

impl ScriptedEngine {
    /// An engine where every task completes as a no-op.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the effect applied when `task_name` runs.
    pub fn script<F>(&self, task_name: impl Into<String>, effect: F)
    where
        F: Fn(&EndpointId, &TaskSpec) -> Result<()> + Send + Sync + 'static,
    {
        self.scripts
            .write()
            .insert(task_name.into(), Arc::new(effect));
    }

    /// Make `start_and_wait` for `task_name` fail with a timeout.
    pub fn script_timeout(&self, task_name: impl Into<String>) {
        self.timing_out.write().insert(task_name.into());
    }

    /// All launches observed so far.
    #[must_use]
    pub fn launches(&self) -> Vec<LaunchRecord> {
        self.launches.read().clone()
    }

    fn run(&self, endpoint: &EndpointId, task: &TaskSpec, local: bool) -> Result<TaskHandle> {
        self.launches.write().push(LaunchRecord {
            endpoint: endpoint.to_string(),
            task: task.name.clone(),
            local,
        });

        let script = self.scripts.read().get(&task.name).cloned();
        if let Some(effect) = script {
            effect(endpoint, task)?;
        }

        let n = self.next_handle.fetch_add(1, Ordering::Relaxed);
        Ok(TaskHandle(format!("T:{n}")))
    }
}

impl ExecutionEngine for ScriptedEngine {
    fn start_and_wait(
        &self,
        endpoint: &EndpointId,
        task: &TaskSpec,
        timeout: Duration,
    ) -> Result<TaskHandle> {
        if self.timing_out.read().contains(&task.name) {
            // Record the launch even when it times out; the run still happened.
            self.launches.write().push(LaunchRecord {
                endpoint: endpoint.to_string(),
                task: task.name.clone(),
                local: false,
            });
            return Err(FchError::TaskTimeout {
                task: task.name.clone(),
                endpoint: endpoint.to_string(),
                timeout,
            });
        }
        self.run(endpoint, task, false)
    }

    fn start_local(&self, endpoint: &EndpointId, task: &TaskSpec) -> Result<TaskHandle> {
        self.run(endpoint, task, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::paths::NamespacePath;
    use crate::store::api::Store;
    use crate::store::memory::MemoryStore;

    #[test]
    fn scripted_effect_runs_on_launch() {
        let store = Arc::new(MemoryStore::new());
        let engine = ScriptedEngine::new();
        let effect_store = Arc::clone(&store);
        engine.script("ListProcesses", move |endpoint, _task| {
            effect_store.put_file(&endpoint.root().join("fs/os/proc/netstat"), b"n".to_vec());
            Ok(())
        });

        let endpoint = EndpointId::new("C.1");
        let handle = engine
            .start_and_wait(
                &endpoint,
                &TaskSpec::new("ListProcesses"),
                Duration::from_secs(5),
            )
            .unwrap();
        assert!(handle.0.starts_with("T:"));
        assert!(
            store
                .open(&NamespacePath::new("C.1/fs/os/proc/netstat"), None)
                .is_ok()
        );
    }

    #[test]
    fn unscripted_task_completes_as_noop() {
        let engine = ScriptedEngine::new();
        let endpoint = EndpointId::new("C.1");
        engine
            .start_and_wait(&endpoint, &TaskSpec::new("Unknown"), Duration::from_secs(1))
            .unwrap();
        assert_eq!(engine.launches().len(), 1);
        assert!(!engine.launches()[0].local);
    }

    #[test]
    fn timeout_script_surfaces_task_timeout() {
        let engine = ScriptedEngine::new();
        engine.script_timeout("SlowFlow");
        let err = engine
            .start_and_wait(
                &EndpointId::new("C.1"),
                &TaskSpec::new("SlowFlow"),
                Duration::from_secs(2),
            )
            .unwrap_err();
        assert_eq!(err.code(), "FCH-3003");
        // The attempt is still recorded.
        assert_eq!(engine.launches().len(), 1);
    }

    #[test]
    fn local_launches_are_flagged() {
        let engine = ScriptedEngine::new();
        engine
            .start_local(&EndpointId::new("C.1"), &TaskSpec::new("DebugFlow"))
            .unwrap();
        assert!(engine.launches()[0].local);
    }

    #[test]
    fn task_handles_are_distinct() {
        let engine = ScriptedEngine::new();
        let endpoint = EndpointId::new("C.1");
        let a = engine.start_local(&endpoint, &TaskSpec::new("A")).unwrap();
        let b = engine.start_local(&endpoint, &TaskSpec::new("A")).unwrap();
        assert_ne!(a, b);
    }
}
