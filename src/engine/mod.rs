//! Task execution engine surface: how the harness launches remote work.
//!
//! The engine is an external collaborator. The harness only starts a task and
//! blocks until the engine reports completion or the wait budget expires;
//! task semantics, scheduling, and the wire protocol live elsewhere.

pub mod scripted;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::core::errors::Result;
use crate::core::paths::EndpointId;

/// A named unit of remote work with JSON-valued arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    /// Task/flow name understood by the engine.
    pub name: String,
    /// Keyword arguments forwarded verbatim.
    pub args: BTreeMap<String, serde_json::Value>,
}

impl TaskSpec {
    /// A task with no arguments.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: BTreeMap::new(),
        }
    }

    /// Builder-style argument attachment.
    #[must_use]
    pub fn with_arg(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.args.insert(key.into(), value);
        self
    }
}

/// Identifier of a launched task, created by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub String);

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Blocking task launch operations consumed by the orchestrator.
pub trait ExecutionEngine {
    /// Launch `task` against `endpoint` and block until the engine reports
    /// completion, failing with `TaskTimeout` once `timeout` elapses.
    fn start_and_wait(
        &self,
        endpoint: &EndpointId,
        task: &TaskSpec,
        timeout: Duration,
    ) -> Result<TaskHandle>;

    /// Synchronous local-debug variant: run the task in-process against a
    /// local endpoint, no timeout budget.
    fn start_local(&self, endpoint: &EndpointId, task: &TaskSpec) -> Result<TaskHandle>;
}
