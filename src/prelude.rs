//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use flow_conformance_harness::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{FchError, Result};
pub use crate::core::paths::{EndpointId, NamespacePath};

// Store
pub use crate::store::api::{Artifact, ArtifactKind, Store};
pub use crate::store::memory::MemoryStore;

// Engine
pub use crate::engine::scripted::ScriptedEngine;
pub use crate::engine::{ExecutionEngine, TaskHandle, TaskSpec};

// Fleet
pub use crate::fleet::directory::{EndpointDirectory, StaticDirectory};
pub use crate::fleet::filter::FleetFilter;
pub use crate::fleet::metadata::EndpointMetadata;

// Harness
pub use crate::harness::registry::{TestTable, builtin_table};
pub use crate::harness::runner::{RunSummary, Runner};
pub use crate::harness::testcase::{
    CheckKind, Platform, RunOptions, RunOutcome, TestCase, TestConfig,
};

// Logger
pub use crate::logger::{LogEntry, RunLogger};
