#![forbid(unsafe_code)]

//! Flow Conformance Harness (fch) — verifies that fleet endpoints execute
//! flows correctly and that their results become visible in the shared
//! namespace-addressed datastore.
//!
//! Each test follows the same protocol:
//! 1. **Clean** — delete declared output paths and prove they are gone
//! 2. **Launch** — start the flow on the endpoint and wait for completion
//! 3. **Check** — validate the result artifacts (existence, content, magic
//!    bytes, or collection population within the results SLA)
//! 4. **Clean again** — leave the namespace as it was found
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use flow_conformance_harness::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use flow_conformance_harness::core::config::Config;
//! use flow_conformance_harness::harness::runner::Runner;
//! ```

pub mod prelude;

pub mod core;
pub mod engine;
pub mod fleet;
pub mod harness;
pub mod logger;
pub mod store;
