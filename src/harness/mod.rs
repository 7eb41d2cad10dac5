//! The conformance harness itself: enumeration, polling, cleanup,
//! test orchestration, the test table, and the suite runner.

pub mod cleanup;
pub mod enumerate;
pub mod poller;
pub mod registry;
pub mod runner;
pub mod testcase;
