//! Datastore surface consumed by the harness, plus the in-memory fixture.

pub mod api;
pub mod memory;
