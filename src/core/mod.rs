//! Shared foundation: errors, configuration, and namespace addressing.

pub mod config;
pub mod errors;
pub mod paths;
