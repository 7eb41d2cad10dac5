//! Fleet awareness: endpoint directory, metadata, and liveness filtering.

pub mod directory;
pub mod filter;
pub mod metadata;
