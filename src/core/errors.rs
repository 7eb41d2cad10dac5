//! FCH-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::paths::NamespacePath;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, FchError>;

/// Top-level error type for the flow conformance harness.
#[derive(Debug, Error)]
pub enum FchError {
    #[error("[FCH-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[FCH-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[FCH-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[FCH-2001] no artifact at {path}")]
    NotFound { path: NamespacePath },

    #[error("[FCH-2002] artifact {path} is a {actual}, expected {expected}")]
    TypeMismatch {
        path: NamespacePath,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("[FCH-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[FCH-2102] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[FCH-3001] no entries in {path} after SLA of {sla_seconds} seconds")]
    EmptyCollection {
        path: NamespacePath,
        sla_seconds: u64,
    },

    #[error("[FCH-3002] path was not deleted during cleanup: {path}")]
    TestStateUnclean { path: NamespacePath },

    #[error("[FCH-3003] task {task} on {endpoint} did not complete within {timeout:?}")]
    TaskTimeout {
        task: String,
        endpoint: String,
        timeout: Duration,
    },

    #[error("[FCH-3004] check failed: {details}")]
    CheckFailed { details: String },

    #[error("[FCH-3005] no agent configuration on {endpoint}; Interrogate did not populate it")]
    MissingAgentConfig { endpoint: String },

    #[error("[FCH-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl FchError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "FCH-1001",
            Self::MissingConfig { .. } => "FCH-1002",
            Self::ConfigParse { .. } => "FCH-1003",
            Self::NotFound { .. } => "FCH-2001",
            Self::TypeMismatch { .. } => "FCH-2002",
            Self::Serialization { .. } => "FCH-2101",
            Self::Io { .. } => "FCH-2102",
            Self::EmptyCollection { .. } => "FCH-3001",
            Self::TestStateUnclean { .. } => "FCH-3002",
            Self::TaskTimeout { .. } => "FCH-3003",
            Self::CheckFailed { .. } => "FCH-3004",
            Self::MissingAgentConfig { .. } => "FCH-3005",
            Self::Runtime { .. } => "FCH-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    ///
    /// Only the bounded poll loop and the one-shot Interrogate fallback act on
    /// this; nothing else in the harness retries.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::EmptyCollection { .. } | Self::Io { .. }
        )
    }

    /// Convenience constructor for check failures.
    #[must_use]
    pub fn check(details: impl Into<String>) -> Self {
        Self::CheckFailed {
            details: details.into(),
        }
    }
}

impl From<serde_json::Error> for FchError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for FchError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
