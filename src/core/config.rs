//! Configuration system: TOML file + env var overrides + defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{FchError, Result};

/// Full harness configuration model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub fleet: FleetConfig,
    pub harness: HarnessConfig,
    pub log: LogConfig,
}

/// Fleet selection defaults used when a run supplies no explicit targets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FleetConfig {
    /// Endpoint ids eligible for conformance runs when none are supplied.
    pub default_endpoint_ids: Vec<String>,
    /// Hostnames to resolve into endpoint ids when none are supplied.
    pub default_hostnames: Vec<String>,
    /// Endpoints that have not checked in for longer than this are excluded.
    pub checkin_threshold_minutes: u64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            default_endpoint_ids: Vec::new(),
            default_hostnames: Vec::new(),
            checkin_threshold_minutes: 20,
        }
    }
}

/// Timing knobs for a single test run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Maximum tolerated delay between task completion and result visibility.
    pub results_sla_seconds: u64,
    /// Blocking wait budget for remote task completion.
    pub task_timeout_seconds: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            results_sla_seconds: 10,
            task_timeout_seconds: 650,
        }
    }
}

/// Run-log destination.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// JSONL run-log path; `None` disables file logging.
    pub jsonl_path: Option<std::path::PathBuf>,
}

impl Config {
    /// Load configuration from an optional TOML file, then apply `FCH_*`
    /// env-var overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(FchError::MissingConfig {
                        path: p.to_path_buf(),
                    });
                }
                let raw = fs::read_to_string(p).map_err(|e| FchError::Io {
                    path: p.to_path_buf(),
                    source: e,
                })?;
                toml::from_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_u64("FCH_CHECKIN_THRESHOLD_MINUTES") {
            self.fleet.checkin_threshold_minutes = v;
        }
        if let Some(v) = env_u64("FCH_RESULTS_SLA_SECONDS") {
            self.harness.results_sla_seconds = v;
        }
        if let Some(v) = env_u64("FCH_TASK_TIMEOUT_SECONDS") {
            self.harness.task_timeout_seconds = v;
        }
        if let Ok(v) = env::var("FCH_LOG_PATH")
            && !v.is_empty()
        {
            self.log.jsonl_path = Some(v.into());
        }
    }

    /// Reject configurations that would disable the safety windows entirely.
    pub fn validate(&self) -> Result<()> {
        if self.fleet.checkin_threshold_minutes == 0 {
            return Err(FchError::InvalidConfig {
                details: "fleet.checkin_threshold_minutes must be > 0".to_string(),
            });
        }
        if self.harness.results_sla_seconds == 0 {
            return Err(FchError::InvalidConfig {
                details: "harness.results_sla_seconds must be > 0".to_string(),
            });
        }
        if self.harness.task_timeout_seconds == 0 {
            return Err(FchError::InvalidConfig {
                details: "harness.task_timeout_seconds must be > 0".to_string(),
            });
        }
        Ok(())
    }

    /// Liveness threshold as a chrono duration for check-in arithmetic.
    #[must_use]
    pub fn checkin_threshold(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::try_from(self.fleet.checkin_threshold_minutes).unwrap_or(20))
    }

    /// Blocking task-wait budget.
    #[must_use]
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.harness.task_timeout_seconds)
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
