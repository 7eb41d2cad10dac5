//! Explicit table of known conformance tests.
//!
//! Tests register by name into a [`TestTable`]; there is no implicit
//! discovery. The built-in table carries the stock suite, and callers can
//! extend it or build their own.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::core::config::HarnessConfig;
use crate::core::errors::{FchError, Result};
use crate::engine::TaskSpec;
use crate::harness::testcase::{CheckKind, Platform, TestConfig};

/// Name-keyed registry of test configurations.
#[derive(Debug, Default)]
pub struct TestTable {
    entries: BTreeMap<String, TestConfig>,
}

impl TestTable {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a test; the name must be unique within the table.
    pub fn register(&mut self, config: TestConfig) -> Result<()> {
        if self.entries.contains_key(&config.name) {
            return Err(FchError::InvalidConfig {
                details: format!("duplicate test name: {}", config.name),
            });
        }
        self.entries.insert(config.name.clone(), config);
        Ok(())
    }

    /// Look up a test by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TestConfig> {
        self.entries.get(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Iterate over entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = &TestConfig> {
        self.entries.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The stock conformance suite, parameterized by the configured windows.
pub fn builtin_table(harness: &HarnessConfig) -> TestTable {
    let sla = harness.results_sla_seconds;
    let timeout = Duration::from_secs(harness.task_timeout_seconds);
    let base = |name: &str, task: &str| {
        TestConfig::new(name, task)
            .with_results_sla(sla)
            .with_timeout(timeout)
    };

    let mut table = TestTable::new();
    let entries = [
        base("NetstatListing", "Netstat")
            .with_output_path("fs/os/proc")
            .with_file_to_find("netstat"),
        base("SysctlContentPresent", "ReadSysctl")
            .with_task(
                TaskSpec::new("ReadSysctl")
                    .with_arg("key", serde_json::json!("kernel/hostname")),
            )
            .with_output_path("fs/os/proc/sys/kernel/hostname")
            .with_check(CheckKind::ContentNonEmpty)
            .with_platforms(&[Platform::Linux]),
        base("FetchAgentBinaryLinux", "FetchAgentBinary")
            .with_output_path("binaries/agentd")
            .with_check(CheckKind::MagicElf)
            .with_platforms(&[Platform::Linux]),
        base("FetchAgentBinaryWindows", "FetchAgentBinary")
            .with_output_path("binaries/agent.exe")
            .with_check(CheckKind::MagicPe)
            .with_platforms(&[Platform::Windows]),
        base("FetchAgentBinaryDarwin", "FetchAgentBinary")
            .with_output_path("binaries/agentd")
            .with_check(CheckKind::MagicMachO)
            .with_platforms(&[Platform::Darwin]),
        base("ProcessListingCollection", "ListProcesses")
            .with_output_path("analysis/ListProcesses")
            .with_check(CheckKind::CollectionNonEmpty),
        base("RawDeviceProcListing", "RawDirectoryListing")
            .with_output_path("fs/raw/*/proc")
            .with_file_to_find("cmdline")
            .with_platforms(&[Platform::Linux]),
        base("DebugEchoFlow", "DebugEcho")
            .with_output_path("analysis/DebugEcho")
            .with_check(CheckKind::CollectionNonEmpty)
            .local_only(),
    ];
    for entry in entries {
        table.register(entry).expect("builtin test names are unique");
    }
    table
}
