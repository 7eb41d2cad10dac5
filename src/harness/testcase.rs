//! Test-case orchestration: clean → launch → wait → check → clean again.
//!
//! A run walks the state machine
//! `Created → CleanedPre → TaskRunning → TaskComplete → Checked → CleanedPost → Done`,
//! with an absorbing `Error` state reachable from anywhere. `Error` still
//! attempts post-run cleanup best-effort; a cleanup failure there is appended
//! to the report but never masks the original failure. Skip gates (platform
//! filter, local-only flows, minimum agent version) short-circuit straight to
//! `Done` before any state is touched.
//!
//! Result-shape specialization is a closed set of tagged check kinds selected
//! by configuration, not an inheritance hierarchy.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::errors::{FchError, Result};
use crate::core::paths::{EndpointId, NamespacePath};
use crate::engine::{ExecutionEngine, TaskSpec};
use crate::fleet::metadata::EndpointMetadata;
use crate::harness::cleanup::CleanupManager;
use crate::harness::enumerate::TreeEnumerator;
use crate::harness::poller::{ResultPoller, SleepFn};
use crate::store::api::{Artifact, ArtifactKind, Store};

// ──────────────────── platforms ────────────────────

/// Endpoint platform, for per-test applicability filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Windows,
    Darwin,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linux => f.write_str("linux"),
            Self::Windows => f.write_str("windows"),
            Self::Darwin => f.write_str("darwin"),
        }
    }
}

impl FromStr for Platform {
    type Err = FchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "windows" => Ok(Self::Windows),
            "darwin" | "macos" => Ok(Self::Darwin),
            other => Err(FchError::InvalidConfig {
                details: format!("unknown platform: {other}"),
            }),
        }
    }
}

// ──────────────────── check kinds ────────────────────

/// Custom predicate over an opened artifact.
pub type CheckPredicate = Arc<dyn Fn(&Artifact) -> Result<()> + Send + Sync>;

/// Result-shape check applied once the task completes.
#[derive(Clone)]
pub enum CheckKind {
    /// The declared output directory contains `file_to_find` as a leaf.
    Existence,
    /// The output file exists and its first bytes are non-empty.
    ContentNonEmpty,
    /// The output file carries the ELF magic.
    MagicElf,
    /// The output file carries the PE magic.
    MagicPe,
    /// The output file carries one of the Mach-O magics.
    MagicMachO,
    /// The output collection becomes non-empty within the results SLA.
    CollectionNonEmpty,
    /// Caller-supplied predicate over the opened output artifact.
    Custom(CheckPredicate),
}

impl fmt::Debug for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Existence => "Existence",
            Self::ContentNonEmpty => "ContentNonEmpty",
            Self::MagicElf => "MagicElf",
            Self::MagicPe => "MagicPe",
            Self::MagicMachO => "MagicMachO",
            Self::CollectionNonEmpty => "CollectionNonEmpty",
            Self::Custom(_) => "Custom(..)",
        };
        f.write_str(label)
    }
}

// ──────────────────── magic-number checks ────────────────────

/// Mach-O magics: fat binary, 32-bit, 64-bit (covering both endiannesses as
/// stored on disk).
const MACHO_MAGICS: [[u8; 4]; 3] = [
    [0xca, 0xfe, 0xba, 0xbe],
    [0xce, 0xfa, 0xed, 0xfe],
    [0xcf, 0xfa, 0xed, 0xfe],
];

/// Bytes 1–3 must spell "ELF".
pub fn check_elf_magic(artifact: &Artifact) -> Result<()> {
    let data = artifact.read(10);
    if data.len() >= 4 && &data[1..4] == b"ELF" {
        Ok(())
    } else {
        Err(FchError::check(format!(
            "{}: ELF magic not found in {:02x?}",
            artifact.path, data
        )))
    }
}

/// Bytes 0–1 must spell "MZ".
pub fn check_pe_magic(artifact: &Artifact) -> Result<()> {
    let data = artifact.read(10);
    if data.starts_with(b"MZ") {
        Ok(())
    } else {
        Err(FchError::check(format!(
            "{}: PE magic not found in {:02x?}",
            artifact.path, data
        )))
    }
}

/// First 4 bytes must equal one of the Mach-O magic constants.
pub fn check_macho_magic(artifact: &Artifact) -> Result<()> {
    let data = artifact.read(10);
    if data.len() >= 4 && MACHO_MAGICS.iter().any(|m| m == &data[..4]) {
        Ok(())
    } else {
        Err(FchError::check(format!(
            "{}: Mach-O magic not found in {:02x?}",
            artifact.path, data
        )))
    }
}

// ──────────────────── configuration ────────────────────

/// Declarative description of one conformance test.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Stable test name, the table key.
    pub name: String,
    /// Task launched against the endpoint.
    pub task: TaskSpec,
    /// Platforms the test applies to; empty means all.
    pub platforms: Vec<Platform>,
    /// Expected output path relative to the endpoint root; may carry one `*`
    /// segment resolved at check time.
    pub output_path: Option<String>,
    /// Leaf expected under the resolved output directory (Existence checks).
    pub file_to_find: Option<String>,
    /// Result-shape check.
    pub check: CheckKind,
    /// Skip endpoints whose agent is older than this.
    pub min_agent_version: Option<u64>,
    /// Flow only exists on debug/local builds; requires local execution.
    pub local_only: bool,
    /// Result-visibility window for collection checks.
    pub results_sla_seconds: u64,
    /// Blocking wait budget for the task.
    pub timeout: Duration,
}

impl TestConfig {
    /// A test running `task_name` with an existence check and defaults from
    /// the documented windows.
    #[must_use]
    pub fn new(name: impl Into<String>, task_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task: TaskSpec::new(task_name),
            platforms: Vec::new(),
            output_path: None,
            file_to_find: None,
            check: CheckKind::Existence,
            min_agent_version: None,
            local_only: false,
            results_sla_seconds: 10,
            timeout: Duration::from_secs(650),
        }
    }

    /// Replace the launched task wholesale (used when the task needs args).
    #[must_use]
    pub fn with_task(mut self, task: TaskSpec) -> Self {
        self.task = task;
        self
    }

    #[must_use]
    pub fn with_platforms(mut self, platforms: &[Platform]) -> Self {
        self.platforms = platforms.to_vec();
        self
    }

    #[must_use]
    pub fn with_output_path(mut self, path: impl Into<String>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_file_to_find(mut self, file: impl Into<String>) -> Self {
        self.file_to_find = Some(file.into());
        self
    }

    #[must_use]
    pub fn with_check(mut self, check: CheckKind) -> Self {
        self.check = check;
        self
    }

    #[must_use]
    pub fn with_min_agent_version(mut self, version: u64) -> Self {
        self.min_agent_version = Some(version);
        self
    }

    #[must_use]
    pub fn local_only(mut self) -> Self {
        self.local_only = true;
        self
    }

    #[must_use]
    pub fn with_results_sla(mut self, seconds: u64) -> Self {
        self.results_sla_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Per-run options supplied by whoever schedules the tests.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Platform of the target endpoint, if known.
    pub platform: Option<Platform>,
    /// Use the synchronous local-debug execution path.
    pub use_local_execution: bool,
    /// Ask the engine to run the task as the platform's privileged user.
    pub run_as_platform_user: bool,
}

// ──────────────────── state machine ────────────────────

/// Orchestration states of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    CleanedPre,
    TaskRunning,
    TaskComplete,
    Checked,
    CleanedPost,
    Done,
    Error,
}

/// Final result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every check held and cleanup converged.
    Passed,
    /// A check, wait, or cleanup failed.
    Failed {
        /// Human-readable explanation naming what was expected and found.
        reason: String,
    },
    /// The test does not apply to this endpoint/run.
    Skipped {
        /// Why the test was skipped.
        reason: String,
    },
}

impl RunOutcome {
    /// Short label for logs and summaries.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
        }
    }

    /// Whether the run passed.
    #[must_use]
    pub const fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// One conformance test bound to an endpoint and collaborators.
pub struct TestCase<'a> {
    config: &'a TestConfig,
    endpoint: EndpointId,
    options: RunOptions,
    store: &'a dyn Store,
    engine: &'a dyn ExecutionEngine,
    state: RunState,
    cleanup: CleanupManager,
    sleep_fn: Option<SleepFn>,
}

impl<'a> TestCase<'a> {
    /// Bind a test configuration to its target and collaborators.
    #[must_use]
    pub fn new(
        config: &'a TestConfig,
        endpoint: EndpointId,
        options: RunOptions,
        store: &'a dyn Store,
        engine: &'a dyn ExecutionEngine,
    ) -> Self {
        Self {
            config,
            endpoint,
            options,
            store,
            engine,
            state: RunState::Created,
            cleanup: CleanupManager::new(),
            sleep_fn: None,
        }
    }

    /// Replace the poller's sleep function (used by tests).
    #[must_use]
    pub fn with_sleep_fn(mut self, sleep: SleepFn) -> Self {
        self.sleep_fn = Some(sleep);
        self
    }

    /// Current orchestration state.
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Paths currently queued for deletion.
    #[must_use]
    pub fn queued_for_deletion(&self) -> Vec<NamespacePath> {
        self.cleanup.paths().cloned().collect()
    }

    /// Execute the full run and report its outcome.
    pub fn run(&mut self) -> RunOutcome {
        match self.skip_reason() {
            Ok(Some(reason)) => {
                self.state = RunState::Done;
                return RunOutcome::Skipped { reason };
            }
            Ok(None) => {}
            Err(e) => return self.fail(e),
        }

        match self.run_to_completion() {
            Ok(()) => {
                self.state = RunState::Done;
                RunOutcome::Passed
            }
            Err(e) => self.fail(e),
        }
    }

    // ──────────────────── skip gates ────────────────────

    fn skip_reason(&self) -> Result<Option<String>> {
        if !self.config.platforms.is_empty() {
            match self.options.platform {
                Some(platform) if self.config.platforms.contains(&platform) => {}
                Some(platform) => {
                    return Ok(Some(format!(
                        "platform {platform} not supported by {}",
                        self.config.name
                    )));
                }
                None => {
                    return Ok(Some(format!(
                        "{} is platform-restricted and the endpoint platform is unknown",
                        self.config.name
                    )));
                }
            }
        }

        if self.config.local_only && !self.options.use_local_execution {
            return Ok(Some(format!(
                "{} uses a debug-only flow; re-run with local execution enabled",
                self.config.name
            )));
        }

        if let Some(min_version) = self.config.min_agent_version {
            let metadata = EndpointMetadata::fetch(self.store, &self.endpoint)?;
            if metadata.agent_version < min_version {
                return Ok(Some(format!(
                    "agent version {} below required minimum {min_version}",
                    metadata.agent_version
                )));
            }
        }

        Ok(None)
    }

    // ──────────────────── happy path ────────────────────

    fn run_to_completion(&mut self) -> Result<()> {
        self.clean_pre()?;
        self.launch()?;
        self.check()?;
        self.clean_post()
    }

    fn clean_pre(&mut self) -> Result<()> {
        self.seed_declared_output();
        self.cleanup.clean(self.store)?;
        self.state = RunState::CleanedPre;
        Ok(())
    }

    fn launch(&mut self) -> Result<()> {
        self.state = RunState::TaskRunning;
        let mut task = self.config.task.clone();
        if self.options.run_as_platform_user {
            task = task.with_arg("run_as_platform_user", json!(true));
        }
        if self.options.use_local_execution {
            self.engine.start_local(&self.endpoint, &task)?;
        } else {
            self.engine
                .start_and_wait(&self.endpoint, &task, self.config.timeout)?;
        }
        self.state = RunState::TaskComplete;
        Ok(())
    }

    fn check(&mut self) -> Result<()> {
        match &self.config.check {
            CheckKind::Existence => self.check_existence()?,
            CheckKind::CollectionNonEmpty => self.check_collection()?,
            kind => {
                let kind = kind.clone();
                self.check_output_content(&kind)?;
            }
        }
        self.state = RunState::Checked;
        Ok(())
    }

    fn clean_post(&mut self) -> Result<()> {
        self.seed_teardown_fallback();
        self.cleanup.clean(self.store)?;
        self.state = RunState::CleanedPost;
        Ok(())
    }

    // ──────────────────── failure path ────────────────────

    /// Enter `Error`, attempt post-run cleanup best-effort, and compose the
    /// failure report. Cleanup failing here is appended, never substituted.
    fn fail(&mut self, original: FchError) -> RunOutcome {
        self.state = RunState::Error;
        let mut reason = original.to_string();
        self.seed_teardown_fallback();
        if let Err(cleanup_err) = self.cleanup.clean(self.store) {
            reason.push_str(&format!("; post-run cleanup also failed: {cleanup_err}"));
        }
        RunOutcome::Failed { reason }
    }

    // ──────────────────── delete-set seeding ────────────────────

    /// Queue the declared output path before the task runs, so leftovers from
    /// a prior failed run are cleared. Wildcarded declarations are skipped
    /// here; their concrete matches are queued at check time.
    fn seed_declared_output(&mut self) {
        if let Some(output) = &self.config.output_path
            && !output.contains('*')
        {
            self.cleanup
                .record_for_deletion(self.endpoint.root().join(output));
        }
    }

    /// If the check never queued anything (it may not have run at all), queue
    /// the expected artifact so teardown still covers it.
    fn seed_teardown_fallback(&mut self) {
        if !self.cleanup.is_empty() {
            return;
        }
        if let Some(output) = &self.config.output_path
            && !output.contains('*')
        {
            let mut path = self.endpoint.root().join(output);
            if let Some(file) = &self.config.file_to_find {
                path = path.join(file);
            }
            self.cleanup.record_for_deletion(path);
        }
    }

    // ──────────────────── result-shape checks ────────────────────

    fn declared_output(&self) -> Result<NamespacePath> {
        let output = self
            .config
            .output_path
            .as_ref()
            .ok_or_else(|| FchError::Runtime {
                details: format!("{} declares no output path", self.config.name),
            })?;
        Ok(self.endpoint.root().join(output))
    }

    /// Locate the (possibly wildcarded) output directory and require
    /// `file_to_find` below it as a leaf artifact.
    fn check_existence(&mut self) -> Result<()> {
        let declared = self.declared_output()?;
        let file = self
            .config
            .file_to_find
            .clone()
            .ok_or_else(|| FchError::Runtime {
                details: format!("{} declares no file_to_find", self.config.name),
            })?;

        let directory = match declared.split_wildcard()? {
            Some(wildcard) => {
                let found = self.resolve_wildcard_directory(&wildcard, &file)?;
                found.ok_or_else(|| {
                    FchError::check(format!("could not locate a directory matching {declared}"))
                })?
            }
            None => {
                let target = declared.join(&file);
                self.cleanup.record_for_deletion(declared.clone());
                self.cleanup.record_for_deletion(target);
                declared
            }
        };

        let target = directory.join(&file);
        let artifact = self.store.open(&target, None)?;
        if artifact.is_container() {
            return Err(FchError::check(format!(
                "no results were written to {target}; maybe the agent is not \
                 running with sufficient privileges"
            )));
        }
        artifact.expect_kind(ArtifactKind::File)
    }

    fn resolve_wildcard_directory(
        &mut self,
        wildcard: &crate::core::paths::WildcardPattern,
        file: &str,
    ) -> Result<Option<NamespacePath>> {
        let enumerator = TreeEnumerator::new(self.store);
        for candidate in enumerator.enumerate(&wildcard.prefix) {
            if wildcard.matches(&candidate) {
                // Queue before validating, so a failed assertion still
                // leaves the paths covered by cleanup.
                self.cleanup.record_for_deletion(candidate.join(file));
                self.cleanup.record_for_deletion(candidate.clone());
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Open the (possibly wildcarded) output file and apply a content check.
    fn check_output_content(&mut self, kind: &CheckKind) -> Result<()> {
        let declared = self.declared_output()?;

        if let Some(wildcard) = declared.split_wildcard()? {
            let enumerator = TreeEnumerator::new(self.store);
            for candidate in enumerator.enumerate(&wildcard.prefix) {
                if wildcard.matches(&candidate) {
                    self.cleanup.record_for_deletion(candidate.clone());
                    let artifact = self.store.open(&candidate, None)?;
                    return Self::check_content(kind, &artifact);
                }
            }
            return Err(FchError::check(format!(
                "output file {declared} not found; maybe the agent is not \
                 running with sufficient privileges"
            )));
        }

        self.cleanup.record_for_deletion(declared.clone());
        let artifact = self.store.open(&declared, None)?;
        if artifact.is_container() {
            return Err(FchError::check(format!("output file {declared} not found")));
        }
        Self::check_content(kind, &artifact)
    }

    fn check_content(kind: &CheckKind, artifact: &Artifact) -> Result<()> {
        match kind {
            CheckKind::ContentNonEmpty => {
                if artifact.read(10).is_empty() {
                    Err(FchError::check(format!("{} has no content", artifact.path)))
                } else {
                    Ok(())
                }
            }
            CheckKind::MagicElf => check_elf_magic(artifact),
            CheckKind::MagicPe => check_pe_magic(artifact),
            CheckKind::MagicMachO => check_macho_magic(artifact),
            CheckKind::Custom(predicate) => predicate(artifact),
            CheckKind::Existence | CheckKind::CollectionNonEmpty => Err(FchError::Runtime {
                details: format!("{kind:?} is not a content check"),
            }),
        }
    }

    /// Poll the declared collection for results within the SLA window.
    fn check_collection(&mut self) -> Result<()> {
        let declared = self.declared_output()?;
        self.cleanup.record_for_deletion(declared.clone());

        let mut poller = ResultPoller::new(self.store);
        if let Some(sleep) = &self.sleep_fn {
            poller = poller.with_sleep_fn(Arc::clone(sleep));
        }
        poller.wait_non_empty(&declared, self.config.results_sla_seconds)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scripted::ScriptedEngine;
    use crate::store::memory::MemoryStore;
    use chrono::Utc;
    use std::sync::Arc;

    fn path(s: &str) -> NamespacePath {
        NamespacePath::new(s)
    }

    fn put_endpoint(store: &MemoryStore, id: &str, agent_version: u64) -> EndpointId {
        let endpoint = EndpointId::new(id);
        let metadata = EndpointMetadata {
            last_checkin: Utc::now(),
            agent_version,
            config: None,
        };
        store.put_file(&endpoint.root(), metadata.to_json().unwrap());
        endpoint
    }

    fn existence_config() -> TestConfig {
        TestConfig::new("NetstatListing", "Netstat")
            .with_output_path("fs/os/proc")
            .with_file_to_find("netstat")
    }

    #[test]
    fn passing_run_walks_to_done_and_cleans_up() {
        let store = Arc::new(MemoryStore::new());
        let endpoint = put_endpoint(&store, "C.1", 3000);
        let engine = ScriptedEngine::new();
        let effect_store = Arc::clone(&store);
        engine.script("Netstat", move |endpoint, _task| {
            effect_store.put_file(&endpoint.root().join("fs/os/proc/netstat"), b"tcp 0".to_vec());
            Ok(())
        });

        let config = existence_config();
        let mut case = TestCase::new(
            &config,
            endpoint,
            RunOptions::default(),
            store.as_ref(),
            &engine,
        );
        let outcome = case.run();

        assert_eq!(outcome, RunOutcome::Passed);
        assert_eq!(case.state(), RunState::Done);
        // Both the directory and the leaf were recorded and removed.
        assert!(store.open(&path("C.1/fs/os/proc"), None).is_err());
        assert!(store.open(&path("C.1/fs/os/proc/netstat"), None).is_err());
    }

    #[test]
    fn task_timeout_fails_the_run_and_still_cleans() {
        let store = Arc::new(MemoryStore::new());
        let endpoint = put_endpoint(&store, "C.1", 3000);
        let engine = ScriptedEngine::new();
        engine.script_timeout("Netstat");

        let config = existence_config();
        let mut case = TestCase::new(
            &config,
            endpoint,
            RunOptions::default(),
            store.as_ref(),
            &engine,
        );
        let outcome = case.run();

        match outcome {
            RunOutcome::Failed { reason } => assert!(reason.contains("FCH-3003"), "{reason}"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(case.state(), RunState::Error);
    }

    /// Store whose deletes stop converging partway through the run: the
    /// first delete of the wedged path applies, later ones are acknowledged
    /// but a stale replica writes the object back before verification reads.
    struct WedgedStore {
        inner: Arc<MemoryStore>,
        wedged: NamespacePath,
        deletes: std::sync::atomic::AtomicU64,
    }

    impl Store for WedgedStore {
        fn open(&self, path: &NamespacePath, expected: Option<ArtifactKind>) -> Result<Artifact> {
            self.inner.open(path, expected)
        }

        fn multi_open(&self, paths: &[NamespacePath]) -> Vec<Artifact> {
            self.inner.multi_open(paths)
        }

        fn multi_list_children(
            &self,
            paths: &[NamespacePath],
        ) -> Vec<(NamespacePath, Vec<NamespacePath>)> {
            self.inner.multi_list_children(paths)
        }

        fn delete_subject(&self, path: &NamespacePath) -> Result<()> {
            self.inner.delete_subject(path)?;
            if path == &self.wedged
                && self
                    .deletes
                    .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
                    >= 1
            {
                self.inner.put_file(path, b"stale".to_vec());
            }
            Ok(())
        }

        fn remove_from_parent_index(&self, path: &NamespacePath) -> Result<()> {
            self.inner.remove_from_parent_index(path)
        }

        fn flush(&self) -> Result<()> {
            self.inner.flush()
        }
    }

    #[test]
    fn cleanup_failure_after_a_failed_run_is_appended_not_substituted() {
        let inner = Arc::new(MemoryStore::new());
        let endpoint = put_endpoint(&inner, "C.1", 3000);
        let store = WedgedStore {
            inner: Arc::clone(&inner),
            wedged: path("C.1/fs/os/proc"),
            deletes: std::sync::atomic::AtomicU64::new(0),
        };
        let engine = ScriptedEngine::new();
        engine.script_timeout("Netstat");

        let config = existence_config();
        let mut case = TestCase::new(&config, endpoint, RunOptions::default(), &store, &engine);
        match case.run() {
            RunOutcome::Failed { reason } => {
                let timeout_at = reason.find("FCH-3003").unwrap_or_else(|| {
                    panic!("reason must keep the original timeout: {reason}")
                });
                let unclean_at = reason.find("FCH-3002").unwrap_or_else(|| {
                    panic!("reason must report the cleanup failure: {reason}")
                });
                assert!(timeout_at < unclean_at, "original failure must lead: {reason}");
                assert!(reason.contains("post-run cleanup also failed"), "{reason}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(case.state(), RunState::Error);
    }

    #[test]
    fn missing_result_reports_what_was_expected() {
        let store = Arc::new(MemoryStore::new());
        let endpoint = put_endpoint(&store, "C.1", 3000);
        let engine = ScriptedEngine::new(); // Netstat completes but writes nothing.

        let config = existence_config();
        let mut case = TestCase::new(
            &config,
            endpoint,
            RunOptions::default(),
            store.as_ref(),
            &engine,
        );
        let outcome = case.run();

        match outcome {
            RunOutcome::Failed { reason } => {
                assert!(reason.contains("fs/os/proc/netstat"), "{reason}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn container_where_leaf_expected_is_a_descriptive_failure() {
        let store = Arc::new(MemoryStore::new());
        let endpoint = put_endpoint(&store, "C.1", 3000);
        let engine = ScriptedEngine::new();
        let effect_store = Arc::clone(&store);
        engine.script("Netstat", move |endpoint, _task| {
            // The flow created the directory but wrote nothing into the leaf.
            effect_store.put_file(
                &endpoint.root().join("fs/os/proc/netstat/child"),
                b"".to_vec(),
            );
            Ok(())
        });

        let config = existence_config();
        let mut case = TestCase::new(
            &config,
            endpoint,
            RunOptions::default(),
            store.as_ref(),
            &engine,
        );
        match case.run() {
            RunOutcome::Failed { reason } => {
                assert!(reason.contains("no results were written"), "{reason}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn platform_filter_skips_mismatched_endpoints() {
        let store = MemoryStore::new();
        let endpoint = put_endpoint(&store, "C.1", 3000);
        let engine = ScriptedEngine::new();

        let config = existence_config().with_platforms(&[Platform::Windows]);
        let options = RunOptions {
            platform: Some(Platform::Linux),
            ..Default::default()
        };
        let mut case = TestCase::new(&config, endpoint, options, &store, &engine);
        match case.run() {
            RunOutcome::Skipped { reason } => assert!(reason.contains("linux"), "{reason}"),
            other => panic!("expected skip, got {other:?}"),
        }
        assert_eq!(case.state(), RunState::Done);
        assert!(engine.launches().is_empty(), "skip must not launch the task");
    }

    #[test]
    fn version_gate_skips_old_agents() {
        let store = MemoryStore::new();
        let endpoint = put_endpoint(&store, "C.1", 2999);
        let engine = ScriptedEngine::new();

        let config = existence_config().with_min_agent_version(3000);
        let mut case = TestCase::new(&config, endpoint, RunOptions::default(), &store, &engine);
        match case.run() {
            RunOutcome::Skipped { reason } => {
                assert!(reason.contains("2999") && reason.contains("3000"), "{reason}");
            }
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn local_only_flow_requires_local_execution() {
        let store = MemoryStore::new();
        let endpoint = put_endpoint(&store, "C.1", 3000);
        let engine = ScriptedEngine::new();

        let config = existence_config().local_only();
        let mut case = TestCase::new(
            &config,
            endpoint.clone(),
            RunOptions::default(),
            &store,
            &engine,
        );
        assert!(matches!(case.run(), RunOutcome::Skipped { .. }));

        // With local execution the flow launches via the local path.
        let engine = ScriptedEngine::new();
        let options = RunOptions {
            use_local_execution: true,
            ..Default::default()
        };
        let mut case = TestCase::new(&config, endpoint, options, &store, &engine);
        let _ = case.run();
        assert!(engine.launches()[0].local);
    }

    #[test]
    fn run_as_platform_user_is_forwarded_to_the_task() {
        let store = Arc::new(MemoryStore::new());
        let endpoint = put_endpoint(&store, "C.1", 3000);
        let engine = ScriptedEngine::new();
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let seen_writer = Arc::clone(&seen);
        let effect_store = Arc::clone(&store);
        engine.script("Netstat", move |endpoint, task| {
            *seen_writer.lock() = task.args.get("run_as_platform_user").cloned();
            effect_store.put_file(&endpoint.root().join("fs/os/proc/netstat"), b"x".to_vec());
            Ok(())
        });

        let config = existence_config();
        let options = RunOptions {
            run_as_platform_user: true,
            ..Default::default()
        };
        let mut case = TestCase::new(&config, endpoint, options, store.as_ref(), &engine);
        assert!(case.run().is_passed());
        assert_eq!(*seen.lock(), Some(json!(true)));
    }

    #[test]
    fn wildcard_output_is_resolved_and_recorded_before_validation() {
        let store = Arc::new(MemoryStore::new());
        let endpoint = put_endpoint(&store, "C.1", 3000);
        let engine = ScriptedEngine::new();
        let effect_store = Arc::clone(&store);
        engine.script("RawListing", move |endpoint, _task| {
            let root = endpoint.root();
            effect_store.put_file(&root.join("fs/tsk/sda1/proc/cmdline"), b"init".to_vec());
            effect_store.put_file(&root.join("fs/tsk/sda2/etc/hosts"), b"".to_vec());
            Ok(())
        });

        let config = TestConfig::new("RawProcListing", "RawListing")
            .with_output_path("fs/tsk/*/proc")
            .with_file_to_find("cmdline");
        let mut case = TestCase::new(
            &config,
            endpoint,
            RunOptions::default(),
            store.as_ref(),
            &engine,
        );
        assert!(case.run().is_passed());
        assert!(store.open(&path("C.1/fs/tsk/sda1/proc"), None).is_err());
        assert!(store.open(&path("C.1/fs/tsk/sda1/proc/cmdline"), None).is_err());
        // The non-matching sibling is untouched.
        assert!(store.open(&path("C.1/fs/tsk/sda2/etc/hosts"), None).is_ok());
    }

    #[test]
    fn failed_wildcard_assertion_still_queues_cleanup() {
        let store = Arc::new(MemoryStore::new());
        let endpoint = put_endpoint(&store, "C.1", 3000);
        let engine = ScriptedEngine::new();
        let effect_store = Arc::clone(&store);
        engine.script("RawListing", move |endpoint, _task| {
            // Matching directory exists but the expected leaf does not.
            effect_store.put_file(&endpoint.root().join("fs/tsk/sda1/proc/other"), b"".to_vec());
            Ok(())
        });

        let config = TestConfig::new("RawProcListing", "RawListing")
            .with_output_path("fs/tsk/*/proc")
            .with_file_to_find("cmdline");
        let mut case = TestCase::new(
            &config,
            endpoint,
            RunOptions::default(),
            store.as_ref(),
            &engine,
        );
        let outcome = case.run();
        assert!(!outcome.is_passed());
        // Best-effort cleanup in the Error state removed the discovered dir.
        assert!(store.open(&path("C.1/fs/tsk/sda1/proc"), None).is_err());
    }

    #[test]
    fn magic_checks_validate_first_bytes() {
        let elf = Artifact {
            path: path("C.1/bin/agentd"),
            payload: crate::store::api::ArtifactPayload::File {
                data: b"\x7fELF\x02\x01\x01\x00\x00\x00".to_vec(),
            },
        };
        check_elf_magic(&elf).unwrap();
        assert!(check_pe_magic(&elf).is_err());

        let pe = Artifact {
            path: path("C.1/bin/agent.exe"),
            payload: crate::store::api::ArtifactPayload::File {
                data: b"MZ\x90\x00\x03\x00\x00\x00".to_vec(),
            },
        };
        check_pe_magic(&pe).unwrap();
        assert!(check_elf_magic(&pe).is_err());

        for magic in [
            [0xca_u8, 0xfe, 0xba, 0xbe],
            [0xce, 0xfa, 0xed, 0xfe],
            [0xcf, 0xfa, 0xed, 0xfe],
        ] {
            let mut data = magic.to_vec();
            data.extend_from_slice(&[0x00; 6]);
            let macho = Artifact {
                path: path("C.1/bin/agentd"),
                payload: crate::store::api::ArtifactPayload::File { data },
            };
            check_macho_magic(&macho).unwrap();
        }
        assert!(check_macho_magic(&elf).is_err());
    }

    #[test]
    fn short_content_fails_magic_checks_cleanly() {
        let stub = Artifact {
            path: path("C.1/bin/agentd"),
            payload: crate::store::api::ArtifactPayload::File {
                data: b"\x7fE".to_vec(),
            },
        };
        assert!(check_elf_magic(&stub).is_err());
        assert!(check_macho_magic(&stub).is_err());
    }

    #[test]
    fn custom_predicate_sees_the_opened_artifact() {
        let store = Arc::new(MemoryStore::new());
        let endpoint = put_endpoint(&store, "C.1", 3000);
        let engine = ScriptedEngine::new();
        let effect_store = Arc::clone(&store);
        engine.script("ReadHostname", move |endpoint, _task| {
            effect_store.put_file(
                &endpoint.root().join("fs/os/etc/hostname"),
                b"workstation-7".to_vec(),
            );
            Ok(())
        });

        let config = TestConfig::new("HostnameIsSet", "ReadHostname")
            .with_output_path("fs/os/etc/hostname")
            .with_check(CheckKind::Custom(Arc::new(|artifact| {
                if artifact.read(10).starts_with(b"workstation") {
                    Ok(())
                } else {
                    Err(FchError::check("hostname does not match inventory prefix"))
                }
            })));
        let mut case = TestCase::new(
            &config,
            endpoint,
            RunOptions::default(),
            store.as_ref(),
            &engine,
        );
        assert!(case.run().is_passed());
    }

    #[test]
    fn content_check_on_container_fails_with_not_found_message() {
        let store = Arc::new(MemoryStore::new());
        let endpoint = put_endpoint(&store, "C.1", 3000);
        let engine = ScriptedEngine::new();
        let effect_store = Arc::clone(&store);
        engine.script("Sysctl", move |endpoint, _task| {
            // Only a deeper child exists, so the declared path is a container.
            effect_store.put_file(
                &endpoint.root().join("fs/os/proc/sys/kernel"),
                b"".to_vec(),
            );
            Ok(())
        });

        let config = TestConfig::new("SysctlValue", "Sysctl")
            .with_output_path("fs/os/proc/sys")
            .with_check(CheckKind::ContentNonEmpty);
        let mut case = TestCase::new(
            &config,
            endpoint,
            RunOptions::default(),
            store.as_ref(),
            &engine,
        );
        match case.run() {
            RunOutcome::Failed { reason } => assert!(reason.contains("not found"), "{reason}"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn collection_check_uses_the_results_sla() {
        let store = Arc::new(MemoryStore::new());
        let endpoint = put_endpoint(&store, "C.1", 3000);
        let engine = ScriptedEngine::new();
        let effect_store = Arc::clone(&store);
        engine.script("ListProcesses", move |endpoint, _task| {
            // Task completes; results land with replication lag (simulated by
            // the injected sleeper below).
            effect_store.put_collection(&endpoint.root().join("analysis/ListProcesses"), vec![]);
            Ok(())
        });

        let lag_store = Arc::clone(&store);
        let coll = path("C.1/analysis/ListProcesses");
        let ticks = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let tick_counter = Arc::clone(&ticks);
        let sleep: SleepFn = Arc::new(move |_d| {
            let tick = tick_counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            if tick == 4 {
                lag_store.push_collection_entry(&coll, json!({"pid": 1}));
            }
        });

        let config = TestConfig::new("ProcessResults", "ListProcesses")
            .with_output_path("analysis/ListProcesses")
            .with_check(CheckKind::CollectionNonEmpty)
            .with_results_sla(10);
        let mut case = TestCase::new(
            &config,
            endpoint,
            RunOptions::default(),
            store.as_ref(),
            &engine,
        )
        .with_sleep_fn(sleep);

        assert!(case.run().is_passed());
        assert_eq!(ticks.load(std::sync::atomic::Ordering::SeqCst), 4);
    }

    #[test]
    fn teardown_fallback_covers_runs_that_never_checked() {
        let store = Arc::new(MemoryStore::new());
        let endpoint = put_endpoint(&store, "C.1", 3000);
        let engine = ScriptedEngine::new();
        engine.script_timeout("Netstat");

        // Leftover artifact from an earlier run of the same test.
        store.put_file(&path("C.1/fs/os/proc/netstat"), b"stale".to_vec());

        let config = existence_config();
        let mut case = TestCase::new(
            &config,
            endpoint,
            RunOptions::default(),
            store.as_ref(),
            &engine,
        );
        let outcome = case.run();
        assert!(!outcome.is_passed());
        // Pre-clean already removed the declared directory; the timeout then
        // failed the run, and best-effort cleanup kept the namespace clean.
        assert!(store.open(&path("C.1/fs/os/proc"), None).is_err());
    }

    #[test]
    fn platform_parse_accepts_aliases() {
        assert_eq!("macos".parse::<Platform>().unwrap(), Platform::Darwin);
        assert_eq!("Linux".parse::<Platform>().unwrap(), Platform::Linux);
        assert!("beos".parse::<Platform>().is_err());
    }
}
