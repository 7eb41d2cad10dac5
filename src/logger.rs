//! JSONL run log: append-only line-delimited JSON, one line per event.
//!
//! Each line is a self-contained JSON object, assembled in memory and written
//! with a single `write_all` so a tailing consumer never sees a partial line.
//!
//! Degradation chain: primary file path, then stderr with an `[FCH-LOG]`
//! prefix, then silent discard. A harness run must never fail because its
//! log could not be written.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::harness::testcase::RunOutcome;

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Event types emitted over a harness run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SuiteStart,
    SuiteComplete,
    TestPassed,
    TestFailed,
    TestSkipped,
    Error,
}

/// A single JSONL log entry. Only `ts`, `event`, and `severity` are always set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    /// Event type identifier.
    pub event: EventType,
    /// Severity level.
    pub severity: Severity,
    /// Test name (for per-test events).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
    /// Target endpoint identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Wall-clock duration of the run in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Failure or skip reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Freeform details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// New entry stamped with the current UTC time.
    #[must_use]
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event,
            severity,
            test: None,
            endpoint: None,
            duration_ms: None,
            reason: None,
            details: None,
        }
    }

    /// Entry describing one finished test run.
    #[must_use]
    pub fn for_outcome(
        test: &str,
        endpoint: &str,
        outcome: &RunOutcome,
        duration_ms: u64,
    ) -> Self {
        let (event, severity, reason) = match outcome {
            RunOutcome::Passed => (EventType::TestPassed, Severity::Info, None),
            RunOutcome::Failed { reason } => {
                (EventType::TestFailed, Severity::Critical, Some(reason.clone()))
            }
            RunOutcome::Skipped { reason } => {
                (EventType::TestSkipped, Severity::Info, Some(reason.clone()))
            }
        };
        let mut entry = Self::new(event, severity);
        entry.test = Some(test.to_owned());
        entry.endpoint = Some(endpoint.to_owned());
        entry.duration_ms = Some(duration_ms);
        entry.reason = reason;
        entry
    }
}

enum Sink {
    File(BufWriter<File>),
    Stderr,
    Discard,
}

/// Append-only JSONL log writer with stderr fallback.
pub struct RunLogger {
    sink: Sink,
    path: Option<PathBuf>,
}

impl RunLogger {
    /// Logger appending to `path`; falls back to stderr if it cannot open.
    #[must_use]
    pub fn open(path: &Path) -> Self {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Self {
                sink: Sink::File(BufWriter::new(file)),
                path: Some(path.to_path_buf()),
            },
            Err(e) => {
                let _ = writeln!(
                    io::stderr(),
                    "[FCH-LOG] cannot open {}: {e}; logging to stderr",
                    path.display()
                );
                Self {
                    sink: Sink::Stderr,
                    path: None,
                }
            }
        }
    }

    /// Logger writing straight to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            sink: Sink::Stderr,
            path: None,
        }
    }

    /// Logger that discards everything.
    #[must_use]
    pub fn discard() -> Self {
        Self {
            sink: Sink::Discard,
            path: None,
        }
    }

    /// Path of the primary file, if the logger is file-backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write one entry as one line. Infallible by contract: on a file write
    /// error the logger degrades to stderr and keeps going.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(json) => format!("{json}\n"),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[FCH-LOG] serialize error: {e}");
                return;
            }
        };

        match &mut self.sink {
            Sink::File(writer) => {
                if writer.write_all(line.as_bytes()).is_err() {
                    let _ = writeln!(io::stderr(), "[FCH-LOG] write failed; using stderr");
                    let _ = io::stderr().write_all(line.as_bytes());
                    self.sink = Sink::Stderr;
                }
            }
            Sink::Stderr => {
                let _ = write!(io::stderr(), "[FCH-LOG] {line}");
            }
            Sink::Discard => {}
        }
    }

    /// Flush buffered lines.
    pub fn flush(&mut self) {
        if let Sink::File(writer) = &mut self.sink {
            let _ = writer.flush();
        }
    }
}

impl Drop for RunLogger {
    fn drop(&mut self) {
        self.flush();
    }
}
