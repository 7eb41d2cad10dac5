//! Serial suite runner: every registered test against every selected target.

use std::time::Instant;

use crate::core::paths::EndpointId;
use crate::engine::ExecutionEngine;
use crate::harness::registry::TestTable;
use crate::harness::testcase::{RunOptions, RunOutcome, TestCase};
use crate::logger::{EventType, LogEntry, RunLogger, Severity};
use crate::store::api::Store;

/// One finished test run.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub test: String,
    pub endpoint: EndpointId,
    pub outcome: RunOutcome,
    pub duration_ms: u64,
}

/// Aggregate view of a suite run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub records: Vec<RunRecord>,
}

impl RunSummary {
    #[must_use]
    pub fn passed(&self) -> usize {
        self.count(|o| matches!(o, RunOutcome::Passed))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, RunOutcome::Failed { .. }))
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, RunOutcome::Skipped { .. }))
    }

    /// Whether no run failed. Skips do not fail a suite.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, predicate: impl Fn(&RunOutcome) -> bool) -> usize {
        self.records
            .iter()
            .filter(|r| predicate(&r.outcome))
            .count()
    }
}

/// Drives the table of tests across the target set, one run at a time.
///
/// Runs are strictly serial: tests mutate shared namespace state during
/// cleanup, so concurrent runs against one endpoint would race each other's
/// delete sets.
pub struct Runner<'a> {
    store: &'a dyn Store,
    engine: &'a dyn ExecutionEngine,
    table: &'a TestTable,
    logger: RunLogger,
}

impl<'a> Runner<'a> {
    #[must_use]
    pub fn new(
        store: &'a dyn Store,
        engine: &'a dyn ExecutionEngine,
        table: &'a TestTable,
        logger: RunLogger,
    ) -> Self {
        Self {
            store,
            engine,
            table,
            logger,
        }
    }

    /// Run every registered test against every target and collect the records.
    pub fn run(&mut self, targets: &[EndpointId], options: &RunOptions) -> RunSummary {
        let mut start_entry = LogEntry::new(EventType::SuiteStart, Severity::Info);
        start_entry.details = Some(format!(
            "{} tests x {} targets",
            self.table.len(),
            targets.len()
        ));
        self.logger.write_entry(&start_entry);

        let mut summary = RunSummary::default();
        for endpoint in targets {
            for config in self.table.iter() {
                let started = Instant::now();
                let mut case = TestCase::new(
                    config,
                    endpoint.clone(),
                    options.clone(),
                    self.store,
                    self.engine,
                );
                let outcome = case.run();
                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

                self.logger.write_entry(&LogEntry::for_outcome(
                    &config.name,
                    endpoint.as_str(),
                    &outcome,
                    duration_ms,
                ));
                summary.records.push(RunRecord {
                    test: config.name.clone(),
                    endpoint: endpoint.clone(),
                    outcome,
                    duration_ms,
                });
            }
        }

        let mut end_entry = LogEntry::new(EventType::SuiteComplete, Severity::Info);
        end_entry.details = Some(format!(
            "passed={} failed={} skipped={}",
            summary.passed(),
            summary.failed(),
            summary.skipped()
        ));
        self.logger.write_entry(&end_entry);
        self.logger.flush();
        summary
    }
}
