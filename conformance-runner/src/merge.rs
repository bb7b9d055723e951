// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Merging structured reports from several attempts or shards into one.

use crate::{
    errors::ReportReadError,
    helpers::plural,
    report::{StructuredReport, TestCaseResult},
};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::time::Duration;
use tracing::debug;

/// The deduplicated result of merging structured reports.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergedReport {
    /// The number of test cases reported, summed across reports.
    pub executed: usize,

    /// The number of failed test cases reported, summed across reports.
    pub failed: usize,

    /// The number of successful test cases reported, summed across reports.
    pub successful: usize,

    /// The total duration, as computed from the logs.
    pub duration: Duration,

    cases: IndexMap<String, TestCaseResult>,
}

impl MergedReport {
    /// Returns the retained result for `name`.
    pub fn get(&self, name: &str) -> Option<&TestCaseResult> {
        self.cases.get(name)
    }

    /// Iterates over the retained results in first-seen order.
    pub fn cases(&self) -> impl ExactSizeIterator<Item = &TestCaseResult> + '_ {
        self.cases.values()
    }

    /// Iterates over the retained results that were not skipped.
    pub fn non_skipped(&self) -> impl Iterator<Item = &TestCaseResult> + '_ {
        self.cases().filter(|testcase| !testcase.skipped)
    }

    /// Returns the number of retained results.
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Returns true if no results were retained.
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Converts this into a structured report mirroring the input schema.
    pub fn to_structured_report(&self) -> StructuredReport {
        StructuredReport {
            tests: self.executed,
            failures: self.failed,
            time: self.duration.as_secs_f64(),
            testcases: self.cases.values().cloned().collect(),
        }
    }
}

/// The number of attempts each test case failed in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FailureOccurrences {
    counts: IndexMap<String, usize>,
}

impl FailureOccurrences {
    /// Records one failure of `name`.
    pub fn record(&mut self, name: &str) {
        *self.counts.entry(name.to_owned()).or_default() += 1;
    }

    /// Returns the number of failures recorded for `name`.
    pub fn get(&self, name: &str) -> usize {
        self.counts.get(name).copied().unwrap_or_default()
    }

    /// Iterates over test cases and their failure counts, in first-failure order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.counts.iter().map(|(name, count)| (name.as_str(), *count))
    }

    /// Returns true if no failures were recorded.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, usize)> for FailureOccurrences {
    fn from_iter<T: IntoIterator<Item = (S, usize)>>(iter: T) -> Self {
        Self {
            counts: iter
                .into_iter()
                .map(|(name, count)| (name.into(), count))
                .collect(),
        }
    }
}

/// The output of [`ResultMerger`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergeOutput {
    /// The merged report.
    pub report: MergedReport,

    /// Per-test-case failure counts.
    pub failure_occurrences: FailureOccurrences,
}

/// Merges structured reports, deduplicating test cases by name.
///
/// A skipped result never replaces an existing one. A non-skipped result always replaces the
/// existing one, so the last attempt wins.
#[derive(Debug, Default)]
pub struct ResultMerger {
    output: MergeOutput,
}

impl ResultMerger {
    /// Creates a new merger. `duration` is the total duration as computed from the logs.
    pub fn new(duration: Duration) -> Self {
        Self {
            output: MergeOutput {
                report: MergedReport {
                    duration,
                    ..Default::default()
                },
                failure_occurrences: FailureOccurrences::default(),
            },
        }
    }

    /// Adds one report.
    pub fn add_report(&mut self, report: StructuredReport) {
        let merged = &mut self.output.report;
        merged.executed += report.tests;
        merged.failed += report.failures;
        merged.successful += report.successful();

        for testcase in report.testcases {
            if testcase.skipped {
                merged
                    .cases
                    .entry(testcase.name.clone())
                    .or_insert(testcase);
                continue;
            }
            if testcase.is_failure() {
                self.output.failure_occurrences.record(&testcase.name);
            }
            merged.cases.insert(testcase.name.clone(), testcase);
        }
    }

    /// Reads and adds the report at `path`.
    pub fn add_report_file(&mut self, path: &Utf8Path) -> Result<(), ReportReadError> {
        debug!("merging structured report {path}");
        let report = StructuredReport::from_path(path)?;
        self.add_report(report);
        Ok(())
    }

    /// Finishes merging.
    pub fn finish(self) -> MergeOutput {
        debug!(
            "merged {} {} from structured reports",
            self.output.report.len(),
            plural::testcases_str(self.output.report.len()),
        );
        self.output
    }

    /// Merges the reports at `paths`, in order.
    pub fn merge_files(
        paths: &[Utf8PathBuf],
        duration: Duration,
    ) -> Result<MergeOutput, ReportReadError> {
        let mut merger = Self::new(duration);
        for path in paths {
            merger.add_report_file(path)?;
        }
        Ok(merger.finish())
    }
}
