// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The run summary, and writing it out along with the merged results.

use crate::{
    config::RunConfig,
    errors::{WriteArtifactError, WriteArtifactsError},
    flake::FlakeClassification,
    helpers::{plural, sig_group},
    log_scan::LogStats,
    merge::MergedReport,
    report::TestCaseResult,
};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use conformance_metadata::{
    BulkDocument, TestcaseDocument, TestcaseDocumentStatus, TestsuiteSummaryDocument,
};
use std::{
    fs,
    io::{BufWriter, Write},
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tracing::{debug, info};

/// The file name of the summary document.
pub const SUMMARY_FILE: &str = "test_summary.json";

/// The file name of the merged structured report.
pub const MERGED_REPORT_FILE: &str = "junit_01.xml";

/// Identifies the run a summary was produced for.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunMetadata {
    /// The file name of the primary descriptor file.
    pub test_desc_file: String,

    /// The active groups, joined by `,`.
    pub execution_group: String,
}

impl RunMetadata {
    /// Extracts the run metadata from a resolved config.
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            test_desc_file: config.test_desc_file(),
            execution_group: config.execution_group(),
        }
    }
}

/// The aggregate result of one analysis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// The number of test cases executed.
    pub executed: usize,

    /// The number of test cases that succeeded.
    pub successful: usize,

    /// The number of test cases that failed in every attempt.
    pub failed: usize,

    /// The number of flaky test cases.
    pub flaked: usize,

    /// The total duration of the run.
    pub duration: Duration,

    /// The names of the test cases that failed in every attempt.
    pub failed_testcase_names: Vec<String>,

    /// The run this summary belongs to.
    pub metadata: RunMetadata,

    /// When the run started, computed as `finish_time - duration`.
    pub start_time: DateTime<Utc>,

    /// When the run finished.
    pub finish_time: DateTime<Utc>,
}

impl RunSummary {
    /// Computes the summary from the outputs of the analysis stages.
    ///
    /// If the merged report retained any test case, counts are derived from it. Otherwise the
    /// counts parsed out of the logs are used as is.
    pub fn new(
        metadata: RunMetadata,
        stats: LogStats,
        report: &MergedReport,
        classification: &FlakeClassification,
        finish_time: DateTime<Utc>,
    ) -> Self {
        let flaked = classification.flaked().len();
        let failed_testcase_names = classification.hard_failed().to_vec();
        let failed = failed_testcase_names.len();

        let (executed, successful) = if report.is_empty() {
            (stats.executed, stats.successful)
        } else {
            let executed = report.non_skipped().count();
            (executed, executed.saturating_sub(failed + flaked))
        };

        let start_time = chrono::Duration::from_std(stats.duration)
            .ok()
            .and_then(|duration| finish_time.checked_sub_signed(duration))
            .unwrap_or(finish_time);

        Self {
            executed,
            successful,
            failed,
            flaked,
            duration: stats.duration,
            failed_testcase_names,
            metadata,
            start_time,
            finish_time,
        }
    }

    /// Returns true if no test case failed in every attempt.
    pub fn is_successful(&self) -> bool {
        self.failed_testcase_names.is_empty()
    }

    /// Returns true if at least one test case was flaky.
    pub fn has_flakes(&self) -> bool {
        self.flaked > 0
    }

    /// Converts this summary into its document form.
    pub fn to_document(&self) -> TestsuiteSummaryDocument {
        TestsuiteSummaryDocument {
            executed_testcases: self.executed,
            successful_testcases: self.successful,
            failed_testcases: self.failed,
            flaked_testcases: self.flaked,
            flaked: self.has_flakes(),
            duration: self.duration.as_secs(),
            successful: self.is_successful(),
            test_desc_file: self.metadata.test_desc_file.clone(),
            execution_group: self.metadata.execution_group.clone(),
            failed_testcase_names: self.failed_testcase_names.clone(),
        }
    }
}

/// Builds the document for a single test case.
pub fn testcase_document(testcase: &TestCaseResult, metadata: &RunMetadata) -> TestcaseDocument {
    let failed = testcase.is_failure();
    TestcaseDocument {
        name: testcase.name.clone(),
        status: if failed {
            TestcaseDocumentStatus::Failure
        } else {
            TestcaseDocumentStatus::Success
        },
        failure_text: testcase.failure_text.clone().filter(|_| failed),
        system_out: testcase.system_out.clone(),
        duration: testcase.duration_secs(),
        sig: sig_group(&testcase.name).to_owned(),
        test_desc_file: metadata.test_desc_file.clone(),
        execution_group: metadata.execution_group.clone(),
        successful: !failed,
    }
}

/// Hands out strictly increasing nanosecond timestamps.
#[derive(Debug, Default)]
struct NanoClock {
    last: u128,
}

impl NanoClock {
    fn next(&mut self) -> u128 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_nanos());
        self.last = now.max(self.last + 1);
        self.last
    }
}

/// Writes a [`RunSummary`] and the merged results into the export directory.
///
/// Writing continues past individual failures, which are returned together at the end.
#[derive(Debug)]
pub struct SummaryWriter {
    export_dir: Utf8PathBuf,
    clock: NanoClock,
    errors: Vec<WriteArtifactError>,
}

impl SummaryWriter {
    /// Creates a new writer for `export_dir`, which must already exist.
    pub fn new(export_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
            clock: NanoClock::default(),
            errors: Vec::new(),
        }
    }

    /// Writes every artifact: the summary document, one document per retained non-skipped test
    /// case and the merged structured report.
    pub fn write(
        mut self,
        summary: &RunSummary,
        report: &MergedReport,
    ) -> Result<(), WriteArtifactsError> {
        let mut written = 0;
        for testcase in report.non_skipped() {
            let document = testcase_document(testcase, &summary.metadata);
            let path = self
                .export_dir
                .join(format!("test-{}.json", self.clock.next()));
            if self.write_bulk_document(&path, &document) {
                written += 1;
            }
        }
        debug!(
            "wrote {written} {} documents",
            plural::testcases_str(written)
        );

        let report_path = self.export_dir.join(MERGED_REPORT_FILE);
        self.write_merged_report(&report_path, report);

        let summary_path = self.export_dir.join(SUMMARY_FILE);
        if self.write_bulk_document(&summary_path, &summary.to_document()) {
            info!("summary written to {summary_path}");
        }

        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(WriteArtifactsError::new(self.errors))
        }
    }

    fn write_bulk_document(&mut self, path: &Utf8Path, document: &impl BulkDocument) -> bool {
        let result = document
            .to_bulk_string()
            .map_err(|err| WriteArtifactError::Serialize {
                path: path.to_owned(),
                err,
            })
            .and_then(|contents| {
                fs::write(path, contents).map_err(|err| WriteArtifactError::Io {
                    path: path.to_owned(),
                    err,
                })
            });
        self.record(result)
    }

    fn write_merged_report(&mut self, path: &Utf8Path, report: &MergedReport) -> bool {
        let result = fs::File::create(path)
            .map_err(|err| WriteArtifactError::Io {
                path: path.to_owned(),
                err,
            })
            .and_then(|file| {
                let mut writer = BufWriter::new(file);
                report
                    .to_structured_report()
                    .serialize(&mut writer)
                    .map_err(|err| WriteArtifactError::Xml {
                        path: path.to_owned(),
                        err,
                    })?;
                writer.flush().map_err(|err| WriteArtifactError::Io {
                    path: path.to_owned(),
                    err,
                })
            });
        let ok = self.record(result);
        if ok {
            debug!("merged structured report written to {path}");
        }
        ok
    }

    fn record(&mut self, result: Result<(), WriteArtifactError>) -> bool {
        match result {
            Ok(()) => true,
            Err(err) => {
                self.errors.push(err);
                false
            }
        }
    }
}
