// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The universe of known test cases, discovered through a dry run of the external engine.

use crate::{
    descriptor::TestCaseDescriptor,
    engine::ExternalEngine,
    errors::DiscoverUniverseError,
    helpers::{find_files_matching, plural},
    name_set::TestNameSet,
    report::StructuredReport,
};
use camino::Utf8Path;
use regex::Regex;
use std::fs;
use tracing::{debug, info, warn};

/// The file the universe is dumped to when debug logging is enabled.
pub const ALL_TESTCASES_FILE: &str = "all_testcases.txt";

/// Every known, non-skipped test case name.
///
/// Built once per run and read-only afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TestCaseUniverse {
    names: TestNameSet,
}

impl TestCaseUniverse {
    /// Creates a universe from the given names.
    pub fn from_names(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a universe from the non-skipped test cases of a structured report.
    pub fn from_report(report: &StructuredReport) -> Self {
        Self {
            names: report
                .testcases
                .iter()
                .filter(|testcase| !testcase.skipped)
                .map(|testcase| testcase.name.as_str())
                .collect(),
        }
    }

    /// Discovers the universe by running `engine` in dry-run mode.
    ///
    /// The dry run writes into a fresh temporary directory within `tmp_dir`, which is removed
    /// afterwards. Exactly one file matching `report_pattern` must be produced.
    pub fn discover(
        engine: &dyn ExternalEngine,
        tmp_dir: &Utf8Path,
        report_pattern: &Regex,
    ) -> Result<Self, DiscoverUniverseError> {
        let temp_err = |err: std::io::Error| DiscoverUniverseError::TempDir {
            tmp_dir: tmp_dir.to_owned(),
            err,
        };
        fs::create_dir_all(tmp_dir).map_err(temp_err)?;
        let results_dir = camino_tempfile::Builder::new()
            .prefix("dry-run-")
            .tempdir_in(tmp_dir)
            .map_err(temp_err)?;

        info!("discovering known test cases");
        engine.dry_run(results_dir.path())?;

        let mut reports = find_files_matching(results_dir.path(), report_pattern)?;
        let report_path = match reports.len() {
            0 => {
                return Err(DiscoverUniverseError::EmptyDryRun {
                    results_dir: results_dir.path().to_owned(),
                });
            }
            1 => reports.swap_remove(0),
            _ => {
                return Err(DiscoverUniverseError::AmbiguousDryRun {
                    results_dir: results_dir.path().to_owned(),
                    reports,
                });
            }
        };

        let report = StructuredReport::from_path(&report_path)?;
        let universe = Self::from_report(&report);
        info!(
            "discovered {} known {}",
            universe.len(),
            plural::testcases_str(universe.len()),
        );

        if tracing::enabled!(tracing::Level::DEBUG) {
            universe.dump(&tmp_dir.join(ALL_TESTCASES_FILE));
        }

        Ok(universe)
    }

    /// Returns the known names.
    pub fn names(&self) -> &TestNameSet {
        &self.names
    }

    /// Returns the number of known test cases.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if no test cases are known.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns true if `name` is a known test case.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Returns the known test cases covered by `descriptor`.
    pub fn matching(&self, descriptor: &TestCaseDescriptor) -> TestNameSet {
        self.names
            .iter()
            .filter(|name| descriptor.matches(name))
            .collect()
    }

    /// Returns the known test cases whose name contains `substring`.
    pub fn matching_name(&self, substring: &str) -> TestNameSet {
        self.names
            .iter()
            .filter(|name| name.contains(substring))
            .collect()
    }

    fn dump(&self, path: &Utf8Path) {
        let result = fs::File::create(path).and_then(|file| self.names.write_lines(file));
        match result {
            Ok(()) => debug!("wrote known test cases to {path}"),
            Err(err) => warn!("failed to write known test cases to {path}: {err}"),
        }
    }
}
