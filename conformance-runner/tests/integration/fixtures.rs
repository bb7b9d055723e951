// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use camino_tempfile_ext::prelude::*;
use color_eyre::eyre::Result;
use conformance_runner::{
    config::{ConformanceConfig, RunConfig, RunConfigOverrides},
    engine::ExternalEngine,
    errors::EngineError,
};
use indoc::indoc;
use std::{cell::RefCell, fmt::Write, fs, sync::Once};

pub(crate) fn test_init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        color_eyre::install().ok();
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub(crate) static DRY_RUN_REPORT: &str = indoc! {r#"
    <?xml version="1.0" encoding="UTF-8"?>
    <testsuite tests="6" failures="0" time="0">
        <testcase name="[sig-apps] T1 [Conformance]" time="0"></testcase>
        <testcase name="[sig-apps] T2 [Conformance]" time="0"></testcase>
        <testcase name="[sig-node] T3 [Conformance]" time="0"></testcase>
        <testcase name="[sig-node] T4" time="0"></testcase>
        <testcase name="[sig-storage] T5" time="0"></testcase>
        <testcase name="[sig-storage] T6" time="0"><skipped/></testcase>
    </testsuite>
"#};

pub(crate) static DESCRIPTORS: &str = indoc! {r#"
    [
        {"testcase": "T1", "groups": ["fast"]},
        {"testcase": "T2", "groups": ["fast"], "retest": ["aws"]},
        {"testcase": "T3", "groups": ["fast"]},
        {"testcase": "T4", "groups": ["slow"]},
        {"testcase": "T5", "groups": ["fast"], "exclude": ["aws"], "only": ["gcp"]}
    ]
"#};

pub(crate) static CONFIG: &str = indoc! {r#"
    [profile.default]
    context = "aws"
    groups = ["fast"]
    description-file = "default.json"
    flake-attempts = 2
    retry-failed-testcases = true

    [profile.default.engine]
    program = "unused"
"#};

/// A temporary working directory holding descriptors and config.
pub(crate) struct Workspace {
    pub(crate) dir: Utf8TempDir,
}

impl Workspace {
    pub(crate) fn new() -> Result<Self> {
        Self::with_lists("[]", "[]")
    }

    pub(crate) fn with_lists(false_positives: &str, skip: &str) -> Result<Self> {
        let dir = camino_tempfile::tempdir()?;
        dir.child("descriptions/default.json")
            .write_str(DESCRIPTORS)?;
        dir.child("descriptions/false_positives.json")
            .write_str(false_positives)?;
        dir.child("descriptions/skip.json").write_str(skip)?;
        dir.child(".config/conformance.toml").write_str(CONFIG)?;
        Ok(Self { dir })
    }

    pub(crate) fn path(&self) -> &Utf8Path {
        self.dir.path()
    }

    pub(crate) fn run_config(&self, overrides: &RunConfigOverrides) -> Result<RunConfig> {
        let config = ConformanceConfig::from_sources(self.path(), None)?;
        Ok(config.profile("default")?.resolve(overrides)?)
    }
}

/// One attempt's artifacts, written into `attempt-<n>/` of the results directory.
pub(crate) struct Attempt {
    pub(crate) report: String,
    pub(crate) log: String,
}

impl Attempt {
    /// Builds an attempt from `(name, failure)` pairs; `None` means the test case passed.
    pub(crate) fn new(testcases: &[(&str, Option<&str>)], duration: &str) -> Self {
        let failures = testcases
            .iter()
            .filter(|(_, failure)| failure.is_some())
            .count();
        let passed = testcases.len() - failures;

        let mut report = String::new();
        writeln!(
            report,
            r#"<testsuite tests="{}" failures="{failures}" time="1">"#,
            testcases.len()
        )
        .unwrap();
        for (name, failure) in testcases {
            match failure {
                Some(text) => writeln!(
                    report,
                    r#"  <testcase name="{name}" time="1.5"><failure>{text}</failure></testcase>"#
                ),
                None => writeln!(report, r#"  <testcase name="{name}" time="1.5"></testcase>"#),
            }
            .unwrap();
        }
        report.push_str("</testsuite>\n");

        let log = format!(
            "Ran {} of 6 Specs in 1.0 seconds\n\
             FAIL! -- {passed} Passed | {failures} Failed | 0 Pending | 3 Skipped\n\
             Ginkgo ran 1 suite in {duration}\n",
            testcases.len(),
        );
        Self { report, log }
    }
}

/// An engine that writes canned artifacts instead of running anything.
///
/// Each call to `run` consumes the next batch of attempts.
pub(crate) struct FakeEngine {
    runs: RefCell<Vec<Vec<Attempt>>>,
    descriptors: RefCell<Vec<Vec<String>>>,
}

impl FakeEngine {
    pub(crate) fn new(runs: Vec<Vec<Attempt>>) -> Self {
        Self {
            runs: RefCell::new(runs),
            descriptors: RefCell::new(Vec::new()),
        }
    }

    /// Returns the run descriptors passed to each `run` call, one name per element.
    pub(crate) fn descriptors(&self) -> Vec<Vec<String>> {
        self.descriptors.borrow().clone()
    }
}

impl ExternalEngine for FakeEngine {
    fn dry_run(&self, results_dir: &Utf8Path) -> Result<(), EngineError> {
        fs::write(results_dir.join("junit_01.xml"), DRY_RUN_REPORT).map_err(|err| {
            EngineError::CreateResultsDir {
                dir: results_dir.to_owned(),
                err,
            }
        })
    }

    fn run(&self, run_descriptor: &Utf8Path, results_dir: &Utf8Path) -> Result<(), EngineError> {
        let descriptor = fs::read_to_string(run_descriptor).expect("run descriptor is readable");
        self.descriptors
            .borrow_mut()
            .push(descriptor.lines().map(str::to_owned).collect());

        let attempts = self.runs.borrow_mut().remove(0);
        for (index, attempt) in attempts.iter().enumerate() {
            let dir: Utf8PathBuf = results_dir.join(format!("attempt-{}", index + 1));
            fs::create_dir_all(&dir).expect("attempt dir created");
            fs::write(dir.join(format!("junit_{:02}.xml", index + 1)), &attempt.report)
                .expect("report written");
            fs::write(dir.join("e2e.log"), &attempt.log).expect("log written");
        }
        Ok(())
    }
}
