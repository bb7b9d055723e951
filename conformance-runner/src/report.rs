// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured (JUnit-style XML) reports produced by the external engine.
//!
//! A report has a single `<testsuite>` root carrying `tests`, `failures` and `time` attributes,
//! with one `<testcase>` child per test case:
//!
//! ```xml
//! <testsuite tests="2" failures="1" time="12.5">
//!     <testcase name="[sig-apps] works" time="3.2"></testcase>
//!     <testcase name="[sig-node] fails" time="9.3">
//!         <failure>timed out</failure>
//!         <system-out>...</system-out>
//!     </testcase>
//! </testsuite>
//! ```

use crate::{errors::ReportReadError, helpers::sig_group};
use camino::Utf8Path;
use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};
use serde::Deserialize;
use std::{fmt, fs, io};

static TESTSUITE_TAG: &str = "testsuite";
static TESTCASE_TAG: &str = "testcase";
static FAILURE_TAG: &str = "failure";
static SKIPPED_TAG: &str = "skipped";
static SYSTEM_OUT_TAG: &str = "system-out";

/// The outcome of a single test case within one report.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TestCaseStatus {
    /// The test case passed.
    Success,

    /// The test case failed.
    Failure,

    /// The test case was not run.
    Skipped,
}

impl TestCaseStatus {
    /// Returns true if this is [`Self::Skipped`].
    pub fn is_skipped(self) -> bool {
        matches!(self, Self::Skipped)
    }

    /// Returns the string representation of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TestCaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of a single test case within one report.
#[derive(Clone, Debug, PartialEq)]
pub struct TestCaseResult {
    /// The test case name.
    pub name: String,

    /// Whether the test case was skipped.
    pub skipped: bool,

    /// The time taken, in seconds.
    pub time: f64,

    /// The failure text. Present and non-empty if the test case failed.
    pub failure_text: Option<String>,

    /// Captured standard output.
    pub system_out: Option<String>,
}

impl TestCaseResult {
    /// Creates a successful result with no output.
    pub fn new(name: impl Into<String>, time: f64) -> Self {
        Self {
            name: name.into(),
            skipped: false,
            time,
            failure_text: None,
            system_out: None,
        }
    }

    /// Marks this result as skipped.
    pub fn skipped(mut self) -> Self {
        self.skipped = true;
        self
    }

    /// Marks this result as failed with `text`.
    pub fn failed(mut self, text: impl Into<String>) -> Self {
        self.failure_text = Some(text.into());
        self
    }

    /// Sets the captured standard output.
    pub fn with_system_out(mut self, output: impl Into<String>) -> Self {
        self.system_out = Some(output.into());
        self
    }

    /// Returns true if failure text is present and non-empty.
    pub fn is_failure(&self) -> bool {
        self.failure_text.as_deref().is_some_and(|text| !text.is_empty())
    }

    /// Returns the status of this test case. Skipping takes precedence over failure.
    pub fn status(&self) -> TestCaseStatus {
        if self.skipped {
            TestCaseStatus::Skipped
        } else if self.is_failure() {
            TestCaseStatus::Failure
        } else {
            TestCaseStatus::Success
        }
    }

    /// Returns the time taken in whole seconds, truncated.
    pub fn duration_secs(&self) -> u64 {
        if self.time.is_finite() && self.time > 0.0 {
            self.time as u64
        } else {
            0
        }
    }

    /// Returns the group tag derived from the leading bracketed part of the name.
    pub fn group(&self) -> &str {
        sig_group(&self.name)
    }
}

/// A structured report: totals plus one result per test case.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StructuredReport {
    /// The number of test cases reported.
    pub tests: usize,

    /// The number of failed test cases reported.
    pub failures: usize,

    /// The total time taken, in seconds.
    pub time: f64,

    /// The test cases, in file order.
    pub testcases: Vec<TestCaseResult>,
}

impl StructuredReport {
    /// Reads and parses a report file.
    pub fn from_path(path: &Utf8Path) -> Result<Self, ReportReadError> {
        let contents = fs::read_to_string(path).map_err(|err| ReportReadError::Read {
            path: path.to_owned(),
            err,
        })?;
        Self::from_xml_str(path, &contents)
    }

    /// Parses report XML. `path` is used for error reporting.
    pub fn from_xml_str(path: &Utf8Path, contents: &str) -> Result<Self, ReportReadError> {
        let suite: TestsuiteXml =
            quick_xml::de::from_str(contents).map_err(|err| ReportReadError::Parse {
                path: path.to_owned(),
                err,
            })?;
        Ok(suite.into())
    }

    /// Returns the number of successful test cases according to the totals.
    pub fn successful(&self) -> usize {
        self.tests.saturating_sub(self.failures)
    }

    /// Serializes this report as XML.
    pub fn serialize(&self, writer: impl io::Write) -> quick_xml::Result<()> {
        let mut writer = Writer::new_with_indent(writer, b' ', 4);

        let decl = BytesDecl::new("1.0", Some("UTF-8"), None);
        writer.write_event(Event::Decl(decl))?;

        let mut testsuite_tag = BytesStart::new(TESTSUITE_TAG);
        testsuite_tag.extend_attributes([
            ("tests", self.tests.to_string().as_str()),
            ("failures", self.failures.to_string().as_str()),
            ("time", serialize_time(self.time).as_str()),
        ]);
        writer.write_event(Event::Start(testsuite_tag))?;

        for testcase in &self.testcases {
            serialize_testcase(testcase, &mut writer)?;
        }

        writer.write_event(Event::End(BytesEnd::new(TESTSUITE_TAG)))?;

        // Add a trailing newline.
        writer.write_indent()?;
        Ok(())
    }

    /// Serializes this report to a string.
    pub fn to_xml_string(&self) -> quick_xml::Result<String> {
        let mut buf = Vec::new();
        self.serialize(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

fn serialize_testcase(
    testcase: &TestCaseResult,
    writer: &mut Writer<impl io::Write>,
) -> quick_xml::Result<()> {
    let TestCaseResult {
        name,
        skipped,
        time,
        failure_text,
        system_out,
    } = testcase;

    let mut testcase_tag = BytesStart::new(TESTCASE_TAG);
    testcase_tag.extend_attributes([
        ("name", name.as_str()),
        ("time", serialize_time(*time).as_str()),
    ]);
    writer.write_event(Event::Start(testcase_tag))?;

    if *skipped {
        writer.write_event(Event::Empty(BytesStart::new(SKIPPED_TAG)))?;
    }
    if let Some(text) = failure_text {
        serialize_text_element(FAILURE_TAG, text, writer)?;
    }
    if let Some(output) = system_out {
        serialize_text_element(SYSTEM_OUT_TAG, output, writer)?;
    }

    writer.write_event(Event::End(BytesEnd::new(TESTCASE_TAG)))?;
    Ok(())
}

fn serialize_text_element(
    tag: &str,
    text: &str,
    writer: &mut Writer<impl io::Write>,
) -> quick_xml::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn serialize_time(time: f64) -> String {
    format!("{time:.3}")
}

#[derive(Debug, Deserialize)]
struct TestsuiteXml {
    #[serde(rename = "@tests", default)]
    tests: usize,
    #[serde(rename = "@failures", default)]
    failures: usize,
    #[serde(rename = "@time", default)]
    time: f64,
    #[serde(rename = "testcase", default)]
    testcases: Vec<TestcaseXml>,
}

#[derive(Debug, Deserialize)]
struct TestcaseXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@time", default)]
    time: f64,
    #[serde(default)]
    skipped: Option<EmptyXml>,
    #[serde(default)]
    failure: Option<TextXml>,
    #[serde(rename = "system-out", default)]
    system_out: Option<TextXml>,
}

#[derive(Debug, Deserialize)]
struct EmptyXml {}

#[derive(Debug, Deserialize)]
struct TextXml {
    #[serde(rename = "$text", default)]
    text: String,
}

impl From<TestsuiteXml> for StructuredReport {
    fn from(suite: TestsuiteXml) -> Self {
        Self {
            tests: suite.tests,
            failures: suite.failures,
            time: suite.time,
            testcases: suite.testcases.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<TestcaseXml> for TestCaseResult {
    fn from(testcase: TestcaseXml) -> Self {
        Self {
            name: testcase.name,
            skipped: testcase.skipped.is_some(),
            time: testcase.time,
            failure_text: testcase.failure.map(|failure| failure.text),
            system_out: testcase.system_out.map(|output| output.text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    static REPORT: &str = indoc! {r#"
        <?xml version="1.0" encoding="UTF-8"?>
        <testsuite name="Kubernetes e2e suite" tests="3" failures="1" errors="0" time="42.75">
            <testcase name="[sig-apps] Deployment works" classname="Kubernetes e2e suite" time="3.5"></testcase>
            <testcase name="[sig-node] Pods fail" classname="Kubernetes e2e suite" time="9.9">
                <failure type="Failure">expected 1 to equal 2</failure>
                <system-out>pod logs</system-out>
            </testcase>
            <testcase name="[sig-storage] Volumes" classname="Kubernetes e2e suite" time="0">
                <skipped></skipped>
            </testcase>
        </testsuite>
    "#};

    #[test]
    fn parse_report() {
        let report = StructuredReport::from_xml_str(Utf8Path::new("junit_01.xml"), REPORT).unwrap();
        assert_eq!(report.tests, 3);
        assert_eq!(report.failures, 1);
        assert_eq!(report.successful(), 2);
        assert_eq!(report.time, 42.75);

        let statuses: Vec<_> = report
            .testcases
            .iter()
            .map(|testcase| (testcase.name.as_str(), testcase.status()))
            .collect();
        assert_eq!(
            statuses,
            [
                ("[sig-apps] Deployment works", TestCaseStatus::Success),
                ("[sig-node] Pods fail", TestCaseStatus::Failure),
                ("[sig-storage] Volumes", TestCaseStatus::Skipped),
            ]
        );

        let failed = &report.testcases[1];
        assert_eq!(failed.failure_text.as_deref(), Some("expected 1 to equal 2"));
        assert_eq!(failed.system_out.as_deref(), Some("pod logs"));
        assert_eq!(failed.duration_secs(), 9);
        assert_eq!(failed.group(), "[sig-node]");
    }

    #[test]
    fn empty_failure_text_is_success() {
        let testcase = TestCaseResult::new("t", 1.0).failed("");
        assert_eq!(testcase.status(), TestCaseStatus::Success);
        assert!(!testcase.is_failure());
    }

    #[test]
    fn malformed_report_is_an_error() {
        let err = StructuredReport::from_xml_str(
            Utf8Path::new("junit_01.xml"),
            r#"<testsuite tests="many"></testsuite>"#,
        )
        .unwrap_err();
        assert!(matches!(err, ReportReadError::Parse { .. }), "{err:?}");
    }

    #[test]
    fn serialized_report_parses_back() {
        let report = StructuredReport {
            tests: 2,
            failures: 1,
            time: 12.0,
            testcases: vec![
                TestCaseResult::new("[sig-apps] <works> & more", 2.0).with_system_out("out"),
                TestCaseResult::new("[sig-node] fails", 10.0).failed("boom"),
                TestCaseResult::new("[sig-storage] skipped", 0.0).skipped(),
            ],
        };
        let xml = report.to_xml_string().unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#), "{xml}");
        assert!(xml.contains(r#"<testsuite tests="2" failures="1" time="12.000">"#), "{xml}");
        assert!(xml.contains("<skipped/>"), "{xml}");

        let parsed = StructuredReport::from_xml_str(Utf8Path::new("merged.xml"), &xml).unwrap();
        assert_eq!(parsed, report);
    }
}
