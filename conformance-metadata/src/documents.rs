// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::BulkDocumentError;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;

/// A document written in bulk-ingestion format.
///
/// A bulk document consists of a single index header line identifying the logical document type,
/// followed by the JSON body of the document on the next line.
pub trait BulkDocument: Serialize + DeserializeOwned {
    /// The index header line for this document type.
    const INDEX_HEADER: &'static str;

    /// Serializes this document, including the index header line.
    fn to_bulk_string(&self) -> serde_json::Result<String> {
        let body = serde_json::to_string(self)?;
        Ok(format!("{}\n{body}", Self::INDEX_HEADER))
    }

    /// Parses a document previously produced by [`to_bulk_string`](Self::to_bulk_string).
    fn from_bulk_str(input: &str) -> Result<Self, BulkDocumentError> {
        let (header, body) = input
            .split_once('\n')
            .ok_or(BulkDocumentError::MissingBody)?;
        if header.trim_end() != Self::INDEX_HEADER {
            return Err(BulkDocumentError::UnexpectedHeader {
                expected: Self::INDEX_HEADER,
                actual: header.to_owned(),
            });
        }
        serde_json::from_str(body).map_err(BulkDocumentError::Json)
    }
}

/// The summary document for a whole test suite run.
///
/// Written once per analysis as `test_summary.json`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct TestsuiteSummaryDocument {
    /// The number of test cases executed.
    pub executed_testcases: usize,

    /// The number of test cases that succeeded.
    pub successful_testcases: usize,

    /// The number of test cases that failed in every attempt.
    pub failed_testcases: usize,

    /// The number of test cases that failed in some, but not all, attempts.
    pub flaked_testcases: usize,

    /// True if at least one test case flaked.
    #[serde(rename = "individual_testcases_flaked")]
    pub flaked: bool,

    /// The duration of the run, in seconds.
    pub duration: u64,

    /// True if no test case failed in every attempt.
    pub successful: bool,

    /// The descriptor file the run was generated from.
    pub test_desc_file: String,

    /// The comma-separated list of test case groups that were active.
    pub execution_group: String,

    /// The names of the test cases that failed in every attempt.
    pub failed_testcase_names: Vec<String>,
}

impl BulkDocument for TestsuiteSummaryDocument {
    const INDEX_HEADER: &'static str = r#"{"index": {"_index": "e2e_testsuite", "_type": "_doc"}}"#;
}

/// The document for an individual test case.
///
/// Written once per retained test case as `test-<nanos>.json`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct TestcaseDocument {
    /// The name of the test case.
    pub name: String,

    /// The status of the test case.
    pub status: TestcaseDocumentStatus,

    /// The failure text, if the test case failed.
    #[serde(
        rename = "failure.text",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub failure_text: Option<String>,

    /// Captured standard output, if any.
    #[serde(rename = "system-out", default, skip_serializing_if = "Option::is_none")]
    pub system_out: Option<String>,

    /// The duration of the test case, in seconds.
    pub duration: u64,

    /// The group tag derived from the leading bracketed part of the name, e.g. `[sig-network]`.
    pub sig: String,

    /// The descriptor file the run was generated from.
    pub test_desc_file: String,

    /// The comma-separated list of test case groups that were active.
    pub execution_group: String,

    /// True if the test case succeeded.
    pub successful: bool,
}

impl BulkDocument for TestcaseDocument {
    const INDEX_HEADER: &'static str = r#"{"index": {"_index": "e2e_testcase", "_type": "_doc"}}"#;
}

/// The status of a test case, as recorded in a [`TestcaseDocument`].
#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TestcaseDocumentStatus {
    /// The test case succeeded.
    Success,

    /// The test case failed.
    Failure,
}

impl TestcaseDocumentStatus {
    /// Returns the string representation of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for TestcaseDocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn summary_field_names() {
        let summary = TestsuiteSummaryDocument {
            executed_testcases: 3,
            successful_testcases: 1,
            failed_testcases: 1,
            flaked_testcases: 1,
            flaked: true,
            duration: 17,
            successful: false,
            test_desc_file: "working.json".to_owned(),
            execution_group: "fast,slow".to_owned(),
            failed_testcase_names: vec!["T3".to_owned()],
        };
        let serialized = summary.to_bulk_string().unwrap();
        let (header, body) = serialized.split_once('\n').unwrap();
        assert_eq!(header, TestsuiteSummaryDocument::INDEX_HEADER);

        let value: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(value["individual_testcases_flaked"], true);
        assert_eq!(value["failed_testcase_names"][0], "T3");
        assert_eq!(value["duration"], 17);

        assert_eq!(
            TestsuiteSummaryDocument::from_bulk_str(&serialized).unwrap(),
            summary
        );
    }

    #[test]
    fn testcase_optional_fields_are_omitted() {
        let doc = TestcaseDocument {
            name: "[sig-apps] works".to_owned(),
            status: TestcaseDocumentStatus::Success,
            failure_text: None,
            system_out: None,
            duration: 4,
            sig: "[sig-apps]".to_owned(),
            test_desc_file: "working.json".to_owned(),
            execution_group: "fast".to_owned(),
            successful: true,
        };
        let serialized = doc.to_bulk_string().unwrap();
        assert!(!serialized.contains("failure.text"), "{serialized}");
        assert!(!serialized.contains("system-out"), "{serialized}");
        assert!(serialized.contains(r#""status":"success""#), "{serialized}");
    }

    #[test_case("" ; "empty input")]
    #[test_case(r#"{"executed_testcases": 1}"# ; "body only")]
    fn missing_body(input: &str) {
        assert!(matches!(
            TestsuiteSummaryDocument::from_bulk_str(input),
            Err(BulkDocumentError::MissingBody)
        ));
    }

    #[test]
    fn wrong_header() {
        let input = format!("{}\n{{}}", TestcaseDocument::INDEX_HEADER);
        assert!(matches!(
            TestsuiteSummaryDocument::from_bulk_str(&input),
            Err(BulkDocumentError::UnexpectedHeader { .. })
        ));
    }
}
