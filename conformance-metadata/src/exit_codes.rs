// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `conformance` failures.
///
/// `conformance` runs may fail for a variety of reasons. This structure documents the exit codes
/// that may occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum ConformanceExitCode {}

impl ConformanceExitCode {
    /// No errors occurred and the test suite was successful.
    ///
    /// Test cases may still have flaked in this case.
    pub const OK: i32 = 0;

    /// The selection produced no test cases to run.
    pub const NO_TESTS_SELECTED: i32 = 4;

    /// One or more test cases failed in every attempt.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// The external test engine could not be started, or exited with a non-zero code.
    pub const ENGINE_FAILED: i32 = 101;

    /// Reading test case descriptors produced an error.
    pub const DESCRIPTOR_READ_FAILED: i32 = 102;

    /// Discovering the universe of known test cases through a dry run failed.
    pub const DRY_RUN_FAILED: i32 = 104;

    /// Analyzing the results of a run produced an error.
    pub const ANALYSIS_FAILED: i32 = 105;

    /// Writing output artifacts produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;

    /// A user issue happened while setting up a `conformance` invocation.
    pub const SETUP_ERROR: i32 = 96;
}
