// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Test case selection and results aggregation for conformance suites.
//!
//! A run flows through these stages, in order:
//!
//! 1. [`descriptor`]: descriptor files are loaded from the descriptor directory.
//! 2. [`universe`]: the known test cases are discovered through a dry run of the
//!    [external engine](engine::ExternalEngine).
//! 3. [`selection`]: descriptor rules are applied against the known test cases, and the result is
//!    written out as a run descriptor.
//! 4. The external engine runs the selected test cases.
//! 5. [`log_scan`] and [`merge`]: logs and structured reports from every attempt are aggregated.
//! 6. [`flake`]: failures are classified as flaky or failed.
//! 7. [`summary`]: the summary and merged results are written to the export directory.
//!
//! [`analyze`] ties these stages together. Every stage takes the same
//! [`RunConfig`](config::RunConfig).

pub mod analyze;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod errors;
pub mod flake;
pub mod helpers;
pub mod log_scan;
pub mod merge;
pub mod name_set;
pub mod report;
pub mod selection;
pub mod summary;
pub mod universe;
