// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Documented exit codes and machine-readable output documents for conformance runs.
//!
//! The summary and per-test-case documents are written in a bulk-ingestion format: an index header
//! line, followed by the JSON body of the document. See [`BulkDocument`] for details.

mod documents;
mod errors;
mod exit_codes;

pub use documents::*;
pub use errors::*;
pub use exit_codes::*;
