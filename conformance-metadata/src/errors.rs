// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{error, fmt};

/// An error that occurs while reading a [`BulkDocument`](crate::BulkDocument).
#[derive(Debug)]
pub enum BulkDocumentError {
    /// The input did not contain an index header line followed by a body.
    MissingBody,

    /// The index header did not match the one expected for this document type.
    UnexpectedHeader {
        /// The header that was expected.
        expected: &'static str,

        /// The header that was found.
        actual: String,
    },

    /// Error parsing the JSON body.
    Json(serde_json::Error),
}

impl fmt::Display for BulkDocumentError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MissingBody => {
                write!(f, "bulk document is missing a body after the index header")
            }
            Self::UnexpectedHeader { expected, actual } => {
                write!(
                    f,
                    "unexpected index header `{actual}` (expected `{expected}`)"
                )
            }
            Self::Json(_) => {
                write!(f, "parsing bulk document body failed")
            }
        }
    }
}

impl error::Error for BulkDocumentError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::MissingBody | Self::UnexpectedHeader { .. } => None,
            Self::Json(err) => Some(err),
        }
    }
}
