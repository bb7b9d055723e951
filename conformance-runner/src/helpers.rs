// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for conformance-runner.

use crate::errors::ArtifactDiscoveryError;
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::sync::LazyLock;
use walkdir::WalkDir;

/// Utilities for pluralizing various words based on count or plurality.
pub mod plural {
    /// Returns "test case" if `count` is 1, otherwise "test cases".
    pub fn testcases_str(count: usize) -> &'static str {
        if count == 1 { "test case" } else { "test cases" }
    }

    /// Returns "file" if `count` is 1, otherwise "files".
    pub fn files_str(count: usize) -> &'static str {
        if count == 1 { "file" } else { "files" }
    }
}

/// Recursively finds files under `dir` whose path matches `pattern`, sorted by path.
///
/// A missing `dir` is an error.
pub(crate) fn find_files_matching(
    dir: &Utf8Path,
    pattern: &Regex,
) -> Result<Vec<Utf8PathBuf>, ArtifactDiscoveryError> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|err| ArtifactDiscoveryError::Walk {
            dir: dir.to_owned(),
            err,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = Utf8PathBuf::from_path_buf(entry.into_path()).map_err(|path| {
            ArtifactDiscoveryError::NonUtf8Path {
                dir: dir.to_owned(),
                path,
            }
        })?;
        if pattern.is_match(path.as_str()) {
            paths.push(path);
        }
    }
    paths.sort_unstable();
    Ok(paths)
}

static SIG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[.*?]").expect("sig pattern is valid"));

/// Returns the leading bracketed group of a test case name, e.g. `[sig-network]`, or an empty
/// string.
pub fn sig_group(name: &str) -> &str {
    SIG_PATTERN.find(name).map_or("", |m| m.as_str())
}
