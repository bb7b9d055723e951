// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test case descriptors: rules naming a test case and the contexts and groups it runs in.
//!
//! Descriptor files are JSON arrays. Each element looks like:
//!
//! ```json
//! {
//!     "testcase": "[sig-apps] Deployment",
//!     "exclude": ["aws"],
//!     "groups": ["fast"],
//!     "skip": "Serial",
//!     "focus": "RollingUpdate"
//! }
//! ```

use crate::{
    errors::DescriptorReadError,
    helpers::find_files_matching,
    name_set::TestNameSet,
    selection::SelectionContext,
};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use regex::Regex;
use serde::Deserialize;
use std::{fs, sync::LazyLock};
use tracing::{debug, warn};

/// The group token that matches every group.
pub const WILDCARD_GROUP: &str = "*";

/// A single test case descriptor.
#[derive(Clone, Debug)]
pub struct TestCaseDescriptor {
    name: String,
    excluded_contexts: IndexSet<String>,
    only_contexts: IndexSet<String>,
    retest_contexts: IndexSet<String>,
    groups: IndexSet<String>,
    skip: Option<Regex>,
    focus: Option<Regex>,
}

#[derive(Debug, Deserialize)]
struct DescriptorEntry {
    testcase: String,
    #[serde(default)]
    exclude: IndexSet<String>,
    #[serde(default)]
    only: IndexSet<String>,
    #[serde(default)]
    retest: IndexSet<String>,
    #[serde(default)]
    groups: IndexSet<String>,
    #[serde(default)]
    skip: Option<String>,
    #[serde(default)]
    focus: Option<String>,
}

impl TestCaseDescriptor {
    /// Creates a descriptor for `name` with no restrictions and no groups.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            excluded_contexts: IndexSet::new(),
            only_contexts: IndexSet::new(),
            retest_contexts: IndexSet::new(),
            groups: IndexSet::new(),
            skip: None,
            focus: None,
        }
    }

    /// Adds contexts this test case must not run in.
    pub fn with_excluded(mut self, contexts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.excluded_contexts
            .extend(contexts.into_iter().map(Into::into));
        self
    }

    /// Adds contexts this test case is restricted to.
    pub fn with_only(mut self, contexts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.only_contexts.extend(contexts.into_iter().map(Into::into));
        self
    }

    /// Adds contexts this test case is flagged for retesting in.
    pub fn with_retest(mut self, contexts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.retest_contexts
            .extend(contexts.into_iter().map(Into::into));
        self
    }

    /// Adds groups this test case belongs to.
    pub fn with_groups(mut self, groups: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }

    /// Sets the pattern of test case names to leave out of this descriptor's matches.
    pub fn with_skip(mut self, skip: Regex) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Sets the pattern test case names must match to be part of this descriptor's matches.
    pub fn with_focus(mut self, focus: Regex) -> Self {
        self.focus = Some(focus);
        self
    }

    fn from_entry(path: &Utf8Path, entry: DescriptorEntry) -> Result<Self, DescriptorReadError> {
        let compile = |field: &'static str, pattern: Option<String>| {
            pattern
                .filter(|pattern| !pattern.is_empty())
                .map(|pattern| Regex::new(&pattern))
                .transpose()
                .map_err(|err| DescriptorReadError::InvalidPattern {
                    path: path.to_owned(),
                    testcase: entry.testcase.clone(),
                    field,
                    err,
                })
        };
        let skip = compile("skip", entry.skip)?;
        let focus = compile("focus", entry.focus)?;

        Ok(Self {
            name: entry.testcase,
            excluded_contexts: entry.exclude,
            only_contexts: entry.only,
            retest_contexts: entry.retest,
            groups: entry.groups,
            skip,
            focus,
        })
    }

    /// Returns the test case name, matched as a substring of known test case names.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the groups this test case belongs to.
    pub fn groups(&self) -> impl Iterator<Item = &str> + '_ {
        self.groups.iter().map(String::as_str)
    }

    /// Returns true if both excluded and only contexts are set. Such descriptors are never
    /// selected.
    pub fn has_conflicting_context_filters(&self) -> bool {
        !self.excluded_contexts.is_empty() && !self.only_contexts.is_empty()
    }

    /// Returns true if this test case is explicitly excluded from `context`.
    pub fn is_excluded_from(&self, context: &str) -> bool {
        self.excluded_contexts.contains(context)
    }

    /// Returns true if this descriptor does not restrict contexts, or restricts them to a set
    /// including `context`.
    pub fn is_considered_in(&self, context: &str) -> bool {
        self.only_contexts.is_empty() || self.only_contexts.contains(context)
    }

    /// Returns true if this test case is flagged for retesting in `context`.
    pub fn is_flagged_for_retest_in(&self, context: &str) -> bool {
        self.retest_contexts.contains(context)
    }

    /// Returns true if any active group is the wildcard or one of this test case's groups.
    pub fn matches_any_group<'a>(&self, active_groups: impl IntoIterator<Item = &'a str>) -> bool {
        active_groups
            .into_iter()
            .any(|group| group == WILDCARD_GROUP || self.groups.contains(group))
    }

    /// Returns true if this descriptor applies under `ctx`.
    pub fn is_valid_for(&self, ctx: &SelectionContext) -> bool {
        let context = ctx.active_context();
        if self.is_excluded_from(context) || !self.is_considered_in(context) {
            return false;
        }
        if ctx.retest_only() {
            self.is_flagged_for_retest_in(context)
        } else {
            self.matches_any_group(ctx.active_groups().iter().map(String::as_str))
        }
    }

    /// Returns true if the known test case name `test_name` is covered by this descriptor.
    pub fn matches(&self, test_name: &str) -> bool {
        if !test_name.contains(&self.name) {
            return false;
        }
        if let Some(skip) = &self.skip {
            if skip.is_match(test_name) {
                return false;
            }
        }
        match &self.focus {
            Some(focus) => focus.is_match(test_name),
            None => true,
        }
    }
}

/// The contents of one descriptor file.
#[derive(Clone, Debug)]
pub struct DescriptorList {
    path: Utf8PathBuf,
    descriptors: Vec<TestCaseDescriptor>,
}

impl DescriptorList {
    /// Creates a list from descriptors constructed in memory.
    pub fn new(path: impl Into<Utf8PathBuf>, descriptors: Vec<TestCaseDescriptor>) -> Self {
        Self {
            path: path.into(),
            descriptors,
        }
    }

    /// Reads and parses a descriptor file.
    pub fn from_path(path: impl Into<Utf8PathBuf>) -> Result<Self, DescriptorReadError> {
        let path = path.into();
        let contents = fs::read_to_string(&path).map_err(|err| DescriptorReadError::Read {
            path: path.clone(),
            err,
        })?;
        Self::from_json_str(path, &contents)
    }

    /// Parses descriptor JSON. `path` is used for error reporting.
    pub fn from_json_str(
        path: impl Into<Utf8PathBuf>,
        contents: &str,
    ) -> Result<Self, DescriptorReadError> {
        let path = path.into();
        let entries: Vec<DescriptorEntry> =
            serde_json::from_str(contents).map_err(|err| DescriptorReadError::Parse {
                path: path.clone(),
                err,
            })?;
        let descriptors = entries
            .into_iter()
            .map(|entry| TestCaseDescriptor::from_entry(&path, entry))
            .collect::<Result<Vec<_>, _>>()?;
        debug!("read {} descriptors from {path}", descriptors.len());
        Ok(Self { path, descriptors })
    }

    /// Returns the path this list was read from.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the number of descriptors.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns true if there are no descriptors.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Iterates over the descriptors in file order.
    pub fn iter(&self) -> impl Iterator<Item = &TestCaseDescriptor> + '_ {
        self.descriptors.iter()
    }

    /// Iterates over the descriptors that can be used at all.
    ///
    /// Descriptors with both excluded and only contexts are skipped with a warning.
    pub fn usable(&self) -> impl Iterator<Item = &TestCaseDescriptor> + '_ {
        self.descriptors.iter().filter(|descriptor| {
            if descriptor.has_conflicting_context_filters() {
                warn!(
                    "test case `{}` in {} has both `exclude` and `only` set, skipping it",
                    descriptor.name(),
                    self.path,
                );
                false
            } else {
                true
            }
        })
    }

    /// Returns the names of the usable descriptors that are valid under `ctx`.
    pub fn valid_names(&self, ctx: &SelectionContext) -> TestNameSet {
        self.usable()
            .filter(|descriptor| descriptor.is_valid_for(ctx))
            .map(TestCaseDescriptor::name)
            .collect()
    }

    /// Returns the names of every descriptor, regardless of context or conflicting filters.
    pub fn all_names(&self) -> TestNameSet {
        self.iter().map(TestCaseDescriptor::name).collect()
    }
}

static DESCRIPTOR_FILE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.json$").expect("descriptor file pattern is valid"));

/// Loads descriptor files from a descriptor directory.
#[derive(Clone, Debug)]
pub struct DescriptorStore {
    dir: Utf8PathBuf,
}

impl DescriptorStore {
    /// Creates a store rooted at `dir`.
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the descriptor directory.
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Loads a descriptor file. Relative paths are resolved against the descriptor directory.
    pub fn load(&self, path: &Utf8Path) -> Result<DescriptorList, DescriptorReadError> {
        DescriptorList::from_path(self.dir.join(path))
    }

    /// Loads every `*.json` file in the descriptor directory, sorted by path.
    pub fn load_all(&self) -> Result<Vec<DescriptorList>, DescriptorReadError> {
        find_files_matching(&self.dir, &DESCRIPTOR_FILE_PATTERN)?
            .into_iter()
            .map(DescriptorList::from_path)
            .collect()
    }
}
