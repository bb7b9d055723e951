// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ordered sets of test case names.

use crate::errors::NameMatcherBuildError;
use aho_corasick::{AhoCorasick, Anchored, Input, StartKind};
use indexmap::IndexSet;
use serde::Deserialize;
use std::{collections::HashSet, fmt, io};

/// An ordered set of test case names.
///
/// Iteration follows insertion order, so artifacts produced from a set are reproducible across
/// runs. Equality is order-independent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TestNameSet {
    names: IndexSet<String>,
}

impl TestNameSet {
    /// Creates a new, empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of names in the set.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns true if the set contains `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Iterates over the names in insertion order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.names.iter().map(String::as_str)
    }

    /// Inserts a name, returning true if it was not already present.
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.names.insert(name.into())
    }

    /// Removes a name, returning true if it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        self.names.shift_remove(name)
    }

    /// Adds every name in `other` to this set.
    pub fn union_with(&mut self, other: &TestNameSet) {
        for name in other.iter() {
            self.insert(name);
        }
    }

    /// Removes every name in `other` from this set.
    pub fn difference_with(&mut self, other: &TestNameSet) {
        self.names.retain(|name| !other.contains(name));
    }

    /// Retains only the names also present in `other`.
    pub fn intersect_with(&mut self, other: &TestNameSet) {
        self.names.retain(|name| other.contains(name));
    }

    /// Removes every name matched by `matcher`, returning the removed names in order.
    pub fn remove_matching(&mut self, matcher: &NameMatcher) -> Vec<String> {
        let mut removed = Vec::new();
        self.names.retain(|name| {
            if matcher.is_match(name) {
                removed.push(name.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Writes the names to `writer`, one per line.
    pub fn write_lines(&self, mut writer: impl io::Write) -> io::Result<()> {
        for name in &self.names {
            writeln!(writer, "{name}")?;
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<S> for TestNameSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<S: Into<String>> Extend<S> for TestNameSet {
    fn extend<T: IntoIterator<Item = S>>(&mut self, iter: T) {
        self.names.extend(iter.into_iter().map(Into::into));
    }
}

impl IntoIterator for TestNameSet {
    type Item = String;
    type IntoIter = indexmap::set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.names.into_iter()
    }
}

impl<'a> IntoIterator for &'a TestNameSet {
    type Item = &'a String;
    type IntoIter = indexmap::set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.names.iter()
    }
}

/// How a pattern is matched against a test case name.
#[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum NameMatch {
    /// The name must equal the pattern.
    #[default]
    Exact,

    /// The name must start with the pattern.
    Prefix,

    /// The name must contain the pattern.
    Substring,
}

impl NameMatch {
    /// Returns the string representation of this match mode, as used in config files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Prefix => "prefix",
            Self::Substring => "substring",
        }
    }
}

impl fmt::Display for NameMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Matches test case names against a set of patterns using one [`NameMatch`] mode.
///
/// Empty patterns never match.
#[derive(Clone, Debug)]
pub struct NameMatcher {
    patterns: Vec<String>,
    imp: NameMatcherImpl,
}

#[derive(Clone, Debug)]
enum NameMatcherImpl {
    Exact(HashSet<String>),
    Automaton {
        matcher: Box<AhoCorasick>,
        anchored: Anchored,
    },
}

impl NameMatcher {
    /// Builds a matcher for `patterns`.
    pub fn new(
        mode: NameMatch,
        patterns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, NameMatcherBuildError> {
        let mut patterns: Vec<String> = patterns
            .into_iter()
            .map(Into::into)
            .filter(|pattern| !pattern.is_empty())
            .collect();
        patterns.sort_unstable();
        patterns.dedup();

        let imp = match mode {
            NameMatch::Exact => NameMatcherImpl::Exact(patterns.iter().cloned().collect()),
            NameMatch::Prefix => NameMatcherImpl::Automaton {
                matcher: Box::new(
                    AhoCorasick::builder()
                        .start_kind(StartKind::Anchored)
                        .build(&patterns)?,
                ),
                anchored: Anchored::Yes,
            },
            NameMatch::Substring => NameMatcherImpl::Automaton {
                matcher: Box::new(AhoCorasick::new(&patterns)?),
                anchored: Anchored::No,
            },
        };

        Ok(Self { patterns, imp })
    }

    /// Returns the patterns, sorted and deduplicated.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Returns true if `name` is matched by any pattern.
    pub fn is_match(&self, name: &str) -> bool {
        match &self.imp {
            NameMatcherImpl::Exact(patterns) => patterns.contains(name),
            NameMatcherImpl::Automaton { matcher, anchored } => {
                matcher.is_match(Input::new(name).anchored(*anchored))
            }
        }
    }
}
