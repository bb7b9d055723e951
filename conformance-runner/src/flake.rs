// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classifying failed test cases as flaky or failed.

use crate::merge::FailureOccurrences;
use std::num::NonZeroUsize;

/// Classifies failures against the number of attempts each test case was expected to get.
///
/// A test case that failed in fewer attempts than the threshold is flaky; one that failed in at
/// least as many is failed.
#[derive(Copy, Clone, Debug)]
pub struct FlakeClassifier {
    attempts_threshold: NonZeroUsize,
}

impl FlakeClassifier {
    /// Creates a new classifier.
    pub fn new(attempts_threshold: NonZeroUsize) -> Self {
        Self { attempts_threshold }
    }

    /// Classifies every test case with at least one failure.
    pub fn classify(&self, occurrences: &FailureOccurrences) -> FlakeClassification {
        let mut classification = FlakeClassification::default();
        for (name, count) in occurrences.iter() {
            if count == 0 {
                continue;
            }
            if count < self.attempts_threshold.get() {
                classification.flaked.push(name.to_owned());
            } else {
                classification.hard_failed.push(name.to_owned());
            }
        }
        classification
    }
}

/// The result of [`FlakeClassifier::classify`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlakeClassification {
    flaked: Vec<String>,
    hard_failed: Vec<String>,
}

impl FlakeClassification {
    /// Returns the flaky test cases.
    pub fn flaked(&self) -> &[String] {
        &self.flaked
    }

    /// Returns the test cases that failed in every expected attempt.
    pub fn hard_failed(&self) -> &[String] {
        &self.hard_failed
    }

    /// Returns true if at least one test case was flaky.
    pub fn has_flakes(&self) -> bool {
        !self.flaked.is_empty()
    }

    /// Returns true if no test case failed in every expected attempt. Flaky test cases do not
    /// make a run unsuccessful.
    pub fn is_successful(&self) -> bool {
        self.hard_failed.is_empty()
    }
}
