// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Selecting the test cases to run.
//!
//! Selection starts from an empty set and applies these steps in order:
//!
//! 1. Every primary descriptor valid in the current context adds the known test cases it matches.
//!    Invalid descriptors remove the test cases they match, so a broad rule can be narrowed by a
//!    more specific exclusion later in the file.
//! 2. In retest mode, the set is replaced by the conformance test cases matched by primary
//!    descriptors flagged for retesting in the current context.
//! 3. Every test case named in the false-positive list is removed, whatever its context.
//! 4. Every test case matched by a skip-list entry valid in the current context is removed.
//! 5. Optionally, known test cases that no descriptor in any file covers are added.

use crate::{
    config::RunConfig,
    descriptor::{DescriptorList, DescriptorStore},
    errors::SelectionError,
    helpers::plural,
    name_set::{NameMatch, NameMatcher, TestNameSet},
    universe::TestCaseUniverse,
};
use camino::Utf8Path;
use std::{
    fs,
    io::{self, BufWriter, Write},
};
use tracing::{debug, info, warn};

/// The group every conformance test case is tagged with.
pub const CONFORMANCE_GROUP: &str = "[Conformance]";

/// The context selection rules are evaluated against.
///
/// Supplied once per run and immutable during selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectionContext {
    active_context: String,
    active_groups: Vec<String>,
    retest_only: bool,
}

impl SelectionContext {
    /// Creates a new selection context.
    pub fn new(
        active_context: impl Into<String>,
        active_groups: Vec<String>,
        retest_only: bool,
    ) -> Self {
        Self {
            active_context: active_context.into(),
            active_groups,
            retest_only,
        }
    }

    /// Returns the active context.
    pub fn active_context(&self) -> &str {
        &self.active_context
    }

    /// Returns the active groups, in order.
    pub fn active_groups(&self) -> &[String] {
        &self.active_groups
    }

    /// Returns true if only test cases flagged for retesting are selected.
    pub fn retest_only(&self) -> bool {
        self.retest_only
    }
}

/// Toggles for the individual selection steps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SelectionOptions {
    /// Skip step 3.
    pub ignore_false_positives: bool,

    /// Skip step 4.
    pub ignore_skip_list: bool,

    /// Run step 5.
    pub include_untracked: bool,

    /// How skip-list entries are matched against test case names.
    pub name_match: NameMatch,
}

/// The descriptor lists selection reads from.
#[derive(Clone, Copy, Debug, Default)]
pub struct SelectionInputs<'a> {
    /// The primary run descriptors.
    pub primary: Option<&'a DescriptorList>,

    /// Test cases known to report spurious failures.
    pub false_positives: Option<&'a DescriptorList>,

    /// Test cases that must not run.
    pub skip: Option<&'a DescriptorList>,

    /// Every descriptor file on disk, used to find untracked test cases.
    pub tracked: &'a [DescriptorList],
}

/// Applies descriptor rules against the universe of known test cases.
#[derive(Clone, Debug)]
pub struct SelectionEngine<'a> {
    ctx: &'a SelectionContext,
    options: SelectionOptions,
    universe: &'a TestCaseUniverse,
}

impl<'a> SelectionEngine<'a> {
    /// Creates a new selection engine.
    pub fn new(
        ctx: &'a SelectionContext,
        options: SelectionOptions,
        universe: &'a TestCaseUniverse,
    ) -> Self {
        Self {
            ctx,
            options,
            universe,
        }
    }

    /// Selects test cases from the given descriptor lists.
    ///
    /// Fails with [`SelectionError::EmptySelection`] if nothing is selected.
    pub fn select(&self, inputs: &SelectionInputs<'_>) -> Result<TestNameSet, SelectionError> {
        let mut selected = TestNameSet::new();

        if let Some(primary) = inputs.primary {
            self.apply_primary(primary, &mut selected);
        }
        if self.ctx.retest_only() {
            selected = self.retest_selection(inputs.primary);
        }
        if !self.options.ignore_false_positives {
            if let Some(false_positives) = inputs.false_positives {
                Self::remove_false_positives(false_positives, &mut selected);
            }
        }
        if !self.options.ignore_skip_list {
            if let Some(skip) = inputs.skip {
                self.remove_skipped(skip, &mut selected)?;
            }
        }
        if self.options.include_untracked {
            self.add_untracked(inputs.tracked, &mut selected);
        }

        if selected.is_empty() {
            return Err(SelectionError::EmptySelection);
        }
        Ok(selected)
    }

    /// Loads the descriptor lists named by `config` from `store`, then selects test cases.
    ///
    /// Lists whose step is disabled are not loaded.
    pub fn select_from_store(
        &self,
        store: &DescriptorStore,
        config: &RunConfig,
    ) -> Result<TestNameSet, SelectionError> {
        let primary = config
            .description_file
            .as_deref()
            .map(|path| store.load(path))
            .transpose()?;
        let false_positives = if self.options.ignore_false_positives {
            None
        } else {
            Some(store.load(&config.false_positives_file)?)
        };
        let skip = if self.options.ignore_skip_list {
            None
        } else {
            Some(store.load(&config.skip_file)?)
        };
        let tracked = if self.options.include_untracked {
            store.load_all()?
        } else {
            Vec::new()
        };

        self.select(&SelectionInputs {
            primary: primary.as_ref(),
            false_positives: false_positives.as_ref(),
            skip: skip.as_ref(),
            tracked: &tracked,
        })
    }

    fn apply_primary(&self, primary: &DescriptorList, selected: &mut TestNameSet) {
        for descriptor in primary.usable() {
            let matched = self.universe.matching(descriptor);
            if matched.is_empty() {
                warn!(
                    "test case `{}` from {} matches no known test case, skipping it",
                    descriptor.name(),
                    primary.path(),
                );
                continue;
            }

            if descriptor.is_valid_for(self.ctx) {
                debug!(
                    "`{}` selects {} {}",
                    descriptor.name(),
                    matched.len(),
                    plural::testcases_str(matched.len()),
                );
                selected.union_with(&matched);
            } else {
                debug!(
                    "`{}` is not valid for context `{}`, deselecting {} {}",
                    descriptor.name(),
                    self.ctx.active_context(),
                    matched.len(),
                    plural::testcases_str(matched.len()),
                );
                selected.difference_with(&matched);
            }
        }
    }

    fn retest_selection(&self, primary: Option<&DescriptorList>) -> TestNameSet {
        let mut flagged = TestNameSet::new();
        for descriptor in primary.into_iter().flat_map(DescriptorList::usable) {
            if descriptor.is_valid_for(self.ctx) {
                flagged.union_with(&self.universe.matching(descriptor));
            }
        }

        let mut selected = self.universe.matching_name(CONFORMANCE_GROUP);
        selected.intersect_with(&flagged);
        debug!(
            "retest mode: {} conformance {} flagged for context `{}`",
            selected.len(),
            plural::testcases_str(selected.len()),
            self.ctx.active_context(),
        );
        selected
    }

    fn remove_false_positives(false_positives: &DescriptorList, selected: &mut TestNameSet) {
        for name in false_positives.all_names() {
            if selected.remove(&name) {
                debug!("removed false positive `{name}`");
            }
        }
    }

    fn remove_skipped(
        &self,
        skip: &DescriptorList,
        selected: &mut TestNameSet,
    ) -> Result<(), SelectionError> {
        let matcher = NameMatcher::new(self.options.name_match, skip.valid_names(self.ctx))?;
        for name in selected.remove_matching(&matcher) {
            debug!("removed skipped test case `{name}`");
        }
        Ok(())
    }

    fn add_untracked(&self, tracked: &[DescriptorList], selected: &mut TestNameSet) {
        let mut untracked = self.universe.names().clone();
        for descriptor in tracked.iter().flat_map(DescriptorList::usable) {
            untracked.difference_with(&self.universe.matching(descriptor));
        }
        info!(
            "including {} untracked {}",
            untracked.len(),
            plural::testcases_str(untracked.len()),
        );
        selected.union_with(&untracked);
    }
}

/// Writes `selected` to `path` as a run descriptor: one test case name per line.
pub fn write_run_descriptor(selected: &TestNameSet, path: &Utf8Path) -> Result<(), SelectionError> {
    let map_err = |err: io::Error| SelectionError::WriteRunDescriptor {
        path: path.to_owned(),
        err,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(map_err)?;
    }
    let file = fs::File::create(path).map_err(map_err)?;
    let mut writer = BufWriter::new(file);
    selected.write_lines(&mut writer).map_err(map_err)?;
    writer.flush().map_err(map_err)?;

    info!(
        "wrote {} {} to {path}",
        selected.len(),
        plural::testcases_str(selected.len()),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::TestCaseDescriptor;
    use camino_tempfile::tempdir;
    use pretty_assertions::assert_eq;
    use proptest::{collection::vec, prelude::*};
    use test_case::test_case;
    use test_strategy::proptest;

    fn universe() -> TestCaseUniverse {
        TestCaseUniverse::from_names([
            "[sig-apps] Deployment rolls over [Conformance]",
            "[sig-apps] Deployment scales",
            "[sig-node] Pods start [Conformance]",
            "[sig-node] Pods restart",
            "[sig-storage] Volumes mount",
        ])
    }

    fn ctx(context: &str, groups: &[&str], retest_only: bool) -> SelectionContext {
        SelectionContext::new(
            context,
            groups.iter().map(|group| (*group).to_owned()).collect(),
            retest_only,
        )
    }

    fn list(descriptors: Vec<TestCaseDescriptor>) -> DescriptorList {
        DescriptorList::new("test.json", descriptors)
    }

    fn names(set: &TestNameSet) -> Vec<&str> {
        set.iter().collect()
    }

    #[test]
    fn primary_union_and_narrowing() {
        let universe = universe();
        let ctx = ctx("aws", &["fast"], false);
        let primary = list(vec![
            TestCaseDescriptor::new("[sig-apps]").with_groups(["fast"]),
            TestCaseDescriptor::new("[sig-apps] Deployment scales")
                .with_groups(["fast"])
                .with_excluded(["aws"]),
            TestCaseDescriptor::new("[sig-node] Pods start").with_groups(["fast"]),
            TestCaseDescriptor::new("[sig-storage]").with_groups(["slow"]),
            TestCaseDescriptor::new("does not exist").with_groups(["fast"]),
        ]);

        let engine = SelectionEngine::new(&ctx, SelectionOptions::default(), &universe);
        let selected = engine
            .select(&SelectionInputs {
                primary: Some(&primary),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            names(&selected),
            [
                "[sig-apps] Deployment rolls over [Conformance]",
                "[sig-node] Pods start [Conformance]",
            ]
        );
    }

    #[test]
    fn retest_mode_keeps_flagged_conformance_tests() {
        let universe = universe();
        let ctx = ctx("aws", &["fast"], true);
        let primary = list(vec![
            TestCaseDescriptor::new("[sig-apps] Deployment").with_retest(["aws"]),
            TestCaseDescriptor::new("[sig-node] Pods").with_retest(["gcp"]),
        ]);

        let engine = SelectionEngine::new(&ctx, SelectionOptions::default(), &universe);
        let selected = engine
            .select(&SelectionInputs {
                primary: Some(&primary),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            names(&selected),
            ["[sig-apps] Deployment rolls over [Conformance]"]
        );
    }

    #[test]
    fn retest_mode_ignores_later_unflagged_descriptors() {
        let universe = universe();
        let ctx = ctx("aws", &["fast"], true);
        let primary = list(vec![
            TestCaseDescriptor::new("[sig-apps] Deployment rolls over").with_retest(["aws"]),
            // Broader and not flagged: invalid in retest mode, but must not deselect the
            // flagged test case above.
            TestCaseDescriptor::new("[sig-apps]").with_groups(["fast"]),
        ]);

        let engine = SelectionEngine::new(&ctx, SelectionOptions::default(), &universe);
        let selected = engine
            .select(&SelectionInputs {
                primary: Some(&primary),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            names(&selected),
            ["[sig-apps] Deployment rolls over [Conformance]"]
        );
    }

    #[test_case(false, &["[sig-node] Pods start [Conformance]"] ; "false positives removed")]
    #[test_case(true, &[
        "[sig-apps] Deployment rolls over [Conformance]",
        "[sig-node] Pods start [Conformance]",
    ] ; "false positives ignored")]
    fn false_positives(ignore: bool, expected: &[&str]) {
        let universe = universe();
        let ctx = ctx("aws", &["*"], false);
        let primary = list(vec![TestCaseDescriptor::new("[Conformance]")]);
        // Neither context validity nor conflicting filters matter for false positives.
        let false_positives = list(vec![
            TestCaseDescriptor::new("[sig-apps] Deployment rolls over [Conformance]")
                .with_only(["gcp"])
                .with_excluded(["azure"]),
        ]);

        let options = SelectionOptions {
            ignore_false_positives: ignore,
            ..Default::default()
        };
        let engine = SelectionEngine::new(&ctx, options, &universe);
        let selected = engine
            .select(&SelectionInputs {
                primary: Some(&primary),
                false_positives: Some(&false_positives),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(names(&selected), expected);
    }

    #[test_case(NameMatch::Exact, &[
        "[sig-apps] Deployment rolls over [Conformance]",
        "[sig-apps] Deployment scales",
    ] ; "exact")]
    #[test_case(NameMatch::Prefix, &["[sig-apps] Deployment scales"] ; "prefix")]
    #[test_case(NameMatch::Substring, &["[sig-apps] Deployment scales"] ; "substring")]
    fn skip_list_match_modes(name_match: NameMatch, expected: &[&str]) {
        let universe = universe();
        let ctx = ctx("aws", &["fast"], false);
        let primary = list(vec![TestCaseDescriptor::new("[sig-apps]").with_groups(["fast"])]);
        let skip = list(vec![
            TestCaseDescriptor::new("[sig-apps] Deployment rolls").with_groups(["fast"]),
            // Not valid for this context, so it is not applied.
            TestCaseDescriptor::new("[sig-apps] Deployment scales")
                .with_groups(["fast"])
                .with_excluded(["aws"]),
        ]);

        let options = SelectionOptions {
            name_match,
            ..Default::default()
        };
        let engine = SelectionEngine::new(&ctx, options, &universe);
        let selected = engine
            .select(&SelectionInputs {
                primary: Some(&primary),
                skip: Some(&skip),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(names(&selected), expected);
    }

    #[test]
    fn untracked_test_cases_are_added() {
        let universe = universe();
        let ctx = ctx("aws", &["fast"], false);
        let primary = list(vec![TestCaseDescriptor::new("[sig-apps] Deployment scales")
            .with_groups(["fast"])]);
        let tracked = [
            list(vec![TestCaseDescriptor::new("[sig-apps] Deployment scales")]),
            list(vec![TestCaseDescriptor::new("[sig-node] Pods restart")]),
        ];

        let options = SelectionOptions {
            include_untracked: true,
            ..Default::default()
        };
        let engine = SelectionEngine::new(&ctx, options, &universe);
        let selected = engine
            .select(&SelectionInputs {
                primary: Some(&primary),
                tracked: &tracked,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            names(&selected),
            [
                "[sig-apps] Deployment scales",
                "[sig-apps] Deployment rolls over [Conformance]",
                "[sig-node] Pods start [Conformance]",
                "[sig-storage] Volumes mount",
            ]
        );
    }

    #[test]
    fn tracked_test_cases_are_not_added_back() {
        let universe = universe();
        let ctx = ctx("aws", &["fast"], false);
        let primary = list(vec![
            TestCaseDescriptor::new("Deployment rolls over").with_groups(["fast"]),
            TestCaseDescriptor::new("Pods restart").with_groups(["slow"]),
        ]);
        let tracked = [primary.clone()];

        let options = SelectionOptions {
            include_untracked: true,
            ..Default::default()
        };
        let engine = SelectionEngine::new(&ctx, options, &universe);
        let selected = engine
            .select(&SelectionInputs {
                primary: Some(&primary),
                tracked: &tracked,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            names(&selected),
            [
                "[sig-apps] Deployment rolls over [Conformance]",
                "[sig-apps] Deployment scales",
                "[sig-node] Pods start [Conformance]",
                "[sig-storage] Volumes mount",
            ]
        );
    }

    #[test]
    fn conflicting_descriptor_is_never_selected() {
        let universe = universe();
        let ctx = ctx("aws", &["fast"], false);
        let primary = list(vec![
            TestCaseDescriptor::new("[sig-storage]")
                .with_groups(["fast"])
                .with_excluded(["gcp"])
                .with_only(["aws"]),
            TestCaseDescriptor::new("[sig-node] Pods restart").with_groups(["fast"]),
        ]);

        let engine = SelectionEngine::new(&ctx, SelectionOptions::default(), &universe);
        let selected = engine
            .select(&SelectionInputs {
                primary: Some(&primary),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(names(&selected), ["[sig-node] Pods restart"]);
    }

    #[test]
    fn empty_selection_is_an_error() {
        let universe = universe();
        let ctx = ctx("aws", &["fast"], false);
        let primary = list(vec![TestCaseDescriptor::new("[sig-apps]").with_groups(["slow"])]);

        let engine = SelectionEngine::new(&ctx, SelectionOptions::default(), &universe);
        let err = engine
            .select(&SelectionInputs {
                primary: Some(&primary),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, SelectionError::EmptySelection), "{err:?}");
    }

    #[test]
    fn write_run_descriptor_one_per_line() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("tmp/generated_tests_to_run.txt");
        let selected: TestNameSet = ["b", "a"].into_iter().collect();
        write_run_descriptor(&selected, &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "b\na\n");
    }

    fn descriptor_strategy() -> impl Strategy<Value = TestCaseDescriptor> {
        (
            "[a-e]{1,2}",
            prop::option::of(prop_oneof![Just("aws"), Just("gcp")]),
            prop::option::of(prop_oneof![Just("aws"), Just("gcp")]),
            prop_oneof![Just("fast"), Just("slow")],
        )
            .prop_map(|(name, exclude, only, group)| {
                TestCaseDescriptor::new(name)
                    .with_excluded(exclude)
                    .with_only(only)
                    .with_groups([group])
            })
    }

    #[proptest(cases = 64)]
    fn selection_is_idempotent_and_honors_skip_list(
        #[strategy(vec("[a-e]{1,3}", 1..12))] universe_names: Vec<String>,
        #[strategy(vec(descriptor_strategy(), 0..8))] primary: Vec<TestCaseDescriptor>,
        #[strategy(vec(descriptor_strategy(), 0..4))] skip: Vec<TestCaseDescriptor>,
    ) {
        let universe = TestCaseUniverse::from_names(universe_names);
        let ctx = ctx("aws", &["fast"], false);
        let primary = list(primary);
        let skip = list(skip);
        let engine = SelectionEngine::new(&ctx, SelectionOptions::default(), &universe);
        let inputs = SelectionInputs {
            primary: Some(&primary),
            skip: Some(&skip),
            ..Default::default()
        };

        let first = engine.select(&inputs);
        let second = engine.select(&inputs);
        match (first, second) {
            (Ok(first), Ok(second)) => {
                prop_assert_eq!(&first, &second);
                let skipped = skip.valid_names(&ctx);
                for name in first.iter() {
                    prop_assert!(!skipped.contains(name));
                    prop_assert!(universe.contains(name));
                }
            }
            (Err(SelectionError::EmptySelection), Err(SelectionError::EmptySelection)) => {}
            (first, second) => prop_assert!(false, "mismatched results: {first:?} vs {second:?}"),
        }
    }
}
