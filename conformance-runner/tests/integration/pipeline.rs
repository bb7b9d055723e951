// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::{Result, ensure};
use conformance_metadata::{BulkDocument, TestcaseDocument, TestsuiteSummaryDocument};
use conformance_runner::{
    analyze::{
        MERGED_LOG_FILE, analyze, generate, prepare_export_dir, reset_dir, write_retry_descriptor,
    },
    config::RunConfigOverrides,
    engine::ExternalEngine,
    errors::{GenerateError, SelectionError},
    report::StructuredReport,
    summary::{MERGED_REPORT_FILE, SUMMARY_FILE},
    universe::ALL_TESTCASES_FILE,
};
use pretty_assertions::assert_eq;
use std::{fs, time::Duration};

const T1: &str = "[sig-apps] T1 [Conformance]";
const T2: &str = "[sig-apps] T2 [Conformance]";
const T3: &str = "[sig-node] T3 [Conformance]";

fn two_attempts() -> Vec<Attempt> {
    vec![
        Attempt::new(
            &[(T1, None), (T2, Some("timed out")), (T3, Some("boom"))],
            "10s",
        ),
        Attempt::new(&[(T1, None), (T2, None), (T3, Some("boom again"))], "7s"),
    ]
}

#[test]
fn test_generate_run_analyze() -> Result<()> {
    test_init();
    let workspace = Workspace::new()?;
    let config = workspace.run_config(&RunConfigOverrides::default())?;
    let engine = FakeEngine::new(vec![two_attempts()]);

    prepare_export_dir(&config)?;
    let run_descriptor = generate(&config, &engine)?;
    assert_eq!(
        fs::read_to_string(&run_descriptor)?,
        format!("{T1}\n{T2}\n{T3}\n")
    );
    ensure!(
        config.tmp_dir.join(ALL_TESTCASES_FILE).is_file(),
        "known test cases are dumped with debug logging enabled"
    );

    let results_dir = workspace.path().join("results");
    engine.run(&run_descriptor, &results_dir)?;
    let summary = analyze(&results_dir, &config)?;

    assert_eq!(summary.executed, 3);
    assert_eq!(summary.successful, 1);
    assert_eq!(summary.flaked, 1);
    assert_eq!(summary.failed_testcase_names, [T3]);
    assert_eq!(summary.duration, Duration::from_secs(17));
    ensure!(!summary.is_successful(), "T3 failed in every attempt");

    // The summary document on disk matches.
    let document = TestsuiteSummaryDocument::from_bulk_str(&fs::read_to_string(
        config.export_dir.join(SUMMARY_FILE),
    )?)?;
    assert_eq!(document.executed_testcases, 3);
    assert_eq!(document.successful_testcases, 1);
    assert_eq!(document.flaked_testcases, 1);
    assert_eq!(document.failed_testcases, 1);
    assert_eq!(document.duration, 17);
    assert_eq!(document.test_desc_file, "default.json");
    assert_eq!(document.execution_group, "fast");
    ensure!(document.flaked, "T2 flaked");
    ensure!(!document.successful, "the suite failed");

    // One document per test case, reflecting the last attempt.
    let mut documents = Vec::new();
    for entry in fs::read_dir(&config.export_dir)? {
        let path = entry?.path();
        let is_testcase = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with("test-"));
        if is_testcase {
            documents.push(TestcaseDocument::from_bulk_str(&fs::read_to_string(path)?)?);
        }
    }
    documents.sort_by(|a, b| a.name.cmp(&b.name));
    let statuses: Vec<_> = documents
        .iter()
        .map(|document| {
            (
                document.name.as_str(),
                document.status.as_str(),
                document.sig.as_str(),
            )
        })
        .collect();
    assert_eq!(
        statuses,
        [
            (T1, "success", "[sig-apps]"),
            (T2, "success", "[sig-apps]"),
            (T3, "failure", "[sig-node]"),
        ]
    );

    let merged = StructuredReport::from_path(&config.export_dir.join(MERGED_REPORT_FILE))?;
    assert_eq!(merged.tests, 6);
    assert_eq!(merged.failures, 3);
    assert_eq!(merged.testcases.len(), 3);

    let combined_log = fs::read_to_string(config.export_dir.join(MERGED_LOG_FILE))?;
    assert_eq!(combined_log.matches("Ginkgo ran 1 suite").count(), 2);

    Ok(())
}

#[test]
fn test_retry_failed() -> Result<()> {
    test_init();
    let workspace = Workspace::new()?;
    let config = workspace.run_config(&RunConfigOverrides::default())?;
    let engine = FakeEngine::new(vec![
        two_attempts(),
        vec![Attempt::new(&[(T3, None)], "3s")],
    ]);

    prepare_export_dir(&config)?;
    let run_descriptor = generate(&config, &engine)?;
    let results_dir = workspace.path().join("results");
    engine.run(&run_descriptor, &results_dir)?;
    let summary = analyze(&results_dir, &config)?;
    ensure!(config.retry_failed_testcases, "retries are enabled");

    reset_dir(&config.export_dir)?;
    reset_dir(&results_dir)?;
    let retry_descriptor = write_retry_descriptor(&config, &summary.failed_testcase_names)?;
    engine.run(&retry_descriptor, &results_dir)?;
    let retry_summary = analyze(&results_dir, &config)?;

    assert_eq!(engine.descriptors()[1], [T3]);
    assert_eq!(retry_summary.executed, 1);
    assert_eq!(retry_summary.successful, 1);
    assert_eq!(retry_summary.duration, Duration::from_secs(3));
    ensure!(retry_summary.is_successful(), "T3 passed on retry");
    ensure!(!retry_summary.has_flakes(), "nothing flaked on retry");

    Ok(())
}

#[test]
fn test_lists_and_overrides() -> Result<()> {
    test_init();
    let workspace = Workspace::with_lists(
        r#"[{"testcase": "[sig-apps] T1 [Conformance]"}]"#,
        r#"[{"testcase": "[sig-node] T3 [Conformance]", "groups": ["fast"]}]"#,
    )?;
    let engine = FakeEngine::new(Vec::new());

    let config = workspace.run_config(&RunConfigOverrides::default())?;
    let run_descriptor = generate(&config, &engine)?;
    assert_eq!(fs::read_to_string(&run_descriptor)?, format!("{T2}\n"));

    // Retest mode only keeps conformance test cases flagged for the active context.
    let config = workspace.run_config(&RunConfigOverrides {
        retest_flagged_only: Some(true),
        ..Default::default()
    })?;
    let run_descriptor = generate(&config, &engine)?;
    assert_eq!(fs::read_to_string(&run_descriptor)?, format!("{T2}\n"));

    Ok(())
}

#[test]
fn test_empty_selection() -> Result<()> {
    test_init();
    let workspace = Workspace::new()?;
    let config = workspace.run_config(&RunConfigOverrides {
        groups: vec!["nonexistent".to_owned()],
        ..Default::default()
    })?;
    let engine = FakeEngine::new(Vec::new());

    let err = generate(&config, &engine).expect_err("nothing is selected");
    ensure!(
        matches!(err, GenerateError::Select(SelectionError::EmptySelection)),
        "unexpected error: {err:?}"
    );
    ensure!(
        !config.run_descriptor_path().exists(),
        "no run descriptor is written for an empty selection"
    );
    Ok(())
}
