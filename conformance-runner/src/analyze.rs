// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The end-to-end pipeline: generating a run descriptor, and analyzing the results of a run.
//!
//! Stages run strictly in sequence and every stage receives the same [`RunConfig`].

use crate::{
    config::RunConfig,
    descriptor::DescriptorStore,
    engine::ExternalEngine,
    errors::{AnalyzeError, GenerateError, PrepareExportDirError, SelectionError},
    flake::FlakeClassifier,
    helpers::{find_files_matching, plural},
    log_scan::LogScanner,
    merge::ResultMerger,
    name_set::TestNameSet,
    selection::{SelectionEngine, write_run_descriptor},
    summary::{MERGED_REPORT_FILE, RunMetadata, RunSummary, SUMMARY_FILE, SummaryWriter},
    universe::TestCaseUniverse,
};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use regex::Regex;
use std::{fs, io, sync::LazyLock};
use tracing::{debug, info};

/// The file name of the combined log within the export directory.
pub const MERGED_LOG_FILE: &str = "build-log.txt";

static STALE_ARTIFACT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"(^|[/\\])(test-\d+\.json|{}|{}|{})$",
        regex::escape(SUMMARY_FILE),
        regex::escape(MERGED_REPORT_FILE),
        regex::escape(MERGED_LOG_FILE),
    );
    Regex::new(&pattern).expect("stale artifact pattern is valid")
});

/// Discovers known test cases, selects the ones to run and writes them to the run descriptor.
///
/// Returns the path of the run descriptor.
pub fn generate(
    config: &RunConfig,
    engine: &dyn ExternalEngine,
) -> Result<Utf8PathBuf, GenerateError> {
    info!("generating run descriptor");
    let store = DescriptorStore::new(&config.descriptions_dir);
    let universe =
        TestCaseUniverse::discover(engine, &config.tmp_dir, &config.artifact_patterns.report)?;

    let selected = SelectionEngine::new(&config.selection, config.selection_options, &universe)
        .select_from_store(&store, config)?;

    let path = config.run_descriptor_path();
    write_run_descriptor(&selected, &path)?;
    Ok(path)
}

/// Writes the run descriptor for a retry of `failed` test cases.
///
/// Returns the path of the run descriptor.
pub fn write_retry_descriptor(
    config: &RunConfig,
    failed: &[String],
) -> Result<Utf8PathBuf, SelectionError> {
    let names: TestNameSet = failed.iter().map(String::as_str).collect();
    if names.is_empty() {
        return Err(SelectionError::EmptySelection);
    }
    let path = config.retry_descriptor_path();
    write_run_descriptor(&names, &path)?;
    Ok(path)
}

/// Prepares the export directory for a new run.
///
/// Stale per-test-case documents, the stale summary, stale merged artifacts and the stale run
/// descriptor are removed. The directory is created if it doesn't exist.
pub fn prepare_export_dir(config: &RunConfig) -> Result<(), PrepareExportDirError> {
    let export_dir = &config.export_dir;
    fs::create_dir_all(export_dir).map_err(|err| PrepareExportDirError::Create {
        dir: export_dir.clone(),
        err,
    })?;

    let stale = find_files_matching(export_dir, &STALE_ARTIFACT_PATTERN)?;
    for path in &stale {
        remove_file_if_exists(path)?;
    }
    remove_file_if_exists(&config.run_descriptor_path())?;
    remove_file_if_exists(&config.retry_descriptor_path())?;

    debug!(
        "removed {} stale {} from {export_dir}",
        stale.len(),
        plural::files_str(stale.len()),
    );
    Ok(())
}

/// Removes `dir` along with its contents, then recreates it empty.
pub fn reset_dir(dir: &Utf8Path) -> Result<(), PrepareExportDirError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => debug!("removed {dir}"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(PrepareExportDirError::Remove {
                path: dir.to_owned(),
                err,
            });
        }
    }
    fs::create_dir_all(dir).map_err(|err| PrepareExportDirError::Create {
        dir: dir.to_owned(),
        err,
    })
}

fn remove_file_if_exists(path: &Utf8Path) -> Result<(), PrepareExportDirError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(PrepareExportDirError::Remove {
            path: path.to_owned(),
            err,
        }),
    }
}

/// Analyzes the logs and structured reports in `results_dir`, writing the combined log, the
/// summary, per-test-case documents and the merged structured report into the export directory.
pub fn analyze(results_dir: &Utf8Path, config: &RunConfig) -> Result<RunSummary, AnalyzeError> {
    info!("analyzing results in {results_dir}");
    let export_dir = &config.export_dir;
    fs::create_dir_all(export_dir).map_err(|err| AnalyzeError::CreateExportDir {
        dir: export_dir.clone(),
        err,
    })?;

    let logs = find_files_matching(results_dir, &config.artifact_patterns.log)?;
    debug!("found {} log {}", logs.len(), plural::files_str(logs.len()));
    let stats = LogScanner::scan_files(&logs, &export_dir.join(MERGED_LOG_FILE))?;

    let reports = find_files_matching(results_dir, &config.artifact_patterns.report)?;
    debug!(
        "found {} structured report {}",
        reports.len(),
        plural::files_str(reports.len()),
    );
    let merged = ResultMerger::merge_files(&reports, stats.duration)?;

    let classification =
        FlakeClassifier::new(config.flake_attempts).classify(&merged.failure_occurrences);
    let summary = RunSummary::new(
        RunMetadata::from_config(config),
        stats,
        &merged.report,
        &classification,
        Utc::now(),
    );
    info!(
        "executed {} {} in {}: {} successful, {} failed, {} flaked",
        summary.executed,
        plural::testcases_str(summary.executed),
        humantime::format_duration(summary.duration),
        summary.successful,
        summary.failed,
        summary.flaked,
    );

    SummaryWriter::new(export_dir).write(&summary, &merged.report)?;
    info!("check out result files in {export_dir}");

    Ok(summary)
}
