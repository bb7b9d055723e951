// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line parsing and command routing.

use crate::{
    ExpectedError, Result,
    errors::SuiteFailed,
    output::{OutputContext, OutputOpts, OutputWriter, StderrStyles, clap_styles},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use conformance_metadata::ConformanceExitCode;
use conformance_runner::{
    analyze::{analyze, generate, prepare_export_dir, reset_dir, write_retry_descriptor},
    config::{ConformanceConfig, RunConfig, RunConfigOverrides},
    engine::{CommandEngine, ExternalEngine},
    errors::EngineError,
    helpers::plural,
    summary::RunSummary,
};
use std::io::Write;
use tracing::{info, warn};

/// Select, run and summarize a conformance test suite.
///
/// Test cases are selected from descriptor files, run through an external engine, and the
/// results of every attempt are merged into a single summary.
#[derive(Debug, Parser)]
#[command(
    name = "conformance",
    version,
    styles = clap_styles::style(),
    max_term_width = 100,
)]
pub struct ConformanceApp {
    /// Run as if started in DIR instead of the current directory.
    #[arg(long, short = 'C', global = true, value_name = "DIR")]
    workdir: Option<Utf8PathBuf>,

    #[clap(flatten)]
    output: OutputOpts,

    #[clap(flatten)]
    config_opts: ConfigOpts,

    #[clap(flatten)]
    overrides: OverrideOpts,

    #[clap(subcommand)]
    command: Command,
}

impl ConformanceApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app.
    ///
    /// Returns the exit code.
    pub fn exec(self, output_writer: &mut OutputWriter) -> Result<i32> {
        let base_dir = match self.workdir {
            Some(workdir) => workdir,
            None => current_dir()?,
        };
        let run_config = self
            .config_opts
            .make_run_config(&base_dir, &self.overrides.to_overrides())?;
        let engine = CommandEngine::new(&run_config.engine);
        let styles = OutputContext::from(self.output).stderr_styles();

        match self.command {
            Command::Generate => {
                let run_descriptor = generate(&run_config, &engine)?;
                let mut stdout = output_writer.stdout_writer();
                writeln!(stdout, "{run_descriptor}")
                    .and_then(|()| stdout.flush())
                    .map_err(|err| ExpectedError::WriteStdout { err })?;
                Ok(ConformanceExitCode::OK)
            }
            Command::Analyze { results_dir } => {
                let results_dir = base_dir.join(results_dir);
                let summary = analyze(&results_dir, &run_config)?;
                finish(&summary, &styles, output_writer)
            }
            Command::Run => {
                let summary = run(&run_config, &engine)?;
                finish(&summary, &styles, output_writer)
            }
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Discover known test cases and write the run descriptor
    ///
    /// Runs the engine in dry-run mode, applies descriptor rules, and writes the selected test
    /// cases one per line. The path of the run descriptor is printed to stdout.
    Generate,

    /// Analyze the results of an existing run
    ///
    /// Merges the logs and structured reports in RESULTS_DIR, writes the summary and merged
    /// results to the export directory, and prints the summary as JSON to stdout.
    Analyze {
        /// The directory the engine wrote its results to
        #[arg(value_name = "RESULTS_DIR")]
        results_dir: Utf8PathBuf,
    },

    /// Generate, run and analyze, retrying failed test cases if configured
    Run,
}

/// Configuration options.
#[derive(Debug, Args)]
#[command(next_help_heading = "Config options")]
struct ConfigOpts {
    /// Config file [default: DIR/.config/conformance.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,

    /// The configuration profile to use
    #[arg(
        long,
        short = 'P',
        env = "CONFORMANCE_PROFILE",
        global = true,
        default_value = ConformanceConfig::DEFAULT_PROFILE,
    )]
    profile: String,
}

impl ConfigOpts {
    fn make_run_config(
        &self,
        base_dir: &Utf8Path,
        overrides: &RunConfigOverrides,
    ) -> Result<RunConfig> {
        let config_file = self
            .config_file
            .as_ref()
            .map(|config_file| base_dir.join(config_file));
        let config = ConformanceConfig::from_sources(base_dir, config_file.as_deref())?;
        let profile = config.profile(&self.profile)?;
        Ok(profile.resolve(overrides)?)
    }
}

/// Options that take precedence over the selected profile.
#[derive(Debug, Default, Args)]
#[command(next_help_heading = "Selection options")]
struct OverrideOpts {
    /// The context (e.g. provider) to select test cases for
    #[arg(long, global = true, value_name = "CONTEXT")]
    context: Option<String>,

    /// Active test case group; may be specified multiple times
    #[arg(long = "group", global = true, value_name = "GROUP")]
    groups: Vec<String>,

    /// Only run conformance test cases flagged for retesting in the active context
    #[arg(long, global = true)]
    retest_flagged_only: bool,

    /// Primary descriptor file, relative to the descriptor directory
    #[arg(long, global = true, value_name = "PATH")]
    description_file: Option<Utf8PathBuf>,

    /// Number of attempts each test case is expected to get
    #[arg(long, global = true, value_name = "N")]
    flake_attempts: Option<usize>,
}

impl OverrideOpts {
    fn to_overrides(&self) -> RunConfigOverrides {
        RunConfigOverrides {
            context: self.context.clone(),
            groups: self.groups.clone(),
            retest_flagged_only: self.retest_flagged_only.then_some(true),
            description_file: self.description_file.clone(),
            flake_attempts: self.flake_attempts,
        }
    }
}

fn current_dir() -> Result<Utf8PathBuf> {
    let dir = std::env::current_dir().map_err(|err| ExpectedError::GetCurrentDirFailed { err })?;
    Utf8PathBuf::from_path_buf(dir).map_err(|path| ExpectedError::WorkdirInvalidUtf8 { path })
}

/// Runs the whole pipeline, including the retry cycle.
fn run(config: &RunConfig, engine: &dyn ExternalEngine) -> Result<RunSummary> {
    prepare_export_dir(config)?;
    let run_descriptor = generate(config, engine)?;

    let results_dir = &config.engine.results_dir;
    reset_dir(results_dir)?;
    run_engine(engine, &run_descriptor, results_dir)?;
    let summary = analyze(results_dir, config)?;

    if !config.retry_failed_testcases || summary.is_successful() {
        return Ok(summary);
    }

    let failed = &summary.failed_testcase_names;
    info!(
        "retrying {} failed {}",
        failed.len(),
        plural::testcases_str(failed.len()),
    );
    reset_dir(&config.export_dir)?;
    reset_dir(results_dir)?;
    let retry_descriptor = write_retry_descriptor(config, failed)
        .map_err(|err| ExpectedError::WriteRetryDescriptor { err })?;
    run_engine(engine, &retry_descriptor, results_dir)?;
    Ok(analyze(results_dir, config)?)
}

/// Runs the engine. A non-zero exit is expected when test cases fail, so it is only a warning:
/// the results are analyzed either way.
fn run_engine(
    engine: &dyn ExternalEngine,
    run_descriptor: &Utf8Path,
    results_dir: &Utf8Path,
) -> Result<()> {
    match engine.run(run_descriptor, results_dir) {
        Ok(()) => Ok(()),
        Err(err @ EngineError::Failed { .. }) => {
            warn!("{err}, analyzing results anyway");
            Ok(())
        }
        Err(err) => Err(ExpectedError::engine_failed(err)),
    }
}

/// Prints the summary and computes the exit code.
fn finish(
    summary: &RunSummary,
    styles: &StderrStyles,
    output_writer: &mut OutputWriter,
) -> Result<i32> {
    let mut stdout = output_writer.stdout_writer();
    serde_json::to_writer_pretty(&mut stdout, &summary.to_document())
        .map_err(|err| ExpectedError::SerializeSummary { err })?;
    writeln!(stdout)
        .and_then(|()| stdout.flush())
        .map_err(|err| ExpectedError::WriteStdout { err })?;

    if summary.has_flakes() {
        warn!(
            "{} {} flaked",
            summary.flaked,
            plural::testcases_str(summary.flaked),
        );
    }

    if summary.is_successful() {
        Ok(ConformanceExitCode::OK)
    } else {
        let failed = SuiteFailed {
            failed: summary.failed_testcase_names.clone(),
        };
        failed.display_to_stderr(styles);
        Ok(failed.process_exit_code())
    }
}
