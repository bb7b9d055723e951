// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use conformance_metadata::ConformanceExitCode;
use conformance_runner::{errors::*, helpers::plural};
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An error that `conformance` knows how to report, along with its exit code.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine the current directory")]
    GetCurrentDirFailed {
        #[source]
        err: std::io::Error,
    },
    #[error("working directory is not valid UTF-8")]
    WorkdirInvalidUtf8 { path: std::path::PathBuf },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("profile not found")]
    ProfileNotFound {
        #[from]
        err: ProfileNotFound,
    },
    #[error("config resolve error")]
    ResolveConfigError {
        #[from]
        err: ResolveConfigError,
    },
    #[error("failed to prepare directory")]
    PrepareDirError {
        #[from]
        err: PrepareExportDirError,
    },
    #[error("failed to generate run descriptor")]
    GenerateError {
        #[from]
        err: GenerateError,
    },
    #[error("failed to write retry descriptor")]
    WriteRetryDescriptor {
        #[source]
        err: SelectionError,
    },
    #[error("engine failed")]
    EngineFailed {
        #[source]
        err: EngineError,
    },
    #[error("analysis failed")]
    AnalyzeError {
        #[from]
        err: AnalyzeError,
    },
    #[error("failed to write to stdout")]
    WriteStdout {
        #[source]
        err: std::io::Error,
    },
    #[error("failed to serialize summary")]
    SerializeSummary {
        #[source]
        err: serde_json::Error,
    },
}

impl ExpectedError {
    pub(crate) fn engine_failed(err: EngineError) -> Self {
        Self::EngineFailed { err }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::GetCurrentDirFailed { .. }
            | Self::WorkdirInvalidUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::ProfileNotFound { .. }
            | Self::ResolveConfigError { .. }
            | Self::PrepareDirError { .. } => ConformanceExitCode::SETUP_ERROR,
            Self::GenerateError { err } => match err {
                GenerateError::Discover(_) => ConformanceExitCode::DRY_RUN_FAILED,
                GenerateError::Select(err) => selection_exit_code(err),
                _ => ConformanceExitCode::SETUP_ERROR,
            },
            Self::WriteRetryDescriptor { err } => selection_exit_code(err),
            Self::EngineFailed { .. } => ConformanceExitCode::ENGINE_FAILED,
            Self::AnalyzeError { err } => match err {
                AnalyzeError::Write(_) | AnalyzeError::CreateExportDir { .. } => {
                    ConformanceExitCode::WRITE_OUTPUT_ERROR
                }
                _ => ConformanceExitCode::ANALYSIS_FAILED,
            },
            Self::WriteStdout { .. } | Self::SerializeSummary { .. } => {
                ConformanceExitCode::WRITE_OUTPUT_ERROR
            }
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::GetCurrentDirFailed { err } => {
                error!("could not determine the current directory");
                Some(err as &dyn Error)
            }
            Self::WorkdirInvalidUtf8 { path } => {
                error!(
                    "working directory `{}` is not valid UTF-8",
                    path.display().style(styles.bold)
                );
                None
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse conformance config at `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::ProfileNotFound { err } => {
                error!("{}", err);
                err.source()
            }
            Self::ResolveConfigError { err } => {
                error!("{}", err);
                err.source()
            }
            Self::PrepareDirError { err } => {
                error!("{}", err);
                err.source()
            }
            Self::GenerateError { err } => match err {
                GenerateError::Select(SelectionError::EmptySelection) => {
                    error!(
                        "{}: check the descriptor files and the active context and groups",
                        "no test cases were selected".style(styles.bold)
                    );
                    None
                }
                _ => {
                    error!("{}", err);
                    err.source()
                }
            },
            Self::WriteRetryDescriptor { err } => {
                error!("failed to write retry descriptor");
                Some(err as &dyn Error)
            }
            Self::EngineFailed { err } => {
                error!("{}", err);
                err.source()
            }
            Self::AnalyzeError { err } => {
                error!("{}", err);
                err.source()
            }
            Self::WriteStdout { err } => {
                error!("failed to write to stdout");
                Some(err as &dyn Error)
            }
            Self::SerializeSummary { err } => {
                error!("failed to serialize summary");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}

fn selection_exit_code(err: &SelectionError) -> i32 {
    match err {
        SelectionError::EmptySelection => ConformanceExitCode::NO_TESTS_SELECTED,
        SelectionError::Descriptor(_) => ConformanceExitCode::DESCRIPTOR_READ_FAILED,
        SelectionError::WriteRunDescriptor { .. } => ConformanceExitCode::WRITE_OUTPUT_ERROR,
        _ => ConformanceExitCode::SETUP_ERROR,
    }
}

/// Reported when the suite completed but had test cases that failed in every attempt.
#[derive(Debug)]
pub(crate) struct SuiteFailed {
    pub(crate) failed: Vec<String>,
}

impl SuiteFailed {
    pub(crate) fn display_to_stderr(&self, styles: &StderrStyles) {
        error!(
            "test suite {} for {} {}:",
            "failed".style(styles.failed),
            self.failed.len(),
            plural::testcases_str(self.failed.len()),
        );
        for name in &self.failed {
            error!(target: NO_HEADING_TARGET, "    {}", name.style(styles.bold));
        }
    }

    pub(crate) fn process_exit_code(&self) -> i32 {
        ConformanceExitCode::TEST_RUN_FAILED
    }
}
