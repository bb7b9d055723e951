// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the conformance runner.

use camino::Utf8PathBuf;
use config::ConfigError;
use itertools::Itertools;
use std::{error::Error as StdError, fmt, io, path::PathBuf};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse conformance config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
///
/// Returned by [`ConfigParseError::kind`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// An error which indicates that a profile was requested but not known.
#[derive(Clone, Debug, Error)]
#[error("profile `{profile}` not found (known profiles: {})", .all_profiles.join(", "))]
pub struct ProfileNotFound {
    profile: String,
    all_profiles: Vec<String>,
}

impl ProfileNotFound {
    pub(crate) fn new(
        profile: impl Into<String>,
        all_profiles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut all_profiles: Vec<_> = all_profiles.into_iter().map(|s| s.into()).collect();
        all_profiles.sort_unstable();
        Self {
            profile: profile.into(),
            all_profiles,
        }
    }
}

/// An error that occurs while resolving a profile into a
/// [`RunConfig`](crate::config::RunConfig).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResolveConfigError {
    /// The number of flake attempts was zero.
    #[error("`flake-attempts` for profile `{profile}` must be at least 1")]
    InvalidFlakeAttempts {
        /// The profile that was being resolved.
        profile: String,
    },

    /// An artifact pattern was not a valid regular expression.
    #[error("invalid regex for `{key}` in profile `{profile}`")]
    InvalidPattern {
        /// The profile that was being resolved.
        profile: String,

        /// The config key holding the pattern.
        key: &'static str,

        /// The underlying error.
        #[source]
        err: regex::Error,
    },
}

/// An error that occurs while reading a test case descriptor file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DescriptorReadError {
    /// The descriptor file could not be read.
    #[error("failed to read descriptor file `{path}`")]
    Read {
        /// The descriptor file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// The descriptor file is not a valid JSON list of descriptors.
    #[error("failed to parse descriptor file `{path}`")]
    Parse {
        /// The descriptor file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: serde_json::Error,
    },

    /// A `skip` or `focus` pattern is not a valid regular expression.
    #[error("invalid `{field}` pattern for test case `{testcase}` in `{path}`")]
    InvalidPattern {
        /// The descriptor file.
        path: Utf8PathBuf,

        /// The test case the pattern belongs to.
        testcase: String,

        /// The field the pattern was read from.
        field: &'static str,

        /// The underlying error.
        #[source]
        err: regex::Error,
    },

    /// The descriptor directory could not be listed.
    #[error("failed to list descriptor files")]
    List(#[from] ArtifactDiscoveryError),
}

/// An error that occurs while searching a directory for artifacts.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ArtifactDiscoveryError {
    /// An error occurred while walking the directory.
    #[error("failed to walk directory `{dir}`")]
    Walk {
        /// The directory being searched.
        dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: walkdir::Error,
    },

    /// A path within the directory is not valid UTF-8.
    #[error("path `{}` within `{dir}` is not valid UTF-8", .path.display())]
    NonUtf8Path {
        /// The directory being searched.
        dir: Utf8PathBuf,

        /// The offending path.
        path: PathBuf,
    },
}

/// An error that occurs while invoking the external test engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The results directory could not be created.
    #[error("failed to create results directory `{dir}`")]
    CreateResultsDir {
        /// The results directory.
        dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// The engine process could not be started.
    #[error("failed to execute `{command}`")]
    Exec {
        /// The command that was run.
        command: String,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// The engine process exited with a non-zero code.
    #[error("`{command}` failed with {}", DisplayExitCode(*.exit_code))]
    Failed {
        /// The command that was run.
        command: String,

        /// The exit code, if the process was not terminated by a signal.
        exit_code: Option<i32>,
    },
}

struct DisplayExitCode(Option<i32>);

impl fmt::Display for DisplayExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "no exit code (terminated by signal)"),
        }
    }
}

/// An error that occurs while building a
/// [`NameMatcher`](crate::name_set::NameMatcher).
#[derive(Debug, Error)]
#[error("failed to build test case name matcher")]
pub struct NameMatcherBuildError {
    #[from]
    err: aho_corasick::BuildError,
}

/// An error that occurs while reading a structured report file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportReadError {
    /// The report file could not be read.
    #[error("failed to read structured report `{path}`")]
    Read {
        /// The report file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// The report file is not a valid structured report.
    #[error("failed to parse structured report `{path}`")]
    Parse {
        /// The report file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: quick_xml::DeError,
    },
}

/// An error that occurs while discovering the universe of known test cases.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoverUniverseError {
    /// A temporary directory for the dry run could not be created.
    #[error("failed to create dry run directory within `{tmp_dir}`")]
    TempDir {
        /// The directory the temporary directory was to be created in.
        tmp_dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// The dry run failed.
    #[error("dry run of the test engine failed")]
    Engine(#[from] EngineError),

    /// The dry run's results directory could not be searched.
    #[error("failed to search dry run results")]
    Discovery(#[from] ArtifactDiscoveryError),

    /// More than one structured report was produced.
    #[error(
        "found multiple structured reports after dry run in `{results_dir}`, expected only one: {}",
        .reports.iter().join(", ")
    )]
    AmbiguousDryRun {
        /// The dry run's results directory.
        results_dir: Utf8PathBuf,

        /// The reports that were found.
        reports: Vec<Utf8PathBuf>,
    },

    /// No structured report was produced.
    #[error("no structured report was created during dry run in `{results_dir}`")]
    EmptyDryRun {
        /// The dry run's results directory.
        results_dir: Utf8PathBuf,
    },

    /// The structured report could not be read.
    #[error("failed to read dry run report")]
    ReadReport(#[from] ReportReadError),
}

/// An error that occurs while selecting test cases to run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SelectionError {
    /// A descriptor file could not be loaded.
    #[error("failed to load test case descriptors")]
    Descriptor(#[from] DescriptorReadError),

    /// The matcher for skip-list entries could not be built.
    #[error("failed to build skip list matcher")]
    NameMatcher(#[from] NameMatcherBuildError),

    /// No test cases remained after applying all selection rules.
    #[error("no test cases found to run")]
    EmptySelection,

    /// The run descriptor could not be written.
    #[error("failed to write run descriptor to `{path}`")]
    WriteRunDescriptor {
        /// The run descriptor path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },
}

/// An error that occurs while scanning log fragments.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LogScanError {
    /// A log fragment could not be read.
    #[error("failed to read log fragment `{path}`")]
    Read {
        /// The log fragment.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// The combined log could not be written.
    #[error("failed to write combined log `{path}`")]
    WriteCombined {
        /// The combined log path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// A captured count was not an integer.
    #[error("non-integer value `{value}` captured as `{capture}` by the `{pattern}` pattern")]
    InvalidCount {
        /// The pattern that matched.
        pattern: &'static str,

        /// The name of the capture group.
        capture: &'static str,

        /// The captured value.
        value: String,

        /// The underlying error.
        #[source]
        err: std::num::ParseIntError,
    },

    /// A captured duration could not be parsed.
    #[error("invalid duration `{value}` captured by the `{pattern}` pattern")]
    InvalidDuration {
        /// The pattern that matched.
        pattern: &'static str,

        /// The captured value.
        value: String,

        /// The underlying error.
        #[source]
        err: DurationParseError,
    },

    /// None of the recognized patterns produced any information.
    #[error("unable to interpret log output, got only zero values. Log output:\n{contents}")]
    NoInformation {
        /// The raw contents of every log fragment that was scanned.
        contents: String,
    },
}

/// An error that occurs while parsing a duration such as `1h2m3.5s`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid duration `{input}`: {reason}")]
pub struct DurationParseError {
    input: String,
    reason: &'static str,
}

impl DurationParseError {
    pub(crate) fn new(input: impl Into<String>, reason: &'static str) -> Self {
        Self {
            input: input.into(),
            reason,
        }
    }
}

/// An error that occurs while writing a single output artifact.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteArtifactError {
    /// A document could not be serialized.
    #[error("failed to serialize `{path}`")]
    Serialize {
        /// The artifact path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: serde_json::Error,
    },

    /// The structured report could not be serialized.
    #[error("failed to serialize structured report `{path}`")]
    Xml {
        /// The artifact path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: quick_xml::Error,
    },

    /// The artifact could not be written.
    #[error("failed to write `{path}`")]
    Io {
        /// The artifact path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },
}

/// One or more output artifacts could not be written.
///
/// Writing continues past individual failures; every failure is collected here.
#[derive(Debug)]
pub struct WriteArtifactsError {
    errors: Vec<WriteArtifactError>,
}

impl WriteArtifactsError {
    pub(crate) fn new(errors: Vec<WriteArtifactError>) -> Self {
        Self { errors }
    }

    /// Returns the individual errors.
    pub fn errors(&self) -> &[WriteArtifactError] {
        &self.errors
    }
}

impl fmt::Display for WriteArtifactsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to write {} output artifact(s)", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  - {}", DisplayErrorChain::new(error))?;
        }
        Ok(())
    }
}

impl StdError for WriteArtifactsError {}

/// An error that occurs while generating a run descriptor.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GenerateError {
    /// Known test cases could not be discovered.
    #[error("failed to discover known test cases")]
    Discover(#[from] DiscoverUniverseError),

    /// Test cases could not be selected.
    #[error("failed to select test cases")]
    Select(#[from] SelectionError),
}

/// An error that occurs while preparing the export or results directory for a run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PrepareExportDirError {
    /// The directory could not be created.
    #[error("failed to create directory `{dir}`")]
    Create {
        /// The directory.
        dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// A stale artifact or directory could not be removed.
    #[error("failed to remove stale `{path}`")]
    Remove {
        /// The stale artifact or directory.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// The export directory could not be searched.
    #[error("failed to search export directory")]
    Discovery(#[from] ArtifactDiscoveryError),
}

/// An error that occurs while analyzing the results of a run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AnalyzeError {
    /// The export directory could not be created.
    #[error("failed to create export directory `{dir}`")]
    CreateExportDir {
        /// The export directory.
        dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// The results directory could not be searched.
    #[error("failed to search results directory")]
    Discovery(#[from] ArtifactDiscoveryError),

    /// Log analysis failed.
    #[error("results analysis failed at log analysis")]
    LogScan(#[from] LogScanError),

    /// Structured report analysis failed.
    #[error("results analysis failed at structured report analysis")]
    Merge(#[from] ReportReadError),

    /// Output artifacts could not be written.
    #[error("results analysis failed while writing output artifacts")]
    Write(#[from] WriteArtifactsError),
}

/// Displays an error along with its chain of sources.
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: StdError> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: StdError> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        let mut next = self.error.source();
        while let Some(err) = next {
            write!(f, "\n  caused by: {err}")?;
            next = err.source();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_error_chain() {
        let err = ReportReadError::Read {
            path: "results/junit_01.xml".into(),
            err: io::Error::new(io::ErrorKind::NotFound, "file missing"),
        };
        let displayed = DisplayErrorChain::new(&err).to_string();
        assert_eq!(
            displayed,
            "failed to read structured report `results/junit_01.xml`\n  caused by: file missing"
        );
    }

    #[test]
    fn profile_not_found_sorts_profiles() {
        let err = ProfileNotFound::new("missing", ["ci", "default", "aws"]);
        assert_eq!(
            err.to_string(),
            "profile `missing` not found (known profiles: aws, ci, default)"
        );
    }

    #[test]
    fn engine_failed_display() {
        let err = EngineError::Failed {
            command: "engine --run".to_owned(),
            exit_code: Some(3),
        };
        assert_eq!(err.to_string(), "`engine --run` failed with exit code 3");

        let err = EngineError::Failed {
            command: "engine --run".to_owned(),
            exit_code: None,
        };
        assert_eq!(
            err.to_string(),
            "`engine --run` failed with no exit code (terminated by signal)"
        );
    }
}
