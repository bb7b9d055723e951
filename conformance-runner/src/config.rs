// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for conformance runs.

use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind, ProfileNotFound, ResolveConfigError},
    name_set::NameMatch,
    selection::{SelectionContext, SelectionOptions},
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, File, FileFormat, builder::DefaultState};
use regex::Regex;
use serde::Deserialize;
use std::{collections::HashMap, num::NonZeroUsize};

/// Overall configuration for conformance runs.
///
/// This is the root data structure for configuration. Most settings are managed through
/// [profiles](ConformanceProfile), obtained through the [`profile`](Self::profile) method.
#[derive(Clone, Debug)]
pub struct ConformanceConfig {
    base_dir: Utf8PathBuf,
    inner: ConformanceConfigImpl,
}

impl ConformanceConfig {
    /// The default location of the config within the base directory: `.config/conformance.toml`.
    pub const CONFIG_PATH: &'static str = ".config/conformance.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// The name of the default profile.
    pub const DEFAULT_PROFILE: &'static str = "default";

    /// Reads the config from the given file, or if not specified from `.config/conformance.toml`
    /// in the base directory.
    ///
    /// If no config file is specified and the base directory doesn't have
    /// `.config/conformance.toml`, uses the default config options. Relative paths in the config
    /// are resolved against `base_dir`.
    pub fn from_sources(
        base_dir: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let base_dir = base_dir.into();

        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = base_dir.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let inner = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(config_file, kind))?;

        Ok(Self { base_dir, inner })
    }

    /// Parses a config from a TOML string layered on top of the default config.
    ///
    /// `config_file` is only used for error reporting.
    pub fn from_toml_str(
        base_dir: impl Into<Utf8PathBuf>,
        config_file: &Utf8Path,
        contents: &str,
    ) -> Result<Self, ConfigParseError> {
        let builder =
            Self::make_default_config().add_source(File::from_str(contents, FileFormat::Toml));
        let inner = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(config_file, kind))?;

        Ok(Self {
            base_dir: base_dir.into(),
            inner,
        })
    }

    /// Returns the default config.
    pub fn default_config(base_dir: impl Into<Utf8PathBuf>) -> Self {
        let config = Self::make_default_config()
            .build()
            .expect("default config is always valid");

        let inner = config
            .try_deserialize()
            .expect("default config is always valid");
        Self {
            base_dir: base_dir.into(),
            inner,
        }
    }

    /// Returns the directory relative paths are resolved against.
    pub fn base_dir(&self) -> &Utf8Path {
        &self.base_dir
    }

    /// Returns the profile with the given name, or an error if a profile was specified but not
    /// found.
    pub fn profile(&self, name: impl AsRef<str>) -> Result<ConformanceProfile<'_>, ProfileNotFound> {
        let name = name.as_ref();
        let custom_profile = self.inner.profiles.get(name)?;
        Ok(ConformanceProfile {
            name: name.to_owned(),
            base_dir: &self.base_dir,
            default_profile: &self.inner.profiles.default,
            custom_profile,
        })
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<ConformanceConfigImpl, ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|err| ConfigParseErrorKind::BuildError(Box::new(err)))?;

        serde_path_to_error::deserialize(config)
            .map_err(|err| ConfigParseErrorKind::DeserializeError(Box::new(err)))
    }
}

/// Values supplied on the command line that take precedence over the selected profile.
#[derive(Clone, Debug, Default)]
pub struct RunConfigOverrides {
    /// Overrides `context`.
    pub context: Option<String>,

    /// Overrides `groups` if non-empty.
    pub groups: Vec<String>,

    /// Overrides `retest-flagged-only`.
    pub retest_flagged_only: Option<bool>,

    /// Overrides `description-file`.
    pub description_file: Option<Utf8PathBuf>,

    /// Overrides `flake-attempts`.
    pub flake_attempts: Option<usize>,
}

/// A configuration profile. Resolves into a [`RunConfig`].
///
/// Returned by [`ConformanceConfig::profile`].
#[derive(Clone, Debug)]
pub struct ConformanceProfile<'cfg> {
    name: String,
    base_dir: &'cfg Utf8Path,
    default_profile: &'cfg DefaultProfileImpl,
    custom_profile: Option<&'cfg CustomProfileImpl>,
}

macro_rules! profile_value {
    ($self:ident, $field:ident) => {
        $self
            .custom_profile
            .and_then(|profile| profile.$field.clone())
            .unwrap_or_else(|| $self.default_profile.$field.clone())
    };
}

macro_rules! engine_value {
    ($self:ident, $field:ident) => {
        $self
            .custom_profile
            .and_then(|profile| profile.engine.$field.clone())
            .unwrap_or_else(|| $self.default_profile.engine.$field.clone())
    };
}

impl ConformanceProfile<'_> {
    /// Returns the name of this profile.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the active context for this profile.
    pub fn context(&self) -> String {
        profile_value!(self, context)
    }

    /// Returns the active groups for this profile.
    pub fn groups(&self) -> Vec<String> {
        profile_value!(self, groups)
    }

    /// Returns the number of attempts each test case is expected to get.
    pub fn flake_attempts(&self) -> usize {
        profile_value!(self, flake_attempts)
    }

    /// Returns the name match semantics used by skip lists and untracked detection.
    pub fn name_match(&self) -> NameMatch {
        profile_value!(self, name_match)
    }

    /// Returns the primary descriptor file, if any, as written in the config.
    pub fn description_file(&self) -> Option<Utf8PathBuf> {
        self.custom_profile
            .and_then(|profile| profile.description_file.clone())
            .or_else(|| self.default_profile.description_file.clone())
    }

    /// Resolves this profile and the given overrides into a [`RunConfig`].
    pub fn resolve(&self, overrides: &RunConfigOverrides) -> Result<RunConfig, ResolveConfigError> {
        let flake_attempts = overrides
            .flake_attempts
            .unwrap_or_else(|| self.flake_attempts());
        let flake_attempts = NonZeroUsize::new(flake_attempts).ok_or_else(|| {
            ResolveConfigError::InvalidFlakeAttempts {
                profile: self.name.clone(),
            }
        })?;

        let groups = if overrides.groups.is_empty() {
            self.groups()
        } else {
            overrides.groups.clone()
        };
        let selection = SelectionContext::new(
            overrides.context.clone().unwrap_or_else(|| self.context()),
            groups,
            overrides
                .retest_flagged_only
                .unwrap_or_else(|| profile_value!(self, retest_flagged_only)),
        );

        let selection_options = SelectionOptions {
            ignore_false_positives: profile_value!(self, ignore_false_positive_list),
            ignore_skip_list: profile_value!(self, ignore_skip_list),
            include_untracked: profile_value!(self, include_untracked_tests),
            name_match: self.name_match(),
        };

        let descriptions_dir = self.base_dir.join(profile_value!(self, descriptions_dir));
        let description_file = overrides
            .description_file
            .clone()
            .or_else(|| self.description_file())
            .map(|file| descriptions_dir.join(file));
        let false_positives_file =
            descriptions_dir.join(profile_value!(self, false_positives_file));
        let skip_file = descriptions_dir.join(profile_value!(self, skip_file));

        let artifact_patterns = ArtifactPatterns {
            report: self.compile_pattern(
                "report-file-pattern",
                &profile_value!(self, report_file_pattern),
            )?,
            log: self.compile_pattern("log-file-pattern", &profile_value!(self, log_file_pattern))?,
        };

        let engine = EngineConfig {
            program: engine_value!(self, program),
            args: engine_value!(self, args),
            dry_run_args: engine_value!(self, dry_run_args),
            results_dir: self.base_dir.join(engine_value!(self, results_dir)),
        };

        Ok(RunConfig {
            profile_name: self.name.clone(),
            selection,
            selection_options,
            descriptions_dir,
            description_file,
            false_positives_file,
            skip_file,
            flake_attempts,
            retry_failed_testcases: profile_value!(self, retry_failed_testcases),
            export_dir: self.base_dir.join(profile_value!(self, export_dir)),
            tmp_dir: self.base_dir.join(profile_value!(self, tmp_dir)),
            artifact_patterns,
            engine,
        })
    }

    fn compile_pattern(
        &self,
        key: &'static str,
        pattern: &str,
    ) -> Result<Regex, ResolveConfigError> {
        Regex::new(pattern).map_err(|err| ResolveConfigError::InvalidPattern {
            profile: self.name.clone(),
            key,
            err,
        })
    }
}

/// The fully resolved configuration for one run.
///
/// Constructed once, then passed by reference into every pipeline stage.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// The profile this config was resolved from.
    pub profile_name: String,

    /// The context selection rules are evaluated against.
    pub selection: SelectionContext,

    /// Toggles for the individual selection steps.
    pub selection_options: SelectionOptions,

    /// The directory containing descriptor files.
    pub descriptions_dir: Utf8PathBuf,

    /// The primary descriptor file, if any.
    pub description_file: Option<Utf8PathBuf>,

    /// The false-positive descriptor list.
    pub false_positives_file: Utf8PathBuf,

    /// The skip descriptor list.
    pub skip_file: Utf8PathBuf,

    /// The number of attempts each test case is expected to get.
    pub flake_attempts: NonZeroUsize,

    /// Whether failed test cases are rerun once after the first analysis.
    pub retry_failed_testcases: bool,

    /// Where summary and per-test-case documents are written.
    pub export_dir: Utf8PathBuf,

    /// Where the run descriptor and other intermediate files are written.
    pub tmp_dir: Utf8PathBuf,

    /// Patterns used to find artifacts in a results directory.
    pub artifact_patterns: ArtifactPatterns,

    /// The external engine.
    pub engine: EngineConfig,
}

impl RunConfig {
    /// The file name of the generated run descriptor within the temporary directory.
    pub const RUN_DESCRIPTOR_FILE: &'static str = "generated_tests_to_run.txt";

    /// The file name of the retry run descriptor within the temporary directory.
    pub const RETRY_DESCRIPTOR_FILE: &'static str = "failedTestcasesDescription.txt";

    /// Returns the path of the generated run descriptor.
    pub fn run_descriptor_path(&self) -> Utf8PathBuf {
        self.tmp_dir.join(Self::RUN_DESCRIPTOR_FILE)
    }

    /// Returns the path of the retry run descriptor.
    pub fn retry_descriptor_path(&self) -> Utf8PathBuf {
        self.tmp_dir.join(Self::RETRY_DESCRIPTOR_FILE)
    }

    /// Returns the active groups joined by `,`.
    pub fn execution_group(&self) -> String {
        self.selection.active_groups().join(",")
    }

    /// Returns the file name of the primary descriptor file, or an empty string.
    pub fn test_desc_file(&self) -> String {
        self.description_file
            .as_deref()
            .and_then(Utf8Path::file_name)
            .unwrap_or_default()
            .to_owned()
    }
}

/// Patterns matched against the paths of files in a results directory.
#[derive(Clone, Debug)]
pub struct ArtifactPatterns {
    /// Matches structured report files.
    pub report: Regex,

    /// Matches log fragments.
    pub log: Regex,
}

/// Configuration for the external test engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// The program to run.
    pub program: String,

    /// Arguments for a full run.
    pub args: Vec<String>,

    /// Arguments for a dry run.
    pub dry_run_args: Vec<String>,

    /// The directory the engine writes results into.
    pub results_dir: Utf8PathBuf,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ConformanceConfigImpl {
    #[serde(rename = "profile")]
    profiles: ConformanceProfilesImpl,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ConformanceProfilesImpl {
    default: DefaultProfileImpl,
    #[serde(flatten)]
    other: HashMap<String, CustomProfileImpl>,
}

impl ConformanceProfilesImpl {
    fn get(&self, profile: &str) -> Result<Option<&CustomProfileImpl>, ProfileNotFound> {
        let custom_profile = match profile {
            ConformanceConfig::DEFAULT_PROFILE => None,
            other => Some(
                self.other
                    .get(other)
                    .ok_or_else(|| ProfileNotFound::new(profile, self.all_profiles()))?,
            ),
        };
        Ok(custom_profile)
    }

    fn all_profiles(&self) -> impl Iterator<Item = &str> {
        self.other
            .keys()
            .map(|key| key.as_str())
            .chain(std::iter::once(ConformanceConfig::DEFAULT_PROFILE))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultProfileImpl {
    context: String,
    groups: Vec<String>,
    retest_flagged_only: bool,
    descriptions_dir: Utf8PathBuf,
    #[serde(default)]
    description_file: Option<Utf8PathBuf>,
    false_positives_file: Utf8PathBuf,
    skip_file: Utf8PathBuf,
    ignore_false_positive_list: bool,
    ignore_skip_list: bool,
    include_untracked_tests: bool,
    name_match: NameMatch,
    flake_attempts: usize,
    retry_failed_testcases: bool,
    export_dir: Utf8PathBuf,
    tmp_dir: Utf8PathBuf,
    report_file_pattern: String,
    log_file_pattern: String,
    engine: DefaultEngineImpl,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultEngineImpl {
    program: String,
    args: Vec<String>,
    dry_run_args: Vec<String>,
    results_dir: Utf8PathBuf,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CustomProfileImpl {
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    groups: Option<Vec<String>>,
    #[serde(default)]
    retest_flagged_only: Option<bool>,
    #[serde(default)]
    descriptions_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    description_file: Option<Utf8PathBuf>,
    #[serde(default)]
    false_positives_file: Option<Utf8PathBuf>,
    #[serde(default)]
    skip_file: Option<Utf8PathBuf>,
    #[serde(default)]
    ignore_false_positive_list: Option<bool>,
    #[serde(default)]
    ignore_skip_list: Option<bool>,
    #[serde(default)]
    include_untracked_tests: Option<bool>,
    #[serde(default)]
    name_match: Option<NameMatch>,
    #[serde(default)]
    flake_attempts: Option<usize>,
    #[serde(default)]
    retry_failed_testcases: Option<bool>,
    #[serde(default)]
    export_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    tmp_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    report_file_pattern: Option<String>,
    #[serde(default)]
    log_file_pattern: Option<String>,
    #[serde(default)]
    engine: CustomEngineImpl,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CustomEngineImpl {
    #[serde(default)]
    program: Option<String>,
    #[serde(default)]
    args: Option<Vec<String>>,
    #[serde(default)]
    dry_run_args: Option<Vec<String>>,
    #[serde(default)]
    results_dir: Option<Utf8PathBuf>,
}
