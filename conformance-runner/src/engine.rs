// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The external test engine.
//!
//! The engine executes test cases and writes structured reports and log fragments into a results
//! directory. Both entry points block until the engine exits.

use crate::{config::EngineConfig, errors::EngineError};
use camino::Utf8Path;
use std::fs;
use tracing::{debug, info};

/// Environment variable holding the results directory.
pub const RESULTS_DIR_ENV: &str = "CONFORMANCE_RESULTS_DIR";

/// Environment variable holding the run descriptor path.
pub const RUN_DESCRIPTOR_ENV: &str = "CONFORMANCE_RUN_DESCRIPTOR";

/// Environment variable set to `1` for dry runs.
pub const DRY_RUN_ENV: &str = "CONFORMANCE_DRY_RUN";

const RUN_DESCRIPTOR_PLACEHOLDER: &str = "{run-descriptor}";
const RESULTS_DIR_PLACEHOLDER: &str = "{results-dir}";

/// An external engine that runs test cases.
pub trait ExternalEngine {
    /// Enumerates known test cases without executing them, writing a structured report into
    /// `results_dir`.
    fn dry_run(&self, results_dir: &Utf8Path) -> Result<(), EngineError>;

    /// Runs the test cases named in `run_descriptor`, writing results into `results_dir`.
    fn run(&self, run_descriptor: &Utf8Path, results_dir: &Utf8Path) -> Result<(), EngineError>;
}

/// An [`ExternalEngine`] that spawns a configured program.
#[derive(Clone, Debug)]
pub struct CommandEngine<'cfg> {
    config: &'cfg EngineConfig,
}

impl<'cfg> CommandEngine<'cfg> {
    /// Creates a new engine from the given config.
    pub fn new(config: &'cfg EngineConfig) -> Self {
        Self { config }
    }

    fn exec(
        &self,
        args: &[String],
        run_descriptor: Option<&Utf8Path>,
        results_dir: &Utf8Path,
    ) -> Result<(), EngineError> {
        fs::create_dir_all(results_dir).map_err(|err| EngineError::CreateResultsDir {
            dir: results_dir.to_owned(),
            err,
        })?;

        let args = substitute_args(args, run_descriptor, results_dir);
        let command = display_command(&self.config.program, &args);
        info!("running `{command}`");

        let mut expression = duct::cmd(self.config.program.as_str(), &args)
            .env(RESULTS_DIR_ENV, results_dir)
            .unchecked();
        expression = match run_descriptor {
            Some(run_descriptor) => expression
                .env(RUN_DESCRIPTOR_ENV, run_descriptor)
                .env_remove(DRY_RUN_ENV),
            None => expression.env(DRY_RUN_ENV, "1").env_remove(RUN_DESCRIPTOR_ENV),
        };

        let output = expression.run().map_err(|err| EngineError::Exec {
            command: command.clone(),
            err,
        })?;
        debug!("`{command}` exited with {}", output.status);

        if output.status.success() {
            Ok(())
        } else {
            Err(EngineError::Failed {
                command,
                exit_code: output.status.code(),
            })
        }
    }
}

impl ExternalEngine for CommandEngine<'_> {
    fn dry_run(&self, results_dir: &Utf8Path) -> Result<(), EngineError> {
        self.exec(&self.config.dry_run_args, None, results_dir)
    }

    fn run(&self, run_descriptor: &Utf8Path, results_dir: &Utf8Path) -> Result<(), EngineError> {
        self.exec(&self.config.args, Some(run_descriptor), results_dir)
    }
}

fn substitute_args(
    args: &[String],
    run_descriptor: Option<&Utf8Path>,
    results_dir: &Utf8Path,
) -> Vec<String> {
    args.iter()
        .map(|arg| {
            let arg = arg.replace(RESULTS_DIR_PLACEHOLDER, results_dir.as_str());
            match run_descriptor {
                Some(run_descriptor) => {
                    arg.replace(RUN_DESCRIPTOR_PLACEHOLDER, run_descriptor.as_str())
                }
                None => arg,
            }
        })
        .collect()
}

fn display_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn placeholders_are_substituted() {
        let args = vec![
            "--results-dir={results-dir}".to_owned(),
            "--run={run-descriptor}".to_owned(),
            "plain".to_owned(),
        ];
        assert_eq!(
            substitute_args(
                &args,
                Some(Utf8Path::new("/tmp/run.txt")),
                Utf8Path::new("/out")
            ),
            ["--results-dir=/out", "--run=/tmp/run.txt", "plain"]
        );
        assert_eq!(
            substitute_args(&args, None, Utf8Path::new("/out")),
            ["--results-dir=/out", "--run={run-descriptor}", "plain"]
        );
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use camino_tempfile::tempdir;
        use pretty_assertions::assert_eq;

        fn engine_config(program: &str, args: &[&str]) -> EngineConfig {
            EngineConfig {
                program: program.to_owned(),
                args: args.iter().map(|arg| (*arg).to_owned()).collect(),
                dry_run_args: args.iter().map(|arg| (*arg).to_owned()).collect(),
                results_dir: "unused".into(),
            }
        }

        #[test]
        fn run_passes_environment() {
            let temp_dir = tempdir().unwrap();
            let results_dir = temp_dir.path().join("results");
            let config = engine_config(
                "sh",
                &[
                    "-c",
                    r#"printf '%s' "$CONFORMANCE_RUN_DESCRIPTOR" > "$CONFORMANCE_RESULTS_DIR/out.txt""#,
                ],
            );
            CommandEngine::new(&config)
                .run(Utf8Path::new("/tmp/run.txt"), &results_dir)
                .unwrap();
            assert_eq!(
                fs::read_to_string(results_dir.join("out.txt")).unwrap(),
                "/tmp/run.txt"
            );
        }

        #[test]
        fn dry_run_sets_flag() {
            let temp_dir = tempdir().unwrap();
            let config = engine_config(
                "sh",
                &["-c", r#"printf '%s' "$CONFORMANCE_DRY_RUN" > {results-dir}/out.txt"#],
            );
            CommandEngine::new(&config).dry_run(temp_dir.path()).unwrap();
            assert_eq!(
                fs::read_to_string(temp_dir.path().join("out.txt")).unwrap(),
                "1"
            );
        }

        #[test]
        fn non_zero_exit_is_an_error() {
            let temp_dir = tempdir().unwrap();
            let config = engine_config("sh", &["-c", "exit 3"]);
            let err = CommandEngine::new(&config)
                .dry_run(temp_dir.path())
                .unwrap_err();
            assert!(
                matches!(err, EngineError::Failed { exit_code: Some(3), .. }),
                "{err:?}"
            );
        }

        #[test]
        fn missing_program_is_an_error() {
            let temp_dir = tempdir().unwrap();
            let config = engine_config("conformance-engine-that-does-not-exist", &[]);
            let err = CommandEngine::new(&config)
                .dry_run(temp_dir.path())
                .unwrap_err();
            assert!(matches!(err, EngineError::Exec { .. }), "{err:?}");
        }
    }
}
