//! Raw block-level copy between two attached devices.
//!
//! The copy is a single long-running `dd` invocation followed by an explicit
//! `sync`, so the duplicated bytes are durable before the workflow moves on.
//! There is no partial-progress checkpoint: a failed copy leaves the target in
//! an unknown state and is never retried.

use std::ffi::OsString;

use camino::Utf8Path;
use thiserror::Error;

use crate::command::{CommandError, CommandRunner, ProcessCommandRunner};

/// Block size passed to `dd`; large for throughput, provider-agnostic.
pub const DEFAULT_BLOCK_SIZE: &str = "128M";

/// Errors raised by the copy step. Any of these is fatal to the workflow.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CopyError {
    /// Raised when `dd` or `sync` exits abnormally.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Program that failed.
        program: String,
        /// Exit status reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the command.
        stderr: String,
    },
    /// Raised when the copy command cannot be started.
    #[error(transparent)]
    Runner(#[from] CommandError),
}

/// Capability that duplicates all bytes from one block device to another and
/// flushes the result to stable storage before returning.
pub trait BlockCopier {
    /// Copies `source` onto `target`, byte for byte.
    ///
    /// # Errors
    ///
    /// Returns [`CopyError`] when the underlying copy or flush fails; the
    /// target device contents are unspecified afterwards.
    fn copy(&self, source: &Utf8Path, target: &Utf8Path) -> Result<(), CopyError>;
}

/// Settings for the `dd`-backed copier.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CopierSettings {
    /// Path to the `dd` binary.
    pub dd_bin: String,
    /// Path to the `sync` binary used to flush pending writes.
    pub sync_bin: String,
    /// Block size forwarded to `dd` (`bs=`).
    pub block_size: String,
    /// Whether to run both commands under `sudo`; raw device access usually
    /// needs elevated privileges on the helper instance.
    pub elevate: bool,
}

impl Default for CopierSettings {
    fn default() -> Self {
        Self {
            dd_bin: String::from("dd"),
            sync_bin: String::from("sync"),
            block_size: String::from(DEFAULT_BLOCK_SIZE),
            elevate: true,
        }
    }
}

/// Block copier that shells out to `dd` and `sync`.
#[derive(Clone, Debug)]
pub struct DdCopier<R: CommandRunner> {
    settings: CopierSettings,
    runner: R,
}

impl DdCopier<ProcessCommandRunner> {
    /// Creates a copier wired to the real process runner.
    #[must_use]
    pub const fn with_process_runner(settings: CopierSettings) -> Self {
        Self::new(settings, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> DdCopier<R> {
    /// Creates a copier using the provided runner.
    #[must_use]
    pub const fn new(settings: CopierSettings, runner: R) -> Self {
        Self { settings, runner }
    }

    fn run_checked(&self, program: &str, args: Vec<OsString>) -> Result<(), CopyError> {
        let (actual_program, actual_args) = if self.settings.elevate {
            let mut elevated = vec![OsString::from(program)];
            elevated.extend(args);
            (String::from("sudo"), elevated)
        } else {
            (program.to_owned(), args)
        };

        let output = self.runner.run(&actual_program, &actual_args)?;
        if output.is_success() {
            return Ok(());
        }

        let status_text = output
            .code
            .map_or_else(|| String::from("unknown"), |code| code.to_string());
        Err(CopyError::CommandFailure {
            program: program.to_owned(),
            status: output.code,
            status_text,
            stderr: output.stderr,
        })
    }
}

impl<R: CommandRunner> BlockCopier for DdCopier<R> {
    fn copy(&self, source: &Utf8Path, target: &Utf8Path) -> Result<(), CopyError> {
        let dd_args = vec![
            OsString::from(format!("bs={}", self.settings.block_size)),
            OsString::from(format!("if={source}")),
            OsString::from(format!("of={target}")),
            OsString::from("oflag=direct"),
        ];
        self.run_checked(&self.settings.dd_bin, dd_args)?;
        self.run_checked(&self.settings.sync_bin, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedRunner;
    use camino::Utf8PathBuf;
    use rstest::rstest;

    fn paths() -> (Utf8PathBuf, Utf8PathBuf) {
        (
            Utf8PathBuf::from("/dev/sds"),
            Utf8PathBuf::from("/dev/sdt"),
        )
    }

    #[rstest]
    fn copy_invokes_dd_then_sync_under_sudo() {
        let runner = ScriptedRunner::new();
        runner.push_success();
        runner.push_success();
        let copier = DdCopier::new(CopierSettings::default(), runner.clone());
        let (source, target) = paths();

        copier.copy(&source, &target).expect("copy should succeed");

        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 2);
        assert_eq!(
            invocations[0].command_string(),
            "sudo dd bs=128M if=/dev/sds of=/dev/sdt oflag=direct"
        );
        assert_eq!(invocations[1].command_string(), "sudo sync");
    }

    #[rstest]
    fn copy_without_elevation_runs_dd_directly() {
        let runner = ScriptedRunner::new();
        runner.push_success();
        runner.push_success();
        let settings = CopierSettings {
            elevate: false,
            ..CopierSettings::default()
        };
        let copier = DdCopier::new(settings, runner.clone());
        let (source, target) = paths();

        copier.copy(&source, &target).expect("copy should succeed");

        let invocations = runner.invocations();
        assert_eq!(invocations[0].program, "dd");
        assert_eq!(invocations[1].program, "sync");
    }

    #[rstest]
    fn dd_failure_surfaces_exit_status_and_stderr() {
        let runner = ScriptedRunner::new();
        runner.push_output(Some(1), "", "dd: error writing '/dev/sdt'");
        let copier = DdCopier::new(CopierSettings::default(), runner.clone());
        let (source, target) = paths();

        let err = copier.copy(&source, &target).expect_err("copy should fail");

        assert!(matches!(
            err,
            CopyError::CommandFailure {
                ref program,
                status: Some(1),
                ref stderr,
                ..
            } if program == "dd" && stderr.contains("error writing")
        ));
        // no sync once dd has failed
        assert_eq!(runner.invocations().len(), 1);
    }

    #[rstest]
    fn sync_failure_is_a_copy_failure_too() {
        let runner = ScriptedRunner::new();
        runner.push_success();
        runner.push_failure(1);
        let copier = DdCopier::new(CopierSettings::default(), runner.clone());
        let (source, target) = paths();

        let err = copier.copy(&source, &target).expect_err("sync should fail");
        assert!(
            matches!(err, CopyError::CommandFailure { ref program, .. } if program == "sync")
        );
    }

    #[rstest]
    fn spawn_errors_pass_through() {
        let runner = ScriptedRunner::new();
        let copier = DdCopier::new(CopierSettings::default(), runner);
        let (source, target) = paths();

        let err = copier.copy(&source, &target).expect_err("no scripted output");
        assert!(matches!(err, CopyError::Runner(_)));
    }
}
