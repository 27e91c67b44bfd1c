// SPDX-License-Identifier: MIT

//! Stages the embedded payload and hands the process over to it.
//!
//! The `launch` function is the main entry point for a launcher binary.  It
//! takes a `LaunchConfig` describing the payload, the scratch directory that
//! receives the staging file, and the program name the replacement process
//! sees.  The `Launcher` walks the stages in order: allocate the staging
//! file, restrict it to its owner, stream the decoded payload into it, close
//! it, then replace the process.  Any failure ends the launch; nothing is
//! retried and the staging file is never removed.

pub mod error;
pub mod payload;
pub mod spawn;

mod rwutil;
mod spawn_linux;

use std::{
    convert::Infallible,
    ffi::OsString,
    io::Write,
    path::{Path, PathBuf},
};

use tracing::debug;

pub use payload::Payload;
pub use spawn::{LaunchEnv, ProcessReplacer, Stage};
pub use spawn_linux::{ExecReplacer, ForkExecReplacer};

use error::LaunchError;
use rwutil::{CopyError, SIZE_8K, copy_chunked};
use spawn_linux::StagingFile;

/// Directory receiving staging files unless configured otherwise.
pub const DEFAULT_SCRATCH_DIR: &str = "/tmp";

/// Program name the replacement process sees unless configured otherwise.
pub const DEFAULT_PLACEHOLDER: &str = "binary";

/// Describes what to launch and where to stage it.
#[derive(Debug, Clone)]
pub struct LaunchConfig<'a> {
    pub payload: Payload<'a>,
    pub scratch_dir: PathBuf,
    pub placeholder: OsString,
}

impl LaunchConfig<'static> {
    /// The configuration baked in by the build script.
    pub fn embedded() -> Self {
        LaunchConfig {
            payload: Payload::new(include_str!(env!("STAGEXEC_PAYLOAD_FILE"))),
            scratch_dir: PathBuf::from(env!("STAGEXEC_SCRATCH_DIR")),
            placeholder: OsString::from(env!("STAGEXEC_PLACEHOLDER")),
        }
    }
}

impl<'a> LaunchConfig<'a> {
    /// Default scratch directory and placeholder around `payload`.
    pub fn new(payload: Payload<'a>) -> Self {
        LaunchConfig {
            payload,
            scratch_dir: PathBuf::from(DEFAULT_SCRATCH_DIR),
            placeholder: OsString::from(DEFAULT_PLACEHOLDER),
        }
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn placeholder(mut self, name: impl Into<OsString>) -> Self {
        self.placeholder = name.into();
        self
    }
}

/// A fully written, closed staging file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedExecutable {
    pub path: PathBuf,
    /// Decoded size of the payload.
    pub len: u64,
}

/// Turns a payload into a running process.
pub struct Launcher<'a> {
    config: LaunchConfig<'a>,
    env: LaunchEnv,
}

impl<'a> Launcher<'a> {
    pub fn new(config: LaunchConfig<'a>, env: LaunchEnv) -> Self {
        Launcher { config, env }
    }

    pub fn config(&self) -> &LaunchConfig<'a> {
        &self.config
    }

    /// Materialize the payload as an owner-only executable file.
    ///
    /// On failure the partially written file stays where it is.
    pub fn stage(&self) -> Result<StagedExecutable, LaunchError> {
        let mut staging = StagingFile::allocate(&self.config.scratch_dir)?;
        log_stage(Stage::Created, staging.path());

        staging.restrict()?;
        log_stage(Stage::PermissionsSet, staging.path());

        log_stage(Stage::Decoding, staging.path());
        let mut source = self.config.payload.reader();
        let len = copy_chunked::<_, _, SIZE_8K>(&mut source, staging.file_mut()).map_err(
            |e| match e {
                CopyError::Read(e) => payload::classify(e),
                CopyError::Write(e) => LaunchError::Write(e),
            },
        )?;
        source.finish()?;

        let path = staging.close()?;
        debug!(stage = %Stage::Written, path = %path.display(), len, "staging file complete");
        Ok(StagedExecutable { path, len })
    }

    /// Stage the payload and replace the process with it.
    /// Only returns on failure.
    pub fn run<R: ProcessReplacer>(&self, replacer: &R) -> Result<Infallible, LaunchError> {
        let argv = self.env.argv(&self.config.placeholder)?;
        let envp = self.env.envp()?;
        let staged = self.stage()?;
        log_stage(Stage::Execd, &staged.path);
        replacer.replace(&staged.path, &argv, &envp)
    }
}

fn log_stage(stage: Stage, path: &Path) {
    debug!(stage = %stage, path = %path.display(), "launch stage");
}

/// Launch `config` with the arguments and environment of this process.
///
/// On failure, prints the error as a single line on standard output and exits
/// with status 1.  Uses fork, exec and wait instead of an in-place exec when
/// built with the `fork-exec` feature.
pub fn launch(config: LaunchConfig<'_>) -> ! {
    let launcher = Launcher::new(config, LaunchEnv::current());

    #[cfg(feature = "fork-exec")]
    let Err(err) = launcher.run(&ForkExecReplacer);
    #[cfg(not(feature = "fork-exec"))]
    let Err(err) = launcher.run(&ExecReplacer);

    debug!(reached = ?err.stage(), "launch failed");
    report_failure(&mut std::io::stdout(), &err);
    std::process::exit(1)
}

/// Write `err` as one line.  A closed or broken stream must not turn the
/// failure into a panic, so write errors are dropped.
fn report_failure<W: Write>(out: &mut W, err: &LaunchError) {
    let _ = writeln!(out, "{err}");
    let _ = out.flush();
}
