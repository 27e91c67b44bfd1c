// SPDX-License-Identifier: MIT

//! General model for handing the process over to the staged executable.

use std::{
    convert::Infallible,
    ffi::{CString, OsStr, OsString},
    fmt::Display,
    os::unix::ffi::OsStrExt as _,
    path::Path,
};

use crate::runtime::error::LaunchError;

/// Replaces the running process with another executable.
///
/// This is the seam between staging and the operating system.  A successful
/// replacement never returns, so the only value an implementation hands back
/// is the error.
pub trait ProcessReplacer {
    /// Run `path` with the prepared argument vector and environment.
    fn replace(
        &self,
        path: &Path,
        argv: &[CString],
        envp: &[CString],
    ) -> Result<Infallible, LaunchError>;
}

/// Launch progress, in the only order it can happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// The staging file exists and is empty.
    Created,
    /// The staging file is owner-only.
    PermissionsSet,
    /// The payload is streaming into the staging file.
    Decoding,
    /// The staging file is complete and closed.
    Written,
    /// Control is being handed to the staging file.
    Execd,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Created => "created",
            Stage::PermissionsSet => "permissions-set",
            Stage::Decoding => "decoding",
            Stage::Written => "written",
            Stage::Execd => "exec'd",
        })
    }
}

/// What the replacement process inherits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchEnv {
    /// The full original argument vector, including argument zero.
    pub args: Vec<OsString>,
    /// Environment variables, in the order they were read.
    pub env: Vec<(OsString, OsString)>,
}

impl LaunchEnv {
    /// Capture the arguments and environment of the running process.
    pub fn current() -> Self {
        LaunchEnv {
            args: std::env::args_os().collect(),
            env: std::env::vars_os().collect(),
        }
    }

    /// Build the argument vector for the replacement process.
    ///
    /// Argument zero is replaced by `placeholder` so that the staging file's
    /// generated name never shows up as the program name.  Everything after
    /// it is passed through untouched.
    pub fn argv(&self, placeholder: &OsStr) -> Result<Vec<CString>, LaunchError> {
        let mut argv = Vec::with_capacity(self.args.len().max(1));
        argv.push(CString::new(placeholder.as_bytes())?);
        for arg in self.args.iter().skip(1) {
            argv.push(CString::new(arg.as_bytes())?);
        }
        Ok(argv)
    }

    /// Build the `KEY=VALUE` environment block.
    pub fn envp(&self) -> Result<Vec<CString>, LaunchError> {
        let mut environ = Vec::with_capacity(self.env.len());
        for (key, val) in self.env.iter() {
            let mut entry = key.clone();
            entry.push("=");
            entry.push(val);
            environ.push(CString::new(entry.as_bytes())?);
        }
        Ok(environ)
    }
}
