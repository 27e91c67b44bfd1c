// SPDX-License-Identifier: MIT

//! In-place process replacement.

use std::{
    convert::Infallible,
    ffi::CString,
    os::unix::ffi::OsStrExt as _,
    path::Path,
};

use tracing::debug;

use crate::runtime::{error::LaunchError, spawn::ProcessReplacer};

/// Replaces the process image with `execve(2)`.
///
/// The process ID and every descriptor without close-on-exec survive.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecReplacer;

impl ProcessReplacer for ExecReplacer {
    fn replace(
        &self,
        path: &Path,
        argv: &[CString],
        envp: &[CString],
    ) -> Result<Infallible, LaunchError> {
        let exec_path = CString::new(path.as_os_str().as_bytes())?;
        debug!(path = %path.display(), args = argv.len(), "execve");
        nix::unistd::execve(exec_path.as_c_str(), argv, envp).map_err(|errno| {
            LaunchError::Exec {
                path: path.to_path_buf(),
                source: errno.into(),
            }
        })
    }
}
