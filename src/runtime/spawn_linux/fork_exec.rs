// SPDX-License-Identifier: MIT

//! Process replacement by fork, exec and wait.
//!
//! The child runs the staged executable and the parent mirrors its exit
//! status.  Argument and environment handling is identical to the in-place
//! replacement; only the process ID differs.

use std::{
    convert::Infallible,
    ffi::CString,
    fs::File,
    io::{ErrorKind, Read, Write},
    os::unix::ffi::OsStrExt as _,
    path::Path,
    ptr,
};

use nix::{
    errno::Errno,
    fcntl::OFlag,
    libc::{c_char, c_int},
    sys::wait::{WaitStatus, waitpid},
    unistd::{ForkResult, Pid, fork, pipe2},
};
use tracing::debug;

use crate::runtime::{error::LaunchError, spawn::ProcessReplacer};

/// Exit code of a child whose exec call failed.
const EXEC_FAILED: c_int = 127;

/// Exit code offset for a child killed by a signal, as shells report it.
const SIGNAL_BASE: i32 = 128;

/// Runs the staged executable as a child and exits with its status.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForkExecReplacer;

impl ForkExecReplacer {
    /// Run the executable as a child process and wait for it.
    ///
    /// Returns the exit code, or `128 + signal` when the child was killed.
    /// An exec failure inside the child comes back as `LaunchError::Exec`.
    pub fn spawn_and_wait(
        &self,
        path: &Path,
        argv: &[CString],
        envp: &[CString],
    ) -> Result<i32, LaunchError> {
        // Everything the child touches is prepared before the fork.  Between
        // fork and exec the child may only make async-signal-safe calls, so
        // no allocation happens there.
        let exec_path = CString::new(path.as_os_str().as_bytes())?;
        let argv_ptrs = null_terminated(argv);
        let envp_ptrs = null_terminated(envp);

        // The write end closes on a successful exec, so the parent reads
        // either nothing or the child's errno.
        let (report_read, report_write) =
            pipe2(OFlag::O_CLOEXEC).map_err(|e| LaunchError::Fork(e.into()))?;

        match unsafe { fork() } {
            Err(e) => Err(LaunchError::Fork(e.into())),
            Ok(ForkResult::Child) => {
                drop(report_read);
                // SAFETY: every pointer refers to a NUL-terminated string that
                // outlives this call, and both arrays end with a null pointer.
                unsafe {
                    nix::libc::execve(exec_path.as_ptr(), argv_ptrs.as_ptr(), envp_ptrs.as_ptr());
                }
                let report = (Errno::last() as i32).to_be_bytes();
                let mut report_write = File::from(report_write);
                let _ = report_write.write_all(&report);
                // SAFETY: leaves without running the parent's exit handlers.
                unsafe { nix::libc::_exit(EXEC_FAILED) }
            }
            Ok(ForkResult::Parent { child }) => {
                drop(report_write);
                let failure = read_report(File::from(report_read));
                debug!(pid = child.as_raw(), path = %path.display(), "spawned staged executable");
                let status = wait_for(child);
                match failure {
                    Some(errno) => Err(LaunchError::Exec {
                        path: path.to_path_buf(),
                        source: std::io::Error::from_raw_os_error(errno),
                    }),
                    None => status,
                }
            }
        }
    }
}

impl ProcessReplacer for ForkExecReplacer {
    fn replace(
        &self,
        path: &Path,
        argv: &[CString],
        envp: &[CString],
    ) -> Result<Infallible, LaunchError> {
        let code = self.spawn_and_wait(path, argv, envp)?;
        debug!(code, "staged executable exited");
        std::process::exit(code)
    }
}

fn null_terminated(strings: &[CString]) -> Vec<*const c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(ptr::null()))
        .collect()
}

/// Read the errno the child reports when its exec fails.
/// `None` means the exec succeeded and the pipe closed without data.
fn read_report(mut report: File) -> Option<i32> {
    let mut buff = [0u8; size_of::<i32>()];
    let mut filled = 0;
    while filled < buff.len() {
        match report.read(&mut buff[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    (filled == buff.len()).then(|| i32::from_be_bytes(buff))
}

fn wait_for(child: Pid) -> Result<i32, LaunchError> {
    loop {
        match waitpid(child, None) {
            Ok(WaitStatus::Exited(_pid, code)) => return Ok(code),
            Ok(WaitStatus::Signaled(_pid, signal, _core)) => return Ok(SIGNAL_BASE + signal as i32),
            // Stopped or continued; keep waiting for termination.
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(e) => {
                return Err(LaunchError::Wait {
                    pid: child.as_raw(),
                    source: e.into(),
                });
            }
        }
    }
}
