// SPDX-License-Identifier: MIT

//! Stages and executes the payload.
//! Specific to Linux.

mod exec;
mod fork_exec;
mod staging;

pub use exec::ExecReplacer;
pub use fork_exec::ForkExecReplacer;
pub(crate) use staging::StagingFile;
