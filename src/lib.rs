//! # stagexec
//!
//! A self-extracting launcher.  The embedded payload is decoded into a
//! private staging file, which then replaces the running process.

#[cfg(not(target_os = "linux"))]
compile_error!("stagexec only supports Linux targets");

pub mod observability;
pub mod runtime;


pub use runtime::{
    ExecReplacer, ForkExecReplacer, LaunchConfig, LaunchEnv, Launcher, Payload,
    ProcessReplacer, Stage, StagedExecutable, error::LaunchError, launch,
};
