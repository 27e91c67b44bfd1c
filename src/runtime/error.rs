// SPDX-License-Identifier: MIT

//! Common error type.
//!
//! Every variant is fatal; the launcher never retries or recovers.

use std::{ffi::NulError, path::PathBuf};

use thiserror::Error;

use crate::runtime::spawn::Stage;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("unable to create staging file in {}: {source}", .dir.display())]
    Allocate {
        dir: PathBuf,
        source: std::io::Error,
    },

    #[error("unable to restrict staging file permissions: {0}")]
    Permissions(#[source] std::io::Error),

    #[error("illegal base64 data in payload: {0}")]
    Decode(#[source] std::io::Error),

    #[error("corrupt compressed payload: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("unable to write staging file: {0}")]
    Write(#[source] std::io::Error),

    #[error("unable to close staging file: {0}")]
    Close(#[source] std::io::Error),

    #[error("exec {}: {source}", .path.display())]
    Exec {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("argument contains a NUL byte: {0}")]
    InvalidArgument(#[from] NulError),

    #[error("unable to fork: {0}")]
    Fork(#[source] std::io::Error),

    #[error("waiting for child {pid} failed: {source}")]
    Wait { pid: i32, source: std::io::Error },
}

impl LaunchError {
    /// The last stage the launcher reached before failing.
    /// `None` means not even the staging file exists.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Allocate { .. } | Self::InvalidArgument(_) => None,
            Self::Permissions(_) => Some(Stage::Created),
            Self::Decode(_) | Self::Decompress(_) | Self::Write(_) | Self::Close(_) => {
                Some(Stage::Decoding)
            }
            Self::Exec { .. } | Self::Fork(_) | Self::Wait { .. } => Some(Stage::Written),
        }
    }
}
