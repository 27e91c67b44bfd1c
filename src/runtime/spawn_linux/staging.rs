// SPDX-License-Identifier: MIT

//! The staging file: a private, uniquely named file that receives the decoded
//! payload and then becomes the replacement process image.
//!
//! The file is persisted as soon as it is created.  Nothing here removes it,
//! since the replacement process runs from this path.

use std::{
    fs::{File, Permissions},
    os::unix::fs::PermissionsExt as _,
    path::{Path, PathBuf},
};

use crate::runtime::error::LaunchError;

/// Owner read, write and execute.  No group or other access.
pub(crate) const STAGING_MODE: u32 = 0o700;

const PREFIX: &str = "stagexec-";

pub(crate) struct StagingFile {
    file: File,
    path: PathBuf,
}

impl StagingFile {
    /// Create a new, empty, uniquely named file inside `dir`.
    pub(crate) fn allocate(dir: &Path) -> Result<Self, LaunchError> {
        let (file, path) = tempfile::Builder::new()
            .prefix(PREFIX)
            .tempfile_in(dir)
            .and_then(|tmp| tmp.keep().map_err(|e| e.error))
            .map_err(|source| LaunchError::Allocate {
                dir: dir.to_path_buf(),
                source,
            })?;
        Ok(StagingFile { file, path })
    }

    /// Restrict the file to its owner.
    /// Applied through the open handle, before any content is written.
    pub(crate) fn restrict(&self) -> Result<(), LaunchError> {
        self.file
            .set_permissions(Permissions::from_mode(STAGING_MODE))
            .map_err(LaunchError::Permissions)
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    /// Flush the content to storage and close the handle.
    /// Linux refuses to exec a file that is still open for writing, so the
    /// handle must be gone before the path is handed out.
    pub(crate) fn close(self) -> Result<PathBuf, LaunchError> {
        let StagingFile { file, path } = self;
        file.sync_all().map_err(LaunchError::Close)?;
        drop(file);
        Ok(path)
    }
}
