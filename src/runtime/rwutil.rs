// SPDX-License-Identifier: MIT

//! Read & Write utility functions.

use std::io::{ErrorKind, Read, Write};

/// Copy buffer size used when streaming the payload.
pub const SIZE_8K: usize = 8 * 1024;

/// Which side of a copy failed.
#[derive(Debug)]
pub enum CopyError {
    Read(std::io::Error),
    Write(std::io::Error),
}

/// Stream everything from `source` into `out` through a single `COUNT` sized
/// buffer, returning the number of bytes copied.
///
/// Unlike `std::io::copy`, the caller learns whether the reader or the writer
/// failed.
pub fn copy_chunked<R: Read, W: Write, const COUNT: usize>(
    source: &mut R,
    out: &mut W,
) -> Result<u64, CopyError> {
    let mut buff = [0u8; COUNT];
    let mut total: u64 = 0;
    loop {
        let count = match source.read(&mut buff) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyError::Read(e)),
        };
        out.write_all(&buff[..count]).map_err(CopyError::Write)?;
        total += count as u64;
    }
}
