// SPDX-License-Identifier: MIT

//! The embedded payload and its streaming decoder.
//!
//! The payload is base64 text wrapped around a gzip stream.  Decoding is a
//! chain of readers: line-break stripping, base64 decoding, then gzip
//! decompression.  Nothing is buffered beyond what each adapter needs, so
//! memory use does not depend on the payload size.

use std::io::{ErrorKind, Read};

use base64::{engine::GeneralPurpose, read::DecoderReader};
use flate2::read::MultiGzDecoder;

use crate::runtime::error::LaunchError;

static ENGINE: GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// Base64 encoded, gzip compressed executable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payload<'a> {
    encoded: &'a str,
}

impl<'a> Payload<'a> {
    pub const fn new(encoded: &'a str) -> Self {
        Payload { encoded }
    }

    /// True when the payload carries no data at all.
    pub fn is_empty(&self) -> bool {
        self.encoded.trim().is_empty()
    }

    /// Start decoding the payload.
    /// Surrounding whitespace is ignored.
    pub fn reader(&self) -> PayloadReader<'a> {
        let text = StripLineBreaks {
            rest: self.encoded.trim().as_bytes(),
        };
        PayloadReader {
            empty: self.is_empty(),
            inner: MultiGzDecoder::new(DecoderReader::new(text, &ENGINE)),
        }
    }
}

/// Pull-based decoder producing the raw executable bytes.
pub struct PayloadReader<'a> {
    empty: bool,
    inner: MultiGzDecoder<DecoderReader<'static, GeneralPurpose, StripLineBreaks<'a>>>,
}

impl PayloadReader<'_> {
    /// Confirm the stream ended cleanly and release it.
    ///
    /// Errors that only show up at the end of the compressed stream, such as a
    /// missing trailer, are reported here if the caller stopped reading early.
    pub fn finish(mut self) -> Result<(), LaunchError> {
        let mut extra = [0u8; 1];
        loop {
            match self.read(&mut extra) {
                Ok(0) => return Ok(()),
                Ok(_) => {
                    return Err(LaunchError::Decompress(std::io::Error::new(
                        ErrorKind::InvalidData,
                        "payload stream finalized before its end",
                    )));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(classify(e)),
            }
        }
    }
}

impl Read for PayloadReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.empty {
            return Err(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                "payload is empty",
            ));
        }
        self.inner.read(buf)
    }
}

/// Sort a read error from the decoder chain into the layer that raised it.
pub(crate) fn classify(e: std::io::Error) -> LaunchError {
    let from_base64 = e
        .get_ref()
        .is_some_and(|inner| inner.is::<base64::DecodeError>());
    if from_base64 {
        LaunchError::Decode(e)
    } else {
        LaunchError::Decompress(e)
    }
}

/// Base64 text may be wrapped; the decoder wants it on one line.
struct StripLineBreaks<'a> {
    rest: &'a [u8],
}

impl Read for StripLineBreaks<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut count = 0;
        while count < buf.len() {
            let Some((&byte, rest)) = self.rest.split_first() else {
                break;
            };
            self.rest = rest;
            if byte != b'\n' && byte != b'\r' {
                buf[count] = byte;
                count += 1;
            }
        }
        Ok(count)
    }
}
