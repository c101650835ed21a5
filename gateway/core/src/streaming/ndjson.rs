//! Incremental NDJSON line decoding
//!
//! Backends stream their bodies in arbitrary chunks; [`LineDecoder`]
//! reassembles them into complete records without copying more than once.

use bytes::{Bytes, BytesMut};
use thiserror::Error;

/// A single pending line grew past the configured limit
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("record exceeds maximum line length of {limit} bytes")]
pub struct LineTooLong {
    /// Configured maximum in bytes
    pub limit: usize,
}

/// Splits a byte stream into newline-terminated records
#[derive(Debug)]
pub struct LineDecoder {
    buffer: BytesMut,
    /// Bytes of `buffer` already known to contain no newline
    scanned: usize,
    max_line_bytes: usize,
}

impl LineDecoder {
    /// Create a decoder rejecting lines longer than `max_line_bytes`
    #[must_use]
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            scanned: 0,
            max_line_bytes,
        }
    }

    /// Append a chunk from the body
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete record, skipping blank lines
    ///
    /// Returns `Ok(None)` when more input is needed.
    ///
    /// # Errors
    ///
    /// Returns [`LineTooLong`] if a complete or pending line exceeds the limit.
    pub fn next_record(&mut self) -> Result<Option<Bytes>, LineTooLong> {
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let pos = self.scanned + offset;
            self.scanned = 0;
            let mut line = self.buffer.split_to(pos + 1);
            line.truncate(pos);
            if let Some(record) = self.take_line(line)? {
                return Ok(Some(record));
            }
        }
        self.scanned = self.buffer.len();

        // A trailing '\r' may still turn out to be part of "\r\n"
        let pending = self.buffer.len() - usize::from(self.buffer.last() == Some(&b'\r'));
        if pending > self.max_line_bytes {
            return Err(LineTooLong {
                limit: self.max_line_bytes,
            });
        }
        Ok(None)
    }

    /// Flush a final record that had no trailing newline
    ///
    /// # Errors
    ///
    /// Returns [`LineTooLong`] if the remainder exceeds the limit.
    pub fn finish(mut self) -> Result<Option<Bytes>, LineTooLong> {
        let rest = std::mem::take(&mut self.buffer);
        self.take_line(rest)
    }

    fn take_line(&self, mut line: BytesMut) -> Result<Option<Bytes>, LineTooLong> {
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        if line.len() > self.max_line_bytes {
            return Err(LineTooLong {
                limit: self.max_line_bytes,
            });
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(line.freeze()))
    }
}
