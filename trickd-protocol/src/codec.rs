//! Line-delimited JSON codec.
//!
//! Every message is one JSON document followed by `\n`. Blank lines are
//! ignored and a trailing `\r` is tolerated.

use crate::error::ProtocolError;
use crate::MAX_LINE_SIZE;
use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value as a JSON line.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut bytes = serde_json::to_vec(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Buffers partial reads and yields complete lines.
pub struct LineDecoder {
    buffer: BytesMut,
    max_line: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::with_max_line(MAX_LINE_SIZE)
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_line,
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Returns the next complete, non-blank line.
    ///
    /// A line that is not valid UTF-8 is consumed before the error is
    /// returned, so decoding can continue. `LineTooLong` is not recoverable.
    pub fn next_line(&mut self) -> Result<Option<String>, ProtocolError> {
        loop {
            let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') else {
                if self.buffer.len() > self.max_line {
                    return Err(ProtocolError::LineTooLong {
                        size: self.buffer.len(),
                        max: self.max_line,
                    });
                }
                return Ok(None);
            };
            if pos > self.max_line {
                return Err(ProtocolError::LineTooLong {
                    size: pos,
                    max: self.max_line,
                });
            }

            let mut line = self.buffer.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }
            let text = std::str::from_utf8(&line[..]).map_err(|_| ProtocolError::InvalidUtf8)?;
            if text.trim().is_empty() {
                continue;
            }
            return Ok(Some(text.to_string()));
        }
    }

    /// Decodes the next line as JSON.
    pub fn decode_line<T: DeserializeOwned>(&mut self) -> Result<Option<T>, ProtocolError> {
        match self.next_line()? {
            Some(line) => Ok(Some(serde_json::from_str(&line)?)),
            None => Ok(None),
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}
