//! Newline-delimited JSON framing.
//!
//! The server writes one JSON document per line; the client side receives
//! arbitrary byte chunks and has to reassemble lines before parsing.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CoreError;

/// Encode a value as a single NDJSON line (trailing `\n` included).
pub fn encode_line<T: Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    Ok(line)
}

/// Incremental NDJSON decoder.
///
/// Feed it byte chunks as they arrive; it yields every complete line and
/// keeps the partial tail for the next call. Blank lines are skipped.
#[derive(Debug)]
pub struct NdjsonDecoder<T> {
    buffer: Vec<u8>,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> NdjsonDecoder<T> {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Append a chunk and decode all lines it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<T>, CoreError> {
        self.buffer.extend_from_slice(chunk);

        let mut items = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(item) = Self::decode(&line)? {
                items.push(item);
            }
        }
        Ok(items)
    }

    /// Decode whatever is left once the stream is closed.
    pub fn finish(mut self) -> Result<Option<T>, CoreError> {
        let rest = std::mem::take(&mut self.buffer);
        Self::decode(&rest)
    }

    fn decode(line: &[u8]) -> Result<Option<T>, CoreError> {
        let text = String::from_utf8_lossy(line);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(trimmed)?))
    }
}

impl<T: DeserializeOwned> Default for NdjsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}
