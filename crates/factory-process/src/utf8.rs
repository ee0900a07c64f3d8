//! Chunk-wise UTF-8 decoding for pipe reads.

/// Decodes byte chunks into text without splitting multi-byte sequences.
///
/// An incomplete sequence at the end of a chunk is held back until the next
/// chunk arrives. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub(crate) struct Utf8Chunker {
    pending: Vec<u8>,
}

impl Utf8Chunker {
    pub(crate) fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            // Truncated sequence; wait for more bytes.
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }

    /// Flush whatever is held back once the pipe is closed.
    pub(crate) fn finish(self) -> String {
        String::from_utf8_lossy(&self.pending).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passthrough() {
        let mut chunker = Utf8Chunker::default();
        assert_eq!(chunker.decode(b"line1\nli"), "line1\nli");
        assert_eq!(chunker.decode(b"ne2\n"), "ne2\n");
        assert_eq!(chunker.finish(), "");
    }

    #[test]
    fn test_split_multibyte() {
        let bytes = "héllo ✓".as_bytes();
        let mut chunker = Utf8Chunker::default();
        let mut out = String::new();
        for b in bytes {
            out.push_str(&chunker.decode(&[*b]));
        }
        out.push_str(&chunker.finish());
        assert_eq!(out, "héllo ✓");
    }

    #[test]
    fn test_invalid_bytes_replaced() {
        let mut chunker = Utf8Chunker::default();
        assert_eq!(chunker.decode(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn test_truncated_tail_flushed_lossy() {
        let mut chunker = Utf8Chunker::default();
        assert_eq!(chunker.decode(b"ok\xe2\x9c"), "ok");
        assert_eq!(chunker.finish(), "\u{FFFD}");
    }
}
