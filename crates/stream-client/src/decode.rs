use std::str::{Utf8Error, from_utf8};

const REPLACEMENT: char = '\u{FFFD}';

/// Incremental UTF-8 decoder. A multi-byte sequence cut in half by chunk
/// boundaries is held back until the rest of it arrives.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Fails on the first invalid sequence. The offending bytes stay
    /// buffered, so a following [`Utf8Decoder::decode_lossy`] call can still
    /// recover the text around them.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<String, Utf8Error> {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(chunk);
        match from_utf8(&buf) {
            Ok(text) => Ok(text.to_owned()),
            Err(e) if e.error_len().is_none() => {
                let (valid, rest) = buf.split_at(e.valid_up_to());
                let text = String::from_utf8_lossy(valid).into_owned();
                self.pending = rest.to_vec();
                Ok(text)
            }
            Err(e) => {
                self.pending = buf;
                Err(e)
            }
        }
    }

    /// Replaces invalid sequences with U+FFFD.
    pub fn decode_lossy(&mut self, chunk: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(chunk);
        let mut out = String::with_capacity(buf.len());
        let mut rest = buf.as_slice();
        loop {
            match from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flushes bytes still held back at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        self.pending.clear();
        Some(REPLACEMENT.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii() {
        let mut d = Utf8Decoder::new();
        assert_eq!(d.decode(b"Hel").unwrap(), "Hel");
        assert_eq!(d.decode(b"lo").unwrap(), "lo");
        assert!(!d.has_pending());
        assert!(d.finish().is_none());
    }

    #[test]
    fn test_split_multibyte() {
        let bytes = "café ☕".as_bytes();
        // 'é' is 0xC3 0xA9, cut between the two
        let (a, b) = bytes.split_at(4);
        let mut d = Utf8Decoder::new();
        assert_eq!(d.decode(a).unwrap(), "caf");
        assert!(d.has_pending());
        assert_eq!(d.decode(b).unwrap(), "é ☕");
        assert!(!d.has_pending());
    }

    #[test]
    fn test_three_way_split() {
        let bytes = "☕".as_bytes();
        let mut d = Utf8Decoder::new();
        assert_eq!(d.decode(&bytes[..1]).unwrap(), "");
        assert_eq!(d.decode(&bytes[1..2]).unwrap(), "");
        assert_eq!(d.decode(&bytes[2..]).unwrap(), "☕");
    }

    #[test]
    fn test_invalid_strict_keeps_bytes() {
        let mut d = Utf8Decoder::new();
        assert!(d.decode(&[b'o', b'k', 0xFF, b'!']).is_err());
        assert!(d.has_pending());
        assert_eq!(d.decode_lossy(&[]), "ok\u{FFFD}!");
        assert!(!d.has_pending());
    }

    #[test]
    fn test_invalid_lossy() {
        let mut d = Utf8Decoder::new();
        assert_eq!(d.decode_lossy(&[b'o', b'k', 0xFF, b'!']), "ok\u{FFFD}!");
        // still handles a split sequence afterwards
        assert_eq!(d.decode_lossy(&[0xC3]), "");
        assert_eq!(d.decode_lossy(&[0xA9]), "é");
    }

    #[test]
    fn test_finish_flushes_truncated_sequence() {
        let mut d = Utf8Decoder::new();
        assert_eq!(d.decode(&[b'a', 0xE2, 0x98]).unwrap(), "a");
        assert_eq!(d.finish().as_deref(), Some("\u{FFFD}"));
        assert!(d.finish().is_none());
    }
}
