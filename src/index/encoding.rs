//! Text encoding detection, line terminator scanning and line decoding.

use memchr::memchr_iter;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How many leading bytes are inspected when detecting an encoding
pub const DETECTION_SAMPLE_BYTES: usize = 8192;

/// Encodings the indexer can split into lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
    /// ISO-8859-1: every byte is one character
    Latin1,
}

/// Result of inspecting the start of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub encoding: Encoding,
    /// Nothing identified the encoding; a default decoding was chosen
    pub guessed: bool,
}

impl Encoding {
    /// Width of one code unit in bytes
    #[inline]
    pub fn unit_width(self) -> u64 {
        match self {
            Encoding::Utf16Le | Encoding::Utf16Be => 2,
            Encoding::Utf8 | Encoding::Latin1 => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Utf16Le => "UTF-16LE",
            Encoding::Utf16Be => "UTF-16BE",
            Encoding::Latin1 => "ISO-8859-1",
        }
    }

    /// Parse a user-facing encoding name (case-insensitive, dashes optional)
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "utf8" => Some(Encoding::Utf8),
            "utf16le" | "utf16" => Some(Encoding::Utf16Le),
            "utf16be" => Some(Encoding::Utf16Be),
            "latin1" | "iso88591" => Some(Encoding::Latin1),
            _ => None,
        }
    }

    /// Call `on_line_end` with the absolute position just past every line
    /// terminator in `buf`, which starts at absolute position `base`.
    ///
    /// For UTF-16 `base` must be even; a terminator split across the end of
    /// `buf` is not reported.
    pub(crate) fn scan_line_ends<E>(
        self,
        buf: &[u8],
        base: u64,
        mut on_line_end: impl FnMut(u64) -> Result<(), E>,
    ) -> Result<(), E> {
        match self {
            Encoding::Utf8 | Encoding::Latin1 => {
                for i in memchr_iter(b'\n', buf) {
                    on_line_end(base + i as u64 + 1)?;
                }
            }
            Encoding::Utf16Le => {
                // 0A 00 at an even position
                for i in memchr_iter(b'\n', buf) {
                    if (base + i as u64) % 2 == 0 && buf.get(i + 1) == Some(&0) {
                        on_line_end(base + i as u64 + 2)?;
                    }
                }
            }
            Encoding::Utf16Be => {
                // 00 0A, the 0A at an odd position
                for i in memchr_iter(b'\n', buf) {
                    if (base + i as u64) % 2 == 1 && i > 0 && buf[i - 1] == 0 {
                        on_line_end(base + i as u64 + 1)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Decode the raw bytes of one line, dropping its terminator.
    ///
    /// Invalid sequences are replaced rather than rejected. A byte order mark
    /// at the start of the line is removed.
    pub fn decode_line(self, bytes: &[u8]) -> String {
        let mut text = match self {
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Encoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
            Encoding::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
            Encoding::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
        };

        if text.ends_with('\n') {
            text.pop();
            if text.ends_with('\r') {
                text.pop();
            }
        }
        if text.starts_with('\u{FEFF}') {
            text.replace_range(..'\u{FEFF}'.len_utf8(), "");
        }
        text
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> String {
    let units = bytes.chunks_exact(2).map(|pair| to_unit([pair[0], pair[1]]));
    let mut text: String = char::decode_utf16(units)
        .map(|unit| unit.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    if bytes.len() % 2 == 1 {
        text.push(char::REPLACEMENT_CHARACTER);
    }
    text
}

/// Detect the encoding from the first bytes of a file.
///
/// Byte order marks win. Without one, a file whose bytes are mostly NUL on one
/// parity is taken as BOM-less UTF-16. Otherwise valid UTF-8 (a sequence cut
/// by the end of the sample is fine) is UTF-8, and anything else falls back to
/// Latin-1 with `guessed` set.
pub fn detect_encoding(sample: &[u8]) -> Detection {
    let sample = &sample[..sample.len().min(DETECTION_SAMPLE_BYTES)];
    let detected = |encoding| Detection {
        encoding,
        guessed: false,
    };

    if sample.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return detected(Encoding::Utf8);
    }
    if sample.starts_with(&[0xFF, 0xFE]) {
        return detected(Encoding::Utf16Le);
    }
    if sample.starts_with(&[0xFE, 0xFF]) {
        return detected(Encoding::Utf16Be);
    }

    if sample.len() >= 4 {
        let pairs = sample.len() / 2;
        let even_nuls = sample.iter().step_by(2).filter(|&&b| b == 0).count();
        let odd_nuls = sample.iter().skip(1).step_by(2).filter(|&&b| b == 0).count();
        // Mostly ASCII text in UTF-16 has a NUL in nearly every other byte
        if odd_nuls * 10 >= pairs * 7 && even_nuls * 10 < pairs {
            return detected(Encoding::Utf16Le);
        }
        if even_nuls * 10 >= pairs * 7 && odd_nuls * 10 < pairs {
            return detected(Encoding::Utf16Be);
        }
    }

    match std::str::from_utf8(sample) {
        Ok(_) => detected(Encoding::Utf8),
        Err(e) if e.error_len().is_none() => detected(Encoding::Utf8),
        Err(_) => Detection {
            encoding: Encoding::Latin1,
            guessed: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    fn utf16be(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(|u| u.to_be_bytes()).collect()
    }

    fn line_ends(encoding: Encoding, buf: &[u8]) -> Vec<u64> {
        let mut ends = Vec::new();
        encoding
            .scan_line_ends::<()>(buf, 0, |end| {
                ends.push(end);
                Ok(())
            })
            .unwrap();
        ends
    }

    #[test]
    fn test_detect_boms() {
        assert_eq!(detect_encoding(b"\xEF\xBB\xBFhello").encoding, Encoding::Utf8);
        assert_eq!(detect_encoding(b"\xFF\xFEh\0").encoding, Encoding::Utf16Le);
        assert_eq!(detect_encoding(b"\xFE\xFF\0h").encoding, Encoding::Utf16Be);
    }

    #[test]
    fn test_detect_bomless_utf16() {
        let le = detect_encoding(&utf16le("plain ascii log line\n"));
        assert_eq!(le.encoding, Encoding::Utf16Le);
        assert!(!le.guessed);
        assert_eq!(detect_encoding(&utf16be("plain ascii log line\n")).encoding, Encoding::Utf16Be);
    }

    #[test]
    fn test_detect_utf8_and_fallback() {
        assert_eq!(detect_encoding("héllo wörld\n".as_bytes()).encoding, Encoding::Utf8);
        assert_eq!(detect_encoding(b"").encoding, Encoding::Utf8);

        // Multi-byte sequence cut by the end of the sample
        let cut = &"é".as_bytes()[..1];
        let mut sample = b"abc".to_vec();
        sample.extend_from_slice(cut);
        assert_eq!(detect_encoding(&sample).encoding, Encoding::Utf8);

        let fallback = detect_encoding(b"caf\xE9 au lait\n");
        assert_eq!(fallback.encoding, Encoding::Latin1);
        assert!(fallback.guessed);
    }

    #[test]
    fn test_scan_single_byte_line_ends() {
        assert_eq!(line_ends(Encoding::Utf8, b"ab\ncd\n\nx"), vec![3, 6, 7]);
        assert!(line_ends(Encoding::Utf8, b"no newline").is_empty());
    }

    #[test]
    fn test_scan_utf16_line_ends() {
        let le = utf16le("a\nbc\n");
        assert_eq!(line_ends(Encoding::Utf16Le, &le), vec![4, 10]);

        let be = utf16be("a\nbc\n");
        assert_eq!(line_ends(Encoding::Utf16Be, &be), vec![4, 10]);

        // U+0A0A contains the newline byte but is not a terminator
        let tricky = utf16le("\u{0A0A}\n");
        assert_eq!(line_ends(Encoding::Utf16Le, &tricky), vec![4]);
    }

    #[test]
    fn test_decode_strips_terminators_and_bom() {
        assert_eq!(Encoding::Utf8.decode_line(b"hello\r\n"), "hello");
        assert_eq!(Encoding::Utf8.decode_line(b"\xEF\xBB\xBFfirst\n"), "first");
        assert_eq!(Encoding::Utf8.decode_line(b"bad \xFF byte"), "bad \u{FFFD} byte");
        assert_eq!(Encoding::Latin1.decode_line(b"caf\xE9\n"), "café");

        let mut le = vec![0xFF, 0xFE];
        le.extend(utf16le("line\r\n"));
        assert_eq!(Encoding::Utf16Le.decode_line(&le), "line");
        assert_eq!(Encoding::Utf16Be.decode_line(&utf16be("zz\n")), "zz");
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Encoding::from_name("UTF-16LE"), Some(Encoding::Utf16Le));
        assert_eq!(Encoding::from_name("iso-8859-1"), Some(Encoding::Latin1));
        assert_eq!(Encoding::from_name("utf8"), Some(Encoding::Utf8));
        assert_eq!(Encoding::from_name("ebcdic"), None);
    }
}
