//! Response decoding
//!
//! The monitor answers read commands with hex dump lines:
//!
//! ```text
//! 00001000: 12345678 9abcdef0 00000000 ffffffff
//! ```
//!
//! A payload line is an 8-digit lowercase hex offset, a colon, one space and
//! then whitespace separated hex values of any width. Any other line (banners,
//! diagnostics, blank lines) is skipped.

use std::fmt;

use super::Width;
use crate::memory::hexdump;

const OFFSET_DIGITS: usize = 8;

fn is_lower_hex(b: u8) -> bool {
    b.is_ascii_digit() || (b'a'..=b'f').contains(&b)
}

/// Recognize one payload line, returning its offset and values.
///
/// Values are taken left to right until the first token that is not a hex
/// number, so a trailing ASCII column does not end up in the result.
pub fn parse_line(line: &str) -> Option<(u32, Vec<u32>)> {
    let bytes = line.as_bytes();
    if bytes.len() < OFFSET_DIGITS + 3 {
        return None;
    }
    if !bytes[..OFFSET_DIGITS].iter().copied().all(is_lower_hex) {
        return None;
    }
    if bytes[OFFSET_DIGITS] != b':' || bytes[OFFSET_DIGITS + 1] != b' ' {
        return None;
    }
    if !is_lower_hex(bytes[OFFSET_DIGITS + 2]) {
        return None;
    }

    let offset = u32::from_str_radix(&line[..OFFSET_DIGITS], 16).ok()?;
    let values = line[OFFSET_DIGITS + 2..]
        .split_whitespace()
        .map_while(|token| u32::from_str_radix(token, 16).ok())
        .collect();

    Some((offset, values))
}

/// Decode every payload value in a response, in line order
pub fn decode(response: &[u8]) -> Vec<u32> {
    String::from_utf8_lossy(response)
        .lines()
        .filter_map(parse_line)
        .flat_map(|(_, values)| values)
        .collect()
}

/// Decoded read result, shaped by element width and count
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Exactly one element was requested
    Scalar(u32),
    /// Several byte-wide elements
    Bytes(Vec<u8>),
    /// Several half- or word-wide elements
    Words(Vec<u32>),
}

impl Decoded {
    /// Shape `values` for a read of `count` elements of `width`.
    ///
    /// Extra values are dropped. Returns `None` if fewer than `count`
    /// values were decoded.
    pub fn shape(width: Width, count: usize, mut values: Vec<u32>) -> Option<Decoded> {
        if values.len() < count {
            return None;
        }
        values.truncate(count);

        Some(match (count, width) {
            (1, _) => Decoded::Scalar(values[0]),
            (_, Width::Byte) => Decoded::Bytes(values.into_iter().map(|v| v as u8).collect()),
            _ => Decoded::Words(values),
        })
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            Decoded::Scalar(_) => 1,
            Decoded::Bytes(b) => b.len(),
            Decoded::Words(w) => w.len(),
        }
    }

    /// Whether no elements were read
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The value of a single-element read
    pub fn as_scalar(&self) -> Option<u32> {
        match self {
            Decoded::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// All elements as integers
    pub fn into_words(self) -> Vec<u32> {
        match self {
            Decoded::Scalar(v) => vec![v],
            Decoded::Bytes(b) => b.into_iter().map(u32::from).collect(),
            Decoded::Words(w) => w,
        }
    }
}

impl fmt::Display for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoded::Scalar(v) => write!(f, "{:#x}", v),
            Decoded::Bytes(b) => f.write_str(&hexdump(b)),
            Decoded::Words(w) => {
                let parts: Vec<String> = w.iter().map(|v| format!("{:08x}", v)).collect();
                f.write_str(&parts.join(" "))
            }
        }
    }
}
