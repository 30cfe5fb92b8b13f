//! Planning of multi-command memory operations
//!
//! The monitor reads commands into a fixed line buffer, so long writes are
//! split over several lines. Both planners here are pure and do no I/O.

use std::iter::Peekable;

use crate::protocol::{MonitorCommand, Width};

/// Most values carried by one write line
pub const MAX_VALUES_PER_LINE: usize = 14;

/// Longest write line the monitor accepts, terminator included
pub const MAX_LINE_LENGTH: usize = 128;

// "ww " plus 8 address digits
const WRITE_PREFIX_LEN: usize = 11;

/// One command line of a batched write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteLine {
    /// Address of the first value on this line
    pub addr: u32,
    /// Number of values on this line
    pub count: usize,
    /// Command text without terminator
    pub text: String,
}

fn token_len(value: u32) -> usize {
    // " 0x" plus hex digits
    let digits = if value == 0 {
        1
    } else {
        (32 - value.leading_zeros() as usize).div_ceil(4)
    };
    3 + digits
}

/// Split a write of `values` at `addr` into command lines.
///
/// A line is closed as soon as adding another value would exceed either
/// [`MAX_VALUES_PER_LINE`] or [`MAX_LINE_LENGTH`]; each following line
/// starts where the previous one ended. Lines are produced on demand, so
/// large fills are never planned up front.
pub fn plan_write_lines<I>(width: Width, addr: u32, values: I) -> WriteLines<I::IntoIter>
where
    I: IntoIterator<Item = u32>,
{
    WriteLines {
        width,
        addr,
        values: values.into_iter().peekable(),
    }
}

/// Iterator over the command lines of a batched write
pub struct WriteLines<I: Iterator<Item = u32>> {
    width: Width,
    addr: u32,
    values: Peekable<I>,
}

impl<I: Iterator<Item = u32>> Iterator for WriteLines<I> {
    type Item = WriteLine;

    fn next(&mut self) -> Option<WriteLine> {
        let mut line_values = Vec::new();
        let mut len = WRITE_PREFIX_LEN;

        while let Some(&value) = self.values.peek() {
            let token = token_len(value);
            let count = line_values.len();
            if count > 0 && (count == MAX_VALUES_PER_LINE || len + token + 1 > MAX_LINE_LENGTH) {
                break;
            }
            len += token;
            line_values.push(value);
            self.values.next();
        }

        if line_values.is_empty() {
            return None;
        }

        let addr = self.addr;
        let count = line_values.len();
        self.addr = addr.wrapping_add((count * self.width.size()) as u32);
        let text = MonitorCommand::Write {
            width: self.width,
            addr,
            values: line_values,
        }
        .encode();
        Some(WriteLine { addr, count, text })
    }
}

/// One write of a fill operation: `count` elements of `width` at `addr`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillOp {
    /// Start address
    pub addr: u32,
    /// Element width
    pub width: Width,
    /// Number of elements
    pub count: u32,
}

impl FillOp {
    /// Bytes covered by this write
    pub fn len(&self) -> u32 {
        self.count * self.width.size() as u32
    }

    /// Whether the write covers no bytes
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Decompose a fill of `size` bytes at `addr` into byte and word writes.
///
/// While the address is unaligned or fewer than four bytes remain,
/// `size % 4` bytes (or one byte if that is zero) are written with byte
/// width. Otherwise all remaining whole words are written at once.
pub fn plan_memset(addr: u32, size: u32) -> Vec<FillOp> {
    let mut ops = Vec::new();
    let mut addr = addr;
    let mut size = size;

    while size > 0 {
        let op = if addr & 3 != 0 || size < 4 {
            let n = match size & 3 {
                0 => 1,
                n => n,
            };
            FillOp {
                addr,
                width: Width::Byte,
                count: n,
            }
        } else {
            FillOp {
                addr,
                width: Width::Word,
                count: size / 4,
            }
        };
        addr = addr.wrapping_add(op.len());
        size -= op.len();
        ops.push(op);
    }

    ops
}
