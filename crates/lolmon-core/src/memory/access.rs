//! Register access surface
//!
//! [`RegisterAccess`] is what peripheral drivers program against. All sized
//! helpers are provided on top of three width-generic operations.

use std::io;
use thiserror::Error;

use super::bit;
use crate::protocol::{ProtocolError, Width};

/// Failure of a memory or register operation
#[derive(Error, Debug)]
pub enum AccessError {
    /// The monitor did not complete the command
    #[error("Command '{command}' failed: {reason}")]
    CommandFailed {
        /// Command text
        command: String,
        /// What went wrong on the link
        reason: String,
    },

    /// The reply carried fewer values than requested
    #[error("Short read: expected {expected} values, got {got}")]
    ShortRead {
        /// Values requested
        expected: usize,
        /// Values decoded
        got: usize,
    },

    /// Bit index beyond the register width
    #[error("Bit {bit} out of range for {width:?} access")]
    BitOutOfRange {
        /// Requested bit
        bit: u32,
        /// Register width
        width: Width,
    },

    /// Value does not fit in the element width
    #[error("Value {value:#x} does not fit in {width:?}")]
    ValueTooWide {
        /// Offending value
        value: u32,
        /// Element width
        width: Width,
    },

    /// The device cannot be accessed with the requested width
    #[error("Unsupported access width: {0}")]
    UnsupportedWidth(String),

    /// Link-level failure, including operator aborts
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Local I/O error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl AccessError {
    /// Whether the operator aborted the operation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AccessError::Protocol(ProtocolError::Cancelled))
    }
}

/// Sized register reads, writes and copies on target memory
pub trait RegisterAccess {
    /// Read one element
    fn read(&mut self, width: Width, addr: u32) -> Result<u32, AccessError>;

    /// Write one element
    fn write(&mut self, width: Width, addr: u32, value: u32) -> Result<(), AccessError>;

    /// Copy `count` elements from `src` to `dest`
    fn copy(&mut self, width: Width, dest: u32, src: u32, count: usize)
        -> Result<(), AccessError>;

    /// Set or clear bit `n` with a read-modify-write. Not atomic.
    fn set_clear_bit(
        &mut self,
        width: Width,
        addr: u32,
        n: u32,
        set: bool,
    ) -> Result<(), AccessError> {
        if n >= width.bits() {
            return Err(AccessError::BitOutOfRange { bit: n, width });
        }
        let current = self.read(width, addr)?;
        let value = if set {
            current | bit(n)
        } else {
            current & !bit(n)
        };
        self.write(width, addr, value)
    }

    /// Read a byte
    fn read8(&mut self, addr: u32) -> Result<u8, AccessError> {
        Ok(self.read(Width::Byte, addr)? as u8)
    }

    /// Read a half word
    fn read16(&mut self, addr: u32) -> Result<u16, AccessError> {
        Ok(self.read(Width::Half, addr)? as u16)
    }

    /// Read a word
    fn read32(&mut self, addr: u32) -> Result<u32, AccessError> {
        self.read(Width::Word, addr)
    }

    /// Write a byte
    fn write8(&mut self, addr: u32, value: u8) -> Result<(), AccessError> {
        self.write(Width::Byte, addr, value.into())
    }

    /// Write a half word
    fn write16(&mut self, addr: u32, value: u16) -> Result<(), AccessError> {
        self.write(Width::Half, addr, value.into())
    }

    /// Write a word
    fn write32(&mut self, addr: u32, value: u32) -> Result<(), AccessError> {
        self.write(Width::Word, addr, value)
    }

    /// Copy bytes
    fn copy8(&mut self, dest: u32, src: u32, count: usize) -> Result<(), AccessError> {
        self.copy(Width::Byte, dest, src, count)
    }

    /// Copy half words
    fn copy16(&mut self, dest: u32, src: u32, count: usize) -> Result<(), AccessError> {
        self.copy(Width::Half, dest, src, count)
    }

    /// Copy words
    fn copy32(&mut self, dest: u32, src: u32, count: usize) -> Result<(), AccessError> {
        self.copy(Width::Word, dest, src, count)
    }

    /// Set or clear a bit of a byte register
    fn setclr8(&mut self, addr: u32, n: u32, set: bool) -> Result<(), AccessError> {
        self.set_clear_bit(Width::Byte, addr, n, set)
    }

    /// Set or clear a bit of a half word register
    fn setclr16(&mut self, addr: u32, n: u32, set: bool) -> Result<(), AccessError> {
        self.set_clear_bit(Width::Half, addr, n, set)
    }

    /// Set or clear a bit of a word register
    fn setclr32(&mut self, addr: u32, n: u32, set: bool) -> Result<(), AccessError> {
        self.set_clear_bit(Width::Word, addr, n, set)
    }
}

impl<A: RegisterAccess + ?Sized> RegisterAccess for &mut A {
    fn read(&mut self, width: Width, addr: u32) -> Result<u32, AccessError> {
        (**self).read(width, addr)
    }

    fn write(&mut self, width: Width, addr: u32, value: u32) -> Result<(), AccessError> {
        (**self).write(width, addr, value)
    }

    fn copy(
        &mut self,
        width: Width,
        dest: u32,
        src: u32,
        count: usize,
    ) -> Result<(), AccessError> {
        (**self).copy(width, dest, src, count)
    }
}
