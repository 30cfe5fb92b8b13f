//! Register blocks
//!
//! A [`RegisterBlock`] models one device's register window: a base address
//! plus the access widths the device decodes natively. Wider accesses than
//! the device supports are composed from consecutive narrower ones, least
//! significant part first.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{AccessError, Monitor, RegisterAccess};
use crate::protocol::Width;

/// Words shown by [`RegisterBlock::dump`]
const DUMP_WORDS: usize = 0x20;

/// Access widths a device decodes natively
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidthCaps {
    /// 8-bit accesses
    pub byte: bool,
    /// 16-bit accesses
    pub half: bool,
    /// 32-bit accesses
    pub word: bool,
}

impl WidthCaps {
    /// Every width is native
    pub const ALL: WidthCaps = WidthCaps {
        byte: true,
        half: true,
        word: true,
    };

    /// Byte-wide device
    pub const BYTE_ONLY: WidthCaps = WidthCaps {
        byte: true,
        half: false,
        word: false,
    };

    /// 16-bit device
    pub const HALF_ONLY: WidthCaps = WidthCaps {
        byte: false,
        half: true,
        word: false,
    };

    /// 32-bit device
    pub const WORD_ONLY: WidthCaps = WidthCaps {
        byte: false,
        half: false,
        word: true,
    };

    /// Whether `width` is decoded natively
    pub fn supports(&self, width: Width) -> bool {
        match width {
            Width::Byte => self.byte,
            Width::Half => self.half,
            Width::Word => self.word,
        }
    }

    /// Width to issue for an access of `width`: itself if native, otherwise
    /// the widest native width below it
    pub fn native_for(&self, width: Width) -> Option<Width> {
        if self.supports(width) {
            return Some(width);
        }
        Width::ALL
            .iter()
            .rev()
            .copied()
            .filter(|w| *w < width)
            .find(|w| self.supports(*w))
    }
}

impl Default for WidthCaps {
    fn default() -> Self {
        Self::ALL
    }
}

/// A device's register window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBlock {
    name: String,
    base: u32,
    caps: WidthCaps,
}

impl RegisterBlock {
    /// Block at `base` accepting every access width
    pub fn new(name: &str, base: u32) -> Self {
        Self::with_caps(name, base, WidthCaps::ALL)
    }

    /// Block at `base` that only decodes the widths in `caps`
    pub fn with_caps(name: &str, base: u32, caps: WidthCaps) -> Self {
        Self {
            name: name.to_string(),
            base,
            caps,
        }
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base address
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Native access widths
    pub fn caps(&self) -> WidthCaps {
        self.caps
    }

    /// Absolute address of `offset`
    pub fn addr(&self, offset: u32) -> u32 {
        self.base.wrapping_add(offset)
    }

    fn plan(&self, width: Width) -> Result<(Width, usize), AccessError> {
        let native = self.caps.native_for(width).ok_or_else(|| {
            AccessError::UnsupportedWidth(format!(
                "{} has no native access of {:?} or narrower",
                self.name, width
            ))
        })?;
        Ok((native, width.size() / native.size()))
    }

    /// Read the register at `offset`
    pub fn read<A: RegisterAccess + ?Sized>(
        &self,
        ctx: &mut A,
        width: Width,
        offset: u32,
    ) -> Result<u32, AccessError> {
        let (native, parts) = self.plan(width)?;
        let addr = self.addr(offset);
        if parts == 1 {
            return ctx.read(width, addr);
        }

        trace!(block = %self.name, offset, ?width, ?native, "composed read");
        let step = native.size();
        let mut buf = [0u8; 4];
        for i in 0..parts {
            let part = ctx.read(native, addr.wrapping_add((i * step) as u32))?;
            LittleEndian::write_uint(&mut buf[i * step..], part.into(), step);
        }
        Ok(LittleEndian::read_uint(&buf, width.size()) as u32)
    }

    /// Write the register at `offset`
    pub fn write<A: RegisterAccess + ?Sized>(
        &self,
        ctx: &mut A,
        width: Width,
        offset: u32,
        value: u32,
    ) -> Result<(), AccessError> {
        if value & !width.mask() != 0 {
            return Err(AccessError::ValueTooWide { value, width });
        }
        let (native, parts) = self.plan(width)?;
        let addr = self.addr(offset);
        if parts == 1 {
            return ctx.write(width, addr, value);
        }

        trace!(block = %self.name, offset, ?width, ?native, "composed write");
        let step = native.size();
        let mut buf = [0u8; 4];
        LittleEndian::write_uint(&mut buf, value.into(), width.size());
        for i in 0..parts {
            let part = LittleEndian::read_uint(&buf[i * step..], step) as u32;
            ctx.write(native, addr.wrapping_add((i * step) as u32), part)?;
        }
        Ok(())
    }

    /// Set or clear bit `n` of the register at `offset`
    pub fn set_clear_bit<A: RegisterAccess + ?Sized>(
        &self,
        ctx: &mut A,
        width: Width,
        offset: u32,
        n: u32,
        set: bool,
    ) -> Result<(), AccessError> {
        if n >= width.bits() {
            return Err(AccessError::BitOutOfRange { bit: n, width });
        }
        let current = self.read(ctx, width, offset)?;
        let value = if set {
            current | super::bit(n)
        } else {
            current & !super::bit(n)
        };
        self.write(ctx, width, offset, value)
    }

    /// Read a byte register
    pub fn read8<A: RegisterAccess + ?Sized>(
        &self,
        ctx: &mut A,
        offset: u32,
    ) -> Result<u8, AccessError> {
        Ok(self.read(ctx, Width::Byte, offset)? as u8)
    }

    /// Read a half word register
    pub fn read16<A: RegisterAccess + ?Sized>(
        &self,
        ctx: &mut A,
        offset: u32,
    ) -> Result<u16, AccessError> {
        Ok(self.read(ctx, Width::Half, offset)? as u16)
    }

    /// Read a word register
    pub fn read32<A: RegisterAccess + ?Sized>(
        &self,
        ctx: &mut A,
        offset: u32,
    ) -> Result<u32, AccessError> {
        self.read(ctx, Width::Word, offset)
    }

    /// Write a byte register
    pub fn write8<A: RegisterAccess + ?Sized>(
        &self,
        ctx: &mut A,
        offset: u32,
        value: u8,
    ) -> Result<(), AccessError> {
        self.write(ctx, Width::Byte, offset, value.into())
    }

    /// Write a half word register
    pub fn write16<A: RegisterAccess + ?Sized>(
        &self,
        ctx: &mut A,
        offset: u32,
        value: u16,
    ) -> Result<(), AccessError> {
        self.write(ctx, Width::Half, offset, value.into())
    }

    /// Write a word register
    pub fn write32<A: RegisterAccess + ?Sized>(
        &self,
        ctx: &mut A,
        offset: u32,
        value: u32,
    ) -> Result<(), AccessError> {
        self.write(ctx, Width::Word, offset, value)
    }

    /// Copy `count` elements between two offsets of this block
    pub fn copy<A: RegisterAccess + ?Sized>(
        &self,
        ctx: &mut A,
        width: Width,
        dest: u32,
        src: u32,
        count: usize,
    ) -> Result<(), AccessError> {
        if !self.caps.supports(width) {
            return Err(AccessError::UnsupportedWidth(format!(
                "{} cannot copy with {:?} accesses",
                self.name, width
            )));
        }
        ctx.copy(width, self.addr(dest), self.addr(src), count)
    }

    /// The monitor's dump of the first registers of the block
    pub fn dump(&self, monitor: &mut Monitor) -> Result<String, AccessError> {
        monitor.dump(Width::Word, self.base, DUMP_WORDS)
    }
}
