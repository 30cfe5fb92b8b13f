//! Monitor commands
//!
//! Defines the command lines understood by the monitor and how they are
//! formatted on the wire. Addresses are printed as 8 lowercase hex digits,
//! written values as `0x`-prefixed hex and element counts in decimal.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ProtocolError, LINE_TERMINATOR, PROMPT};

/// Element width of a memory access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Width {
    /// 8 bits
    Byte,
    /// 16 bits
    Half,
    /// 32 bits
    Word,
}

impl Width {
    /// All widths, narrowest first
    pub const ALL: [Width; 3] = [Width::Byte, Width::Half, Width::Word];

    /// Size in bytes
    pub fn size(self) -> usize {
        match self {
            Width::Byte => 1,
            Width::Half => 2,
            Width::Word => 4,
        }
    }

    /// Width for a size in bytes
    pub fn from_size(size: usize) -> Option<Width> {
        match size {
            1 => Some(Width::Byte),
            2 => Some(Width::Half),
            4 => Some(Width::Word),
            _ => None,
        }
    }

    /// Mask covering every bit of an element
    pub fn mask(self) -> u32 {
        match self {
            Width::Byte => 0xff,
            Width::Half => 0xffff,
            Width::Word => 0xffff_ffff,
        }
    }

    /// Number of bits in an element
    pub fn bits(self) -> u32 {
        self.size() as u32 * 8
    }

    /// Mnemonic of the read command (`rb`, `rh`, `rw`)
    pub fn read_mnemonic(self) -> &'static str {
        match self {
            Width::Byte => "rb",
            Width::Half => "rh",
            Width::Word => "rw",
        }
    }

    /// Mnemonic of the write command (`wb`, `wh`, `ww`)
    pub fn write_mnemonic(self) -> &'static str {
        match self {
            Width::Byte => "wb",
            Width::Half => "wh",
            Width::Word => "ww",
        }
    }

    /// Mnemonic of the copy command (`cb`, `ch`, `cw`)
    pub fn copy_mnemonic(self) -> &'static str {
        match self {
            Width::Byte => "cb",
            Width::Half => "ch",
            Width::Word => "cw",
        }
    }
}

/// A command line for the monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorCommand {
    /// Read `count` elements starting at `addr`
    Read { width: Width, addr: u32, count: usize },

    /// Write consecutive elements starting at `addr`
    Write {
        width: Width,
        addr: u32,
        values: Vec<u32>,
    },

    /// Copy `count` elements from `src` to `dest`
    Copy {
        width: Width,
        dest: u32,
        src: u32,
        count: usize,
    },

    /// Program `size` bytes of flash at `flash_addr` from RAM at `mem_addr`
    Flash {
        mem_addr: u32,
        flash_addr: u32,
        size: u32,
    },

    /// Jump to `addr` with four arguments. Control does not come back.
    Call { addr: u32, args: [u32; 4] },

    /// Commit pending state (caches, write buffers)
    Sync,

    /// Any other text typed verbatim
    Raw(String),
}

impl MonitorCommand {
    /// Format the command line, without terminator
    pub fn encode(&self) -> String {
        match self {
            MonitorCommand::Read { width, addr, count } => {
                format!("{} {:08x} {}", width.read_mnemonic(), addr, count)
            }
            MonitorCommand::Write {
                width,
                addr,
                values,
            } => {
                let mut line = format!("{} {:08x}", width.write_mnemonic(), addr);
                for value in values {
                    line.push_str(&format!(" {:#x}", value));
                }
                line
            }
            // The monitor takes the source first
            MonitorCommand::Copy {
                width,
                dest,
                src,
                count,
            } => format!("{} {:08x} {:08x} {}", width.copy_mnemonic(), src, dest, count),
            MonitorCommand::Flash {
                mem_addr,
                flash_addr,
                size,
            } => format!("fl {:08x} {:08x} {:#x}", mem_addr, flash_addr, size),
            MonitorCommand::Call { addr, args } => format!(
                "call {:x} {} {} {} {}",
                addr, args[0], args[1], args[2], args[3]
            ),
            MonitorCommand::Sync => "sync".to_string(),
            MonitorCommand::Raw(text) => text.clone(),
        }
    }

    /// Whether the monitor prints a prompt after executing the command
    pub fn returns_control(&self) -> bool {
        !matches!(self, MonitorCommand::Call { .. })
    }
}

impl fmt::Display for MonitorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Check that `command` can be typed as a single line
pub fn validate_command(command: &str) -> Result<(), ProtocolError> {
    let bytes = command.as_bytes();
    if bytes.contains(&LINE_TERMINATOR) {
        return Err(ProtocolError::InvalidCommand(format!(
            "{:?} contains a line terminator",
            command
        )));
    }
    if bytes.windows(PROMPT.len()).any(|w| w == PROMPT) {
        return Err(ProtocolError::InvalidCommand(format!(
            "{:?} contains the prompt marker",
            command
        )));
    }
    Ok(())
}
