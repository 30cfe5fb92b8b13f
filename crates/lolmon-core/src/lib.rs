//! # lolmon Core Library
//!
//! Host side of the lolmon serial debug monitor.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - A reliable command channel over the monitor's echoing serial console
//! - Decoding of the monitor's hex dump replies
//! - Sized register and memory access for peripheral drivers
//! - Register blocks with width composition for devices with narrow buses
//!
//! ## Example
//!
//! ```rust,ignore
//! use lolmon_core::prelude::*;
//!
//! let config = ConnectionConfig::new("/dev/ttyUSB0");
//! let mut monitor = Monitor::open(config)?;
//!
//! let uart = RegisterBlock::new("uart0", 0xbf54_0000);
//! let status = uart.read32(&mut monitor, 0x14)?;
//! monitor.memset(0x8000_0000, 0, 0x1000)?;
//! ```

pub mod memory;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::memory::{AccessError, Monitor, RegisterAccess, RegisterBlock, WidthCaps};
    pub use crate::protocol::{
        CancelToken, Connection, ConnectionConfig, Decoded, MonitorCommand, ProtocolError,
        SpeedChange, Width,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
