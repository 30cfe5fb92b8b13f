//! Memory and Register Access
//!
//! Sized reads, writes, copies and bit updates on target memory, built on
//! the command channel and the reply decoder.

mod access;
mod batch;
mod bits;
mod block;
mod monitor;

pub use access::{AccessError, RegisterAccess};
pub use batch::{
    plan_memset, plan_write_lines, FillOp, WriteLine, WriteLines, MAX_LINE_LENGTH,
    MAX_VALUES_PER_LINE,
};
pub use bits::{bit, hexdump, hexdump_at, mask};
pub use block::{RegisterBlock, WidthCaps};
pub use monitor::Monitor;
