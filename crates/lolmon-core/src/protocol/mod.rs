//! Monitor Link Protocol
//!
//! Implements the line-oriented ASCII protocol spoken by the lolmon debug
//! monitor over a serial link.
//!
//! Every command is typed into the monitor as if by a human at a terminal:
//! the monitor echoes each byte, answers the terminating newline with
//! `\r\n`, prints its reply and finally shows the `"> "` prompt again.

mod cancel;
mod channel;
pub mod commands;
mod config;
mod connection;
pub mod decoder;
mod error;
pub mod serial;
pub mod stream;

pub use cancel::CancelToken;
pub use channel::{ChannelState, ChannelStats, CommandChannel, Reply};
pub use commands::{validate_command, MonitorCommand, Width};
pub use config::{ChannelConfig, ConnectionConfig};
pub use connection::{Connection, SpeedChange};
pub use decoder::{decode, parse_line, Decoded};
pub use error::ProtocolError;
pub use serial::{clear_buffers, configure_port, list_ports, open_port, PortInfo};
pub use stream::{SerialChannel, TcpChannel, Transport};

/// Default baud rate of the monitor's console UART
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default per-call timeout for bounded reads in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;

/// Default wall-clock budget for the prompt to appear in milliseconds
pub const DEFAULT_PROMPT_TIMEOUT_MS: u64 = 1000;

/// Default number of command bytes written before the echo is checked
pub const DEFAULT_CHUNK_SIZE: usize = 0x38;

/// Default number of attempts per command before giving up
pub const DEFAULT_ECHO_ATTEMPTS: u32 = 3;

/// Marker printed by the monitor when it is ready for the next command
pub const PROMPT: &[u8] = b"> ";

/// Acknowledgment of the newline that terminates a command line
pub const LINE_ACK: &[u8] = b"\r\n";

/// Line terminator sent after a command
pub const LINE_TERMINATOR: u8 = b'\n';

/// Ctrl-U, makes the monitor discard the line typed so far
pub const CANCEL_LINE: u8 = 0x15;
