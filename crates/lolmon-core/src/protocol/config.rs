//! Connection configuration
//!
//! Settings are stored as JSON, by default in
//! `<config dir>/lolmon/connection.json`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{
    ProtocolError, DEFAULT_BAUD_RATE, DEFAULT_CHUNK_SIZE, DEFAULT_ECHO_ATTEMPTS,
    DEFAULT_PROMPT_TIMEOUT_MS, DEFAULT_READ_TIMEOUT_MS,
};

/// Tuning of the command channel's send/verify/retry loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Bytes written before each echo check
    pub chunk_size: usize,
    /// Total attempts per command, including the first
    pub echo_attempts: u32,
    /// Wall-clock budget for the prompt after the line ack
    pub prompt_timeout_ms: u64,
    /// Sleep between polls while waiting for the prompt or draining
    pub poll_interval_ms: u64,
    /// Pause after the cancel byte before draining
    pub resync_delay_ms: u64,
    /// Pause after an operator abort before draining
    pub cancel_settle_ms: u64,
    /// Accept a missing or different line ack instead of failing the attempt
    pub tolerate_missing_ack: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            echo_attempts: DEFAULT_ECHO_ATTEMPTS,
            prompt_timeout_ms: DEFAULT_PROMPT_TIMEOUT_MS,
            poll_interval_ms: 50,
            resync_delay_ms: 10,
            cancel_settle_ms: 100,
            tolerate_missing_ack: false,
        }
    }
}

impl ChannelConfig {
    /// Reject settings the channel cannot operate with
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.chunk_size == 0 {
            return Err(ProtocolError::Config("chunk_size must be at least 1".into()));
        }
        if self.echo_attempts == 0 {
            return Err(ProtocolError::Config(
                "echo_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub(crate) fn prompt_timeout(&self) -> Duration {
        Duration::from_millis(self.prompt_timeout_ms)
    }
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Serial port name
    pub port_name: String,
    /// Initial baud rate
    pub baud_rate: u32,
    /// Timeout of a single bounded read in milliseconds
    pub read_timeout_ms: u64,
    /// Command channel settings
    pub channel: ChannelConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port_name: String::from("/dev/ttyUSB0"),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            channel: ChannelConfig::default(),
        }
    }
}

impl ConnectionConfig {
    /// Configuration for `port_name` with default settings
    pub fn new(port_name: &str) -> Self {
        Self {
            port_name: port_name.to_string(),
            ..Default::default()
        }
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Timeout of a single bounded read
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Check every setting
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.baud_rate == 0 {
            return Err(ProtocolError::Config("baud_rate must be non-zero".into()));
        }
        self.channel.validate()
    }

    /// Default location of the configuration file
    pub fn default_path() -> io::Result<PathBuf> {
        let base = dirs::config_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "Could not find config directory")
            })?;
        Ok(base.join("lolmon").join("connection.json"))
    }

    /// Load and validate a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ProtocolError> {
        let content = fs::read_to_string(path)?;
        let config: ConnectionConfig =
            serde_json::from_str(&content).map_err(|e| ProtocolError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or fall back to defaults when it does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ProtocolError> {
        match Self::load(path) {
            Err(ProtocolError::IoError(e)) if e.kind() == io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Write the configuration as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ProtocolError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ProtocolError::Config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }
}
