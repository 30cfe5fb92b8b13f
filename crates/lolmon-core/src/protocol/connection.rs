//! Connection management
//!
//! Owns the live session with the monitor: the transport, the command channel
//! on top of it and the current line speed.

use std::net::ToSocketAddrs;
use std::time::Duration;
use tracing::{info, warn};

use super::{
    clear_buffers, configure_port, open_port, CancelToken, ChannelStats, CommandChannel,
    ConnectionConfig, MonitorCommand, ProtocolError, Reply, SerialChannel, TcpChannel,
    Transport, Width, LINE_ACK, PROMPT,
};

/// Time the monitor gets to answer a bare newline during a probe
const PROBE_SETTLE: Duration = Duration::from_millis(200);

/// Register write that switches the monitor's UART to a new speed.
///
/// The divisor layout belongs to the UART driver, which computes `value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedChange {
    /// Address of the speed register
    pub register: u32,
    /// Access width of the register
    pub width: Width,
    /// Value selecting the new speed
    pub value: u32,
}

/// Live session with the monitor
pub struct Connection {
    channel: CommandChannel<Box<dyn Transport>>,
    config: ConnectionConfig,
}

impl Connection {
    /// Open the serial port named in `config`
    pub fn open(config: ConnectionConfig) -> Result<Self, ProtocolError> {
        config.validate()?;

        let mut port = open_port(&config.port_name, config.baud_rate, config.read_timeout())?;
        configure_port(port.as_mut())?;
        clear_buffers(port.as_mut())?;

        let transport = SerialChannel::new(port, config.read_timeout());
        Self::with_transport(Box::new(transport), config)
    }

    /// Connect to a monitor console exported over TCP
    pub fn connect_tcp<A: ToSocketAddrs>(
        addr: A,
        config: ConnectionConfig,
    ) -> Result<Self, ProtocolError> {
        config.validate()?;
        let transport = TcpChannel::connect(addr, config.read_timeout())
            .map_err(|e| ProtocolError::ConnectionFailed(e.to_string()))?;
        Self::with_transport(Box::new(transport), config)
    }

    /// Run the protocol over an arbitrary transport
    pub fn with_transport(
        transport: Box<dyn Transport>,
        config: ConnectionConfig,
    ) -> Result<Self, ProtocolError> {
        config.validate()?;
        let channel = CommandChannel::new(transport, config.channel.clone())?;
        Ok(Self { channel, config })
    }

    /// Use `token` as the operator abort signal
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.channel = self.channel.with_cancel_token(token);
        self
    }

    /// Connection configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Handle to the abort signal
    pub fn cancel_token(&self) -> CancelToken {
        self.channel.cancel_token()
    }

    /// Traffic counters
    pub fn stats(&self) -> ChannelStats {
        self.channel.stats()
    }

    /// Current local line speed
    pub fn speed(&self) -> u32 {
        self.channel.transport().speed()
    }

    /// The command channel
    pub fn channel(&mut self) -> &mut CommandChannel<Box<dyn Transport>> {
        &mut self.channel
    }

    /// Send a command and collect its reply
    pub fn send(&mut self, command: &str) -> Result<Reply, ProtocolError> {
        self.channel.send(command)
    }

    /// Send a command that never returns to the monitor
    pub fn send_noreturn(&mut self, command: &str) -> Result<Reply, ProtocolError> {
        self.channel.send_noreturn(command)
    }

    /// Bring the monitor back to a fresh prompt
    pub fn flush(&mut self) -> Result<Reply, ProtocolError> {
        self.channel.flush()
    }

    /// Check that a monitor is listening.
    ///
    /// Sends a bare newline and looks for the ack followed by a prompt.
    pub fn probe(&mut self) -> Result<bool, ProtocolError> {
        let answer = self.channel.ping(PROBE_SETTLE)?;

        let mut expected = LINE_ACK.to_vec();
        expected.extend_from_slice(PROMPT);
        let detected = answer.windows(expected.len()).any(|w| w == expected);

        if detected {
            info!(speed = self.speed(), "lolmon detected");
        } else {
            warn!(answer = %String::from_utf8_lossy(&answer), "no monitor prompt on link");
        }
        Ok(detected)
    }

    /// Switch both ends of the link to `baud_rate`.
    ///
    /// The register write goes out and is echo-verified at the current speed,
    /// only then does the local side switch; a probe at the new speed
    /// confirms the link. Returns whether the monitor was found again.
    pub fn change_speed(
        &mut self,
        baud_rate: u32,
        change: SpeedChange,
    ) -> Result<bool, ProtocolError> {
        if baud_rate == 0 {
            return Err(ProtocolError::Config("baud_rate must be non-zero".into()));
        }

        let command = MonitorCommand::Write {
            width: change.width,
            addr: change.register,
            values: vec![change.value],
        };
        let reply = self.channel.send_noreturn(&command.encode())?;
        if !reply.ok {
            return Err(reply
                .failure
                .unwrap_or(ProtocolError::RetryExhausted { attempts: reply.attempts }));
        }

        self.channel.transport_mut().set_speed(baud_rate)?;
        self.config.baud_rate = baud_rate;
        info!(baud_rate, "local speed changed");

        self.probe()
    }
}
