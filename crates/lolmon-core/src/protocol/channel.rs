//! Command channel
//!
//! Turns a command string into a reliably delivered request over a lossy,
//! locally echoing byte stream, and collects the reply up to the prompt.
//!
//! Each command is typed in chunks. After every chunk the echo is read back
//! and compared byte for byte. On a mismatch the half-typed line is discarded
//! with Ctrl-U, pending input is drained and the whole command is typed again
//! one byte at a time. Once the full line has been echoed, a newline submits
//! it, the monitor acknowledges with `\r\n`, and everything up to the next
//! prompt is the reply.

use std::borrow::Cow;
use std::io::Write;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use super::{
    validate_command, CancelToken, ChannelConfig, ProtocolError, Transport, CANCEL_LINE,
    LINE_ACK, LINE_TERMINATOR, PROMPT,
};

/// Where the channel is in the exchange of one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No command in flight
    Idle,
    /// Writing chunk `chunk` of the command
    Sending { chunk: usize },
    /// Reading back the echo of chunk `chunk`
    VerifyingEcho { chunk: usize },
    /// Newline written, waiting for `\r\n`
    AwaitingAck,
    /// Collecting the reply until the prompt shows up
    AwaitingPrompt,
    /// Last command finished; `ok` is false on timeout or retry exhaustion
    Done { ok: bool },
}

/// Outcome of a command
#[derive(Debug)]
pub struct Reply {
    /// Bytes received after the line ack, without the prompt
    pub data: Vec<u8>,
    /// Whether the prompt was seen (or, for fire-and-forget commands, the
    /// line was accepted)
    pub ok: bool,
    /// Why `ok` is false
    pub failure: Option<ProtocolError>,
    /// Attempts used, including the successful one
    pub attempts: u32,
}

impl Reply {
    fn success(data: Vec<u8>, attempts: u32) -> Self {
        Self {
            data,
            ok: true,
            failure: None,
            attempts,
        }
    }

    fn failed(data: Vec<u8>, failure: ProtocolError, attempts: u32) -> Self {
        Self {
            data,
            ok: false,
            failure: Some(failure),
            attempts,
        }
    }

    /// Reply text, lossily decoded
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

/// Traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Bytes written to the transport
    pub tx_bytes: u64,
    /// Bytes read from the transport
    pub rx_bytes: u64,
    /// Commands submitted through `send` or `send_noreturn`
    pub commands: u64,
    /// Cancel-and-drain cycles after a failed attempt
    pub resyncs: u64,
}

/// Reliable request/reply channel to the monitor
pub struct CommandChannel<T: Transport> {
    transport: T,
    config: ChannelConfig,
    cancel: CancelToken,
    state: ChannelState,
    stats: ChannelStats,
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

impl<T: Transport> CommandChannel<T> {
    /// Create a channel over `transport`
    pub fn new(transport: T, config: ChannelConfig) -> Result<Self, ProtocolError> {
        config.validate()?;
        Ok(Self {
            transport,
            config,
            cancel: CancelToken::new(),
            state: ChannelState::Idle,
            stats: ChannelStats::default(),
        })
    }

    /// Use `token` as the abort signal
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Handle to the abort signal checked by this channel
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Current protocol state
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Traffic counters
    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    /// Channel settings
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// The underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The underlying transport, for out-of-band I/O such as link probing
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Give back the transport
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Send a command and collect its reply.
    ///
    /// Echo and ack failures are retried up to the configured budget; if
    /// every attempt fails, an empty reply with `ok == false` is returned.
    /// A missing prompt yields the partial reply with `ok == false`.
    ///
    /// `Err` is returned for malformed commands, transport I/O failures and
    /// operator aborts. After an abort the link has been drained and the
    /// channel can be used again.
    pub fn send(&mut self, command: &str) -> Result<Reply, ProtocolError> {
        self.submit(command, true)
    }

    /// Send a command that hands control away from the monitor.
    ///
    /// Identical to [`send`](Self::send) up to the line ack; no prompt is
    /// awaited afterwards.
    pub fn send_noreturn(&mut self, command: &str) -> Result<Reply, ProtocolError> {
        self.submit(command, false)
    }

    /// Drain pending input, then run an empty command so the monitor shows a
    /// fresh prompt
    pub fn flush(&mut self) -> Result<Reply, ProtocolError> {
        self.drain()?;
        self.send("")
    }

    fn submit(&mut self, command: &str, await_prompt: bool) -> Result<Reply, ProtocolError> {
        validate_command(command)?;
        let cmd = command.as_bytes();
        self.stats.commands += 1;

        let attempts = self.config.echo_attempts;
        let mut chunk_size = self.config.chunk_size;

        for attempt in 1..=attempts {
            debug!(command, attempt, chunk_size, "sending command");

            match self.attempt(cmd, chunk_size) {
                Ok(prefix) if await_prompt => {
                    return self.collect_reply(command, prefix, attempt);
                }
                Ok(_) => {
                    self.state = ChannelState::Done { ok: true };
                    return Ok(Reply::success(Vec::new(), attempt));
                }
                Err(e) if e.is_transient() => {
                    warn!(command, attempt, "{}", e);
                    self.resync()?;
                    // Byte at a time for the rest of this command
                    chunk_size = 1;
                }
                Err(e) => {
                    if !matches!(e, ProtocolError::Cancelled) {
                        self.state = ChannelState::Done { ok: false };
                    }
                    return Err(e);
                }
            }
        }

        error!(command, attempts, "giving up on command");
        self.state = ChannelState::Done { ok: false };
        Ok(Reply::failed(
            Vec::new(),
            ProtocolError::RetryExhausted { attempts },
            attempts,
        ))
    }

    /// Type the command, submit it and check the line ack.
    ///
    /// Returns bytes that arrived in place of the ack when the ack is
    /// tolerated; they belong to the reply.
    fn attempt(&mut self, cmd: &[u8], chunk_size: usize) -> Result<Vec<u8>, ProtocolError> {
        self.enter_with_echo(cmd, chunk_size)?;

        self.state = ChannelState::AwaitingAck;
        self.write(&[LINE_TERMINATOR])?;
        let ack = self.transport.read_exact_timeout(LINE_ACK.len())?;
        self.stats.rx_bytes += ack.len() as u64;

        if ack == LINE_ACK {
            Ok(Vec::new())
        } else if self.config.tolerate_missing_ack {
            debug!(received = ?ack, "line ack missing, continuing");
            Ok(ack)
        } else {
            Err(ProtocolError::AckViolation { received: ack })
        }
    }

    fn enter_with_echo(&mut self, cmd: &[u8], chunk_size: usize) -> Result<(), ProtocolError> {
        for (index, chunk) in cmd.chunks(chunk_size).enumerate() {
            if self.cancel.is_cancelled() {
                return Err(self.abort(index > 0));
            }

            self.state = ChannelState::Sending { chunk: index };
            self.write(chunk)?;

            self.state = ChannelState::VerifyingEcho { chunk: index };
            let echo = self.transport.read_exact_timeout(chunk.len())?;
            self.stats.rx_bytes += echo.len() as u64;
            debug!(chunk = ?String::from_utf8_lossy(chunk), echo = ?String::from_utf8_lossy(&echo), "echo");

            if echo != chunk {
                return Err(ProtocolError::EchoMismatch {
                    sent: chunk.to_vec(),
                    received: echo,
                });
            }
        }
        Ok(())
    }

    fn collect_reply(
        &mut self,
        command: &str,
        prefix: Vec<u8>,
        attempt: u32,
    ) -> Result<Reply, ProtocolError> {
        self.state = ChannelState::AwaitingPrompt;
        let poll = self.config.poll_interval();
        let mut remaining = self.config.prompt_timeout();
        let mut answer = prefix;

        loop {
            // A tolerated ack slot may already hold the prompt
            if let Some(pos) = find_subslice(&answer, PROMPT) {
                answer.truncate(pos);
                self.state = ChannelState::Done { ok: true };
                return Ok(Reply::success(answer, attempt));
            }

            if self.cancel.is_cancelled() {
                return Err(self.abort(false));
            }

            if self.transport.poll_readable()? {
                let data = self.transport.read_available()?;
                self.stats.rx_bytes += data.len() as u64;
                answer.extend_from_slice(&data);
            } else if remaining.is_zero() {
                break;
            } else {
                let nap = poll.min(remaining);
                std::thread::sleep(nap);
                remaining = remaining.saturating_sub(nap);
            }
        }

        error!(
            command,
            partial = %String::from_utf8_lossy(&answer),
            "command timed out waiting for prompt"
        );
        // A late prompt would corrupt the next command's echo
        self.drain()?;
        self.state = ChannelState::Done { ok: false };
        Ok(Reply::failed(answer, ProtocolError::PromptTimeout, attempt))
    }

    /// Type a bare newline outside the retry loop and return what arrives
    /// within `settle`.
    ///
    /// Stale input is drained first so only the answer to this newline is
    /// returned.
    pub fn ping(&mut self, settle: Duration) -> Result<Vec<u8>, ProtocolError> {
        self.drain()?;
        self.write(&[LINE_TERMINATOR])?;
        std::thread::sleep(settle);

        let answer = self.transport.read_available()?;
        self.stats.rx_bytes += answer.len() as u64;
        self.state = ChannelState::Idle;
        Ok(answer)
    }

    /// Discard the half-typed line on the monitor and drain the link
    pub fn resync(&mut self) -> Result<(), ProtocolError> {
        self.write(&[CANCEL_LINE])?;
        std::thread::sleep(Duration::from_millis(self.config.resync_delay_ms));
        self.drain()?;
        self.stats.resyncs += 1;
        Ok(())
    }

    /// Read and discard input until the link is quiet.
    ///
    /// Gives up after the prompt timeout if the remote keeps talking.
    pub fn drain(&mut self) -> Result<usize, ProtocolError> {
        let deadline = Instant::now() + self.config.prompt_timeout();
        let mut discarded = 0;

        loop {
            let data = self.transport.read_available()?;
            if data.is_empty() {
                break;
            }
            discarded += data.len();
            self.stats.rx_bytes += data.len() as u64;
            debug!(data = %String::from_utf8_lossy(&data), "drained");

            if Instant::now() >= deadline {
                warn!(discarded, "input still arriving after drain budget");
                break;
            }
            std::thread::sleep(self.config.poll_interval());
        }

        Ok(discarded)
    }

    /// Bring the link back to idle after an operator abort
    fn abort(&mut self, mid_line: bool) -> ProtocolError {
        warn!("command aborted, resynchronizing");
        std::thread::sleep(Duration::from_millis(self.config.cancel_settle_ms));

        let settled = self.settle(mid_line);

        self.cancel.take();
        self.state = ChannelState::Idle;
        match settled {
            Ok(()) => ProtocolError::Cancelled,
            Err(e) => e,
        }
    }

    fn settle(&mut self, mid_line: bool) -> Result<(), ProtocolError> {
        if mid_line {
            self.write(&[CANCEL_LINE])?;
        }
        self.drain()?;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.transport.write_all(data)?;
        self.transport.flush()?;
        self.stats.tx_bytes += data.len() as u64;
        Ok(())
    }
}
