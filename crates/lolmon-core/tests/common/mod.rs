//! Simulated lolmon monitor on the far end of an in-memory link

#![allow(dead_code)]

use lolmon_core::protocol::{
    CancelToken, ChannelConfig, Connection, ConnectionConfig, Transport, CANCEL_LINE, LINE_ACK,
    PROMPT,
};
use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Register that sets the monitor's line speed; the value written is the baud rate
pub const SPEED_REGISTER: u32 = 0xbf54_0040;

pub const BOOT_SPEED: u32 = 115200;

/// Monitor state shared between the test and the link
pub struct FakeState {
    /// Target memory, byte addressed, zero where unset
    pub memory: BTreeMap<u32, u8>,
    /// Every command line the monitor executed
    pub lines: Vec<String>,
    /// Addresses passed to `call`
    pub calls: Vec<u32>,
    /// Text printed before every reply
    pub banner: Option<String>,
    /// Number of upcoming echo bytes to corrupt
    pub corrupt_echoes: usize,
    /// Stop printing prompts
    pub mute: bool,
    /// Speed the host side uses
    pub host_speed: u32,
    /// Speed the monitor side uses
    pub remote_speed: u32,
    /// Raised once the reply to the next executed line is on the wire
    pub cancel_on_line: Option<CancelToken>,
    inbox: VecDeque<(u8, u32)>,
    typed: Vec<u8>,
}

impl FakeState {
    /// Queue bytes from the monitor towards the host
    pub fn emit(&mut self, bytes: &[u8]) {
        let speed = self.remote_speed;
        self.inbox.extend(bytes.iter().map(|&b| (b, speed)));
    }

    pub fn read_mem(&self, addr: u32, size: usize) -> u32 {
        (0..size).fold(0u32, |acc, i| {
            let b = self.memory.get(&(addr + i as u32)).copied().unwrap_or(0);
            acc | (u32::from(b) << (8 * i))
        })
    }

    pub fn write_mem(&mut self, addr: u32, size: usize, value: u32) {
        for i in 0..size {
            self.memory.insert(addr + i as u32, (value >> (8 * i)) as u8);
        }
    }

    fn receive(&mut self, byte: u8) {
        // Bytes sent at the wrong speed arrive mangled
        let byte = if self.host_speed == self.remote_speed {
            byte
        } else {
            byte | 0x80
        };

        match byte {
            CANCEL_LINE => self.typed.clear(),
            b'\n' => {
                let line = String::from_utf8_lossy(&std::mem::take(&mut self.typed)).into_owned();
                self.emit(LINE_ACK);
                self.execute(&line);
            }
            _ => {
                self.typed.push(byte);
                let echo = if self.corrupt_echoes > 0 {
                    self.corrupt_echoes -= 1;
                    byte ^ 0x20
                } else {
                    byte
                };
                self.emit(&[echo]);
            }
        }
    }

    fn execute(&mut self, line: &str) {
        self.lines.push(line.to_string());
        let words: Vec<&str> = line.split_whitespace().collect();

        let mut reply = String::new();
        if let Some(banner) = &self.banner {
            reply.push_str(banner);
            reply.push_str("\r\n");
        }

        let mut prompt = true;
        match words.as_slice() {
            [] => {}
            [op, addr, count] if op.starts_with('r') && op.len() == 2 => {
                let size = width_of(op);
                let addr = hex(addr);
                let count: usize = count.parse().unwrap_or(0);
                reply.push_str(&self.format_read(size, addr, count));
            }
            [op, addr, values @ ..] if op.starts_with('w') && op.len() == 2 => {
                let size = width_of(op);
                let mut addr = hex(addr);
                for value in values {
                    if addr == SPEED_REGISTER {
                        self.emit(reply.as_bytes());
                        reply.clear();
                        self.remote_speed = hex(value);
                    } else {
                        self.write_mem(addr, size, hex(value));
                    }
                    addr += size as u32;
                }
            }
            [op, src, dst, count] if op.starts_with('c') && op.len() == 2 => {
                let size = width_of(op);
                let (src, dst) = (hex(src), hex(dst));
                let len = count.parse::<u32>().unwrap_or(0) * size as u32;
                for i in 0..len {
                    let b = self.read_mem(src + i, 1);
                    self.write_mem(dst + i, 1, b);
                }
            }
            ["fl", mem, flash, size] => {
                let (mem, flash, size) = (hex(mem), hex(flash), hex(size));
                for i in 0..size {
                    let b = self.read_mem(mem + i, 1);
                    self.write_mem(flash + i, 1, b);
                }
            }
            ["sync"] => {}
            ["call", addr, ..] => {
                self.calls.push(hex(addr));
                prompt = false;
            }
            _ => reply.push_str("unknown command\r\n"),
        }

        self.emit(reply.as_bytes());
        if let Some(token) = self.cancel_on_line.take() {
            token.cancel();
        }
        if prompt && !self.mute {
            self.emit(PROMPT);
        }
    }

    fn format_read(&self, size: usize, addr: u32, count: usize) -> String {
        let per_line = 16 / size;
        let mut out = String::new();
        for row in 0..count.div_ceil(per_line) {
            let row_addr = addr + (row * 16) as u32;
            out.push_str(&format!("{:08x}:", row_addr));
            let n = per_line.min(count - row * per_line);
            for i in 0..n {
                let value = self.read_mem(row_addr + (i * size) as u32, size);
                out.push_str(&format!(" {:0w$x}", value, w = size * 2));
            }
            out.push_str("\r\n");
        }
        out
    }
}

fn width_of(op: &str) -> usize {
    match op.as_bytes()[1] {
        b'b' => 1,
        b'h' => 2,
        _ => 4,
    }
}

fn hex(text: &str) -> u32 {
    u32::from_str_radix(text.trim_start_matches("0x"), 16).unwrap_or(0)
}

/// Host end of the link to the simulated monitor
#[derive(Clone)]
pub struct FakeMonitor {
    state: Arc<Mutex<FakeState>>,
}

impl FakeMonitor {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                memory: BTreeMap::new(),
                lines: Vec::new(),
                calls: Vec::new(),
                banner: None,
                corrupt_echoes: 0,
                mute: false,
                host_speed: BOOT_SPEED,
                remote_speed: BOOT_SPEED,
                cancel_on_line: None,
                inbox: VecDeque::new(),
                typed: Vec::new(),
            })),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn lines(&self) -> Vec<String> {
        self.state().lines.clone()
    }

    /// Connection with short timeouts over this link
    pub fn connect(&self) -> Connection {
        self.connect_with(fast_channel())
    }

    pub fn connect_with(&self, channel: ChannelConfig) -> Connection {
        init_tracing();
        let config = ConnectionConfig {
            read_timeout_ms: 20,
            channel,
            ..ConnectionConfig::default()
        };
        Connection::with_transport(Box::new(self.clone()), config).unwrap()
    }
}

/// Route library logs to the test harness, filtered by `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn fast_channel() -> ChannelConfig {
    ChannelConfig {
        prompt_timeout_ms: 100,
        poll_interval_ms: 1,
        resync_delay_ms: 1,
        cancel_settle_ms: 1,
        ..ChannelConfig::default()
    }
}

impl Read for FakeMonitor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        let host_speed = state.host_speed;
        let mut n = 0;
        while n < buf.len() {
            match state.inbox.pop_front() {
                Some((b, speed)) => {
                    buf[n] = if speed == host_speed { b } else { b | 0x80 };
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl Write for FakeMonitor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state();
        for &b in buf {
            state.receive(b);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for FakeMonitor {
    fn read_timeout(&self) -> Duration {
        Duration::from_millis(20)
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(self.state().inbox.len() as u32)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.state().inbox.clear();
        Ok(())
    }

    fn speed(&self) -> u32 {
        self.state.lock().unwrap().host_speed
    }

    fn set_speed(&mut self, baud_rate: u32) -> io::Result<()> {
        self.state().host_speed = baud_rate;
        Ok(())
    }
}
