//! Monitor context
//!
//! [`Monitor`] is the context handed to every driver: it owns the
//! [`Connection`] and turns register and memory operations into monitor
//! commands.

use std::fs;
use std::iter;
use std::path::Path;
use tracing::{debug, info};

use super::{plan_memset, plan_write_lines, AccessError, RegisterAccess};
use crate::protocol::{
    Connection, ConnectionConfig, Decoded, MonitorCommand, ProtocolError, Reply, Width,
};

/// Memory and register access through a live monitor session
pub struct Monitor {
    conn: Connection,
}

impl Monitor {
    /// Wrap an established connection
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Open the serial port from `config` and check that a monitor answers
    pub fn open(config: ConnectionConfig) -> Result<Self, AccessError> {
        let mut conn = Connection::open(config)?;
        if !conn.probe()? {
            return Err(ProtocolError::ConnectionFailed(format!(
                "no monitor prompt on {}",
                conn.config().port_name
            ))
            .into());
        }
        Ok(Self::new(conn))
    }

    /// The underlying connection
    pub fn connection(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Give back the connection
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Run `command`, returning the monitor's reply.
    ///
    /// Commands that hand control away from the monitor are sent without
    /// waiting for a prompt and yield an empty reply.
    pub fn run(&mut self, command: &MonitorCommand) -> Result<Vec<u8>, AccessError> {
        let text = command.encode();
        let reply = if command.returns_control() {
            self.conn.send(&text)?
        } else {
            self.conn.send_noreturn(&text)?
        };
        check(text, reply)
    }

    /// Read `count` elements starting at `addr`
    pub fn read_many(
        &mut self,
        width: Width,
        addr: u32,
        count: usize,
    ) -> Result<Decoded, AccessError> {
        if count == 0 {
            return Ok(Decoded::shape(width, 0, Vec::new()).unwrap_or(Decoded::Words(Vec::new())));
        }

        let data = self.run(&MonitorCommand::Read { width, addr, count })?;
        let values = crate::protocol::decode(&data);
        let got = values.len();
        Decoded::shape(width, count, values).ok_or(AccessError::ShortRead {
            expected: count,
            got,
        })
    }

    /// Write consecutive elements starting at `addr`, batching them into as
    /// few command lines as the monitor's line buffer allows
    pub fn write_many(
        &mut self,
        width: Width,
        addr: u32,
        values: &[u32],
    ) -> Result<(), AccessError> {
        if let Some(&value) = values.iter().find(|&&v| v & !width.mask() != 0) {
            return Err(AccessError::ValueTooWide { value, width });
        }

        self.send_lines(width, addr, values.iter().copied())
    }

    fn send_lines<I>(&mut self, width: Width, addr: u32, values: I) -> Result<(), AccessError>
    where
        I: IntoIterator<Item = u32>,
    {
        for line in plan_write_lines(width, addr, values) {
            debug!(addr = line.addr, count = line.count, "write line");
            let reply = self.conn.send(&line.text)?;
            check(line.text, reply)?;
        }
        Ok(())
    }

    /// Write raw bytes starting at `addr`
    pub fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Result<(), AccessError> {
        let values: Vec<u32> = data.iter().copied().map(u32::from).collect();
        self.write_many(Width::Byte, addr, &values)
    }

    /// Fill `size` bytes at `addr` with `value`, using word writes where
    /// alignment allows
    pub fn memset(&mut self, addr: u32, value: u8, size: u32) -> Result<(), AccessError> {
        let word = u32::from_ne_bytes([value; 4]);
        for op in plan_memset(addr, size) {
            let fill = match op.width {
                Width::Word => word,
                _ => u32::from(value) & op.width.mask(),
            };
            let values = iter::repeat(fill).take(op.count as usize);
            self.send_lines(op.width, op.addr, values)?;
        }
        Ok(())
    }

    /// Program `size` bytes of flash at `flash_addr` from RAM at `mem_addr`
    pub fn flash(&mut self, mem_addr: u32, flash_addr: u32, size: u32) -> Result<(), AccessError> {
        info!(mem_addr, flash_addr, size, "programming flash");
        self.run(&MonitorCommand::Flash {
            mem_addr,
            flash_addr,
            size,
        })?;
        Ok(())
    }

    /// Transfer control to `addr`. The monitor does not come back.
    pub fn call(&mut self, addr: u32, args: [u32; 4]) -> Result<(), AccessError> {
        info!(addr, "calling target code");
        self.run(&MonitorCommand::Call { addr, args })?;
        Ok(())
    }

    /// Commit pending state on the target
    pub fn sync(&mut self) -> Result<(), AccessError> {
        self.run(&MonitorCommand::Sync)?;
        Ok(())
    }

    /// The monitor's own text for a read of `count` elements at `addr`
    pub fn dump(&mut self, width: Width, addr: u32, count: usize) -> Result<String, AccessError> {
        let data = self.run(&MonitorCommand::Read { width, addr, count })?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    /// Load a file into target memory at `addr`, returning its size
    pub fn write_file<P: AsRef<Path>>(&mut self, addr: u32, path: P) -> Result<usize, AccessError> {
        let data = fs::read(path.as_ref())?;
        info!(path = %path.as_ref().display(), addr, len = data.len(), "loading file");
        self.write_bytes(addr, &data)?;
        Ok(data.len())
    }
}

fn check(command: String, reply: Reply) -> Result<Vec<u8>, AccessError> {
    if reply.ok {
        return Ok(reply.data);
    }
    let reason = reply
        .failure
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no prompt".to_string());
    Err(AccessError::CommandFailed { command, reason })
}

impl RegisterAccess for Monitor {
    fn read(&mut self, width: Width, addr: u32) -> Result<u32, AccessError> {
        match self.read_many(width, addr, 1)? {
            Decoded::Scalar(value) => Ok(value & width.mask()),
            other => Err(AccessError::ShortRead {
                expected: 1,
                got: other.len(),
            }),
        }
    }

    fn write(&mut self, width: Width, addr: u32, value: u32) -> Result<(), AccessError> {
        self.write_many(width, addr, &[value])
    }

    fn copy(
        &mut self,
        width: Width,
        dest: u32,
        src: u32,
        count: usize,
    ) -> Result<(), AccessError> {
        self.run(&MonitorCommand::Copy {
            width,
            dest,
            src,
            count,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Transport, LINE_ACK, PROMPT};
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Echoes typed bytes and answers every line with a canned reply
    #[derive(Clone, Default)]
    struct Canned {
        inner: Arc<Mutex<CannedState>>,
    }

    #[derive(Default)]
    struct CannedState {
        inbox: VecDeque<u8>,
        typed: Vec<u8>,
        lines: Vec<String>,
        replies: VecDeque<Vec<u8>>,
    }

    impl Read for Canned {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut state = self.inner.lock().unwrap();
            let n = buf.len().min(state.inbox.len());
            for slot in buf.iter_mut().take(n) {
                *slot = state.inbox.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for Canned {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut state = self.inner.lock().unwrap();
            for &b in buf {
                if b == b'\n' {
                    let line = String::from_utf8(std::mem::take(&mut state.typed)).unwrap();
                    state.lines.push(line);
                    state.inbox.extend(LINE_ACK);
                    let reply = state.replies.pop_front().unwrap_or_default();
                    state.inbox.extend(reply);
                    state.inbox.extend(PROMPT);
                } else {
                    state.typed.push(b);
                    state.inbox.push_back(b);
                }
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Transport for Canned {
        fn read_timeout(&self) -> Duration {
            Duration::from_millis(10)
        }

        fn bytes_to_read(&mut self) -> io::Result<u32> {
            Ok(self.inner.lock().unwrap().inbox.len() as u32)
        }

        fn clear_input_buffer(&mut self) -> io::Result<()> {
            self.inner.lock().unwrap().inbox.clear();
            Ok(())
        }

        fn speed(&self) -> u32 {
            115200
        }

        fn set_speed(&mut self, _baud_rate: u32) -> io::Result<()> {
            Ok(())
        }
    }

    fn monitor(replies: &[&str]) -> (Monitor, Canned) {
        let link = Canned::default();
        link.inner.lock().unwrap().replies = replies.iter().map(|r| r.as_bytes().to_vec()).collect();
        let mut config = ConnectionConfig::default();
        config.channel.prompt_timeout_ms = 50;
        config.channel.poll_interval_ms = 1;
        let conn = Connection::with_transport(Box::new(link.clone()), config).unwrap();
        (Monitor::new(conn), link)
    }

    fn lines(link: &Canned) -> Vec<String> {
        link.inner.lock().unwrap().lines.clone()
    }

    #[test]
    fn test_read32_decodes_scalar() {
        let (mut mon, link) = monitor(&["bf540010: 12345678\r\n"]);
        assert_eq!(mon.read32(0xbf54_0010).unwrap(), 0x1234_5678);
        assert_eq!(lines(&link), vec!["rw bf540010 1"]);
    }

    #[test]
    fn test_read_many_bytes() {
        let (mut mon, _) = monitor(&["00001000: 48 69 21\r\n"]);
        assert_eq!(
            mon.read_many(Width::Byte, 0x1000, 3).unwrap(),
            Decoded::Bytes(b"Hi!".to_vec())
        );
    }

    #[test]
    fn test_short_read() {
        let (mut mon, _) = monitor(&["00001000: 1 2\r\n"]);
        assert!(matches!(
            mon.read_many(Width::Word, 0x1000, 4),
            Err(AccessError::ShortRead {
                expected: 4,
                got: 2
            })
        ));
    }

    #[test]
    fn test_copy_and_sync_commands() {
        let (mut mon, link) = monitor(&[]);
        mon.copy32(0x8000_0000, 0x9e00_0000, 0x10).unwrap();
        mon.sync().unwrap();
        mon.flash(0x8000_0000, 0x1_0000, 0x100).unwrap();
        assert_eq!(
            lines(&link),
            vec![
                "cw 9e000000 80000000 16",
                "sync",
                "fl 80000000 00010000 0x100"
            ]
        );
    }

    #[test]
    fn test_memset_sends_planned_writes() {
        let (mut mon, link) = monitor(&[]);
        mon.memset(0x10001, 0xab, 6).unwrap();
        assert_eq!(
            lines(&link),
            vec![
                "wb 00010001 0xab 0xab",
                "wb 00010003 0xab",
                "wb 00010004 0xab 0xab 0xab",
            ]
        );

        mon.memset(0x2000, 0x5a, 8).unwrap();
        assert_eq!(lines(&link)[3], "ww 00002000 0x5a5a5a5a 0x5a5a5a5a");
    }

    #[test]
    fn test_memset_streams_word_lines() {
        let (mut mon, link) = monitor(&[]);
        mon.memset(0x2000, 0xff, 0x400).unwrap();

        // 256 words at 10 per line
        let sent = lines(&link);
        assert_eq!(sent.len(), 26);
        assert!(sent[1].starts_with("ww 00002028 0xffffffff"));
        assert_eq!(sent[25], format!("ww 000023e8{}", " 0xffffffff".repeat(6)));
    }

    #[test]
    fn test_write_rejects_wide_value() {
        let (mut mon, link) = monitor(&[]);
        assert!(matches!(
            mon.write_many(Width::Half, 0, &[0x1_0000]),
            Err(AccessError::ValueTooWide { .. })
        ));
        assert!(lines(&link).is_empty());
    }

    #[test]
    fn test_write_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        fs::write(&path, [1u8, 2, 3]).unwrap();

        let (mut mon, link) = monitor(&[]);
        assert_eq!(mon.write_file(0x8000_0000, &path).unwrap(), 3);
        assert_eq!(lines(&link), vec!["wb 80000000 0x1 0x2 0x3"]);
    }

    #[test]
    fn test_dump_returns_monitor_text() {
        let (mut mon, _) = monitor(&["00000000: 00000001 00000002\r\n"]);
        let text = mon.dump(Width::Word, 0, 2).unwrap();
        assert_eq!(text, "00000000: 00000001 00000002\r\n");
    }
}
