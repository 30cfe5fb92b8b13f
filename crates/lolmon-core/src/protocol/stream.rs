//! Byte transports
//!
//! Pure byte I/O with a bounded wait. No framing and no retries happen here;
//! that is the job of [`CommandChannel`](super::CommandChannel).

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// A duplex byte stream to the monitor
pub trait Transport: Read + Write + Send {
    /// Upper bound on how long [`read_exact_timeout`](Self::read_exact_timeout) may block
    fn read_timeout(&self) -> Duration;

    /// Number of bytes that can be read without blocking
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Discard buffered input
    fn clear_input_buffer(&mut self) -> io::Result<()>;

    /// Current line speed in baud
    fn speed(&self) -> u32;

    /// Change the local line speed
    fn set_speed(&mut self, baud_rate: u32) -> io::Result<()>;

    /// Read `n` bytes, blocking at most [`read_timeout`](Self::read_timeout).
    ///
    /// Returns fewer than `n` bytes if the timeout expires first.
    fn read_exact_timeout(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let deadline = Instant::now() + self.read_timeout();
        let mut out = Vec::with_capacity(n);
        let mut buf = [0u8; 256];

        while out.len() < n {
            let want = (n - out.len()).min(buf.len());
            match self.read(&mut buf[..want]) {
                Ok(0) => {
                    if Instant::now() >= deadline {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Ok(k) => out.extend_from_slice(&buf[..k]),
                Err(ref e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    if Instant::now() >= deadline {
                        break;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        Ok(out)
    }

    /// Read everything that is currently available without blocking
    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0u8; 512];
        loop {
            let available = self.bytes_to_read()? as usize;
            if available == 0 {
                return Ok(out);
            }
            let want = available.min(buf.len());
            match self.read(&mut buf[..want]) {
                Ok(0) => return Ok(out),
                Ok(k) => out.extend_from_slice(&buf[..k]),
                Err(ref e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    return Ok(out)
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Whether at least one byte is waiting
    fn poll_readable(&mut self) -> io::Result<bool> {
        Ok(self.bytes_to_read()? > 0)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_timeout(&self) -> Duration {
        (**self).read_timeout()
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        (**self).bytes_to_read()
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        (**self).clear_input_buffer()
    }

    fn speed(&self) -> u32 {
        (**self).speed()
    }

    fn set_speed(&mut self, baud_rate: u32) -> io::Result<()> {
        (**self).set_speed(baud_rate)
    }

    fn read_exact_timeout(&mut self, n: usize) -> io::Result<Vec<u8>> {
        (**self).read_exact_timeout(n)
    }

    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        (**self).read_available()
    }

    fn poll_readable(&mut self) -> io::Result<bool> {
        (**self).poll_readable()
    }
}

fn other_error(e: serialport::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

/// Serial port transport
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialChannel {
    /// Wrap an already opened and configured port
    pub fn new(port: Box<dyn SerialPort>, read_timeout: Duration) -> Self {
        let baud_rate = port.baud_rate().unwrap_or(super::DEFAULT_BAUD_RATE);
        Self {
            port,
            baud_rate,
            read_timeout,
        }
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Transport for SerialChannel {
    fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port.bytes_to_read().map_err(other_error)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(other_error)
    }

    fn speed(&self) -> u32 {
        self.baud_rate
    }

    fn set_speed(&mut self, baud_rate: u32) -> io::Result<()> {
        self.port.set_baud_rate(baud_rate).map_err(other_error)?;
        self.baud_rate = baud_rate;
        Ok(())
    }
}

/// TCP transport, for consoles exported by a serial-to-network bridge.
///
/// The line speed is owned by the bridge, so [`Transport::set_speed`] only
/// records the value.
pub struct TcpChannel {
    stream: TcpStream,
    baud_rate: u32,
    read_timeout: Duration,
}

impl TcpChannel {
    /// Connect to a bridge
    pub fn connect<A: ToSocketAddrs>(addr: A, read_timeout: Duration) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Self::new(stream, read_timeout)
    }

    /// Wrap a connected stream
    pub fn new(stream: TcpStream, read_timeout: Duration) -> io::Result<Self> {
        stream.set_read_timeout(Some(read_timeout))?;
        Ok(Self {
            stream,
            baud_rate: super::DEFAULT_BAUD_RATE,
            read_timeout,
        })
    }
}

impl Read for TcpChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Transport for TcpChannel {
    fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.stream.set_nonblocking(true)?;
        let mut buf = [0u8; 4096];
        let result = self.stream.peek(&mut buf);
        self.stream.set_nonblocking(false)?;

        match result {
            Ok(n) => Ok(n as u32),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.stream.set_nonblocking(true)?;
        let mut buf = [0u8; 1024];
        let result = loop {
            match self.stream.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.stream.set_nonblocking(false)?;
        result
    }

    fn speed(&self) -> u32 {
        self.baud_rate
    }

    fn set_speed(&mut self, baud_rate: u32) -> io::Result<()> {
        self.baud_rate = baud_rate;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn loopback_pair() -> (TcpChannel, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpChannel::connect(addr, Duration::from_millis(200)).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn test_tcp_read_exact_timeout_returns_partial() {
        let (mut client, mut server) = loopback_pair();
        server.write_all(b"ab").unwrap();

        let got = client.read_exact_timeout(4).unwrap();
        assert_eq!(got, b"ab".to_vec());
    }

    #[test]
    fn test_tcp_read_available_and_poll() {
        let (mut client, mut server) = loopback_pair();
        assert!(!client.poll_readable().unwrap());

        server.write_all(b"00000000: 1\r\n> ").unwrap();
        std::thread::sleep(Duration::from_millis(50));

        assert!(client.poll_readable().unwrap());
        let got = client.read_available().unwrap();
        assert_eq!(got, b"00000000: 1\r\n> ".to_vec());
        assert!(!client.poll_readable().unwrap());
    }

    #[test]
    fn test_tcp_speed_is_recorded() {
        let (mut client, _server) = loopback_pair();
        assert_eq!(client.speed(), crate::protocol::DEFAULT_BAUD_RATE);
        client.set_speed(921600).unwrap();
        assert_eq!(client.speed(), 921600);
    }
}
