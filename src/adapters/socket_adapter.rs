//! Raw TCP socket transport (`TCPIP::host::port::SOCKET` resources), as used
//! by LAN instruments that expose a SCPI socket (commonly port 5025).

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

use super::{is_poll_timeout, Transport};

/// Quiet period that ends a device clear.
pub const CLEAR_QUIET: Duration = Duration::from_millis(50);

pub struct SocketAdapter {
    host: String,
    port: u16,
    stream: TcpStream,
}

impl SocketAdapter {
    /// Connect to `host:port`, giving up after `timeout`.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> io::Result<Self> {
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    debug!(host, port, "socket connected");
                    return Ok(Self {
                        host: host.to_string(),
                        port,
                        stream,
                    });
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no address for {host}:{port}"),
            )
        }))
    }
}

impl Transport for SocketAdapter {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)?;
        self.stream.flush()
    }

    fn read_available(&mut self, buf: &mut [u8], poll: Duration) -> io::Result<usize> {
        // A zero read timeout is rejected by the OS.
        self.stream
            .set_read_timeout(Some(poll.max(Duration::from_millis(1))))?;
        match self.stream.read(buf) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by instrument",
            )),
            Ok(n) => Ok(n),
            Err(e) if is_poll_timeout(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Drain input until the line has been quiet for [`CLEAR_QUIET`].
    fn clear(&mut self) -> io::Result<()> {
        let mut scratch = [0u8; 512];
        self.stream.set_read_timeout(Some(CLEAR_QUIET))?;
        loop {
            match self.stream.read(&mut scratch) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed by instrument",
                    ))
                }
                Ok(n) => debug!(host = %self.host, port = self.port, discarded = n, "clear"),
                Err(e) if is_poll_timeout(&e) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match self.stream.shutdown(std::net::Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        }
    }

    fn info(&self) -> String {
        format!("SocketAdapter({}:{})", self.host, self.port)
    }
}
