//! Serial transport for RS-232/USB-serial instruments (`ASRL` resources).

use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::debug;

use serialport::{ClearBuffer, SerialPort};

use super::{is_poll_timeout, Transport};

/// Serial adapter wrapping the `serialport` crate.
pub struct SerialAdapter {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    port_name: String,

    /// Baud rate (e.g., 9600, 115200)
    baud_rate: u32,

    port: Box<dyn SerialPort>,
}

impl SerialAdapter {
    /// Open `port_name` at `baud_rate`.
    pub fn open(port_name: &str, baud_rate: u32) -> io::Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(100)) // Internal read timeout
            .open()
            .map_err(io::Error::from)?;

        debug!(port = port_name, baud_rate, "serial port opened");
        Ok(Self {
            port_name: port_name.to_string(),
            baud_rate,
            port,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl Transport for SerialAdapter {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn read_available(&mut self, buf: &mut [u8], poll: Duration) -> io::Result<usize> {
        self.port.set_timeout(poll).map_err(io::Error::from)?;
        match self.port.read(buf) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Unexpected EOF from serial port",
            )),
            Ok(n) => Ok(n),
            // Port timeout is shorter than the session timeout
            Err(e) if is_poll_timeout(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn clear(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::All).map_err(io::Error::from)
    }

    fn info(&self) -> String {
        format!("SerialAdapter({} @ {} baud)", self.port_name, self.baud_rate)
    }
}
