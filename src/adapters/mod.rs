//! Transport adapters.
//!
//! A [`Transport`] moves raw bytes to and from one instrument. It knows nothing
//! about terminations, timeouts or locking: the [`crate::session::Session`]
//! that owns it does the framing and serialization, so every adapter here
//! (serial, socket, simulated, mock) is interchangeable from the parameter
//! layer's point of view.

use std::io;
use std::time::Duration;

pub mod mock_adapter;
#[cfg(feature = "instrument_serial")]
pub mod serial_adapter;
pub mod sim_adapter;
pub mod socket_adapter;

pub use mock_adapter::{MockAdapter, MockLog};
#[cfg(feature = "instrument_serial")]
pub use serial_adapter::SerialAdapter;
pub use sim_adapter::SimAdapter;
pub use socket_adapter::SocketAdapter;

/// Byte-level connection to an instrument.
pub trait Transport: Send {
    /// Transmit all of `data`.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Copy whatever input is available into `buf`, waiting at most `poll`.
    ///
    /// Returns `Ok(0)` when nothing arrived within `poll`. End of stream is an
    /// error, never `Ok(0)`.
    fn read_available(&mut self, buf: &mut [u8], poll: Duration) -> io::Result<usize>;

    /// Discard pending input and reset the communication state of the device.
    fn clear(&mut self) -> io::Result<()>;

    /// Release the underlying resource.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Short human-readable description.
    fn info(&self) -> String;
}

/// True for the error kinds a poll timeout is reported with.
pub(crate) fn is_poll_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}
