//! Transport backed by a [`SimDevice`](crate::sim::SimDevice).

use std::io;
use std::time::Duration;

use super::Transport;
use crate::sim::SimDevice;

pub struct SimAdapter {
    device: SimDevice,
}

impl SimAdapter {
    pub fn new(device: SimDevice) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &SimDevice {
        &self.device
    }
}

impl Transport for SimAdapter {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.device.write(data);
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8], poll: Duration) -> io::Result<usize> {
        if !self.device.has_output() {
            // Nothing will ever arrive unprompted; behave like an idle line.
            std::thread::sleep(poll);
            return Ok(0);
        }
        Ok(self.device.read(buf))
    }

    fn clear(&mut self) -> io::Result<()> {
        self.device.clear();
        Ok(())
    }

    fn info(&self) -> String {
        format!("SimAdapter({})", self.device.name())
    }
}
