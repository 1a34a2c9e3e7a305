//! Transmit-only COM1 console.
//!
//! The guest prints by issuing one-byte `out` instructions to the console
//! port. Nothing else on the port is emulated: reads, wider accesses and
//! string I/O are rejected as unhandled.

use std::io::{self, Write};

use crate::backend::IoDirection;
use crate::error::{Error, Result};
use crate::memory::layout::CONSOLE_PORT;

/// Guest console attached to a single I/O port.
pub struct Serial {
    port: u16,
    /// Output writer
    output: Box<dyn Write + Send>,
}

impl Serial {
    /// Create a new serial console that writes to stdout.
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// Create a new serial console with a custom output writer.
    pub fn with_output(output: Box<dyn Write + Send>) -> Self {
        Self {
            port: CONSOLE_PORT,
            output,
        }
    }

    /// Move the console to another port.
    pub fn on_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether an access has the one shape the console accepts.
    pub fn accepts(&self, port: u16, direction: IoDirection, size: u8, count: u32) -> bool {
        direction == IoDirection::Out && size == 1 && port == self.port && count == 1
    }

    /// Handle a port I/O exit.
    ///
    /// An accepted access writes its byte and flushes, so output order matches
    /// the guest's emission order.
    pub fn handle_io(
        &mut self,
        port: u16,
        direction: IoDirection,
        size: u8,
        count: u32,
        data: &[u8],
    ) -> Result<()> {
        if !self.accepts(port, direction, size, count) || data.is_empty() {
            return Err(Error::UnhandledIo {
                port,
                direction: direction.as_str(),
                size,
                count,
            });
        }

        self.output.write_all(&data[..1])?;
        self.output.flush()?;
        Ok(())
    }
}

impl Default for Serial {
    fn default() -> Self {
        Self::new()
    }
}
