//! Line output over the host console port.

use core::fmt;

use crate::cpu::Cpu;

/// Writes bytes one port write at a time.
pub struct Console<'a, C: Cpu> {
    cpu: &'a mut C,
}

impl<'a, C: Cpu> Console<'a, C> {
    pub fn new(cpu: &'a mut C) -> Self {
        Self { cpu }
    }

    pub fn putc(&mut self, byte: u8) {
        self.cpu.console_out(byte);
    }

    /// Write `line` followed by a newline.
    pub fn puts(&mut self, line: &str) {
        for byte in line.bytes() {
            self.putc(byte);
        }
        self.putc(b'\n');
    }
}

impl<C: Cpu> fmt::Write for Console<'_, C> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        s.bytes().for_each(|b| self.putc(b));
        Ok(())
    }
}
