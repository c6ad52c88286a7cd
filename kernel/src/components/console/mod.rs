//! Console components
//!
//! A console only has to push bytes out; `puts` adds the CR terminals
//! expect before every LF. [`ConsoleWriter`] adapts any console to
//! `core::fmt::Write` for the logger.

use core::fmt;

/// Byte-oriented output device
pub trait Console: Send + Sync {
    /// Write one byte, waiting for the device if needed
    fn putc(&self, c: u8);

    fn puts(&self, s: &str) {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.putc(b'\r');
            }
            self.putc(byte);
        }
    }
}

pub struct ConsoleWriter<C: Console + 'static> {
    console: &'static C,
}

impl<C: Console + 'static> ConsoleWriter<C> {
    pub const fn new(console: &'static C) -> Self {
        Self { console }
    }
}

impl<C: Console + 'static> fmt::Write for ConsoleWriter<C> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.console.puts(s);
        Ok(())
    }
}

pub mod null;
pub mod pl011;
