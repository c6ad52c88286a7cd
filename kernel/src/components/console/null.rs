//! Console that discards everything
//!
//! Selected with the `console-null` feature.

use super::Console;

#[derive(Clone, Copy)]
pub struct NullConfig;

pub struct NullConsole;

impl NullConsole {
    pub const fn new(_config: NullConfig) -> Self {
        Self
    }

    pub fn init(&self) {}
}

impl Console for NullConsole {
    #[inline(always)]
    fn putc(&self, _c: u8) {}

    #[inline(always)]
    fn puts(&self, _s: &str) {}
}
