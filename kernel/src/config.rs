//! Kernel configuration and component composition
//!
//! This module handles compile-time kernel configuration and component
//! composition based on cargo features:
//!
//! - `log-error` .. `log-trace`: maximum log level (most verbose wins,
//!   `log-info` by default)
//! - `console-pl011` / `console-null`: console component

use log::LevelFilter;

#[cfg(feature = "console-null")]
use crate::components::console::null::{NullConfig, NullConsole};
#[cfg(not(feature = "console-null"))]
use crate::components::console::pl011::{Pl011Config, Pl011Console};

/// Number of interrupt vectors
pub const VECTOR_COUNT: usize = 256;

/// Low physical memory kept away from the allocator (firmware, boot stages)
pub const LOW_MEMORY_RESERVED: usize = 4 * 1024 * 1024;

/// QEMU virt PL011 UART base address
pub const PL011_MMIO_BASE: usize = 0x0900_0000;

/// Maximum log level compiled into the kernel logger
pub const LOG_LEVEL: LevelFilter = if cfg!(feature = "log-trace") {
    LevelFilter::Trace
} else if cfg!(feature = "log-debug") {
    LevelFilter::Debug
} else if cfg!(feature = "log-info") {
    LevelFilter::Info
} else if cfg!(feature = "log-warn") {
    LevelFilter::Warn
} else if cfg!(feature = "log-error") {
    LevelFilter::Error
} else {
    LevelFilter::Info
};

/// Console component selection (compile-time)
///
/// `console-null` wins when both are enabled; PL011 is the default.
#[cfg(not(feature = "console-null"))]
pub type KernelConsole = Pl011Console;

#[cfg(feature = "console-null")]
pub type KernelConsole = NullConsole;

#[cfg(not(feature = "console-null"))]
pub static CONSOLE: KernelConsole = Pl011Console::new(Pl011Config {
    mmio_base: PL011_MMIO_BASE,
});

#[cfg(feature = "console-null")]
pub static CONSOLE: KernelConsole = NullConsole::new(NullConfig);

/// Initialize kernel console component
///
/// Must be called early in boot sequence before any debug output.
pub fn init_console() {
    CONSOLE.init();
}

/// Get reference to the global console
pub fn console() -> &'static KernelConsole {
    &CONSOLE
}
