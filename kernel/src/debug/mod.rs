//! Kernel output and logging
//!
//! - `kprint!` / `kprintln!`: raw text to the configured console
//! - [`KernelLogger`]: `log` backend writing `[LEVEL target] message` lines
//! - `fatal!`: log a `FATAL:` line, then panic (the panic handler halts the
//!   core on bare metal)

use core::fmt::{self, Write};

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::components::console::{Console, ConsoleWriter};
use crate::config::{self, KernelConsole};

/// Debug writer (uses the configured console)
pub struct DebugWriter;

impl fmt::Write for DebugWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        config::console().puts(s);
        Ok(())
    }
}

/// Print macro for kernel
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => ({
        use core::fmt::Write;
        let _ = write!($crate::debug::DebugWriter, $($arg)*);
    });
}

/// Print with newline macro for kernel
#[macro_export]
macro_rules! kprintln {
    () => ($crate::kprint!("\n"));
    ($($arg:tt)*) => ({
        use core::fmt::Write;
        let _ = writeln!($crate::debug::DebugWriter, $($arg)*);
    });
}

/// Log a fatal condition and stop
///
/// Evaluates to `!`.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        $crate::debug::log_fatal(format_args!($($arg)*));
        panic!($($arg)*)
    }};
}

#[doc(hidden)]
pub fn log_fatal(args: fmt::Arguments<'_>) {
    log::error!("FATAL: {}", args);
}

/// `log` backend printing one line per record to a console
pub struct KernelLogger<C: Console + 'static> {
    console: &'static C,
    level: LevelFilter,
}

impl<C: Console + 'static> KernelLogger<C> {
    pub const fn new(console: &'static C, level: LevelFilter) -> Self {
        Self { console, level }
    }
}

impl<C: Console + 'static> Log for KernelLogger<C> {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut writer = ConsoleWriter::new(self.console);
        let _ = writeln!(
            writer,
            "[{:<5} {}] {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger<KernelConsole> = KernelLogger::new(&config::CONSOLE, config::LOG_LEVEL);

/// Bring up the console and route the `log` facade to it
///
/// Call once, early in boot.
pub fn init() -> Result<(), SetLoggerError> {
    config::init_console();
    log::set_logger(&LOGGER)?;
    log::set_max_level(config::LOG_LEVEL);
    Ok(())
}
