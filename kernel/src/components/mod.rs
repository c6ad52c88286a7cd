//! Built-in kernel components
//!
//! - `console`: byte sink for `kprintln!` and the kernel logger
//!
//! The console in use is picked by cargo feature in `config.rs`.

pub mod console;
