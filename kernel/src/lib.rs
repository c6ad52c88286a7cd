//! Keystone microkernel core
//!
//! The early-boot core of the Keystone microkernel for ARM64: it takes over
//! from the previous boot stage, accounts for physical memory, brings up
//! the kernel heap, routes hardware interrupts and creates the boot
//! processes from the boot image.
//!
//! # Architecture
//!
//! - `memory`: addresses, the physical memory ledger and the kernel heap
//! - `interrupt`: interrupt vector table and the controller contract
//! - `process`: contracts of the process layer the kernel drives
//! - `kernel`: the [`Kernel`] context object tying the above together
//! - `loader`: boot image loading
//! - `boot`: boot information handed over by the previous stage
//! - `arch`: ARM64 memory map, exception frame and GIC driver
//! - `debug`: console output, logging and fatal errors
//!
//! The crate is `no_std` on the target and builds with `std` for host
//! tests; the global allocator and panic handler only exist on bare metal.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arch;
pub mod boot;
pub mod components;
pub mod config;
pub mod debug;
pub mod error;
pub mod interrupt;
pub mod kernel;
pub mod loader;
pub mod memory;
pub mod process;

pub use boot::CoreInfo;
pub use error::{KernelError, Result};
pub use interrupt::{CpuState, IntController, InterruptHandler};
pub use kernel::Kernel;
pub use memory::heap::DefaultHeap;
pub use memory::{Access, MemoryLayout, MemoryRegion, PhysAddr, VirtAddr};
pub use process::{MemoryContext, Process, ProcessManager};

/// Default allocator; serves nothing until [`Kernel::heap`] formats the heap
#[cfg(all(target_os = "none", target_arch = "aarch64", not(test)))]
#[global_allocator]
pub static GLOBAL_HEAP: DefaultHeap = DefaultHeap::new();

#[cfg(all(target_os = "none", target_arch = "aarch64", not(test)))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    kprintln!("\n[PANIC] {}", info);
    arch::aarch64::halt()
}
