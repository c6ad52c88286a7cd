//! ARM64 (AArch64) architecture-specific code
//!
//! - `context`: CPU state saved on exception entry
//! - `gic`: GICv2 distributor behind `IntController`
//! - [`MEMORY_LAYOUT`]: the QEMU virt memory map used by the boot core

pub mod context;
pub mod gic;

use crate::memory::{Access, MemoryLayout, MemoryRegion, PhysAddr, VirtAddr, PAGE_SIZE};

/// Kernel virtual window: all of RAM, mapped at the top of the address space
pub const KERNEL_DATA_BASE: usize = 0xFFFF_0000_4000_0000;
pub const KERNEL_DATA_SIZE: usize = 1024 * 1024 * 1024;

/// Per-process arguments page, just below the user stack
pub const USER_ARGS_BASE: usize = 0x7FFF_F000;

/// QEMU virt memory map
pub const MEMORY_LAYOUT: MemoryLayout = MemoryLayout::new(
    MemoryRegion::new(
        PhysAddr::new(0),
        VirtAddr::new(KERNEL_DATA_BASE),
        KERNEL_DATA_SIZE,
        Access::READABLE.union(Access::WRITABLE),
    ),
    MemoryRegion::new(
        PhysAddr::new(0),
        VirtAddr::new(USER_ARGS_BASE),
        PAGE_SIZE,
        Access::USER.union(Access::READABLE).union(Access::WRITABLE),
    ),
);

/// Stop this core for good
#[cfg(all(target_os = "none", target_arch = "aarch64"))]
pub fn halt() -> ! {
    loop {
        // SAFETY: wfe only parks the core until the next event
        unsafe { core::arch::asm!("wfe", options(nomem, nostack)) };
    }
}
