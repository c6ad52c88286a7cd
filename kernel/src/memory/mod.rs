//! Memory management subsystem
//!
//! - `address`: Type-safe physical and virtual addresses
//! - `bitmap`: Fixed-size page bitmap
//! - `ledger`: Physical memory ledger (page bookkeeping + kernel window)
//! - `heap`: Two-tier kernel heap formatted in place over a reserved region
//!
//! Shared descriptors live here: [`MemoryRegion`] describes any physical
//! and/or virtual range the kernel deals with, [`Access`] the permissions a
//! mapping is made with, and [`MemoryLayout`] the architecture memory map.

pub mod address;
pub mod bitmap;
pub mod heap;
pub mod ledger;

pub use address::{align_down, align_up, PhysAddr, VirtAddr, PAGE_SIZE};
pub use ledger::{LedgerError, PhysicalLedger};

use bitflags::bitflags;

bitflags! {
    /// Mapping permissions and memory attributes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u32 {
        /// Accessible from user mode
        const USER       = 1 << 0;
        const READABLE   = 1 << 1;
        const WRITABLE   = 1 << 2;
        const EXECUTABLE = 1 << 3;
        const UNCACHED   = 1 << 4;
        /// Device memory (MMIO)
        const DEVICE     = 1 << 5;
    }
}

/// A range of memory, physical and/or virtual
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub phys: PhysAddr,
    pub virt: VirtAddr,
    pub size: usize,
    pub access: Access,
}

impl MemoryRegion {
    pub const fn new(phys: PhysAddr, virt: VirtAddr, size: usize, access: Access) -> Self {
        Self {
            phys,
            virt,
            size,
            access,
        }
    }

    /// A purely physical range
    pub const fn physical(phys: PhysAddr, size: usize) -> Self {
        Self::new(phys, VirtAddr::new(0), size, Access::empty())
    }

    /// A purely virtual range
    pub const fn virt(virt: VirtAddr, size: usize) -> Self {
        Self::new(PhysAddr::new(0), virt, size, Access::empty())
    }

    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// End of the physical range (exclusive)
    pub fn phys_end(&self) -> PhysAddr {
        self.phys + self.size
    }

    /// Whether `other`'s physical range lies entirely inside this one
    pub fn contains_phys(&self, other: &MemoryRegion) -> bool {
        other.phys >= self.phys
            && other
                .phys
                .as_usize()
                .checked_add(other.size)
                .is_some_and(|end| end <= self.phys_end().as_usize())
    }
}

/// Architecture memory map, as far as the boot core needs it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    /// Kernel virtual window over physical memory
    pub kernel_data: MemoryRegion,

    /// Where each process finds its arguments page
    pub user_args: MemoryRegion,
}

impl MemoryLayout {
    pub const fn new(kernel_data: MemoryRegion, user_args: MemoryRegion) -> Self {
        Self {
            kernel_data,
            user_args,
        }
    }
}
