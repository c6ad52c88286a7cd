//! Per-core boot information
//!
//! The previous boot stage describes, in physical addresses, where RAM is
//! and which parts of it are already spoken for. The kernel reserves those
//! regions in the ledger before it allocates anything.

use crate::memory::MemoryRegion;

/// Boot layout handed over by the previous boot stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreInfo {
    /// Core this information belongs to
    pub core_id: u32,

    /// All physical RAM
    pub memory: MemoryRegion,

    /// The kernel image itself
    pub kernel: MemoryRegion,

    /// The boot image holding the initial programs
    pub boot_image: MemoryRegion,

    /// Memory set aside for the kernel heap
    pub heap: MemoryRegion,

    /// Inter-core communication channel
    pub core_channel: MemoryRegion,
}

impl CoreInfo {
    /// Check that RAM is non-empty and every other region lies inside it
    pub fn is_valid(&self) -> bool {
        !self.memory.is_empty()
            && [self.kernel, self.boot_image, self.heap, self.core_channel]
                .iter()
                .all(|region| region.is_empty() || self.memory.contains_phys(region))
    }
}
