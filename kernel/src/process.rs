//! Process layer contracts
//!
//! The boot core creates processes but does not own them: the process
//! manager does. These traits are the narrow surface the kernel uses:
//!
//! - [`ProcessManager`]: create boot processes, deliver interrupt
//!   notifications, hand over to the scheduler
//! - [`Process`]: a created process and its address space
//! - [`MemoryContext`]: per-process virtual memory mapping

use keystone_bootimage::ProgramName;
use thiserror::Error;

use crate::memory::{Access, LedgerError, MemoryLayout, MemoryRegion, PhysAddr, VirtAddr};

/// Process identifier assigned by the process manager
pub type ProcessId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("virtual address {0:#x} is already mapped")]
    AlreadyMapped(usize),

    #[error("invalid address {0:#x}")]
    InvalidAddress(usize),

    #[error("out of page table memory")]
    OutOfMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProcessError {
    #[error("failed to create boot program: {name}")]
    CreateFailed { name: ProgramName },

    #[error("failed to map segment of {name} at {virt:#x}: {cause}")]
    SegmentMapping {
        name: ProgramName,
        virt: usize,
        cause: MapError,
    },

    #[error("failed to allocate program arguments page: {0}")]
    ArgumentAllocation(LedgerError),

    #[error("failed to map program arguments page: {0}")]
    ArgumentMapping(MapError),

    #[error("no interrupt notification target for IRQ {irq}")]
    NotifyFailed { irq: u32 },
}

/// Virtual memory of one process
pub trait MemoryContext {
    /// Map one page
    fn map(&mut self, virt: VirtAddr, phys: PhysAddr, access: Access) -> Result<(), MapError>;

    /// Map every page of `region` (virt -> phys, with `region.access`)
    fn map_range(&mut self, region: &MemoryRegion) -> Result<(), MapError>;
}

pub trait Process {
    type Context: MemoryContext;

    fn id(&self) -> ProcessId;

    fn memory_context(&mut self) -> &mut Self::Context;
}

pub trait ProcessManager {
    type Process: Process;

    /// Create a process starting at `entry`
    ///
    /// `boot` marks processes loaded from the boot image; `privileged`
    /// grants them elevated rights.
    fn create(
        &mut self,
        entry: VirtAddr,
        layout: &MemoryLayout,
        boot: bool,
        privileged: bool,
    ) -> Option<&mut Self::Process>;

    /// Wake whoever waits for `irq` (a logical IRQ, controller base removed)
    fn interrupt_notify(&mut self, irq: u32) -> Result<(), ProcessError>;

    /// Run processes; does not return under normal operation
    fn schedule(&mut self);

    /// The process currently running on this core
    fn current(&mut self) -> Option<&mut Self::Process>;
}
