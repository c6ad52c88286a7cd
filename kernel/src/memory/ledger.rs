//! Physical memory ledger
//!
//! Bitmap-based bookkeeping of which physical 4KB pages are in use, plus
//! translation between physical addresses and the kernel's mapped window.
//!
//! # Design
//! - One bit per page over the physical range handed over at boot
//! - Fixed-size bitmap, usable before the heap exists
//! - Every failing operation leaves the ledger untouched: a page is never
//!   reported allocated and free at the same time, and a double reservation
//!   or double release is an error rather than a silent no-op
//!
//! # Kernel window
//! The window is the virtual range through which the kernel sees physical
//! memory: `window.virt` corresponds to the start of physical memory as
//! handed over, even when page tracking begins at a later aligned address.

use thiserror::Error;

use super::bitmap::{Bitmap, MAX_BITS};
use super::{MemoryRegion, PhysAddr, VirtAddr, PAGE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("page {addr:#x} is already allocated")]
    AlreadyAllocated { addr: usize },

    #[error("page {addr:#x} is not allocated")]
    NotAllocated { addr: usize },

    #[error("address {addr:#x} is outside physical memory")]
    OutOfRange { addr: usize },

    #[error("address {addr:#x} is not page aligned")]
    Unaligned { addr: usize },

    #[error("no free physical range of {size} bytes")]
    OutOfMemory { size: usize },

    #[error("address {addr:#x} is outside the kernel window")]
    OutsideWindow { addr: usize },
}

pub type Result<T> = core::result::Result<T, LedgerError>;

/// Physical page ledger
pub struct PhysicalLedger {
    /// Allocation bitmap (1 = allocated), relative to `base`
    bitmap: Bitmap,

    /// Physical address of page 0
    base: PhysAddr,

    /// Physical address behind `window.virt`
    window_base: PhysAddr,

    /// Number of pages tracked
    pages: usize,

    /// Number of free pages
    free: usize,

    /// Kernel virtual window
    window: MemoryRegion,
}

impl PhysicalLedger {
    /// Create a ledger over `physical` with all pages free
    ///
    /// Only whole pages are tracked; RAM beyond the bitmap's 1GB capacity
    /// is ignored.
    pub fn new(physical: MemoryRegion, window: MemoryRegion) -> Self {
        let base = physical.phys.align_up(PAGE_SIZE);
        let usable = physical
            .size
            .saturating_sub(base.as_usize() - physical.phys.as_usize());
        let mut pages = usable / PAGE_SIZE;

        if pages > MAX_BITS {
            log::warn!(
                "ledger: tracking {} of {} pages at {:#x}",
                MAX_BITS,
                pages,
                base
            );
            pages = MAX_BITS;
        }

        Self {
            bitmap: Bitmap::new(),
            base,
            window_base: physical.phys,
            pages,
            free: pages,
            window,
        }
    }

    /// Page index of `addr`, or `OutOfRange`
    fn page_index(&self, addr: PhysAddr) -> Result<usize> {
        match addr.checked_offset_from(self.base) {
            Some(offset) if offset / PAGE_SIZE < self.pages => Ok(offset / PAGE_SIZE),
            _ => Err(LedgerError::OutOfRange { addr: addr.as_usize() }),
        }
    }

    /// Page range `[first, last)` covering `size` bytes at `addr`
    fn page_span(&self, addr: PhysAddr, size: usize) -> Result<(usize, usize)> {
        let first = self.page_index(addr.align_down(PAGE_SIZE))?;
        let offset = addr.as_usize() % PAGE_SIZE;
        let count = size
            .checked_add(offset + PAGE_SIZE - 1)
            .map(|bytes| bytes / PAGE_SIZE)
            .ok_or(LedgerError::OutOfRange { addr: addr.as_usize() })?;

        if first + count > self.pages {
            let addr = self.base.as_usize() + self.pages * PAGE_SIZE;
            return Err(LedgerError::OutOfRange { addr });
        }
        Ok((first, first + count))
    }

    fn page_address(&self, index: usize) -> PhysAddr {
        self.base + index * PAGE_SIZE
    }

    /// Mark the single page at `addr` allocated
    pub fn allocate_at(&mut self, addr: PhysAddr) -> Result<()> {
        if !addr.is_aligned(PAGE_SIZE) {
            return Err(LedgerError::Unaligned { addr: addr.as_usize() });
        }
        let index = self.page_index(addr)?;
        if self.bitmap.is_set(index) {
            return Err(LedgerError::AlreadyAllocated { addr: addr.as_usize() });
        }

        self.bitmap.set(index);
        self.free -= 1;
        Ok(())
    }

    /// Mark every page touched by `[addr, addr + size)` allocated
    ///
    /// All or nothing: if any page is already allocated or out of range,
    /// nothing is reserved.
    pub fn reserve_region(&mut self, addr: PhysAddr, size: usize) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        let (first, last) = self.page_span(addr, size)?;

        if let Some(index) = self.bitmap.find_set(first, last) {
            let addr = self.page_address(index).as_usize();
            return Err(LedgerError::AlreadyAllocated { addr });
        }

        for index in first..last {
            self.bitmap.set(index);
        }
        self.free -= last - first;
        Ok(())
    }

    /// Allocate a run of free pages large enough for `size` bytes
    ///
    /// The returned base is aligned to `alignment` (at least a page).
    /// First fit from the bottom of memory.
    pub fn allocate(&mut self, size: usize, alignment: usize) -> Result<PhysAddr> {
        let count = size.max(1).div_ceil(PAGE_SIZE);
        let align = alignment.max(PAGE_SIZE).next_power_of_two();

        if count > self.free {
            return Err(LedgerError::OutOfMemory { size });
        }

        let mut candidate = self.base.align_up(align);
        loop {
            let first = match candidate.checked_offset_from(self.base) {
                Some(offset) => offset / PAGE_SIZE,
                None => return Err(LedgerError::OutOfMemory { size }),
            };
            if first + count > self.pages {
                return Err(LedgerError::OutOfMemory { size });
            }

            match self.bitmap.find_set(first, first + count) {
                None => {
                    for index in first..first + count {
                        self.bitmap.set(index);
                    }
                    self.free -= count;
                    return Ok(candidate);
                }
                Some(used) => {
                    // Skip past the allocated page, then to the next free one
                    let next = self
                        .bitmap
                        .find_first_unset(used + 1, self.pages)
                        .ok_or(LedgerError::OutOfMemory { size })?;
                    candidate = self.page_address(next).align_up(align);
                }
            }
        }
    }

    /// Free every page of `[addr, addr + size)`
    ///
    /// All pages must currently be allocated; otherwise nothing is freed.
    pub fn release(&mut self, addr: PhysAddr, size: usize) -> Result<()> {
        if !addr.is_aligned(PAGE_SIZE) {
            return Err(LedgerError::Unaligned { addr: addr.as_usize() });
        }
        let (first, last) = self.page_span(addr, size.max(1))?;

        if let Some(index) = self.bitmap.find_first_unset(first, last) {
            let addr = self.page_address(index).as_usize();
            return Err(LedgerError::NotAllocated { addr });
        }

        for index in first..last {
            self.bitmap.clear(index);
        }
        self.free += last - first;
        Ok(())
    }

    /// Whether the page containing `addr` is allocated
    ///
    /// Addresses outside physical memory are never allocated.
    pub fn is_allocated(&self, addr: PhysAddr) -> bool {
        self.page_index(addr)
            .map(|index| self.bitmap.is_set(index))
            .unwrap_or(false)
    }

    pub fn free_pages(&self) -> usize {
        self.free
    }

    pub fn total_pages(&self) -> usize {
        self.pages
    }

    /// Physical range tracked by the ledger
    pub fn physical(&self) -> MemoryRegion {
        MemoryRegion::physical(self.base, self.pages * PAGE_SIZE)
    }

    pub fn window(&self) -> MemoryRegion {
        self.window
    }

    /// Kernel virtual address of `addr`
    pub fn to_virtual(&self, addr: PhysAddr) -> Result<VirtAddr> {
        self.to_virtual_range(addr, 1)
    }

    /// Kernel virtual address of `[addr, addr + size)`, which must lie
    /// entirely inside the window
    pub fn to_virtual_range(&self, addr: PhysAddr, size: usize) -> Result<VirtAddr> {
        let outside = LedgerError::OutsideWindow { addr: addr.as_usize() };
        let offset = addr.checked_offset_from(self.window_base).ok_or(outside)?;
        match offset.checked_add(size) {
            Some(end) if end <= self.window.size => Ok(self.window.virt + offset),
            _ => Err(outside),
        }
    }

    /// Physical address behind kernel virtual address `addr`
    pub fn to_physical(&self, addr: VirtAddr) -> Result<PhysAddr> {
        match addr.checked_offset_from(self.window.virt) {
            Some(offset) if offset < self.window.size => Ok(self.window_base + offset),
            _ => Err(LedgerError::OutsideWindow { addr: addr.as_usize() }),
        }
    }
}
