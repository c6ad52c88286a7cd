//! Kernel heap
//!
//! # Purpose
//! Turns a reserved, otherwise unused byte range into the kernel's dynamic
//! memory: a bump allocator owns the bytes, a pool allocator on top of it
//! recycles blocks, and the pool becomes the default allocator.
//!
//! # Layout
//! ```text
//! base (aligned to 16)
//! +----------------+-----------------+----------------------------------+
//! | BumpAllocator  | PoolAllocator   |  bump range = pool logical range |
//! +----------------+-----------------+----------------------------------+
//! |<------- METADATA_SIZE ---------->|<-------- size - metadata ------->|
//! ```
//! Both control blocks are written in place; nothing is allocated to
//! construct the heap.
//!
//! # Default allocator
//! [`DefaultHeap`] is a once-settable slot implementing `GlobalAlloc`. The
//! kernel holds a `&'static DefaultHeap` and installs the pool into it when
//! the heap is formatted. On bare metal the crate registers a static slot as
//! the `#[global_allocator]`; hosted builds keep their own allocator and the
//! slot is an ordinary object.

pub mod bump;
pub mod pool;

pub use bump::BumpAllocator;
pub use pool::{PoolAllocator, CHUNK_SIZE};

use core::alloc::{GlobalAlloc, Layout};
use core::mem::{align_of, size_of};
use core::ptr;

use spin::Once;
use thiserror::Error;

use super::{align_up, VirtAddr};

/// Bytes at the start of the heap taken by the two control blocks
pub const METADATA_SIZE: usize = align_up(POOL_OFFSET + size_of::<PoolAllocator>(), 16);

/// Offset of the pool control block from the heap start
const POOL_OFFSET: usize = align_up(size_of::<BumpAllocator>(), align_of::<PoolAllocator>());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeapError {
    #[error("heap region of {size} bytes is too small (need at least {needed})")]
    RegionTooSmall { size: usize, needed: usize },

    #[error("a default heap is already installed")]
    AlreadyInstalled,
}

pub type Result<T> = core::result::Result<T, HeapError>;

/// Process-wide default allocator slot
pub struct DefaultHeap {
    pool: Once<&'static PoolAllocator>,
}

impl Default for DefaultHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultHeap {
    pub const fn new() -> Self {
        Self { pool: Once::new() }
    }

    /// Make `pool` the default allocator; only the first install succeeds
    pub fn install(&self, pool: &'static PoolAllocator) -> Result<()> {
        let mut installed = false;
        self.pool.call_once(|| {
            installed = true;
            pool
        });

        if installed {
            Ok(())
        } else {
            Err(HeapError::AlreadyInstalled)
        }
    }

    pub fn get(&self) -> Option<&'static PoolAllocator> {
        self.pool.get().copied()
    }

    pub fn is_installed(&self) -> bool {
        self.pool.is_completed()
    }
}

unsafe impl GlobalAlloc for DefaultHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        match self.get() {
            Some(pool) => pool.alloc(layout),
            None => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if let Some(pool) = self.get() {
            pool.dealloc(ptr, layout);
        }
    }
}

/// Format `[base, base + size)` as the kernel heap and install it into
/// `default`
///
/// Returns the pool handle. The region is zero-filled first.
///
/// # Safety
/// The range must be mapped, writable, not used by anything else, and stay
/// valid for the rest of the kernel's life.
pub unsafe fn format(
    base: VirtAddr,
    size: usize,
    default: &DefaultHeap,
) -> Result<&'static PoolAllocator> {
    debug_assert!(base.as_usize() != 0, "heap base must be mapped");

    if default.is_installed() {
        return Err(HeapError::AlreadyInstalled);
    }

    let start = align_up(base.as_usize(), 16);
    let padding = start - base.as_usize();
    let needed = METADATA_SIZE + CHUNK_SIZE + padding;
    if size < needed {
        return Err(HeapError::RegionTooSmall { size, needed });
    }
    let capacity = size - padding - METADATA_SIZE;

    ptr::write_bytes(base.as_mut_ptr::<u8>(), 0, size);

    let bump_ptr = start as *mut BumpAllocator;
    bump_ptr.write(BumpAllocator::new(start + METADATA_SIZE, capacity));
    let bump: &'static BumpAllocator = &*bump_ptr;

    let pool_ptr = (start + POOL_OFFSET) as *mut PoolAllocator;
    pool_ptr.write(PoolAllocator::new(bump, capacity));
    let pool: &'static PoolAllocator = &*pool_ptr;

    default.install(pool)?;

    log::info!(
        "heap: {:#x} ({} KB, {} bytes metadata)",
        base,
        size / 1024,
        METADATA_SIZE
    );
    Ok(pool)
}
