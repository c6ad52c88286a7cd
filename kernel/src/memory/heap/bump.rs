//! Bump allocator
//!
//! Hands out memory linearly from a fixed range and never frees. Used as
//! the parent of the pool allocator: the pool carves its chunks and large
//! blocks out of it.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicUsize, Ordering};

pub struct BumpAllocator {
    start: usize,
    end: usize,
    next: AtomicUsize,
}

impl BumpAllocator {
    /// Create a bump allocator over `[start, start + size)`
    pub const fn new(start: usize, size: usize) -> Self {
        Self {
            start,
            end: start + size,
            next: AtomicUsize::new(start),
        }
    }

    /// Reserve `layout.size()` bytes aligned to `layout.align()`
    pub fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let align = layout.align();
        let mut current = self.next.load(Ordering::Relaxed);

        loop {
            let alloc_start = current.checked_add(align - 1)? & !(align - 1);
            let alloc_end = alloc_start.checked_add(layout.size())?;
            if alloc_end > self.end {
                return None;
            }

            match self.next.compare_exchange_weak(
                current,
                alloc_end,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return NonNull::new(alloc_start as *mut u8),
                Err(actual) => current = actual,
            }
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Bytes handed out so far, alignment padding included
    pub fn used(&self) -> usize {
        self.next.load(Ordering::Relaxed) - self.start
    }

    pub fn remaining(&self) -> usize {
        self.end - self.next.load(Ordering::Relaxed)
    }
}

unsafe impl GlobalAlloc for BumpAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.allocate(layout)
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, _ptr: *mut u8, _layout: Layout) {
        // Bump allocator never frees
    }
}
