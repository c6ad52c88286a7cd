//! Pool allocator
//!
//! Segregated free lists for power-of-two size classes (16 bytes to 2KB).
//! A class is refilled by carving one 4KB chunk from the parent bump
//! allocator and threading it onto the class's free list. Anything larger
//! than the biggest class, or aligned beyond it, comes straight from the
//! parent and is recycled through a first-fit list of large blocks. A
//! reused block gives its unused tail back to the list, and a released
//! block is merged with any free neighbour.
//!
//! Free-list links are offsets from the parent's start rather than raw
//! pointers, so the lists only depend on where the heap sits through that
//! single base address.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};

use spin::Mutex;

use super::bump::BumpAllocator;
use crate::memory::align_up;

const MIN_CLASS_SHIFT: u32 = 4;
const MAX_CLASS_SHIFT: u32 = 11;
const CLASS_COUNT: usize = (MAX_CLASS_SHIFT - MIN_CLASS_SHIFT + 1) as usize;

/// Smallest block handed out
pub const MIN_BLOCK: usize = 1 << MIN_CLASS_SHIFT;

/// Largest pooled block; bigger requests go to the parent
pub const MAX_BLOCK: usize = 1 << MAX_CLASS_SHIFT;

/// Size of the chunk a class takes from the parent when it runs dry
pub const CHUNK_SIZE: usize = 4096;

/// End-of-list marker
const NIL: usize = usize::MAX;

/// Header written at the start of a free large block
#[repr(C)]
struct LargeBlock {
    size: usize,
    next: usize,
}

struct PoolState {
    /// Head offset of each class's free list
    classes: [usize; CLASS_COUNT],

    /// Head offset of the large free list
    large: usize,

    /// Bytes currently handed out
    in_use: usize,
}

pub struct PoolAllocator {
    parent: &'static BumpAllocator,
    capacity: usize,
    state: Mutex<PoolState>,
}

fn class_index(layout: Layout) -> Option<usize> {
    let size = layout.size().max(layout.align()).max(MIN_BLOCK);
    if size > MAX_BLOCK {
        return None;
    }
    Some((size.next_power_of_two().trailing_zeros() - MIN_CLASS_SHIFT) as usize)
}

const fn class_size(index: usize) -> usize {
    MIN_BLOCK << index
}

fn large_size(layout: Layout) -> usize {
    align_up(layout.size().max(1), MIN_BLOCK)
}

impl PoolAllocator {
    /// Create a pool over the logical range `0..capacity`, backed by `parent`
    pub const fn new(parent: &'static BumpAllocator, capacity: usize) -> Self {
        Self {
            parent,
            capacity,
            state: Mutex::new(PoolState {
                classes: [NIL; CLASS_COUNT],
                large: NIL,
                in_use: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.state.lock().in_use
    }

    pub fn parent(&self) -> &'static BumpAllocator {
        self.parent
    }

    fn to_offset(&self, addr: usize) -> usize {
        let offset = addr - self.parent.start();
        debug_assert!(offset < self.capacity);
        offset
    }

    fn to_address(&self, offset: usize) -> usize {
        self.parent.start() + offset
    }

    /// Allocate a block for `layout`, or `None` when the heap is exhausted
    pub fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let mut state = self.state.lock();

        let (addr, size) = match class_index(layout) {
            Some(index) => (self.pop_class(&mut state, index)?, class_size(index)),
            None => (self.take_large(&mut state, layout)?, large_size(layout)),
        };

        state.in_use += size;
        NonNull::new(addr as *mut u8)
    }

    /// Return a block to its free list
    ///
    /// # Safety
    /// `block` must have been returned by [`allocate`](Self::allocate) on
    /// this pool with the same `layout`, and must not be used afterwards.
    pub unsafe fn release(&self, block: NonNull<u8>, layout: Layout) {
        let addr = block.as_ptr() as usize;
        let mut state = self.state.lock();

        match class_index(layout) {
            Some(index) => {
                ptr::write(addr as *mut usize, state.classes[index]);
                state.classes[index] = self.to_offset(addr);
                state.in_use -= class_size(index);
            }
            None => {
                let size = large_size(layout);
                self.insert_large(&mut state, addr, size);
                state.in_use -= size;
            }
        }
    }

    fn pop_class(&self, state: &mut PoolState, index: usize) -> Option<usize> {
        if state.classes[index] == NIL {
            self.refill(state, index)?;
        }

        let addr = self.to_address(state.classes[index]);
        // SAFETY: a free block's first word holds the next free offset
        state.classes[index] = unsafe { ptr::read(addr as *const usize) };
        Some(addr)
    }

    fn refill(&self, state: &mut PoolState, index: usize) -> Option<()> {
        let size = class_size(index);
        let chunk = self
            .parent
            .allocate(Layout::from_size_align(CHUNK_SIZE, size).ok()?)?;
        let base = chunk.as_ptr() as usize;

        for block in (0..CHUNK_SIZE / size).rev() {
            let addr = base + block * size;
            // SAFETY: the chunk was just carved from the parent and is unused
            unsafe { ptr::write(addr as *mut usize, state.classes[index]) };
            state.classes[index] = self.to_offset(addr);
        }
        Some(())
    }

    fn take_large(&self, state: &mut PoolState, layout: Layout) -> Option<usize> {
        let size = large_size(layout);
        let align = layout.align().max(MIN_BLOCK);

        // First fit; the unused tail of a bigger block stays on the list
        let mut prev: Option<usize> = None;
        let mut offset = state.large;
        while offset != NIL {
            let addr = self.to_address(offset);
            // SAFETY: offsets on the large list point at LargeBlock headers
            let block = unsafe { ptr::read(addr as *const LargeBlock) };

            if block.size >= size && addr % align == 0 {
                let next = if block.size > size {
                    // SAFETY: sizes are multiples of MIN_BLOCK, so the free tail can hold a header
                    let tail = addr + size;
                    unsafe {
                        ptr::write(
                            tail as *mut LargeBlock,
                            LargeBlock {
                                size: block.size - size,
                                next: block.next,
                            },
                        )
                    };
                    self.to_offset(tail)
                } else {
                    block.next
                };
                self.relink(state, prev, next);
                return Some(addr);
            }

            prev = Some(addr);
            offset = block.next;
        }

        self.parent
            .allocate(Layout::from_size_align(size, align).ok()?)
            .map(|block| block.as_ptr() as usize)
    }

    /// Put a large block back, merging it with free neighbours
    fn insert_large(&self, state: &mut PoolState, addr: usize, size: usize) {
        let mut start = addr;
        let mut size = size;

        // Free blocks are never adjacent, so one pass finds both neighbours
        let mut prev: Option<usize> = None;
        let mut offset = state.large;
        while offset != NIL {
            let at = self.to_address(offset);
            // SAFETY: offsets on the large list point at LargeBlock headers
            let block = unsafe { ptr::read(at as *const LargeBlock) };

            if at + block.size == start || start + size == at {
                self.relink(state, prev, block.next);
                start = start.min(at);
                size += block.size;
            } else {
                prev = Some(at);
            }
            offset = block.next;
        }

        // SAFETY: the merged range is free and at least MIN_BLOCK aligned
        unsafe {
            ptr::write(
                start as *mut LargeBlock,
                LargeBlock {
                    size,
                    next: state.large,
                },
            )
        };
        state.large = self.to_offset(start);
    }

    /// Point `prev` (or the list head) at `next`
    fn relink(&self, state: &mut PoolState, prev: Option<usize>, next: usize) {
        match prev {
            None => state.large = next,
            // SAFETY: `prev` is a header on the large list
            Some(prev) => unsafe { (*(prev as *mut LargeBlock)).next = next },
        }
    }
}

unsafe impl GlobalAlloc for PoolAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.allocate(layout)
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if let Some(block) = NonNull::new(ptr) {
            self.release(block, layout);
        }
    }
}
