//! Type-safe physical and virtual addresses
//!
//! The ledger hands out physical addresses and the kernel touches memory
//! through virtual ones; keeping them as distinct types stops the two from
//! being mixed up when translating through the kernel window.

use core::fmt;
use core::ops::Add;

use static_assertions::const_assert_eq;

/// Size of a page (4KB)
pub const PAGE_SIZE: usize = 4096;

const_assert_eq!(PAGE_SIZE, keystone_bootimage::PAGE_SIZE);

/// Round `value` up to a multiple of `align` (a power of two)
#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Round `value` down to a multiple of `align` (a power of two)
#[inline]
pub const fn align_down(value: usize, align: usize) -> usize {
    value & !(align - 1)
}

macro_rules! address_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            pub const fn new(addr: usize) -> Self {
                Self(addr)
            }

            pub const fn as_usize(self) -> usize {
                self.0
            }

            #[inline]
            pub const fn is_aligned(self, align: usize) -> bool {
                self.0 % align == 0
            }

            #[inline]
            pub const fn align_down(self, align: usize) -> Self {
                Self(align_down(self.0, align))
            }

            #[inline]
            pub const fn align_up(self, align: usize) -> Self {
                Self(align_up(self.0, align))
            }

            /// Byte distance from `base`, if `self` is not below it
            #[inline]
            pub const fn checked_offset_from(self, base: Self) -> Option<usize> {
                self.0.checked_sub(base.0)
            }
        }

        impl Add<usize> for $name {
            type Output = Self;

            fn add(self, rhs: usize) -> Self {
                Self(self.0 + rhs)
            }
        }

        impl From<usize> for $name {
            fn from(addr: usize) -> Self {
                Self(addr)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:#x})"), self.0)
            }
        }

        impl fmt::LowerHex for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::LowerHex::fmt(&self.0, f)
            }
        }
    };
}

address_type!(
    /// Physical memory address
    PhysAddr
);

address_type!(
    /// Kernel or user virtual address
    VirtAddr
);

impl VirtAddr {
    pub const fn as_ptr<T>(self) -> *const T {
        self.0 as *const T
    }

    pub const fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment() {
        let addr = PhysAddr::new(0x4000_1234);
        assert!(!addr.is_aligned(PAGE_SIZE));
        assert_eq!(addr.align_down(PAGE_SIZE), PhysAddr::new(0x4000_1000));
        assert_eq!(addr.align_up(PAGE_SIZE), PhysAddr::new(0x4000_2000));
        assert_eq!(PhysAddr::new(0x2000).align_up(PAGE_SIZE), PhysAddr::new(0x2000));
    }

    #[test]
    fn test_offset_from() {
        let base = VirtAddr::new(0x1000);
        assert_eq!((base + 0x10).checked_offset_from(base), Some(0x10));
        assert_eq!(base.checked_offset_from(base + 1), None);
    }

    #[test]
    fn test_formatting() {
        let addr = PhysAddr::new(0x9000000);
        assert_eq!(format!("{:#x}", addr), "0x9000000");
        assert_eq!(format!("{:?}", addr), "PhysAddr(0x9000000)");
    }
}
