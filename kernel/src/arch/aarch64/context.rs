//! ARM64 CPU state
//!
//! Register snapshot taken on exception entry and handed to interrupt hooks.
//!
//! # Layout
//!
//! All general-purpose registers (x0-x30) followed by the registers needed
//! to return from the exception (SP_EL0, ELR_EL1, SPSR_EL1) and to decode it
//! (ESR_EL1, FAR_EL1). The exception entry code saves registers in exactly
//! this order.

use core::fmt;

use static_assertions::{const_assert_eq, const_assert};

/// CPU state saved on exception entry
///
/// DO NOT reorder fields: the exception entry/exit code depends on this
/// layout.
#[repr(C)]
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuState {
    /// General purpose registers x0-x30 (x29 = FP, x30 = LR)
    pub regs: [u64; 31],

    pub sp_el0: u64,   // User stack pointer
    pub elr_el1: u64,  // Exception link register (return address)
    pub spsr_el1: u64, // Saved processor status register
    pub esr_el1: u64,  // Exception syndrome register
    pub far_el1: u64,  // Fault address register
}

impl CpuState {
    pub const fn new() -> Self {
        Self {
            regs: [0; 31],
            sp_el0: 0,
            elr_el1: 0,
            spsr_el1: 0,
            esr_el1: 0,
            far_el1: 0,
        }
    }

    /// Register x`n`
    #[inline]
    pub fn x(&self, n: usize) -> u64 {
        self.regs[n]
    }

    #[inline]
    pub fn set_x(&mut self, n: usize, value: u64) {
        self.regs[n] = value;
    }

    /// Return value register (x0)
    #[inline]
    pub fn set_return_value(&mut self, value: u64) {
        self.regs[0] = value;
    }

    /// Exception class from ESR_EL1
    #[inline]
    pub fn exception_class(&self) -> u8 {
        ((self.esr_el1 >> 26) & 0x3F) as u8
    }

    /// Instruction specific syndrome from ESR_EL1
    #[inline]
    pub fn iss(&self) -> u32 {
        (self.esr_el1 & 0x1FF_FFFF) as u32
    }

    /// Whether the exception was taken from user mode (EL0t)
    #[inline]
    pub fn from_user(&self) -> bool {
        self.spsr_el1 & 0xF == 0
    }
}

impl fmt::Debug for CpuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuState")
            .field("x0", &format_args!("{:#018x}", self.regs[0]))
            .field("x1", &format_args!("{:#018x}", self.regs[1]))
            .field("x2", &format_args!("{:#018x}", self.regs[2]))
            .field("x3", &format_args!("{:#018x}", self.regs[3]))
            .field("x29_fp", &format_args!("{:#018x}", self.regs[29]))
            .field("x30_lr", &format_args!("{:#018x}", self.regs[30]))
            .field("sp_el0", &format_args!("{:#018x}", self.sp_el0))
            .field("elr_el1", &format_args!("{:#018x}", self.elr_el1))
            .field("spsr_el1", &format_args!("{:#018x}", self.spsr_el1))
            .field("esr_el1", &format_args!("{:#018x}", self.esr_el1))
            .field("far_el1", &format_args!("{:#018x}", self.far_el1))
            .finish()
    }
}

/// Size of the CPU state in bytes (for the exception entry code)
pub const CPU_STATE_SIZE: usize = core::mem::size_of::<CpuState>();

// 31 GPRs + 5 special registers
const_assert_eq!(CPU_STATE_SIZE, 36 * 8);
const_assert!(core::mem::align_of::<CpuState>() == 8);
