//! GICv2 distributor as an [`IntController`]
//!
//! Only the distributor registers the boot core drives are touched: the
//! set/clear-enable banks for masking and SGIR for inter-core interrupts.
//! Bringing up the distributor and the CPU interface is left to the
//! previous boot stage. GIC interrupt ids are used unmodified as kernel
//! vectors, so [`IntController::base`] is 0.

use core::ptr::write_volatile;

use crate::interrupt::{IntController, IntControllerError};

/// Interrupt ids a GICv2 can raise (32 SGI/PPI + 988 SPI)
pub const MAX_IRQS: u32 = 1020;

/// Software generated interrupt ids usable with [`IntController::send`]
pub const SGI_COUNT: u32 = 16;

/// CPU interfaces a GICv2 can target
pub const MAX_CORES: u32 = 8;

/// Set-enable banks, one bit per interrupt
const GICD_ISENABLER: usize = 0x100;

/// Clear-enable banks, one bit per interrupt
const GICD_ICENABLER: usize = 0x180;

/// Bits 16-23: CPU target list, bits 0-3: SGI id
const GICD_SGIR: usize = 0xF00;

pub struct Gic {
    dist_base: usize,
}

impl Gic {
    /// # Safety
    /// `dist_base` must point at a mapped GICv2 distributor (or memory
    /// standing in for one) for as long as the driver is used.
    pub const unsafe fn new(dist_base: usize) -> Self {
        Self { dist_base }
    }

    fn write(&self, offset: usize, value: u32) {
        // SAFETY: `new` requires the distributor base to be valid MMIO
        unsafe { write_volatile((self.dist_base + offset) as *mut u32, value) }
    }

    /// Write `irq`'s bit into the bank starting at `bank`
    fn write_bit(&self, bank: usize, irq: u32) {
        if irq >= MAX_IRQS {
            log::warn!("gic: ignoring invalid IRQ {}", irq);
            return;
        }
        self.write(bank + (irq / 32) as usize * 4, 1 << (irq % 32));
    }
}

impl IntController for Gic {
    fn enable(&mut self, irq: u32) {
        self.write_bit(GICD_ISENABLER, irq);
    }

    fn disable(&mut self, irq: u32) {
        self.write_bit(GICD_ICENABLER, irq);
    }

    fn send(&mut self, core: u32, irq: u32) -> Result<(), IntControllerError> {
        if irq >= SGI_COUNT || core >= MAX_CORES {
            return Err(IntControllerError::SendFailed { core, irq });
        }
        self.write(GICD_SGIR, (1 << (16 + core)) | irq);
        Ok(())
    }

    fn base(&self) -> u32 {
        0
    }
}
