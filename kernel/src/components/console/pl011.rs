//! PL011 UART console component (minimal)
//!
//! Just enough of the PL011 for kernel log output: poll the TX FIFO flag,
//! write the data register. Baud rate and line settings are left as the
//! firmware configured them.

use super::Console;
use core::ptr;

/// PL011 UART registers (minimal subset)
#[repr(C)]
struct Pl011Regs {
    dr: u32,           // 0x00: Data register
    _rsrecr: [u32; 5], // 0x04-0x14: Status/error registers (unused)
    fr: u32,           // 0x18: Flag register
}

/// FR: transmit FIFO full
const FR_TXFF: u32 = 1 << 5;

/// PL011 console component configuration
#[derive(Clone, Copy)]
pub struct Pl011Config {
    /// MMIO base address (as mapped for the kernel)
    pub mmio_base: usize,
}

/// PL011 minimal console (kernel component)
///
/// The MMIO region must be mapped before the console is used.
pub struct Pl011Console {
    mmio_base: usize,
}

impl Pl011Console {
    pub const fn new(config: Pl011Config) -> Self {
        Self {
            mmio_base: config.mmio_base,
        }
    }

    /// Check that the UART responds; configuration is left to firmware
    pub fn init(&self) {
        unsafe {
            let regs = self.mmio_base as *const Pl011Regs;
            let _flags = ptr::read_volatile(ptr::addr_of!((*regs).fr));
        }
    }

    /// Check if TX FIFO is full
    #[inline]
    fn tx_full(&self) -> bool {
        unsafe {
            let regs = self.mmio_base as *const Pl011Regs;
            let fr = ptr::read_volatile(ptr::addr_of!((*regs).fr));
            (fr & FR_TXFF) != 0
        }
    }
}

impl Console for Pl011Console {
    fn putc(&self, c: u8) {
        while self.tx_full() {
            core::hint::spin_loop();
        }

        unsafe {
            let regs = self.mmio_base as *mut Pl011Regs;
            ptr::write_volatile(ptr::addr_of_mut!((*regs).dr), c as u32);
        }
    }
}
