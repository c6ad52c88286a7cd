//! Interrupt handling
//!
//! # Purpose
//! Routes hardware interrupt vectors to kernel hooks and, through the
//! process manager, to user space.
//!
//! # Integration Points
//! - [`IntController`]: the platform interrupt controller (e.g. the GICv2
//!   driver in `arch::aarch64::gic`), consumed through a narrow contract
//! - [`VectorTable`]: per-vector hook lists owned by the kernel
//! - `Kernel::execute_int_vector`: masks the line, runs the hooks, then
//!   notifies the process layer
//!
//! # Testing Strategy
//! - Unit tests: hook registration order and deduplication
//! - Integration tests: dispatch ordering against a fake controller

pub mod vector;

pub use crate::arch::aarch64::context::CpuState;
pub use vector::{InterruptHandler, InterruptHook, VectorTable};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IntControllerError {
    #[error("cannot send IRQ {irq} to core {core}")]
    SendFailed { core: u32, irq: u32 },

    #[error("invalid IRQ {0}")]
    InvalidIrq(u32),
}

/// Platform interrupt controller
pub trait IntController {
    /// Unmask `irq`
    fn enable(&mut self, irq: u32);

    /// Mask `irq`
    fn disable(&mut self, irq: u32);

    /// Raise `irq` on another core
    fn send(&mut self, core: u32, irq: u32) -> Result<(), IntControllerError>;

    /// First vector used for hardware IRQs
    ///
    /// Vectors are `irq + base`; user space only sees `irq`.
    fn base(&self) -> u32;
}
