//! Kernel error types
//!
//! Each subsystem has its own error enum; [`KernelError`] is what the
//! kernel's public operations return and wraps them.

use keystone_bootimage::BootImageError;
use thiserror::Error;

use crate::interrupt::IntControllerError;
use crate::memory::heap::HeapError;
use crate::memory::LedgerError;
use crate::process::ProcessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KernelError {
    /// Malformed boot image, or an entry that is not a program
    #[error("invalid boot image: {0}")]
    InvalidBootImage(#[from] BootImageError),

    /// Creating or provisioning a boot process failed
    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    /// Inter-core interrupt could not be sent
    #[error("failed to send IPI to core {core}: {cause}")]
    Io {
        core: u32,
        irq: u32,
        cause: IntControllerError,
    },

    #[error("physical memory: {0}")]
    Ledger(#[from] LedgerError),

    #[error("heap: {0}")]
    Heap(#[from] HeapError),

    #[error("interrupt vector {0} out of range")]
    InvalidVector(u32),
}

pub type Result<T> = core::result::Result<T, KernelError>;
