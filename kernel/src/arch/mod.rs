//! Architecture support
//!
//! Only AArch64: the QEMU virt memory map, the exception frame hooks
//! receive, and the GICv2 interrupt controller.

pub mod aarch64;
