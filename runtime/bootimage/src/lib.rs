//! Boot image - the contract between the image builder and the kernel
//!
//! # Purpose
//! A boot image is a single read-only blob, placed in physical memory by the
//! previous boot stage, that embeds every program the kernel starts before
//! any file system exists. This crate owns its binary layout so that the
//! builder tool and the kernel loader cannot drift apart.
//!
//! # Integration Points
//! - Depends on: nothing (pure `no_std`)
//! - Provides to: kernel boot image loader, `keystone-bootimage-builder`
//!
//! # Architecture
//! - `layout`: constants, header and table entry encodings
//! - `image`: zero-copy parser that validates every table against the
//!   image bounds before handing out entries
//! - `builder` (feature `alloc`): writer producing images bit-for-bit
//!   compatible with the parser
//!
//! # Testing Strategy
//! - Unit tests: header/entry decoding, bounds validation
//! - Integration tests: builder output parsed back through [`BootImage`]

#![cfg_attr(not(test), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

mod image;
mod layout;

#[cfg(feature = "alloc")]
mod builder;

pub use image::{BootImage, BootSegment, BootSymbol};
pub use layout::{
    Header, ProgramName, SymbolKind, HEADER_SIZE, LAYOUT_REVISION, MAGIC0, MAGIC1, NAME_LEN,
    PAGE_SIZE, SEGMENT_SIZE, SYMBOL_SIZE,
};

#[cfg(feature = "alloc")]
pub use builder::BootImageBuilder;

use thiserror::Error;

/// Errors raised while decoding or producing a boot image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BootImageError {
    #[error("image truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("invalid boot image signature: {magic0:#010x}, {magic1:#010x}")]
    BadMagic { magic0: u32, magic1: u32 },

    #[error("unsupported layout revision {found} (expected {expected})")]
    BadRevision { found: u32, expected: u32 },

    #[error("{table} table exceeds image bounds")]
    TableOutOfBounds { table: &'static str },

    #[error("symbol index {index} out of range ({count} symbols)")]
    SymbolOutOfRange { index: usize, count: usize },

    #[error("segment {index} exceeds image bounds")]
    SegmentOutOfBounds { index: usize },

    #[error("segment {index} is not page aligned")]
    SegmentMisaligned { index: usize },

    #[error("program name is {len} bytes (max {max})")]
    NameTooLong { len: usize, max: usize },

    #[error("unsupported program kind {kind}")]
    UnsupportedKind { kind: u32 },

    #[error("image does not fit the 32-bit layout")]
    TooLarge,
}

pub type Result<T> = core::result::Result<T, BootImageError>;
