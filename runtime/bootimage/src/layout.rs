//! Binary layout of a boot image
//!
//! All integers are little-endian. The header sits at offset 0; the symbol
//! and segment tables are located by byte offsets relative to the image
//! base.
//!
//! ```text
//! Header (32 bytes)
//!   0  u32 magic0          "BOOT"
//!   4  u32 magic1          "IMG0"
//!   8  u32 layout revision
//!  12  u32 image size
//!  16  u32 symbol table offset
//!  20  u32 symbol table count
//!  24  u32 segment table offset
//!  28  u32 segment table count
//!
//! Symbol (56 bytes)
//!   0  [u8; 32] name (null padded)
//!  32  u64 entry point
//!  40  u32 kind
//!  44  u32 first segment index
//!  48  u32 segment count
//!  52  u32 reserved
//!
//! Segment (16 bytes)
//!   0  u64 virtual address
//!   8  u32 data offset (page aligned)
//!  12  u32 size
//! ```

use core::fmt;

use static_assertions::const_assert_eq;

use crate::{BootImageError, Result};

/// First magic word ("BOOT")
pub const MAGIC0: u32 = u32::from_le_bytes(*b"BOOT");

/// Second magic word ("IMG0")
pub const MAGIC1: u32 = u32::from_le_bytes(*b"IMG0");

/// Only layout revision understood by this crate
pub const LAYOUT_REVISION: u32 = 1;

/// Page granularity of segment data inside the image
pub const PAGE_SIZE: usize = 4096;

/// Fixed length of a program name field, including the terminating null
pub const NAME_LEN: usize = 32;

/// Encoded header size
pub const HEADER_SIZE: usize = 32;

/// Encoded symbol entry size
pub const SYMBOL_SIZE: usize = 56;

/// Encoded segment entry size
pub const SEGMENT_SIZE: usize = 16;

const_assert_eq!(HEADER_SIZE, 8 * 4);
const_assert_eq!(SYMBOL_SIZE, NAME_LEN + 8 + 4 * 4);
const_assert_eq!(SEGMENT_SIZE, 8 + 4 + 4);

pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

pub(crate) fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(raw)
}

#[cfg(feature = "alloc")]
pub(crate) fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[cfg(feature = "alloc")]
pub(crate) fn write_u64(bytes: &mut [u8], offset: usize, value: u64) {
    bytes[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// Decoded boot image header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: [u32; 2],
    pub layout_revision: u32,
    pub image_size: u32,
    pub symbol_table_offset: u32,
    pub symbol_table_count: u32,
    pub segments_table_offset: u32,
    pub segments_table_count: u32,
}

impl Header {
    /// Decode the header at the start of `bytes`
    ///
    /// Only checks that enough bytes are present; signature checks are done
    /// by [`crate::BootImage::parse`].
    pub fn read(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(BootImageError::Truncated {
                needed: HEADER_SIZE,
                available: bytes.len(),
            });
        }

        Ok(Self {
            magic: [read_u32(bytes, 0), read_u32(bytes, 4)],
            layout_revision: read_u32(bytes, 8),
            image_size: read_u32(bytes, 12),
            symbol_table_offset: read_u32(bytes, 16),
            symbol_table_count: read_u32(bytes, 20),
            segments_table_offset: read_u32(bytes, 24),
            segments_table_count: read_u32(bytes, 28),
        })
    }

    #[cfg(feature = "alloc")]
    pub(crate) fn write(&self, out: &mut [u8]) {
        write_u32(out, 0, self.magic[0]);
        write_u32(out, 4, self.magic[1]);
        write_u32(out, 8, self.layout_revision);
        write_u32(out, 12, self.image_size);
        write_u32(out, 16, self.symbol_table_offset);
        write_u32(out, 20, self.symbol_table_count);
        write_u32(out, 24, self.segments_table_offset);
        write_u32(out, 28, self.segments_table_count);
    }

    /// Whether the signature words and revision match this crate's layout
    pub fn is_valid(&self) -> bool {
        self.magic == [MAGIC0, MAGIC1] && self.layout_revision == LAYOUT_REVISION
    }
}

/// Kind of a symbol table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Unprivileged boot program
    Program,
    /// Boot program granted privileged execution
    PrivilegedProgram,
    /// Anything else (data blobs, future entry types)
    Other(u32),
}

impl SymbolKind {
    const PROGRAM: u32 = 1;
    const PRIVILEGED_PROGRAM: u32 = 2;

    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            Self::PROGRAM => SymbolKind::Program,
            Self::PRIVILEGED_PROGRAM => SymbolKind::PrivilegedProgram,
            other => SymbolKind::Other(other),
        }
    }

    pub const fn raw(self) -> u32 {
        match self {
            SymbolKind::Program => Self::PROGRAM,
            SymbolKind::PrivilegedProgram => Self::PRIVILEGED_PROGRAM,
            SymbolKind::Other(raw) => raw,
        }
    }

    /// Whether the kernel can start a process from this entry
    pub const fn is_program(self) -> bool {
        matches!(self, SymbolKind::Program | SymbolKind::PrivilegedProgram)
    }
}

/// Fixed-length, null-padded program name
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ProgramName([u8; NAME_LEN]);

impl ProgramName {
    /// Build a name; at most `NAME_LEN - 1` bytes so a null always follows
    pub fn new(name: &str) -> Result<Self> {
        let bytes = name.as_bytes();
        if bytes.len() >= NAME_LEN {
            return Err(BootImageError::NameTooLong {
                len: bytes.len(),
                max: NAME_LEN - 1,
            });
        }

        let mut raw = [0u8; NAME_LEN];
        raw[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(raw))
    }

    pub const fn from_raw(raw: [u8; NAME_LEN]) -> Self {
        Self(raw)
    }

    /// The full field, padding included
    pub const fn as_bytes(&self) -> &[u8; NAME_LEN] {
        &self.0
    }

    /// Name up to the first null (or the first invalid UTF-8 byte)
    pub fn as_str(&self) -> &str {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        match core::str::from_utf8(&self.0[..len]) {
            Ok(name) => name,
            Err(e) => core::str::from_utf8(&self.0[..e.valid_up_to()]).unwrap_or_default(),
        }
    }
}

impl fmt::Display for ProgramName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for ProgramName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}
