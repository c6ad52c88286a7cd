//! Validating boot image parser
//!
//! The image is never overlaid with raw structures: every table is checked
//! against the declared image size once in [`BootImage::parse`], and every
//! entry handed out afterwards is decoded from an already bounds-checked
//! slice.

use crate::layout::{
    read_u32, read_u64, Header, ProgramName, SymbolKind, HEADER_SIZE, LAYOUT_REVISION, MAGIC0,
    MAGIC1, NAME_LEN, PAGE_SIZE, SEGMENT_SIZE, SYMBOL_SIZE,
};
use crate::{BootImageError, Result};

/// One embedded program (symbol table entry)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootSymbol {
    pub name: ProgramName,
    pub entry: u64,
    pub kind: SymbolKind,
    /// Index of the first segment in the segment table
    pub segments_offset: u32,
    pub segments_count: u32,
}

/// One segment of a program (segment table entry)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootSegment {
    pub virtual_address: u64,
    /// Byte offset of the data from the image base
    pub offset: u32,
    pub size: u32,
}

/// A validated, read-only view over a boot image
#[derive(Debug, Clone, Copy)]
pub struct BootImage<'a> {
    bytes: &'a [u8],
    header: Header,
}

fn table_end(offset: u32, count: u32, entry_size: usize) -> Option<usize> {
    (count as usize)
        .checked_mul(entry_size)?
        .checked_add(offset as usize)
}

impl<'a> BootImage<'a> {
    /// Validate `bytes` as a boot image
    ///
    /// Rejects the whole image on a signature, revision or table-bounds
    /// mismatch; nothing is partially accepted.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let header = Header::read(bytes)?;

        if header.magic != [MAGIC0, MAGIC1] {
            return Err(BootImageError::BadMagic {
                magic0: header.magic[0],
                magic1: header.magic[1],
            });
        }

        if header.layout_revision != LAYOUT_REVISION {
            return Err(BootImageError::BadRevision {
                found: header.layout_revision,
                expected: LAYOUT_REVISION,
            });
        }

        let size = header.image_size as usize;
        if size < HEADER_SIZE || size > bytes.len() {
            return Err(BootImageError::Truncated {
                needed: size.max(HEADER_SIZE),
                available: bytes.len(),
            });
        }

        match table_end(header.symbol_table_offset, header.symbol_table_count, SYMBOL_SIZE) {
            Some(end) if end <= size && header.symbol_table_offset as usize >= HEADER_SIZE => {}
            _ => return Err(BootImageError::TableOutOfBounds { table: "symbol" }),
        }

        match table_end(header.segments_table_offset, header.segments_table_count, SEGMENT_SIZE) {
            Some(end) if end <= size && header.segments_table_offset as usize >= HEADER_SIZE => {}
            _ => return Err(BootImageError::TableOutOfBounds { table: "segment" }),
        }

        Ok(Self {
            bytes: &bytes[..size],
            header,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The image bytes, trimmed to the declared size
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn symbol_count(&self) -> usize {
        self.header.symbol_table_count as usize
    }

    pub fn segment_count(&self) -> usize {
        self.header.segments_table_count as usize
    }

    /// Decode symbol `index`, checking that its segment sub-table is in range
    pub fn symbol(&self, index: usize) -> Result<BootSymbol> {
        let count = self.symbol_count();
        if index >= count {
            return Err(BootImageError::SymbolOutOfRange { index, count });
        }

        let start = self.header.symbol_table_offset as usize + index * SYMBOL_SIZE;
        let raw = &self.bytes[start..start + SYMBOL_SIZE];

        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&raw[..NAME_LEN]);

        let symbol = BootSymbol {
            name: ProgramName::from_raw(name),
            entry: read_u64(raw, 32),
            kind: SymbolKind::from_raw(read_u32(raw, 40)),
            segments_offset: read_u32(raw, 44),
            segments_count: read_u32(raw, 48),
        };

        let last = (symbol.segments_offset as usize).checked_add(symbol.segments_count as usize);
        match last {
            Some(end) if end <= self.segment_count() => Ok(symbol),
            _ => Err(BootImageError::TableOutOfBounds { table: "segment" }),
        }
    }

    /// Decode segment table entry `index`, checking its data range
    pub fn segment(&self, index: usize) -> Result<BootSegment> {
        if index >= self.segment_count() {
            return Err(BootImageError::SegmentOutOfBounds { index });
        }

        let start = self.header.segments_table_offset as usize + index * SEGMENT_SIZE;
        let raw = &self.bytes[start..start + SEGMENT_SIZE];

        let segment = BootSegment {
            virtual_address: read_u64(raw, 0),
            offset: read_u32(raw, 8),
            size: read_u32(raw, 12),
        };

        if segment.offset as usize % PAGE_SIZE != 0
            || segment.virtual_address % PAGE_SIZE as u64 != 0
        {
            return Err(BootImageError::SegmentMisaligned { index });
        }

        let end = segment.offset as usize + segment.size as usize;
        if end > self.bytes.len() {
            return Err(BootImageError::SegmentOutOfBounds { index });
        }

        // Every page of the segment must have a representable address
        if segment
            .virtual_address
            .checked_add(segment.size as u64)
            .is_none()
        {
            return Err(BootImageError::SegmentOutOfBounds { index });
        }

        Ok(segment)
    }

    /// Segments belonging to `symbol`, in table order
    pub fn segments(&self, symbol: &BootSymbol) -> impl Iterator<Item = Result<BootSegment>> + '_ {
        let first = symbol.segments_offset as usize;
        (first..first + symbol.segments_count as usize).map(move |index| self.segment(index))
    }

    /// All symbols, in table order
    pub fn symbols(&self) -> impl Iterator<Item = Result<BootSymbol>> + '_ {
        (0..self.symbol_count()).map(move |index| self.symbol(index))
    }

    /// Raw data of a segment
    pub fn segment_data(&self, segment: &BootSegment) -> &'a [u8] {
        let start = segment.offset as usize;
        &self.bytes[start..start + segment.size as usize]
    }
}
