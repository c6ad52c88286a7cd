//! Boot image writer
//!
//! Lays out header, symbol table and segment table back to back, then each
//! segment's data at the next page boundary so the kernel can map it in
//! place.

use alloc::vec;
use alloc::vec::Vec;

use crate::layout::{
    write_u32, write_u64, Header, ProgramName, SymbolKind, HEADER_SIZE, LAYOUT_REVISION, MAGIC0,
    MAGIC1, NAME_LEN, PAGE_SIZE, SEGMENT_SIZE, SYMBOL_SIZE,
};
use crate::{BootImageError, Result};

struct Program {
    name: ProgramName,
    entry: u64,
    kind: SymbolKind,
    segments: Vec<(u64, Vec<u8>)>,
}

/// Collects programs and serializes them into a boot image
#[derive(Default)]
pub struct BootImageBuilder {
    programs: Vec<Program>,
}

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

impl BootImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a program with its `(virtual address, data)` segments
    ///
    /// Segment virtual addresses must be page aligned; the data length
    /// becomes the segment size.
    pub fn program(
        &mut self,
        name: &str,
        entry: u64,
        kind: SymbolKind,
        segments: Vec<(u64, Vec<u8>)>,
    ) -> Result<&mut Self> {
        let name = ProgramName::new(name)?;

        let already = self.programs.iter().map(|p| p.segments.len()).sum::<usize>();
        for (i, (vaddr, _)) in segments.iter().enumerate() {
            if vaddr % PAGE_SIZE as u64 != 0 {
                return Err(BootImageError::SegmentMisaligned { index: already + i });
            }
        }

        self.programs.push(Program {
            name,
            entry,
            kind,
            segments,
        });
        Ok(self)
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Serialize every program added so far
    pub fn build(&self) -> Result<Vec<u8>> {
        let symbol_count = self.programs.len();
        let segment_count: usize = self.programs.iter().map(|p| p.segments.len()).sum();

        let symbols_at = HEADER_SIZE;
        let segments_at = symbols_at + symbol_count * SYMBOL_SIZE;
        let tables_end = segments_at + segment_count * SEGMENT_SIZE;

        // Assign page-aligned data offsets
        let mut cursor = align_up(tables_end, PAGE_SIZE);
        let mut placements = Vec::with_capacity(segment_count);
        for (_, data) in self.programs.iter().flat_map(|p| p.segments.iter()) {
            placements.push(cursor);
            cursor = align_up(cursor + data.len(), PAGE_SIZE);
        }

        let image_size = placements
            .iter()
            .zip(self.programs.iter().flat_map(|p| p.segments.iter()))
            .map(|(offset, (_, data))| offset + data.len())
            .max()
            .unwrap_or(tables_end)
            .max(tables_end);

        if image_size > u32::MAX as usize {
            return Err(BootImageError::TooLarge);
        }

        let mut out = vec![0u8; image_size];

        Header {
            magic: [MAGIC0, MAGIC1],
            layout_revision: LAYOUT_REVISION,
            image_size: image_size as u32,
            symbol_table_offset: symbols_at as u32,
            symbol_table_count: symbol_count as u32,
            segments_table_offset: segments_at as u32,
            segments_table_count: segment_count as u32,
        }
        .write(&mut out);

        let mut segment_index = 0usize;
        for (i, program) in self.programs.iter().enumerate() {
            let sym = symbols_at + i * SYMBOL_SIZE;
            out[sym..sym + NAME_LEN].copy_from_slice(program.name.as_bytes());
            write_u64(&mut out, sym + 32, program.entry);
            write_u32(&mut out, sym + 40, program.kind.raw());
            write_u32(&mut out, sym + 44, segment_index as u32);
            write_u32(&mut out, sym + 48, program.segments.len() as u32);

            for (vaddr, data) in &program.segments {
                let seg = segments_at + segment_index * SEGMENT_SIZE;
                let offset = placements[segment_index];
                write_u64(&mut out, seg, *vaddr);
                write_u32(&mut out, seg + 8, offset as u32);
                write_u32(&mut out, seg + 12, data.len() as u32);
                out[offset..offset + data.len()].copy_from_slice(data);
                segment_index += 1;
            }
        }

        Ok(out)
    }
}
