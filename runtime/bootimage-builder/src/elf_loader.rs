//! ELF file parsing and segment extraction

use anyhow::{bail, Context, Result};
use goblin::elf::program_header::PT_LOAD;
use goblin::elf::{Elf, ProgramHeader};
use keystone_bootimage::PAGE_SIZE;
use std::fs;
use std::path::Path;

/// A program ready to be packed into the boot image
#[derive(Debug)]
pub struct ElfProgram {
    pub name: String,
    pub entry: u64,
    /// (page-aligned virtual address, data)
    pub segments: Vec<(u64, Vec<u8>)>,
}

/// Align address down to page boundary
fn page_align_down(addr: u64) -> u64 {
    addr & !(PAGE_SIZE as u64 - 1)
}

/// Parse an ELF file into a boot program named after the file stem
pub fn parse_elf_file(path: &Path) -> Result<ElfProgram> {
    log::info!("Parsing ELF: {}", path.display());

    let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let elf = Elf::parse(&data).with_context(|| format!("Failed to parse {}", path.display()))?;

    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .with_context(|| format!("No usable program name in {}", path.display()))?
        .to_string();

    log::info!("  Entry point: {:#x}", elf.entry);
    log::info!("  Program headers: {}", elf.program_headers.len());

    let segments = load_segments(&elf.program_headers, &data)?;
    log::info!("  Extracted {} segments", segments.len());

    Ok(ElfProgram {
        name,
        entry: elf.entry,
        segments,
    })
}

/// Convert every `PT_LOAD` header into a page-aligned segment
pub fn load_segments(headers: &[ProgramHeader], elf_data: &[u8]) -> Result<Vec<(u64, Vec<u8>)>> {
    headers
        .iter()
        .filter(|ph| ph.p_type == PT_LOAD && ph.p_memsz > 0)
        .map(|ph| load_segment(ph, elf_data))
        .collect()
}

fn load_segment(ph: &ProgramHeader, elf_data: &[u8]) -> Result<(u64, Vec<u8>)> {
    if ph.p_filesz > ph.p_memsz {
        bail!(
            "segment at {:#x}: file size {:#x} exceeds memory size {:#x}",
            ph.p_vaddr,
            ph.p_filesz,
            ph.p_memsz
        );
    }

    let start = ph.p_offset as usize;
    let end = start
        .checked_add(ph.p_filesz as usize)
        .filter(|end| *end <= elf_data.len())
        .with_context(|| format!("segment at {:#x} lies outside the file", ph.p_vaddr))?;

    let vaddr = page_align_down(ph.p_vaddr);
    let padding = (ph.p_vaddr - vaddr) as usize;

    log::info!(
        "  Load segment: {:#x} - {:#x} (file {:#x}, mem {:#x})",
        ph.p_vaddr,
        ph.p_vaddr + ph.p_memsz,
        ph.p_filesz,
        ph.p_memsz
    );

    let mut data = vec![0u8; padding];
    data.extend_from_slice(&elf_data[start..end]);

    // BSS
    if ph.p_memsz > ph.p_filesz {
        let bss_size = (ph.p_memsz - ph.p_filesz) as usize;
        log::debug!("    BSS: {} bytes zeroed", bss_size);
        data.resize(data.len() + bss_size, 0);
    }

    Ok((vaddr, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use goblin::elf::program_header::PT_NOTE;

    fn load(vaddr: u64, offset: u64, filesz: u64, memsz: u64) -> ProgramHeader {
        ProgramHeader {
            p_type: PT_LOAD,
            p_vaddr: vaddr,
            p_offset: offset,
            p_filesz: filesz,
            p_memsz: memsz,
            ..Default::default()
        }
    }

    #[test]
    fn test_aligned_segment_is_copied() {
        let file: Vec<u8> = (0..64).collect();
        let segments = load_segments(&[load(0x40_0000, 16, 8, 8)], &file).unwrap();

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].0, 0x40_0000);
        assert_eq!(segments[0].1, (16..24).collect::<Vec<u8>>());
    }

    #[test]
    fn test_unaligned_segment_gets_leading_padding() {
        let file = vec![0xEE; 32];
        let segments = load_segments(&[load(0x40_0010, 0, 4, 4)], &file).unwrap();

        let (vaddr, data) = &segments[0];
        assert_eq!(*vaddr, 0x40_0000);
        assert_eq!(data.len(), 0x14);
        assert!(data[..0x10].iter().all(|&b| b == 0));
        assert_eq!(&data[0x10..], &[0xEEu8; 4]);
    }

    #[test]
    fn test_bss_is_zero_filled() {
        let file = vec![0x11; 16];
        let segments = load_segments(&[load(0x50_0000, 0, 16, 0x2000)], &file).unwrap();

        let data = &segments[0].1;
        assert_eq!(data.len(), 0x2000);
        assert!(data[..16].iter().all(|&b| b == 0x11));
        assert!(data[16..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_only_load_headers_are_used() {
        let file = vec![0; 16];
        let note = ProgramHeader {
            p_type: PT_NOTE,
            p_filesz: 4,
            p_memsz: 4,
            ..Default::default()
        };
        let segments = load_segments(&[note, load(0x1000, 0, 0, 0)], &file).unwrap();
        assert!(segments.is_empty());
    }

    #[test]
    fn test_segment_outside_file_is_rejected() {
        let file = vec![0; 16];
        assert!(load_segments(&[load(0x1000, 8, 16, 16)], &file).is_err());
        assert!(load_segments(&[load(0x1000, 0, 16, 8)], &file).is_err());
    }
}
