//! Keystone Boot Image Builder
//!
//! Packs ELF programs into the boot image the kernel loads its initial
//! processes from, and inspects existing images.
//!
//! Usage:
//!   keystone-bootimage-builder build \
//!     --privileged path/to/init.elf \
//!     --program path/to/shell.elf \
//!     --out path/to/bootimage.bin
//!
//!   keystone-bootimage-builder inspect path/to/bootimage.bin
//!
//! Privileged programs are placed in the image before regular ones, each
//! group in command-line order.

mod elf_loader;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use keystone_bootimage::{BootImage, BootImageBuilder, SymbolKind};
use std::fs;
use std::path::{Path, PathBuf};

use crate::elf_loader::parse_elf_file;

#[derive(Parser, Debug)]
#[command(name = "keystone-bootimage-builder", version)]
#[command(about = "Pack ELF programs into a Keystone boot image")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a boot image from ELF programs
    Build {
        /// Unprivileged program ELF (repeatable)
        #[arg(long = "program")]
        programs: Vec<PathBuf>,

        /// Privileged program ELF (repeatable)
        #[arg(long = "privileged")]
        privileged: Vec<PathBuf>,

        /// Output boot image path
        #[arg(long)]
        out: PathBuf,
    },

    /// List the programs and segments of a boot image
    Inspect {
        /// Boot image path
        image: PathBuf,
    },
}

fn build(programs: &[PathBuf], privileged: &[PathBuf], out: &Path) -> Result<()> {
    if programs.is_empty() && privileged.is_empty() {
        bail!("no programs given");
    }

    let mut builder = BootImageBuilder::new();
    let inputs = privileged
        .iter()
        .map(|path| (path, SymbolKind::PrivilegedProgram))
        .chain(programs.iter().map(|path| (path, SymbolKind::Program)));

    for (path, kind) in inputs {
        let program = parse_elf_file(path)?;
        builder
            .program(&program.name, program.entry, kind, program.segments)
            .with_context(|| format!("Cannot add {}", path.display()))?;
        log::info!("Added {} ({:?})", program.name, kind);
    }

    let image = builder.build().context("Failed to build boot image")?;
    fs::write(out, &image).with_context(|| format!("Failed to write {}", out.display()))?;

    log::info!(
        "Boot image written to {} ({} programs, {} bytes)",
        out.display(),
        builder.program_count(),
        image.len()
    );
    Ok(())
}

fn inspect(path: &Path) -> Result<()> {
    let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let image = BootImage::parse(&data).context("Invalid boot image")?;

    log::info!(
        "{}: {} bytes, {} symbols, {} segments",
        path.display(),
        image.len(),
        image.symbol_count(),
        image.segment_count()
    );

    for (index, symbol) in image.symbols().enumerate() {
        let symbol = symbol.with_context(|| format!("Bad symbol {}", index))?;
        log::info!(
            "  [{}] {} entry={:#x} kind={:?}",
            index,
            symbol.name,
            symbol.entry,
            symbol.kind
        );

        for segment in image.segments(&symbol) {
            let segment = segment.with_context(|| format!("Bad segment in {}", symbol.name))?;
            log::info!(
                "      {:#x} - {:#x} at offset {:#x}",
                segment.virtual_address,
                segment.virtual_address + segment.size as u64,
                segment.offset
            );
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Build {
            programs,
            privileged,
            out,
        } => build(&programs, &privileged, &out),
        Command::Inspect { image } => inspect(&image),
    }
}
