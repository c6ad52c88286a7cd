//! Boot image loader
//!
//! Creates the initial processes from the boot image the previous stage
//! placed in physical memory.
//!
//! For every program entry:
//! 1. Create a process through the process manager (boot flag set,
//!    privileged for `PrivilegedProgram` entries)
//! 2. Map each segment page by page, straight from the boot image's
//!    physical pages
//! 3. Allocate and map an arguments page holding the program's name
//!
//! Entries that are not programs are skipped with a warning and the rest of
//! the image still loads. A process error aborts the whole load.
//!
//! Segments are mapped readable, writable and executable regardless of
//! their content; the image format carries no per-segment permissions.

use core::ptr;

use keystone_bootimage::{BootImage, SymbolKind, NAME_LEN};
use log::{error, info, warn};

use crate::error::{KernelError, Result};
use crate::interrupt::IntController;
use crate::kernel::Kernel;
use crate::memory::{Access, PhysAddr, VirtAddr, PAGE_SIZE};
use crate::process::{MemoryContext, Process, ProcessError, ProcessId, ProcessManager};

/// Permissions of every boot program segment
pub const SEGMENT_ACCESS: Access = Access::USER
    .union(Access::READABLE)
    .union(Access::WRITABLE)
    .union(Access::EXECUTABLE);

/// Permissions of the arguments page
pub const ARGUMENT_ACCESS: Access = Access::USER.union(Access::READABLE).union(Access::WRITABLE);

impl<P: ProcessManager, C: IntController, A> Kernel<P, C, A> {
    /// Validate the boot image and load every program in it
    ///
    /// Returns the number of processes created.
    pub fn load_boot_image(&mut self) -> Result<usize> {
        let region = self.info.boot_image;
        let virt = self.ledger.to_virtual_range(region.phys, region.size)?;

        info!("bootimage: {:#x} ({} bytes)", virt, region.size);

        // SAFETY: the boot image was reserved at construction and is only
        // ever read; the kernel window maps all of it
        let bytes = unsafe { core::slice::from_raw_parts(virt.as_ptr::<u8>(), region.size) };

        let image = BootImage::parse(bytes).map_err(|err| {
            error!("{}", err);
            KernelError::InvalidBootImage(err)
        })?;

        let mut loaded = 0;
        for index in 0..image.symbol_count() {
            match self.load_boot_process(&image, region.phys, index) {
                Ok(_) => loaded += 1,
                Err(KernelError::InvalidBootImage(err)) => {
                    warn!("bootimage: skipping entry {}: {}", index, err);
                }
                Err(err) => return Err(err),
            }
        }

        Ok(loaded)
    }

    /// Create the process for entry `index` of `image`
    ///
    /// `image_phys` is the physical address of the image, used to map
    /// segments in place.
    pub fn load_boot_process(
        &mut self,
        image: &BootImage<'_>,
        image_phys: PhysAddr,
        index: usize,
    ) -> Result<ProcessId> {
        let symbol = image.symbol(index)?;
        let name = symbol.name;

        let privileged = match symbol.kind {
            SymbolKind::Program => false,
            SymbolKind::PrivilegedProgram => true,
            SymbolKind::Other(kind) => {
                return Err(keystone_bootimage::BootImageError::UnsupportedKind { kind }.into());
            }
        };

        // Reject bad segments before anything is created
        for segment in image.segments(&symbol) {
            segment?;
        }

        let entry = VirtAddr::new(symbol.entry as usize);
        let process = match self.procs.create(entry, &self.layout, true, privileged) {
            Some(process) => process,
            None => {
                error!("failed to create boot program: {}", name);
                return Err(ProcessError::CreateFailed { name }.into());
            }
        };
        let id = process.id();
        let memory = process.memory_context();

        for segment in image.segments(&symbol) {
            let segment = segment?;
            for offset in (0..segment.size as usize).step_by(PAGE_SIZE) {
                let virt = VirtAddr::new(segment.virtual_address as usize + offset);
                let phys = image_phys + segment.offset as usize + offset;

                memory.map(virt, phys, SEGMENT_ACCESS).map_err(|cause| {
                    error!("failed to map {} at {:#x}: {}", name, virt, cause);
                    ProcessError::SegmentMapping {
                        name,
                        virt: virt.as_usize(),
                        cause,
                    }
                })?;
            }
        }

        let mut args = self.layout.user_args;
        args.access = ARGUMENT_ACCESS;
        args.phys = self.ledger.allocate(args.size, PAGE_SIZE).map_err(|err| {
            error!("failed to allocate program arguments page: {}", err);
            ProcessError::ArgumentAllocation(err)
        })?;

        memory.map_range(&args).map_err(|err| {
            error!("failed to map program arguments page: {}", err);
            ProcessError::ArgumentMapping(err)
        })?;

        let dest = self.ledger.to_virtual_range(args.phys, args.size)?;
        // SAFETY: the pages were just allocated from the ledger and lie inside
        // the kernel window
        unsafe {
            ptr::write_bytes(dest.as_mut_ptr::<u8>(), 0, args.size);
            ptr::copy_nonoverlapping(
                name.as_bytes().as_ptr(),
                dest.as_mut_ptr::<u8>(),
                NAME_LEN.min(args.size),
            );
        }

        info!("loaded: {}", name);
        Ok(id)
    }
}
