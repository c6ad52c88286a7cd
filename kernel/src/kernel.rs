//! Kernel orchestrator
//!
//! # Purpose
//! [`Kernel`] is the single, explicitly constructed context object of the
//! boot core. It owns the physical memory ledger, the interrupt vector
//! table, the heap handle and the collaborators (process manager, API
//! object, interrupt controller), and exposes narrow services on top.
//!
//! # Boot sequence
//! 1. [`Kernel::new`]: build the ledger over RAM and reserve everything the
//!    previous stage already occupies, in order: low 4MB, kernel image,
//!    boot image, heap, inter-core channel
//! 2. [`Kernel::heap`]: format the heap region on first use
//! 3. [`Kernel::run`]: load the boot image, then hand over to the scheduler
//!
//! A failure during the reservation sequence means the boot layout is
//! corrupt or oversized; it is fatal.
//!
//! # Interrupts
//! [`Kernel::execute_int_vector`] masks the vector, runs its hooks in
//! registration order, then forwards a notification for the logical IRQ
//! to the process manager. A notification that cannot be delivered is
//! fatal.

use log::{debug, error, info, trace};

use crate::boot::CoreInfo;
use crate::config::LOW_MEMORY_RESERVED;
use crate::error::{KernelError, Result};
use crate::interrupt::{CpuState, IntController, InterruptHandler, InterruptHook, VectorTable};
use crate::memory::heap::{self, DefaultHeap, PoolAllocator};
use crate::memory::{MemoryLayout, PhysicalLedger};
use crate::process::{Process, ProcessManager};

pub const BANNER: &str = concat!("Keystone microkernel ", env!("CARGO_PKG_VERSION"));
pub const COPYRIGHT: &str = "Copyright (C) Keystone Contributors";

pub struct Kernel<P: ProcessManager, C: IntController, A> {
    pub(crate) info: CoreInfo,
    pub(crate) layout: MemoryLayout,
    pub(crate) ledger: PhysicalLedger,
    pub(crate) procs: P,
    api: A,
    int_control: Option<C>,
    vectors: VectorTable,
    default_heap: &'static DefaultHeap,
    heap: Option<&'static PoolAllocator>,
}

impl<P: ProcessManager, C: IntController, A> Kernel<P, C, A> {
    /// Construct the kernel and reserve the boot layout in the ledger
    ///
    /// `default_heap` receives the heap once it is formatted.
    pub fn new(
        info: CoreInfo,
        layout: MemoryLayout,
        procs: P,
        api: A,
        default_heap: &'static DefaultHeap,
    ) -> Self {
        info!("{}", BANNER);
        info!("{}", COPYRIGHT);

        if !info.is_valid() {
            error!("core info describes regions outside RAM: {:?}", info);
        }

        let ledger = PhysicalLedger::new(info.memory, layout.kernel_data);
        debug!(
            "memory: {:#x} - {:#x} ({} pages), window at {:#x}",
            info.memory.phys,
            info.memory.phys_end(),
            ledger.total_pages(),
            layout.kernel_data.virt
        );

        let mut kernel = Self {
            info,
            layout,
            ledger,
            procs,
            api,
            int_control: None,
            vectors: VectorTable::new(),
            default_heap,
            heap: None,
        };
        kernel.reserve_boot_layout();
        kernel
    }

    fn reserve_boot_layout(&mut self) {
        let memory = self.info.memory;
        let low = LOW_MEMORY_RESERVED.min(memory.size);
        if let Err(err) = self.ledger.reserve_region(memory.phys, low) {
            crate::fatal!("failed to reserve low memory at {:#x}: {}", memory.phys, err);
        }
        let low_end = memory.phys + low;

        let regions = [
            ("kernel", self.info.kernel),
            ("boot image", self.info.boot_image),
            ("heap", self.info.heap),
            ("core channel", self.info.core_channel),
        ];

        for (name, region) in regions {
            if region.is_empty() {
                continue;
            }

            // Pages inside the low margin are already reserved
            let start = if region.phys >= memory.phys && region.phys < low_end {
                low_end
            } else {
                region.phys
            };
            let end = region.phys_end();
            if end <= start {
                trace!("{} lies inside low memory", name);
                continue;
            }

            if let Err(err) = self.ledger.reserve_region(start, end.as_usize() - start.as_usize()) {
                crate::fatal!(
                    "failed to reserve {} memory {:#x} - {:#x}: {}",
                    name,
                    region.phys,
                    end,
                    err
                );
            }
            debug!("reserved {}: {:#x} - {:#x}", name, start, end);
        }

        info!(
            "memory: {} of {} pages free",
            self.ledger.free_pages(),
            self.ledger.total_pages()
        );
    }

    /// The kernel heap, formatted and installed as default on first call
    pub fn heap(&mut self) -> Result<&'static PoolAllocator> {
        if let Some(pool) = self.heap {
            return Ok(pool);
        }

        let region = self.info.heap;
        let base = self.ledger.to_virtual_range(region.phys, region.size)?;
        // SAFETY: the heap region was reserved at construction, nothing else
        // uses it, and the kernel window maps it for the kernel's lifetime
        let pool = unsafe { heap::format(base, region.size, self.default_heap)? };

        self.heap = Some(pool);
        Ok(pool)
    }

    pub fn ledger(&self) -> &PhysicalLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut PhysicalLedger {
        &mut self.ledger
    }

    pub fn process_manager(&mut self) -> &mut P {
        &mut self.procs
    }

    pub fn api(&mut self) -> &mut A {
        &mut self.api
    }

    pub fn core_info(&self) -> &CoreInfo {
        &self.info
    }

    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    /// Memory context of the current process
    pub fn memory_context(&mut self) -> Option<&mut <P::Process as Process>::Context> {
        self.procs.current().map(|process| process.memory_context())
    }

    pub fn set_int_controller(&mut self, controller: C) {
        self.int_control = Some(controller);
    }

    pub fn int_controller(&mut self) -> Option<&mut C> {
        self.int_control.as_mut()
    }

    pub fn vectors(&self) -> &VectorTable {
        &self.vectors
    }

    /// Enable or disable `irq`; a no-op without an interrupt controller
    pub fn enable_irq(&mut self, irq: u32, enabled: bool) {
        if let Some(controller) = self.int_control.as_mut() {
            if enabled {
                controller.enable(irq);
            } else {
                controller.disable(irq);
            }
        }
    }

    /// Raise `irq` on core `core`
    pub fn send_irq(&mut self, core: u32, irq: u32) -> Result<()> {
        if let Some(controller) = self.int_control.as_mut() {
            if let Err(cause) = controller.send(core, irq) {
                error!("failed to send IPI to core {}: {}", core, cause);
                return Err(KernelError::Io { core, irq, cause });
            }
        }
        Ok(())
    }

    /// Register `handler` with `param` for `vector`
    ///
    /// Registering the same pair twice keeps a single entry.
    pub fn hook_int_vector(&mut self, vector: u32, handler: InterruptHandler, param: usize) -> Result<()> {
        if self.vectors.hook(vector, InterruptHook::new(handler, param))? {
            trace!("hooked vector {} (param {:#x})", vector, param);
        }
        Ok(())
    }

    /// Handle interrupt `vector`
    ///
    /// The vector is masked before any hook runs; hooks or the notified
    /// process re-enable it.
    pub fn execute_int_vector(&mut self, vector: u32, state: &mut CpuState) {
        self.enable_irq(vector, false);

        self.vectors.dispatch(vector, state);

        // User space only knows IRQs without the controller's remapping base
        let base = self.int_control.as_ref().map_or(0, |controller| controller.base());
        let Some(irq) = vector.checked_sub(base) else {
            trace!("vector {} below IRQ base {}, no notification", vector, base);
            return;
        };

        if let Err(err) = self.procs.interrupt_notify(irq) {
            crate::fatal!("failed to raise interrupt notification for IRQ #{}: {}", vector, err);
        }
    }

    /// Load the boot programs and enter the scheduler
    pub fn run(&mut self) -> ! {
        match self.load_boot_image() {
            Ok(count) => info!("{} boot programs loaded", count),
            Err(err) => crate::fatal!("failed to load boot image: {}", err),
        }

        self.procs.schedule();

        crate::fatal!("scheduler returned to the kernel")
    }
}

