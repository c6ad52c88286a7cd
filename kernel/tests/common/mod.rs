//! Shared fakes for kernel integration tests
//!
//! Physical RAM is simulated by a page-aligned host buffer; its address is
//! used as the kernel window, so whatever the kernel writes through the
//! ledger's translation lands in the buffer.

#![allow(dead_code)]

use std::alloc::{alloc_zeroed, Layout};
use std::collections::BTreeMap;
use std::sync::Mutex;

use keystone_kernel::interrupt::IntControllerError;
use keystone_kernel::memory::{align_up, PAGE_SIZE};
use keystone_kernel::process::{MapError, ProcessError, ProcessId};
use keystone_kernel::{
    Access, CoreInfo, DefaultHeap, IntController, Kernel, MemoryContext, MemoryLayout,
    MemoryRegion, PhysAddr, Process, ProcessManager, VirtAddr,
};

pub const RAM_BASE: usize = 0x4000_0000;
pub const RAM_SIZE: usize = 8 * 1024 * 1024;

/// Straddles the end of the low 4MB margin
pub const KERNEL_BASE: usize = RAM_BASE + 0x30_0000;
pub const KERNEL_SIZE: usize = 0x20_0000;

pub const BOOT_IMAGE_BASE: usize = RAM_BASE + 0x60_0000;
pub const BOOT_IMAGE_MAX: usize = 0x10_0000;

pub const HEAP_BASE: usize = RAM_BASE + 0x70_0000;
pub const HEAP_SIZE: usize = 0x8_0000;

pub const CHANNEL_BASE: usize = RAM_BASE + 0x78_0000;
pub const CHANNEL_SIZE: usize = 0x1_0000;

/// First page nothing in the boot layout claims
pub const FIRST_FREE: usize = KERNEL_BASE + KERNEL_SIZE;

pub const USER_ARGS: usize = 0x7fff_0000;

/// Host buffer standing in for physical RAM
#[derive(Clone, Copy)]
pub struct SimulatedRam {
    base: *mut u8,
}

impl SimulatedRam {
    pub fn new() -> Self {
        let layout = Layout::from_size_align(RAM_SIZE, PAGE_SIZE).unwrap();
        // Leaked: the kernel under test keeps 'static references into it
        let base = unsafe { alloc_zeroed(layout) };
        assert!(!base.is_null());
        Self { base }
    }

    pub fn window(&self) -> VirtAddr {
        VirtAddr::new(self.base as usize)
    }

    pub fn write(&self, phys: usize, bytes: &[u8]) {
        let offset = phys - RAM_BASE;
        assert!(offset + bytes.len() <= RAM_SIZE);
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.base.add(offset), bytes.len()) };
    }

    pub fn read(&self, phys: usize, len: usize) -> &'static [u8] {
        let offset = phys - RAM_BASE;
        assert!(offset + len <= RAM_SIZE);
        unsafe { std::slice::from_raw_parts(self.base.add(offset), len) }
    }
}

#[derive(Debug, Default)]
pub struct FakeMemoryContext {
    pub mappings: BTreeMap<usize, (PhysAddr, Access)>,
    /// Virtual address whose mapping fails
    pub fail_at: Option<usize>,
}

impl MemoryContext for FakeMemoryContext {
    fn map(&mut self, virt: VirtAddr, phys: PhysAddr, access: Access) -> Result<(), MapError> {
        if self.fail_at == Some(virt.as_usize()) {
            return Err(MapError::OutOfMemory);
        }
        if self.mappings.contains_key(&virt.as_usize()) {
            return Err(MapError::AlreadyMapped(virt.as_usize()));
        }
        self.mappings.insert(virt.as_usize(), (phys, access));
        Ok(())
    }

    fn map_range(&mut self, region: &MemoryRegion) -> Result<(), MapError> {
        for offset in (0..region.size).step_by(PAGE_SIZE) {
            self.map(region.virt + offset, region.phys + offset, region.access)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct FakeProcess {
    pub id: ProcessId,
    pub entry: VirtAddr,
    pub boot: bool,
    pub privileged: bool,
    pub memory: FakeMemoryContext,
}

impl Process for FakeProcess {
    type Context = FakeMemoryContext;

    fn id(&self) -> ProcessId {
        self.id
    }

    fn memory_context(&mut self) -> &mut FakeMemoryContext {
        &mut self.memory
    }
}

#[derive(Debug, Default)]
pub struct FakeProcessManager {
    pub processes: Vec<FakeProcess>,
    pub notified: Vec<u32>,
    pub fail_create: bool,
    pub fail_notify: bool,
    /// Mapping failure injected into every created process
    pub fail_map_at: Option<usize>,
    pub scheduled: bool,
}

impl ProcessManager for FakeProcessManager {
    type Process = FakeProcess;

    fn create(
        &mut self,
        entry: VirtAddr,
        _layout: &MemoryLayout,
        boot: bool,
        privileged: bool,
    ) -> Option<&mut FakeProcess> {
        if self.fail_create {
            return None;
        }
        let id = self.processes.len() as ProcessId + 1;
        self.processes.push(FakeProcess {
            id,
            entry,
            boot,
            privileged,
            memory: FakeMemoryContext {
                fail_at: self.fail_map_at,
                ..Default::default()
            },
        });
        self.processes.last_mut()
    }

    fn interrupt_notify(&mut self, irq: u32) -> Result<(), ProcessError> {
        if self.fail_notify {
            return Err(ProcessError::NotifyFailed { irq });
        }
        self.notified.push(irq);
        Ok(())
    }

    fn schedule(&mut self) {
        self.scheduled = true;
    }

    fn current(&mut self) -> Option<&mut FakeProcess> {
        self.processes.last_mut()
    }
}

/// Interrupt line state shared between a controller and test hooks
#[derive(Debug)]
pub struct Lines {
    pub enabled: Mutex<Vec<bool>>,
    pub sent: Mutex<Vec<(u32, u32)>>,
    /// (vector, enabled) as observed by hooks at entry
    pub observed: Mutex<Vec<(u32, bool)>>,
    pub base: u32,
}

impl Lines {
    pub fn new(base: u32) -> &'static Self {
        Box::leak(Box::new(Self {
            enabled: Mutex::new(vec![true; 1024]),
            sent: Mutex::new(Vec::new()),
            observed: Mutex::new(Vec::new()),
            base,
        }))
    }

    pub fn is_enabled(&self, irq: u32) -> bool {
        self.enabled.lock().unwrap()[irq as usize]
    }

    /// Pass as a hook parameter
    pub fn as_param(&'static self) -> usize {
        self as *const Self as usize
    }

    /// # Safety
    /// `param` must come from [`Lines::as_param`].
    pub unsafe fn from_param(param: usize) -> &'static Self {
        &*(param as *const Self)
    }
}

pub struct FakeController {
    pub lines: &'static Lines,
    /// Highest core `send` accepts
    pub cores: u32,
}

impl FakeController {
    pub fn new(lines: &'static Lines) -> Self {
        Self { lines, cores: 4 }
    }
}

impl IntController for FakeController {
    fn enable(&mut self, irq: u32) {
        self.lines.enabled.lock().unwrap()[irq as usize] = true;
    }

    fn disable(&mut self, irq: u32) {
        self.lines.enabled.lock().unwrap()[irq as usize] = false;
    }

    fn send(&mut self, core: u32, irq: u32) -> Result<(), IntControllerError> {
        if core >= self.cores {
            return Err(IntControllerError::SendFailed { core, irq });
        }
        self.lines.sent.lock().unwrap().push((core, irq));
        Ok(())
    }

    fn base(&self) -> u32 {
        self.lines.base
    }
}

pub type TestKernel = Kernel<FakeProcessManager, FakeController, ()>;

fn region(base: usize, size: usize) -> MemoryRegion {
    MemoryRegion::physical(PhysAddr::new(base), size)
}

/// Boot layout over simulated RAM
pub struct Fixture {
    pub ram: SimulatedRam,
    pub info: CoreInfo,
    pub layout: MemoryLayout,
    pub default_heap: &'static DefaultHeap,
}

impl Fixture {
    pub fn new() -> Self {
        let ram = SimulatedRam::new();
        let info = CoreInfo {
            core_id: 0,
            memory: region(RAM_BASE, RAM_SIZE),
            kernel: region(KERNEL_BASE, KERNEL_SIZE),
            boot_image: region(BOOT_IMAGE_BASE, 0),
            heap: region(HEAP_BASE, HEAP_SIZE),
            core_channel: region(CHANNEL_BASE, CHANNEL_SIZE),
        };
        let layout = MemoryLayout::new(
            MemoryRegion::new(
                PhysAddr::new(0),
                ram.window(),
                RAM_SIZE,
                Access::READABLE | Access::WRITABLE,
            ),
            MemoryRegion::new(
                PhysAddr::new(0),
                VirtAddr::new(USER_ARGS),
                PAGE_SIZE,
                Access::USER | Access::READABLE | Access::WRITABLE,
            ),
        );

        Self {
            ram,
            info,
            layout,
            default_heap: Box::leak(Box::new(DefaultHeap::new())),
        }
    }

    /// Place `image` at the boot image address
    pub fn with_image(image: &[u8]) -> Self {
        assert!(image.len() <= BOOT_IMAGE_MAX);
        let mut fixture = Self::new();
        fixture.ram.write(BOOT_IMAGE_BASE, image);
        fixture.info.boot_image = region(BOOT_IMAGE_BASE, align_up(image.len(), PAGE_SIZE));
        fixture
    }

    pub fn kernel(&self) -> TestKernel {
        self.kernel_with(FakeProcessManager::default())
    }

    pub fn kernel_with(&self, procs: FakeProcessManager) -> TestKernel {
        Kernel::new(self.info, self.layout, procs, (), self.default_heap)
    }
}
