//! Boot image loading against simulated RAM

mod common;

use common::*;
use keystone_bootimage::{BootImageBuilder, BootImageError, SymbolKind, NAME_LEN};
use keystone_kernel::loader::{ARGUMENT_ACCESS, SEGMENT_ACCESS};
use keystone_kernel::memory::{LedgerError, PAGE_SIZE};
use keystone_kernel::process::{MapError, ProcessError};
use keystone_kernel::{KernelError, PhysAddr, VirtAddr};

const TEXT: u64 = 0x40_0000;

fn image(programs: &[(&str, SymbolKind, usize)]) -> Vec<u8> {
    let mut builder = BootImageBuilder::new();
    for (i, (name, kind, pages)) in programs.iter().enumerate() {
        let base = TEXT + (i as u64) * 0x10_0000;
        let data = vec![0xA0 + i as u8; pages * PAGE_SIZE];
        builder.program(name, base, *kind, vec![(base, data)]).unwrap();
    }
    builder.build().unwrap()
}

fn load(fixture: &Fixture) -> (TestKernel, Result<usize, KernelError>) {
    let mut kernel = fixture.kernel();
    let result = kernel.load_boot_image();
    (kernel, result)
}

#[test]
fn test_single_page_program() {
    let fixture = Fixture::with_image(&image(&[("init", SymbolKind::Program, 1)]));
    let (mut kernel, result) = load(&fixture);
    assert_eq!(result, Ok(1));

    let procs = kernel.process_manager();
    assert_eq!(procs.processes.len(), 1);
    let process = &procs.processes[0];
    assert_eq!(process.entry, VirtAddr::new(TEXT as usize));
    assert!(process.boot);
    assert!(!process.privileged);

    // One segment page plus the arguments page
    let mappings = &process.memory.mappings;
    assert_eq!(mappings.len(), 2);

    let (phys, access) = mappings[&(TEXT as usize)];
    assert_eq!(access, SEGMENT_ACCESS);
    // Segment data is mapped in place from the boot image
    assert_eq!(phys, PhysAddr::new(BOOT_IMAGE_BASE + PAGE_SIZE));
    assert_eq!(fixture.ram.read(phys.as_usize(), 4), &[0xA0u8; 4]);

    let (args, access) = mappings[&USER_ARGS];
    assert_eq!(access, ARGUMENT_ACCESS);
    assert_eq!(args, PhysAddr::new(FIRST_FREE));
    let page = fixture.ram.read(args.as_usize(), PAGE_SIZE);
    assert_eq!(&page[..5], b"init\0");
    assert!(page[NAME_LEN..].iter().all(|&b| b == 0));
}

#[test]
fn test_arguments_page_is_allocated_from_ledger() {
    let fixture = Fixture::with_image(&image(&[("init", SymbolKind::Program, 1)]));
    let free_before = fixture.kernel().ledger().free_pages();

    let (kernel, result) = load(&fixture);
    assert_eq!(result, Ok(1));
    assert_eq!(kernel.ledger().free_pages(), free_before - 1);
    assert!(kernel.ledger().is_allocated(PhysAddr::new(FIRST_FREE)));
}

#[test]
fn test_multi_page_segment_maps_every_page() {
    let fixture = Fixture::with_image(&image(&[("big", SymbolKind::Program, 3)]));
    let (mut kernel, result) = load(&fixture);
    assert_eq!(result, Ok(1));

    let mappings = &kernel.process_manager().processes[0].memory.mappings;
    assert_eq!(mappings.len(), 4);
    for page in 0..3 {
        let (phys, _) = mappings[&(TEXT as usize + page * PAGE_SIZE)];
        assert_eq!(phys, PhysAddr::new(BOOT_IMAGE_BASE + (1 + page) * PAGE_SIZE));
    }
}

#[test]
fn test_privileged_program() {
    let fixture = Fixture::with_image(&image(&[
        ("init", SymbolKind::PrivilegedProgram, 1),
        ("shell", SymbolKind::Program, 1),
    ]));
    let (mut kernel, result) = load(&fixture);
    assert_eq!(result, Ok(2));

    let procs = &kernel.process_manager().processes;
    assert!(procs[0].privileged);
    assert!(!procs[1].privileged);
    assert_ne!(procs[0].id, procs[1].id);
}

#[test]
fn test_each_program_gets_its_own_arguments_page() {
    let fixture = Fixture::with_image(&image(&[
        ("first", SymbolKind::Program, 1),
        ("second", SymbolKind::Program, 1),
    ]));
    let (mut kernel, _) = load(&fixture);

    let procs = &kernel.process_manager().processes;
    let (a, _) = procs[0].memory.mappings[&USER_ARGS];
    let (b, _) = procs[1].memory.mappings[&USER_ARGS];
    assert_ne!(a, b);
    assert_eq!(&fixture.ram.read(a.as_usize(), 6)[..], b"first\0");
    assert_eq!(&fixture.ram.read(b.as_usize(), 7)[..], b"second\0");
}

#[test]
fn test_bad_magic_creates_no_process() {
    let mut bytes = image(&[("init", SymbolKind::Program, 1)]);
    bytes[0] ^= 0xFF;
    let fixture = Fixture::with_image(&bytes);

    let (mut kernel, result) = load(&fixture);
    assert!(matches!(
        result,
        Err(KernelError::InvalidBootImage(BootImageError::BadMagic { .. }))
    ));
    assert!(kernel.process_manager().processes.is_empty());
}

#[test]
fn test_unsupported_kind_is_skipped() {
    let fixture = Fixture::with_image(&image(&[
        ("data", SymbolKind::Other(7), 1),
        ("init", SymbolKind::Program, 1),
    ]));
    let (mut kernel, result) = load(&fixture);
    assert_eq!(result, Ok(1));

    let procs = &kernel.process_manager().processes;
    assert_eq!(procs.len(), 1);
    let (args, _) = procs[0].memory.mappings[&USER_ARGS];
    assert_eq!(&fixture.ram.read(args.as_usize(), 5)[..], b"init\0");
}

#[test]
fn test_segment_wrapping_address_space_is_skipped() {
    let top = 0xFFFF_FFFF_FFFF_F000u64;
    let mut builder = BootImageBuilder::new();
    builder
        .program("top", top, SymbolKind::Program, vec![(top, vec![0xEE; 2 * PAGE_SIZE])])
        .unwrap();
    builder
        .program("init", TEXT, SymbolKind::Program, vec![(TEXT, vec![0xA0; PAGE_SIZE])])
        .unwrap();
    let fixture = Fixture::with_image(&builder.build().unwrap());

    let (mut kernel, result) = load(&fixture);
    assert_eq!(result, Ok(1));

    let procs = &kernel.process_manager().processes;
    assert_eq!(procs.len(), 1);
    assert_eq!(procs[0].entry, VirtAddr::new(TEXT as usize));
    let (args, _) = procs[0].memory.mappings[&USER_ARGS];
    assert_eq!(&fixture.ram.read(args.as_usize(), 5)[..], b"init\0");
}

#[test]
fn test_load_boot_process_rejects_unsupported_kind() {
    let bytes = image(&[("data", SymbolKind::Other(7), 1)]);
    let fixture = Fixture::with_image(&bytes);
    let mut kernel = fixture.kernel();

    let parsed = keystone_bootimage::BootImage::parse(&bytes).unwrap();
    let result = kernel.load_boot_process(&parsed, PhysAddr::new(BOOT_IMAGE_BASE), 0);
    assert_eq!(
        result,
        Err(KernelError::InvalidBootImage(BootImageError::UnsupportedKind { kind: 7 }))
    );
    assert!(kernel.process_manager().processes.is_empty());
}

#[test]
fn test_empty_image_loads_nothing() {
    let fixture = Fixture::with_image(&BootImageBuilder::new().build().unwrap());
    let (mut kernel, result) = load(&fixture);
    assert_eq!(result, Ok(0));
    assert!(kernel.process_manager().processes.is_empty());
}

#[test]
fn test_create_failure_aborts_load() {
    let fixture = Fixture::with_image(&image(&[("init", SymbolKind::Program, 1)]));
    let mut kernel = fixture.kernel_with(FakeProcessManager {
        fail_create: true,
        ..Default::default()
    });

    let result = kernel.load_boot_image();
    assert!(matches!(
        result,
        Err(KernelError::Process(ProcessError::CreateFailed { name })) if name.as_str() == "init"
    ));
}

#[test]
fn test_segment_mapping_failure_aborts_load() {
    let fixture = Fixture::with_image(&image(&[
        ("init", SymbolKind::Program, 1),
        ("shell", SymbolKind::Program, 1),
    ]));
    let mut kernel = fixture.kernel_with(FakeProcessManager {
        fail_map_at: Some(TEXT as usize),
        ..Default::default()
    });

    let result = kernel.load_boot_image();
    assert!(matches!(
        result,
        Err(KernelError::Process(ProcessError::SegmentMapping {
            cause: MapError::OutOfMemory,
            ..
        }))
    ));
    assert_eq!(kernel.process_manager().processes.len(), 1);
}

#[test]
fn test_arguments_mapping_failure() {
    let fixture = Fixture::with_image(&image(&[("init", SymbolKind::Program, 1)]));
    let mut kernel = fixture.kernel_with(FakeProcessManager {
        fail_map_at: Some(USER_ARGS),
        ..Default::default()
    });

    assert_eq!(
        kernel.load_boot_image(),
        Err(KernelError::Process(ProcessError::ArgumentMapping(MapError::OutOfMemory)))
    );
}

#[test]
fn test_arguments_allocation_failure() {
    let fixture = Fixture::with_image(&image(&[("init", SymbolKind::Program, 1)]));
    let mut kernel = fixture.kernel();

    // Exhaust the ledger
    while kernel.ledger_mut().allocate(PAGE_SIZE, PAGE_SIZE).is_ok() {}

    assert_eq!(
        kernel.load_boot_image(),
        Err(KernelError::Process(ProcessError::ArgumentAllocation(
            LedgerError::OutOfMemory { size: PAGE_SIZE }
        )))
    );
}

#[test]
#[should_panic(expected = "scheduler returned to the kernel")]
fn test_run_loads_then_schedules() {
    let fixture = Fixture::with_image(&image(&[("init", SymbolKind::Program, 1)]));
    let mut kernel = fixture.kernel();
    kernel.run();
}

#[test]
#[should_panic(expected = "failed to load boot image")]
fn test_run_with_bad_image_is_fatal() {
    let mut bytes = image(&[("init", SymbolKind::Program, 1)]);
    bytes[4] ^= 0xFF;
    let fixture = Fixture::with_image(&bytes);
    let mut kernel = fixture.kernel();
    kernel.run();
}
