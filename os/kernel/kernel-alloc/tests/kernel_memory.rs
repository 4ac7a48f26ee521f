mod common;

use common::{TestPhys, pa};
use kernel_alloc::frame_alloc::FrameAllocError;
use kernel_alloc::memory::{KernelMemory, KernelMemoryError};
use kernel_memory_addresses::{PhysicalPage, VirtualAddress};
use kernel_vmem::{Level, PageFlags, PagingError};

fn va(v: u64) -> VirtualAddress {
    VirtualAddress::new(v)
}

/// 64 frames of RAM, frame 0 reserved, fresh root table.
fn boot(phys: &TestPhys) -> KernelMemory<&TestPhys, 16> {
    let map = phys.memory_map(0x1000);
    KernelMemory::boot_with_empty_root(&map, phys).unwrap()
}

#[test]
fn tables_come_from_the_frame_allocator() {
    let phys = TestPhys::with_frames(64);
    let mut mem = boot(&phys);
    assert_eq!(mem.pages().root(), PhysicalPage::from_number(1));
    assert_eq!(mem.frames().free_pages(), 62);

    mem.map(va(0xFFFF_8000_0000_0000), pa(0x3F000), PageFlags::kernel_rw())
        .unwrap();
    assert_eq!(mem.frames().free_pages(), 59);
    assert_eq!(mem.translate(va(0xFFFF_8000_0000_0ABC)), Ok(pa(0x3FABC)));
}

#[test]
fn remap_returns_the_new_frame() {
    let phys = TestPhys::with_frames(64);
    let mut mem = boot(&phys);

    mem.map(va(0x1000), pa(0x2000), PageFlags::kernel_rw()).unwrap();
    mem.map(va(0x1000), pa(0x3000), PageFlags::kernel_rw()).unwrap();
    assert_eq!(mem.translate(va(0x1000)), Ok(pa(0x3000)));
}

#[test]
fn map_translate_round_trip_keeps_offsets() {
    let phys = TestPhys::with_frames(64);
    let mut mem = boot(&phys);

    let cases = [
        (0x0000_0000_0040_0000, 0x0000_0000_0001_0000),
        (0x0000_7FFF_FFFF_F000, 0x0000_00FF_FFFF_F000),
        (0xFFFF_FFFF_8000_0000, 0x0000_0000_0010_0000),
        (0x0000_7F00_0000_1000, 0x000F_FFFF_FFFF_F000),
    ];
    for (v, p) in cases {
        mem.map(va(v), pa(p), PageFlags::kernel_rw()).unwrap();
    }
    for (v, p) in cases {
        for off in [0, 1, 0x7FF, 0xFFF] {
            assert_eq!(mem.translate(va(v + off)), Ok(pa(p + off)));
        }
    }
}

#[test]
fn unmapping_unmapped_memory_is_free() {
    let phys = TestPhys::with_frames(64);
    let mut mem = boot(&phys);
    let before = mem.frames().free_pages();

    assert_eq!(mem.unmap(va(0x0000_1234_5678_9000)), Ok(false));
    assert_eq!(mem.frames().free_pages(), before);

    mem.map(va(0x5000), pa(0x6000), PageFlags::kernel_rw()).unwrap();
    assert_eq!(mem.unmap(va(0x5000)), Ok(true));
    assert_eq!(
        mem.translate(va(0x5000)),
        Err(KernelMemoryError::Paging(PagingError::NotMapped {
            va: va(0x5000),
            level: Level::L1
        }))
    );
}

#[test]
fn mapping_a_frame_above_52_bits_fails_cleanly() {
    let phys = TestPhys::with_frames(64);
    let mut mem = boot(&phys);
    let before = mem.frames().free_pages();

    assert_eq!(
        mem.map(va(0x1000), pa(1 << 52), PageFlags::kernel_rw()),
        Err(KernelMemoryError::Paging(PagingError::FrameOutOfRange(pa(
            1 << 52
        ))))
    );
    assert_eq!(mem.frames().free_pages(), before);
    assert!(mem.translate(va(0x1000)).is_err());
}

#[test]
fn running_out_of_frames_while_mapping() {
    let phys = TestPhys::with_frames(4);
    let map = phys.memory_map(0x1000);
    let mut mem = KernelMemory::<_, 4>::boot_with_empty_root(&map, &phys).unwrap();

    // Root + L3 + L2 use the remaining three frames.
    assert_eq!(
        mem.map(va(0x1000), pa(0x1000), PageFlags::kernel_rw()),
        Err(KernelMemoryError::Paging(PagingError::OutOfMemory {
            level: Level::L1
        }))
    );
    assert_eq!(
        mem.request_page(),
        Err(KernelMemoryError::Frames(FrameAllocError::OutOfMemory))
    );
}

#[test]
fn adopting_an_existing_root() {
    let phys = TestPhys::with_frames(32);
    // Frame 0 holds the (empty) bootloader root; frames 1.. are usable.
    let map = phys.memory_map(0x1000);
    let mut mem =
        KernelMemory::<_, 8>::boot(&map, &phys, PhysicalPage::from_number(0)).unwrap();
    assert_eq!(mem.frames().free_pages(), 31);

    mem.map(va(0x20_0000), pa(0x1F000), PageFlags::mmio()).unwrap();
    assert_eq!(mem.translate(va(0x20_0010)), Ok(pa(0x1F010)));
    assert_eq!(mem.frames().free_pages(), 28);
    assert!(!mem.pages().is_active());

    let walk = mem.dump_walk(va(0x20_0010));
    let leaf = walk.steps().last().unwrap().entry;
    assert!(leaf.cache_disable() && leaf.no_execute());
}

#[test]
fn identity_mapping_usable_memory() {
    let phys = TestPhys::with_frames(64);
    let map = phys.memory_map(0x4000);
    let mut mem = KernelMemory::<_, 8>::boot_with_empty_root(&map, &phys).unwrap();

    assert_eq!(mem.identity_map_usable(&map, PageFlags::kernel_rw()), Ok(60));
    assert_eq!(mem.translate(va(0x4000)), Ok(pa(0x4000)));
    assert_eq!(mem.translate(va(0x3_FFFF)), Ok(pa(0x3_FFFF)));
    assert!(mem.translate(va(0x3000)).is_err());
}

#[test]
fn locking_a_kernel_object_by_its_address() {
    #[repr(align(4096))]
    struct Descriptors([u64; 600]);
    let table = Box::new(Descriptors([0; 600]));

    let phys = TestPhys::with_frames(64);
    let mut mem = boot(&phys);

    // Back the object's two pages with frames 0x30 and 0x20.
    let object_va = VirtualAddress::from_ptr(&raw const *table);
    mem.map(object_va, pa(0x30000), PageFlags::kernel_rw()).unwrap();
    mem.map(va(object_va.as_u64() + 0x1000), pa(0x20000), PageFlags::kernel_rw())
        .unwrap();
    let before = mem.frames().free_pages();

    assert_eq!(mem.lock_object(&*table), Ok(2));
    assert_eq!(mem.lock_object(&*table), Ok(0));
    assert_eq!(mem.frames().free_pages(), before - 2);
    assert!(!mem.frames().is_free(pa(0x30000)));
    assert!(!mem.frames().is_free(pa(0x20000)));
}

#[test]
fn lock_object_needs_a_mapping() {
    let value = Box::new(7u32);
    let phys = TestPhys::with_frames(8);
    let mut mem = boot(&phys);

    assert!(matches!(
        mem.lock_object(&*value),
        Err(KernelMemoryError::Paging(PagingError::NotMapped { .. }))
    ));
}
