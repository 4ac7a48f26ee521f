//! Debug dumps for the memory subsystem, written through `log::info!`.

use crate::frame_alloc::PhysicalFrameAllocator;
use kernel_info::memory_map::{MemoryMapEntry, usable_bytes};
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::{PageTableManager, PageWalk, PagingError, PhysMapper};
use log::info;

/// One line per free region (`printpfa`).
pub fn dump_free_list<const N: usize>(pfa: &PhysicalFrameAllocator<N>) {
    for region in pfa.regions() {
        info!("{region}");
    }
    info!(
        "{} free pages in {} regions",
        pfa.free_pages(),
        pfa.region_count()
    );
}

/// One line per visited level, then the result (`getphys`).
pub fn dump_walk<M: PhysMapper>(ptm: &PageTableManager<M>, va: VirtualAddress) -> PageWalk {
    let walk = ptm.walk(va);
    info!("walk {va}");
    for step in walk.steps() {
        info!("{step}");
    }
    match walk.result() {
        Ok(pa) => info!("-> {pa}"),
        Err(PagingError::NotMapped { level, .. }) => info!("-- not present at {level}"),
        Err(e) => info!("-- {e}"),
    }
    walk
}

/// One line per memory-map entry (`uefimmap`).
pub fn dump_memory_map(map: &[MemoryMapEntry]) {
    for entry in map {
        info!("{entry}");
    }
    info!("usable memory: {} KB", usable_bytes(map) / 1024);
}
