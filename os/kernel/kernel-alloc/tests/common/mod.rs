#![allow(dead_code)]

use core::cell::UnsafeCell;
use kernel_info::memory_map::{MemoryMapEntry, MemoryRegionKind};
use kernel_memory_addresses::PhysicalAddress;
use kernel_vmem::PhysMapper;

#[repr(C, align(4096))]
struct Frame(UnsafeCell<[u8; 4096]>);

/// Simulated RAM: physical address `n * 4096 + off` is byte `off` of frame `n`.
pub struct TestPhys {
    frames: Vec<Frame>,
}

impl TestPhys {
    pub fn with_frames(n: usize) -> Self {
        Self {
            frames: (0..n).map(|_| Frame(UnsafeCell::new([0; 4096]))).collect(),
        }
    }

    pub fn size(&self) -> u64 {
        self.frames.len() as u64 * 4096
    }

    /// A memory map declaring all of the simulated RAM above `reserved` usable.
    pub fn memory_map(&self, reserved: u64) -> [MemoryMapEntry; 2] {
        [
            MemoryMapEntry::new(0, reserved, MemoryRegionKind::BootloaderReclaimable),
            MemoryMapEntry::new(reserved, self.size() - reserved, MemoryRegionKind::Usable),
        ]
    }
}

impl PhysMapper for TestPhys {
    fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T {
        let idx = usize::try_from(pa.as_u64() >> 12).unwrap();
        let off = usize::try_from(pa.as_u64() & 0xFFF).unwrap();
        self.frames[idx].0.get().cast::<u8>().wrapping_add(off).cast()
    }
}

pub fn pa(v: u64) -> PhysicalAddress {
    PhysicalAddress::new(v)
}
