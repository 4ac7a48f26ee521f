use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// CR3: physical base of the root (level 4) page table, PCID disabled.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct Cr3 {
    #[bits(3)]
    __: u8,

    /// Bit 3: page-level write-through for root table accesses.
    pub write_through: bool,

    /// Bit 4: page-level cache disable for root table accesses.
    pub cache_disable: bool,

    #[bits(7)]
    __: u8,

    /// Bits 12-51: frame number of the root table.
    #[bits(40)]
    root_ppn: u64,

    #[bits(12)]
    __: u16,
}

impl Cr3 {
    /// CR3 value pointing at `root` with default (write-back) caching.
    #[must_use]
    pub const fn from_root(root: PhysicalPage<Size4K>) -> Self {
        Self::new().with_root_ppn(root.number())
    }

    /// The frame holding the root table.
    #[must_use]
    pub const fn root(&self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_number(self.root_ppn())
    }

    #[must_use]
    pub const fn root_address(&self) -> PhysicalAddress {
        self.root().base()
    }
}

#[cfg(feature = "asm")]
impl LoadRegisterUnsafe for Cr3 {
    unsafe fn load_unsafe() -> Self {
        let cr3: u64;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr3)
    }
}

#[cfg(feature = "asm")]
impl StoreRegisterUnsafe for Cr3 {
    unsafe fn store_unsafe(self) {
        let cr3 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
        }
    }
}
