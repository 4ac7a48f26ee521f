//! # Virtual Memory Support
//!
//! The page-table manager of the kernel: it builds, walks and edits the
//! x86-64 4-level translation tree rooted at the table referenced by CR3.
//!
//! ## What you get
//! - A [`PageTableManager`] owning the root pointer and implementing
//!   map / unmap / translate with on-demand table creation.
//! - One [`PageTable<L>`](page_table::PageTable) for all four levels and a
//!   typed [`TableIndex<L>`](page_table::TableIndex).
//! - The hardware entry layout [`PageTableEntry`] and caller-facing
//!   [`PageFlags`].
//! - The two seams the manager needs from the rest of the kernel:
//!   [`FrameAlloc`] (where new table frames come from) and [`PhysMapper`]
//!   (how a physical frame is reached from the current address space).
//!
//! ## x86-64 Virtual Address → Physical Address Walk
//!
//! ```text
//!  L4  →  L3  →  L2  →  L1  →  Physical Page
//!   │      │      │      │
//!   │      │      │      └───► 4 KiB leaf
//!   │      │      └──────────► PS=1 → 2 MiB leaf
//!   │      └─────────────────► PS=1 → 1 GiB leaf
//!   └────────────────────────► root table, referenced by CR3
//! ```
//!
//! Each level consumes 9 bits of the virtual address; the last 12 bits are
//! the byte offset inside the page. Bits 63..48 must repeat bit 47.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod address_space;
mod page_entry_bits;
pub mod page_table;

pub use crate::address_space::{PageTableManager, PageWalk, PagingError, WalkStep};
pub use crate::page_entry_bits::{PageFlags, PageTableEntry};
pub use crate::page_table::{Level, PageTable};
pub use kernel_memory_addresses as addresses;

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};

/// Source of **physical** 4 KiB frames for new page tables.
///
/// Returns `None` when no frame is left.
pub trait FrameAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>>;
}

impl<A: FrameAlloc + ?Sized> FrameAlloc for &mut A {
    #[inline]
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        (**self).alloc_4k()
    }
}

/// Turns physical addresses into pointers valid in the current address space
/// (identity map, higher-half direct map, ...).
pub trait PhysMapper {
    /// Where `pa` is visible right now. Computing the pointer is safe,
    /// using it is not.
    fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T;

    /// Borrow the `T` stored at `pa`.
    ///
    /// # Safety
    /// - `pa` must be mapped writable through this mapper for all of `'a`.
    /// - The bytes at `pa` must be a valid, suitably aligned `T`.
    /// - No other reference to the same memory may be live for `'a`.
    #[inline]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        unsafe { &mut *self.phys_to_ptr::<T>(pa) }
    }
}

impl<M: PhysMapper + ?Sized> PhysMapper for &M {
    #[inline]
    fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T {
        (**self).phys_to_ptr(pa)
    }
}

/// Drop the local TLB entry for the page containing `va`.
///
/// # Safety
/// Privileged instruction, CPL0 only.
#[inline]
pub unsafe fn invalidate_tlb_page(va: VirtualAddress) {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        core::arch::asm!("invlpg [{}]", in(reg) va.as_u64(), options(nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "x86_64"))]
    let _ = va;
}
