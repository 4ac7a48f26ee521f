//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw memory addresses and page bases used by the
//! frame allocator and the page-table manager.
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] / [`PhysicalPage<S>`] | Physical memory (RAM, MMIO, page-table frames). |
//! | [`VirtualAddress`] / [`VirtualPage<S>`] | Addresses translated by the page tables. |
//! | [`MemoryAddressOffset<S>`] | The in-page offset for a page of size `S`. |
//!
//! ## Page Sizes
//!
//! - [`Size4K`]: 4 KiB pages, the allocation and mapping granularity
//! - [`Size2M`]: 2 MiB large pages (PD leaves with `PS=1`)
//! - [`Size1G`]: 1 GiB large pages (PDPT leaves with `PS=1`)
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0xFFFF_FFFF_8000_1234);
//! let (page, off) = va.split::<Size4K>();
//! assert_eq!(page.base().as_u64() & (Size4K::SIZE - 1), 0);
//! assert_eq!(page.join(off), va);
//! ```
//!
//! All types are `#[repr(transparent)]` over `u64` and all alignment math is
//! `const fn`.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod memory_address_offset;
mod page_size;
mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use crate::memory_address_offset::MemoryAddressOffset;
pub use crate::page_size::{PageSize, Size1G, Size2M, Size4K};
pub use crate::physical_address::PhysicalAddress;
pub use crate::physical_page::PhysicalPage;
pub use crate::virtual_address::{VIRTUAL_ADDRESS_BITS, VirtualAddress};
pub use crate::virtual_page::VirtualPage;
