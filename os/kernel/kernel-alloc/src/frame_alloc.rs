//! # Physical Frame Allocator
//!
//! Hands out 4 KiB physical frames from the `Usable` ranges of the boot memory
//! map. Free memory is tracked as a list of contiguous regions, see
//! [`FreeRegion`]; allocation takes from the head of the list.
//!
//! ```rust
//! use kernel_alloc::frame_alloc::PhysicalFrameAllocator;
//! use kernel_info::memory_map::{MemoryMapEntry, MemoryRegionKind};
//! use kernel_memory_addresses::PhysicalAddress;
//!
//! let map = [MemoryMapEntry::new(0x0, 0x10_0000, MemoryRegionKind::Usable)];
//! let mut pfa = PhysicalFrameAllocator::<16>::from_memory_map(&map).unwrap();
//!
//! assert_eq!(pfa.request_page(), Ok(PhysicalAddress::new(0x0)));
//! assert_eq!(pfa.request_page(), Ok(PhysicalAddress::new(0x1000)));
//! assert_eq!(pfa.free_pages(), 254);
//! ```
//!
//! Frames are not zeroed. Nothing is ever returned to the allocator; there is
//! no `free`.

pub use crate::free_list::{FreeRegion, Regions};
use crate::free_list::{RegionList, TableFull};
use kernel_info::memory_map::MemoryMapEntry;
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K};
use kernel_vmem::FrameAlloc;
use log::{debug, info, trace, warn};

/// Default number of free-region slots.
pub const DEFAULT_REGION_CAPACITY: usize = 256;

/// Exclusive end of the highest page a region can describe.
const TOP_OF_MEMORY: u64 = u64::MAX & !Size4K::MASK;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameAllocError {
    /// No free frame is left.
    #[error("out of physical memory")]
    OutOfMemory,
    /// The requested page is not free (already taken or never usable).
    #[error("physical page {0} is not available")]
    Unavailable(PhysicalAddress),
    /// A region had to be added or split but all slots are in use.
    #[error("free region table is full")]
    RegionTableFull,
}

impl From<TableFull> for FrameAllocError {
    fn from(_: TableFull) -> Self {
        Self::RegionTableFull
    }
}

/// Free-list frame allocator with room for `N` disjoint free regions.
pub struct PhysicalFrameAllocator<const N: usize = DEFAULT_REGION_CAPACITY> {
    regions: RegionList<N>,
}

impl<const N: usize> Default for PhysicalFrameAllocator<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> PhysicalFrameAllocator<N> {
    /// An allocator without any free memory.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            regions: RegionList::new(),
        }
    }

    /// Seed the free list with every `Usable` entry of `map`, in map order.
    ///
    /// Entries are not merged. Parts of an entry that are already free
    /// (overlapping usable entries) are skipped so regions stay disjoint.
    ///
    /// # Errors
    /// [`FrameAllocError::RegionTableFull`] if the map has more usable
    /// fragments than `N`.
    pub fn from_memory_map(map: &[MemoryMapEntry]) -> Result<Self, FrameAllocError> {
        let mut this = Self::new();
        for entry in map {
            if entry.is_usable() {
                this.add_region(entry.start(), entry.length)?;
            } else {
                debug!("skipping memory map entry {entry}");
            }
        }
        info!(
            "frame allocator: {} free pages in {} regions",
            this.free_pages(),
            this.region_count()
        );
        Ok(this)
    }

    /// Make the whole pages inside `[base, base + length)` available.
    ///
    /// An unaligned `base` is rounded up and a partial last page dropped.
    /// Returns the number of pages that were added.
    ///
    /// # Errors
    /// [`FrameAllocError::RegionTableFull`]. Pages added before the table ran
    /// full stay free.
    pub fn add_region(
        &mut self,
        base: PhysicalAddress,
        length: u64,
    ) -> Result<u64, FrameAllocError> {
        let end = base.as_u64().saturating_add(length) & !Size4K::MASK;
        let Some(start) = base.checked_align_up::<Size4K>() else {
            return Ok(0);
        };
        if start != base {
            warn!("usable region at {base} is not page aligned, trimmed to {start}");
        }
        let start = start.as_u64();
        if start >= end {
            return Ok(0);
        }

        let added = self.insert_disjoint(start, end)?;
        debug!("added {added} free pages from {base} (+{length:#x})");
        Ok(added)
    }

    /// Take the first free page.
    ///
    /// # Errors
    /// [`FrameAllocError::OutOfMemory`] if no page is free.
    pub fn request_page(&mut self) -> Result<PhysicalAddress, FrameAllocError> {
        let Some(page) = self.regions.pop_front_page() else {
            warn!("frame allocator exhausted");
            return Err(FrameAllocError::OutOfMemory);
        };
        trace!("allocated frame {page}");
        Ok(page)
    }

    /// Take the page containing `target`, and return its base.
    ///
    /// Taking a page from the interior of a region splits it in two and
    /// needs a free slot. With all `N` slots in use, only the first and last
    /// page of a region can be taken; exactness for interior pages holds
    /// only while a slot is free.
    ///
    /// # Errors
    /// - [`FrameAllocError::Unavailable`] if that page is not free.
    /// - [`FrameAllocError::RegionTableFull`] if the containing region must be
    ///   split and no slot is left; the allocator is unchanged.
    #[doc(alias = "request_page")]
    pub fn request_page_at(
        &mut self,
        target: PhysicalAddress,
    ) -> Result<PhysicalAddress, FrameAllocError> {
        let page = target.page::<Size4K>().base();
        if !self.is_free(page) {
            return Err(FrameAllocError::Unavailable(page));
        }
        let start = page.as_u64();
        self.regions.remove_range(start, start + Size4K::SIZE)?;
        trace!("allocated frame {page} on request");
        Ok(page)
    }

    /// Reserve `count` pages from the page containing `start`.
    ///
    /// Pages that aren't free are accepted as already reserved, so locking a
    /// range twice is harmless. Returns the number of pages newly taken off
    /// the free list.
    ///
    /// # Errors
    /// [`FrameAllocError::RegionTableFull`] if a region must be split and no
    /// slot is left; the allocator is unchanged.
    pub fn lock_pages(
        &mut self,
        start: PhysicalAddress,
        count: u64,
    ) -> Result<u64, FrameAllocError> {
        let first = start.page::<Size4K>().base().as_u64();
        let end = count
            .checked_mul(Size4K::SIZE)
            .and_then(|len| first.checked_add(len))
            .unwrap_or(TOP_OF_MEMORY);
        self.lock_range(first, end)
    }

    /// Reserve every page touched by `[start, start + len)`.
    ///
    /// # Errors
    /// As [`lock_pages`](Self::lock_pages).
    pub fn lock_bytes(&mut self, start: PhysicalAddress, len: u64) -> Result<u64, FrameAllocError> {
        if len == 0 {
            return Ok(0);
        }
        let first = start.page::<Size4K>().base().as_u64();
        let last = start.as_u64().saturating_add(len - 1) & !Size4K::MASK;
        let end = last.checked_add(Size4K::SIZE).unwrap_or(TOP_OF_MEMORY);
        self.lock_range(first, end)
    }

    /// The free regions, head first.
    #[doc(alias = "get_first")]
    #[must_use]
    pub const fn regions(&self) -> Regions<'_, N> {
        self.regions.iter()
    }

    /// Total number of free pages.
    #[must_use]
    pub fn free_pages(&self) -> u64 {
        self.regions().map(|r| r.pages()).sum()
    }

    #[must_use]
    pub const fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Whether the page containing `pa` is free.
    #[must_use]
    pub fn is_free(&self, pa: PhysicalAddress) -> bool {
        self.regions().any(|r| r.contains(pa))
    }

    fn lock_range(&mut self, start: u64, end: u64) -> Result<u64, FrameAllocError> {
        let locked = self.regions.remove_range(start, end).inspect_err(|_| {
            warn!("cannot lock {start:#x}..{end:#x}: free region table is full");
        })?;
        debug!(
            "locked {start:#x}..{end:#x}: {locked} of {} pages were free",
            (end - start) >> Size4K::SHIFT
        );
        Ok(locked)
    }

    /// Insert the parts of `[start, end)` that aren't free yet.
    fn insert_disjoint(&mut self, start: u64, end: u64) -> Result<u64, FrameAllocError> {
        if start >= end {
            return Ok(0);
        }

        let overlap = self.regions().find(|r| r.overlaps(start, end));
        let Some(existing) = overlap else {
            let pages = (end - start) >> Size4K::SHIFT;
            let base = PhysicalPage::containing_address(PhysicalAddress::new(start));
            self.regions.push_back(FreeRegion::new(base, pages)).inspect_err(|_| {
                warn!("free region table is full, dropping {start:#x}..{end:#x}");
            })?;
            return Ok(pages);
        };

        debug!("usable range {start:#x}..{end:#x} overlaps free region {existing}");
        let below = self.insert_disjoint(start, existing.base().as_u64().max(start))?;
        let above = self.insert_disjoint(existing.end().as_u64().min(end), end)?;
        Ok(below + above)
    }
}

impl<const N: usize> FrameAlloc for PhysicalFrameAllocator<N> {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        self.request_page().ok().map(PhysicalAddress::page::<Size4K>)
    }
}
