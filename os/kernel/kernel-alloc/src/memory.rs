//! # Kernel Memory Context
//!
//! [`KernelMemory`] owns the physical frame allocator and the page-table
//! manager. It is built once at boot and then passed by reference to whatever
//! needs memory; there is no global instance.
//!
//! ```rust,no_run
//! use kernel_alloc::memory::KernelMemory;
//! use kernel_alloc::phys_mapper::IdentityPhysMapper;
//! use kernel_info::memory_map::MemoryMapEntry;
//! use kernel_vmem::PageFlags;
//!
//! fn init(map: &[MemoryMapEntry]) -> Result<(), kernel_alloc::memory::KernelMemoryError> {
//!     // Keep running on the bootloader's tables.
//!     let mut mem: KernelMemory<_> =
//!         unsafe { KernelMemory::boot_from_current(map, IdentityPhysMapper)? };
//!     mem.identity_map_usable(map, PageFlags::kernel_rw())?;
//!     Ok(())
//! }
//! ```

use crate::debug;
use crate::frame_alloc::{DEFAULT_REGION_CAPACITY, FrameAllocError, PhysicalFrameAllocator};
use kernel_info::memory_map::MemoryMapEntry;
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use kernel_vmem::{PageFlags, PageTableManager, PageWalk, PagingError, PhysMapper};
use log::info;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelMemoryError {
    #[error(transparent)]
    Frames(#[from] FrameAllocError),
    #[error(transparent)]
    Paging(#[from] PagingError),
}

/// The kernel's physical and virtual memory state.
pub struct KernelMemory<M: PhysMapper, const N: usize = DEFAULT_REGION_CAPACITY> {
    frames: PhysicalFrameAllocator<N>,
    pages: PageTableManager<M>,
}

impl<M: PhysMapper, const N: usize> KernelMemory<M, N> {
    /// Build the frame allocator from `map` and manage the tables at `root`.
    ///
    /// # Errors
    /// [`FrameAllocError::RegionTableFull`] if `map` is too fragmented.
    pub fn boot(
        map: &[MemoryMapEntry],
        mapper: M,
        root: PhysicalPage<Size4K>,
    ) -> Result<Self, KernelMemoryError> {
        let frames = PhysicalFrameAllocator::from_memory_map(map)?;
        let pages = PageTableManager::new(mapper, root);
        info!("kernel memory up, root table at {root}");
        Ok(Self { frames, pages })
    }

    /// Like [`boot`](Self::boot), adopting the tables currently in CR3.
    ///
    /// # Safety
    /// See [`PageTableManager::from_current`].
    ///
    /// # Errors
    /// As [`boot`](Self::boot).
    pub unsafe fn boot_from_current(
        map: &[MemoryMapEntry],
        mapper: M,
    ) -> Result<Self, KernelMemoryError> {
        let frames = PhysicalFrameAllocator::from_memory_map(map)?;
        let pages = unsafe { PageTableManager::from_current(mapper) };
        Ok(Self { frames, pages })
    }

    /// Like [`boot`](Self::boot), with a fresh empty root table taken from
    /// the allocator. Nothing is mapped yet and CR3 is not touched.
    ///
    /// # Errors
    /// As [`boot`](Self::boot), or [`PagingError::OutOfMemory`].
    pub fn boot_with_empty_root(
        map: &[MemoryMapEntry],
        mapper: M,
    ) -> Result<Self, KernelMemoryError> {
        let mut frames = PhysicalFrameAllocator::from_memory_map(map)?;
        let pages = PageTableManager::create_root(mapper, &mut frames)?;
        info!("kernel memory up, fresh root table at {}", pages.root());
        Ok(Self { frames, pages })
    }

    #[must_use]
    pub const fn frames(&self) -> &PhysicalFrameAllocator<N> {
        &self.frames
    }

    pub const fn frames_mut(&mut self) -> &mut PhysicalFrameAllocator<N> {
        &mut self.frames
    }

    #[must_use]
    pub const fn pages(&self) -> &PageTableManager<M> {
        &self.pages
    }

    pub const fn pages_mut(&mut self) -> &mut PageTableManager<M> {
        &mut self.pages
    }

    /// See [`PhysicalFrameAllocator::request_page`].
    ///
    /// # Errors
    /// [`FrameAllocError::OutOfMemory`].
    pub fn request_page(&mut self) -> Result<PhysicalAddress, KernelMemoryError> {
        Ok(self.frames.request_page()?)
    }

    /// See [`PhysicalFrameAllocator::request_page_at`].
    ///
    /// # Errors
    /// [`FrameAllocError::Unavailable`] or [`FrameAllocError::RegionTableFull`].
    pub fn request_page_at(
        &mut self,
        target: PhysicalAddress,
    ) -> Result<PhysicalAddress, KernelMemoryError> {
        Ok(self.frames.request_page_at(target)?)
    }

    /// See [`PhysicalFrameAllocator::lock_pages`].
    ///
    /// # Errors
    /// [`FrameAllocError::RegionTableFull`].
    pub fn lock_pages(
        &mut self,
        start: PhysicalAddress,
        count: u64,
    ) -> Result<u64, KernelMemoryError> {
        Ok(self.frames.lock_pages(start, count)?)
    }

    /// See [`PhysicalFrameAllocator::lock_bytes`].
    ///
    /// # Errors
    /// [`FrameAllocError::RegionTableFull`].
    pub fn lock_bytes(
        &mut self,
        start: PhysicalAddress,
        len: u64,
    ) -> Result<u64, KernelMemoryError> {
        Ok(self.frames.lock_bytes(start, len)?)
    }

    /// Reserve the physical pages backing `object` (a GDT, IDT, font or
    /// similar kernel-owned structure) so they are never handed out.
    ///
    /// Each virtual page of the object is translated on its own; the backing
    /// frames need not be contiguous.
    ///
    /// # Errors
    /// [`PagingError`] if part of the object isn't mapped, or
    /// [`FrameAllocError::RegionTableFull`].
    pub fn lock_object<T: ?Sized>(&mut self, object: &T) -> Result<u64, KernelMemoryError> {
        let start = VirtualAddress::from_ptr(core::ptr::from_ref(object).cast::<u8>());
        let len = size_of_val(object) as u64;
        if len == 0 {
            return Ok(0);
        }

        let first = start.page::<Size4K>().base().as_u64();
        let last = start.as_u64().saturating_add(len - 1) & !Size4K::MASK;

        let mut locked = 0;
        let mut page = first;
        loop {
            let pa = self.pages.translate(VirtualAddress::new(page))?;
            locked += self.frames.lock_pages(pa, 1)?;
            if page >= last {
                break;
            }
            page += Size4K::SIZE;
        }
        Ok(locked)
    }

    /// See [`PageTableManager::map`]; new tables come from the frame allocator.
    ///
    /// # Errors
    /// As [`PageTableManager::map`].
    pub fn map(
        &mut self,
        va: VirtualAddress,
        pa: PhysicalAddress,
        flags: PageFlags,
    ) -> Result<(), KernelMemoryError> {
        Ok(self.pages.map(&mut self.frames, va, pa, flags)?)
    }

    /// See [`PageTableManager::map_range`].
    ///
    /// # Errors
    /// As [`PageTableManager::map_range`].
    pub fn map_range(
        &mut self,
        va: VirtualAddress,
        pa: PhysicalAddress,
        len: u64,
        flags: PageFlags,
    ) -> Result<u64, KernelMemoryError> {
        Ok(self.pages.map_range(&mut self.frames, va, pa, len, flags)?)
    }

    /// See [`PageTableManager::identity_map_range`].
    ///
    /// # Errors
    /// As [`PageTableManager::map_range`].
    pub fn identity_map_range(
        &mut self,
        pa: PhysicalAddress,
        len: u64,
        flags: PageFlags,
    ) -> Result<u64, KernelMemoryError> {
        Ok(self
            .pages
            .identity_map_range(&mut self.frames, pa, len, flags)?)
    }

    /// Identity map every `Usable` entry of `map`. Returns the number of pages.
    ///
    /// # Errors
    /// As [`PageTableManager::map_range`]; entries mapped before the error
    /// stay mapped.
    pub fn identity_map_usable(
        &mut self,
        map: &[MemoryMapEntry],
        flags: PageFlags,
    ) -> Result<u64, KernelMemoryError> {
        let mut mapped = 0;
        for entry in map.iter().filter(|e| e.is_usable()) {
            mapped += self.identity_map_range(entry.start(), entry.length, flags)?;
        }
        info!("identity mapped {mapped} pages of usable memory");
        Ok(mapped)
    }

    /// See [`PageTableManager::unmap`].
    ///
    /// # Errors
    /// As [`PageTableManager::unmap`].
    pub fn unmap(&mut self, va: VirtualAddress) -> Result<bool, KernelMemoryError> {
        Ok(self.pages.unmap(va)?)
    }

    /// See [`PageTableManager::translate`].
    ///
    /// # Errors
    /// As [`PageTableManager::translate`].
    pub fn translate(&self, va: VirtualAddress) -> Result<PhysicalAddress, KernelMemoryError> {
        Ok(self.pages.translate(va)?)
    }

    #[must_use]
    pub fn walk(&self, va: VirtualAddress) -> PageWalk {
        self.pages.walk(va)
    }

    /// Log the free list, one region per line.
    pub fn dump_free_list(&self) {
        debug::dump_free_list(&self.frames);
    }

    /// Log the page walk for `va`, one level per line.
    pub fn dump_walk(&self, va: VirtualAddress) -> PageWalk {
        debug::dump_walk(&self.pages, va)
    }
}
