//! # Page Table Manager (x86-64, 4-level)
//!
//! [`PageTableManager`] owns the physical frame of the root (L4) table and
//! edits the tree below it through a [`PhysMapper`].
//!
//! ## Mapping
//!
//! [`map`](PageTableManager::map) always walks exactly four levels. A missing
//! intermediate table is taken from the [`FrameAlloc`], zeroed and linked with
//! a present, writable, user-accessible entry. The leaf receives
//! `{present, ppn} ∪ flags` and replaces whatever was mapped there before.
//!
//! ## Known limitations
//!
//! - Tables are never freed. Unmapping only clears the leaf's present bit;
//!   neither the mapped frame nor emptied tables go back to the allocator.
//! - Large pages found in adopted tables are translated but never split.
//!   Editing inside them fails with [`PagingError::LargePageInPath`].
//! - Only the local TLB is invalidated, and only while this manager owns the
//!   active root.

mod walk;

pub use crate::address_space::walk::{PageWalk, WalkStep};
use crate::page_table::{L1, L2, L3, L4, Level, PageTable, ParentLevel, TableIndex, TableLevel};
use crate::page_table::split_indices;
use crate::{FrameAlloc, PageFlags, PageTableEntry, PhysMapper, invalidate_tlb_page};
use kernel_memory_addresses::{
    PageSize, PhysicalAddress, PhysicalPage, Size1G, Size2M, Size4K, VirtualAddress,
};
use kernel_registers::cr3::Cr3;
use kernel_registers::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use log::{debug, info, trace, warn};

/// Errors from page-table operations. None of them leave a table half
/// written.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PagingError {
    /// No frame was available for a new table of `level`.
    #[error("out of memory while creating {level} table")]
    OutOfMemory { level: Level },
    /// The walk found a not-present entry at `level`.
    #[error("{va} is not mapped (no {level} entry)")]
    NotMapped { va: VirtualAddress, level: Level },
    /// Bits 63..48 are not a sign extension of bit 47.
    #[error("{0} is not a canonical address")]
    MalformedAddress(VirtualAddress),
    /// The path is covered by a 1 GiB (`L3`) or 2 MiB (`L2`) leaf.
    #[error("{va} lies inside a large page mapped at {level}")]
    LargePageInPath { va: VirtualAddress, level: Level },
    /// The frame lies above the 52-bit physical address space an entry can
    /// reference.
    #[error("{0} is beyond the 52-bit physical address space")]
    FrameOutOfRange(PhysicalAddress),
}

/// Owner of the active translation tree.
pub struct PageTableManager<M: PhysMapper> {
    mapper: M,
    root: PhysicalPage<Size4K>,
    /// Whether `root` is known to be loaded in CR3.
    active: bool,
}

impl<M: PhysMapper> PageTableManager<M> {
    /// Manage the tree rooted at `root` without touching CR3.
    #[inline]
    pub const fn new(mapper: M, root: PhysicalPage<Size4K>) -> Self {
        Self {
            mapper,
            root,
            active: false,
        }
    }

    /// Allocate and zero a fresh, empty root table.
    ///
    /// # Errors
    /// - [`PagingError::OutOfMemory`] if `alloc` has no frame left.
    /// - [`PagingError::FrameOutOfRange`] if `alloc` returned a frame CR3
    ///   can't hold.
    pub fn create_root<A: FrameAlloc>(mapper: M, alloc: &mut A) -> Result<Self, PagingError> {
        let root = alloc
            .alloc_4k()
            .ok_or(PagingError::OutOfMemory { level: Level::L4 })?;
        let root = referenceable(root)?;
        let this = Self::new(mapper, root);
        unsafe { this.table_mut::<L4>(root) }.zero();
        debug!("created empty root table at {root}");
        Ok(this)
    }

    /// Adopt the tree currently loaded in CR3.
    ///
    /// # Safety
    /// CPL0 with paging enabled, and `mapper` must reach every table frame of
    /// the active tree.
    pub unsafe fn from_current(mapper: M) -> Self {
        let cr3 = unsafe { Cr3::load_unsafe() };
        let root = cr3.root();
        info!("adopted active root table at {root}");
        Self {
            mapper,
            root,
            active: true,
        }
    }

    /// Install `root` as the tree to manage. CR3 is left alone until
    /// [`activate`](Self::activate).
    pub fn set_root(&mut self, root: PhysicalPage<Size4K>) {
        if root != self.root {
            self.root = root;
            self.active = false;
        }
        debug!("root table set to {root}");
    }

    #[doc(alias = "get_root")]
    #[inline]
    #[must_use]
    pub const fn root(&self) -> PhysicalPage<Size4K> {
        self.root
    }

    /// Whether the managed root was loaded into CR3 by this manager.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    #[inline]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    /// Load CR3 with the managed root. This flushes all non-global TLB entries.
    ///
    /// # Safety
    /// The tree must map the currently executing code, the stack and every
    /// table frame as reached by the mapper.
    ///
    /// # Errors
    /// [`PagingError::FrameOutOfRange`] if the root is above the 52-bit
    /// physical address space. CR3 is left unchanged.
    pub unsafe fn activate(&mut self) -> Result<(), PagingError> {
        let root = referenceable(self.root)?;
        unsafe { Cr3::from_root(root).store_unsafe() };
        self.active = true;
        info!("activated root table at {}", self.root);
        Ok(())
    }

    /// Map the 4 KiB page containing `va` to the frame containing `pa`.
    ///
    /// Overwrites an existing mapping of the same page.
    ///
    /// # Errors
    /// - [`PagingError::MalformedAddress`] for non-canonical `va`.
    /// - [`PagingError::OutOfMemory`] if a missing table couldn't be allocated.
    /// - [`PagingError::LargePageInPath`] if a large page covers `va`.
    /// - [`PagingError::FrameOutOfRange`] if `pa` is at or above 2^52, or a
    ///   new table frame is. Nothing is allocated in the first case.
    pub fn map<A: FrameAlloc>(
        &mut self,
        alloc: &mut A,
        va: VirtualAddress,
        pa: PhysicalAddress,
        flags: PageFlags,
    ) -> Result<(), PagingError> {
        let va = canonical(va)?;
        let page = referenceable(pa.page::<Size4K>())?;
        let (i4, i3, i2, i1, _) = split_indices(va);

        let l3 = self.next_or_create::<L4, A>(alloc, self.root, i4, va)?;
        let l2 = self.next_or_create::<L3, A>(alloc, l3, i3, va)?;
        let l1 = self.next_or_create::<L2, A>(alloc, l2, i2, va)?;

        let table = unsafe { self.table_mut::<L1>(l1) };
        let previous = table.get(i1);
        table.set(i1, PageTableEntry::leaf(page, flags));

        if previous.present() {
            trace!("remapped {va}: {} -> {page}", previous.address());
            self.flush(va);
        } else {
            trace!("mapped {va} -> {page}");
        }
        Ok(())
    }

    /// Map every page touched by `[va, va + len)` to consecutive frames
    /// starting at the frame containing `pa`. Returns the number of pages.
    ///
    /// Pages mapped before an error stay mapped.
    ///
    /// # Errors
    /// As [`map`](Self::map); [`PagingError::MalformedAddress`] also if the
    /// range wraps around the address space.
    pub fn map_range<A: FrameAlloc>(
        &mut self,
        alloc: &mut A,
        va: VirtualAddress,
        pa: PhysicalAddress,
        len: u64,
        flags: PageFlags,
    ) -> Result<u64, PagingError> {
        let pages = pages_spanned(va, len).ok_or(PagingError::MalformedAddress(va))?;
        let va_base = va.page::<Size4K>().base();
        let pa_base = pa.page::<Size4K>().base();

        for n in 0..pages {
            let step = n * Size4K::SIZE;
            let page_va = va_base
                .checked_add(step)
                .ok_or(PagingError::MalformedAddress(va))?;
            let page_pa = pa_base
                .checked_add(step)
                .ok_or(PagingError::MalformedAddress(va))?;
            self.map(alloc, page_va, page_pa, flags)?;
        }

        debug!("mapped {pages} pages at {va} -> {pa}");
        Ok(pages)
    }

    /// [`map_range`](Self::map_range) with virtual == physical.
    ///
    /// # Errors
    /// As [`map_range`](Self::map_range).
    pub fn identity_map_range<A: FrameAlloc>(
        &mut self,
        alloc: &mut A,
        pa: PhysicalAddress,
        len: u64,
        flags: PageFlags,
    ) -> Result<u64, PagingError> {
        self.map_range(alloc, VirtualAddress::new(pa.as_u64()), pa, len, flags)
    }

    /// Clear the present bit of the leaf for `va`.
    ///
    /// Returns `Ok(false)` without touching anything if `va` wasn't mapped.
    /// Never allocates.
    ///
    /// # Errors
    /// - [`PagingError::MalformedAddress`] for non-canonical `va`.
    /// - [`PagingError::LargePageInPath`] if a large page covers `va`.
    pub fn unmap(&mut self, va: VirtualAddress) -> Result<bool, PagingError> {
        let va = canonical(va)?;
        let (i4, i3, i2, i1, _) = split_indices(va);

        let Some(l3) = self.next_table::<L4>(self.root, i4, va)? else {
            return Ok(false);
        };
        let Some(l2) = self.next_table::<L3>(l3, i3, va)? else {
            return Ok(false);
        };
        let Some(l1) = self.next_table::<L2>(l2, i2, va)? else {
            return Ok(false);
        };

        let table = unsafe { self.table_mut::<L1>(l1) };
        let entry = table.get(i1);
        if !entry.present() {
            return Ok(false);
        }

        table.set(i1, entry.with_present(false));
        self.flush(va);
        trace!("unmapped {va}");
        Ok(true)
    }

    /// Resolve `va` to the physical address it is mapped to, keeping the
    /// in-page offset. 2 MiB and 1 GiB leaves are resolved as well.
    ///
    /// # Errors
    /// - [`PagingError::MalformedAddress`] for non-canonical `va`.
    /// - [`PagingError::NotMapped`] naming the first level without a present entry.
    pub fn translate(&self, va: VirtualAddress) -> Result<PhysicalAddress, PagingError> {
        self.walk(va).result()
    }

    /// Walk the tree for `va` and record every entry visited.
    #[must_use]
    pub fn walk(&self, va: VirtualAddress) -> PageWalk {
        let mut walk = PageWalk::new(va);
        if !va.is_canonical() {
            return walk.finish(Err(PagingError::MalformedAddress(va)));
        }
        let (i4, i3, i2, i1, off) = split_indices(va);

        let e4 = self.visit(&mut walk, self.root, i4);
        if !e4.present() {
            return walk.finish(Err(not_mapped(va, Level::L4)));
        }

        let e3 = self.visit(&mut walk, e4.page(), i3);
        if !e3.present() {
            return walk.finish(Err(not_mapped(va, Level::L3)));
        }
        if e3.large_page() {
            return walk.finish(Ok(large_leaf::<Size1G>(e3, va)));
        }

        let e2 = self.visit(&mut walk, e3.page(), i2);
        if !e2.present() {
            return walk.finish(Err(not_mapped(va, Level::L2)));
        }
        if e2.large_page() {
            return walk.finish(Ok(large_leaf::<Size2M>(e2, va)));
        }

        let e1 = self.visit(&mut walk, e2.page(), i1);
        if !e1.present() {
            return walk.finish(Err(not_mapped(va, Level::L1)));
        }
        walk.finish(Ok(e1.page().join(off)))
    }

    /// View the frame `page` as a level-`L` table.
    ///
    /// # Safety
    /// `page` must hold a page table reachable through the mapper, and no
    /// other reference to it may be live while the result is.
    #[inline]
    unsafe fn table_mut<L: TableLevel>(&self, page: PhysicalPage<Size4K>) -> &mut PageTable<L> {
        unsafe { self.mapper.phys_to_mut::<PageTable<L>>(page.base()) }
    }

    fn visit<L: TableLevel>(
        &self,
        walk: &mut PageWalk,
        table: PhysicalPage<Size4K>,
        index: TableIndex<L>,
    ) -> PageTableEntry {
        let entry = unsafe { self.table_mut::<L>(table) }.get(index);
        walk.record(WalkStep {
            level: L::LEVEL,
            index: index.as_u16(),
            table,
            entry,
        });
        entry
    }

    /// The next-level table below `index`, or `None` if the entry is absent.
    fn next_table<L: ParentLevel>(
        &self,
        table: PhysicalPage<Size4K>,
        index: TableIndex<L>,
        va: VirtualAddress,
    ) -> Result<Option<PhysicalPage<Size4K>>, PagingError> {
        let entry = unsafe { self.table_mut::<L>(table) }.get(index);
        if !entry.present() {
            return Ok(None);
        }
        if L::ALLOWS_LARGE && entry.large_page() {
            warn!("{va} is covered by a large page at {}", L::LEVEL);
            return Err(PagingError::LargePageInPath { va, level: L::LEVEL });
        }
        Ok(Some(entry.page()))
    }

    /// The next-level table below `index`, created zeroed if absent.
    fn next_or_create<L: ParentLevel, A: FrameAlloc>(
        &self,
        alloc: &mut A,
        table: PhysicalPage<Size4K>,
        index: TableIndex<L>,
        va: VirtualAddress,
    ) -> Result<PhysicalPage<Size4K>, PagingError> {
        if let Some(next) = self.next_table::<L>(table, index, va)? {
            return Ok(next);
        }

        let child_level = <L::Child as TableLevel>::LEVEL;
        let Some(frame) = alloc.alloc_4k() else {
            warn!("no frame left for a new {child_level} table (mapping {va})");
            return Err(PagingError::OutOfMemory { level: child_level });
        };
        let frame = referenceable(frame)?;

        unsafe { self.table_mut::<L::Child>(frame) }.zero();
        unsafe { self.table_mut::<L>(table) }.set(index, PageTableEntry::table(frame));
        debug!("created {child_level} table at {frame} for {va}");
        Ok(frame)
    }

    fn flush(&self, va: VirtualAddress) {
        if self.active {
            unsafe { invalidate_tlb_page(va) };
        }
    }
}

fn canonical(va: VirtualAddress) -> Result<VirtualAddress, PagingError> {
    if va.is_canonical() {
        Ok(va)
    } else {
        Err(PagingError::MalformedAddress(va))
    }
}

fn referenceable(page: PhysicalPage<Size4K>) -> Result<PhysicalPage<Size4K>, PagingError> {
    if PageTableEntry::can_reference(page) {
        Ok(page)
    } else {
        warn!("frame {page} is beyond the 52-bit physical address space");
        Err(PagingError::FrameOutOfRange(page.base()))
    }
}

const fn not_mapped(va: VirtualAddress, level: Level) -> PagingError {
    PagingError::NotMapped { va, level }
}

/// Physical address of `va` inside the large page described by `entry`.
fn large_leaf<S: PageSize>(entry: PageTableEntry, va: VirtualAddress) -> PhysicalAddress {
    // Bit 12 of a large leaf is PAT, not part of the base.
    PhysicalPage::<S>::containing_address(entry.address()).join(va.offset::<S>())
}

/// Number of 4 KiB pages touched by `[va, va + len)`, `None` on overflow.
fn pages_spanned(va: VirtualAddress, len: u64) -> Option<u64> {
    if len == 0 {
        return Some(0);
    }
    let first = va.as_u64() >> Size4K::SHIFT;
    let last = va.as_u64().checked_add(len - 1)? >> Size4K::SHIFT;
    Some(last - first + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{BumpAlloc, TestPhys};

    fn setup(frames: usize) -> (TestPhys, BumpAlloc) {
        let phys = TestPhys::with_frames(frames);
        // Frame 0 stays unused so that a zero entry never aliases a table.
        let alloc = BumpAlloc::new(0x1000, phys.end());
        (phys, alloc)
    }

    fn va(v: u64) -> VirtualAddress {
        VirtualAddress::new(v)
    }

    fn pa(v: u64) -> PhysicalAddress {
        PhysicalAddress::new(v)
    }

    #[test]
    fn cold_map_creates_three_tables() {
        let (phys, mut alloc) = setup(16);
        let mut ptm = PageTableManager::create_root(&phys, &mut alloc).unwrap();
        assert_eq!(alloc.handed_out, 1);

        ptm.map(&mut alloc, va(0x1000), pa(0x2000), PageFlags::kernel_rw())
            .unwrap();
        assert_eq!(alloc.handed_out, 4);
        assert_eq!(ptm.translate(va(0x1000)), Ok(pa(0x2000)));

        let walk = ptm.walk(va(0x1000));
        assert_eq!(walk.steps().count(), 4);
        for step in walk.steps().take(3) {
            assert!(step.entry.present() && step.entry.writable() && step.entry.user());
        }
        let leaf = walk.steps().last().unwrap().entry;
        assert!(leaf.present() && leaf.writable() && !leaf.user());

        // Same L1 table, no new frames.
        ptm.map(&mut alloc, va(0x5000), pa(0x9000), PageFlags::kernel_ro())
            .unwrap();
        assert_eq!(alloc.handed_out, 4);
    }

    #[test]
    fn remap_replaces_previous_frame() {
        let (phys, mut alloc) = setup(16);
        let mut ptm = PageTableManager::create_root(&phys, &mut alloc).unwrap();

        ptm.map(&mut alloc, va(0x1000), pa(0x2000), PageFlags::kernel_rw())
            .unwrap();
        ptm.map(&mut alloc, va(0x1000), pa(0x3000), PageFlags::kernel_rw())
            .unwrap();

        assert_eq!(ptm.translate(va(0x1000)), Ok(pa(0x3000)));
        assert_eq!(alloc.handed_out, 4);
    }

    #[test]
    fn translate_keeps_page_offset() {
        let (phys, mut alloc) = setup(16);
        let mut ptm = PageTableManager::create_root(&phys, &mut alloc).unwrap();

        let base = 0xFFFF_8000_0010_0000;
        ptm.map(&mut alloc, va(base), pa(0x7000), PageFlags::kernel_rw())
            .unwrap();
        assert_eq!(ptm.translate(va(base + 0x123)), Ok(pa(0x7123)));
        assert_eq!(ptm.translate(va(base + 0xFFF)), Ok(pa(0x7FFF)));
        assert_eq!(
            ptm.translate(va(base + 0x1000)),
            Err(PagingError::NotMapped {
                va: va(base + 0x1000),
                level: Level::L1
            })
        );
    }

    #[test]
    fn empty_tree_reports_first_missing_level() {
        let (phys, mut alloc) = setup(4);
        let ptm = PageTableManager::create_root(&phys, &mut alloc).unwrap();
        assert_eq!(
            ptm.translate(va(0x4000)),
            Err(PagingError::NotMapped {
                va: va(0x4000),
                level: Level::L4
            })
        );
    }

    #[test]
    fn unmap_is_idempotent_and_never_allocates() {
        let (phys, mut alloc) = setup(16);
        let mut ptm = PageTableManager::create_root(&phys, &mut alloc).unwrap();

        assert_eq!(ptm.unmap(va(0xDEAD_B000)), Ok(false));
        assert_eq!(ptm.unmap(va(0xDEAD_B000)), Ok(false));
        assert_eq!(alloc.handed_out, 1);

        ptm.map(&mut alloc, va(0xDEAD_B000), pa(0x4000), PageFlags::kernel_rw())
            .unwrap();
        let after_map = alloc.handed_out;

        assert_eq!(ptm.unmap(va(0xDEAD_B123)), Ok(true));
        assert_eq!(ptm.unmap(va(0xDEAD_B000)), Ok(false));
        assert_eq!(alloc.handed_out, after_map);
        assert_eq!(
            ptm.translate(va(0xDEAD_B000)),
            Err(PagingError::NotMapped {
                va: va(0xDEAD_B000),
                level: Level::L1
            })
        );
    }

    #[test]
    fn non_canonical_addresses_are_rejected() {
        let (phys, mut alloc) = setup(8);
        let mut ptm = PageTableManager::create_root(&phys, &mut alloc).unwrap();
        let bad = va(0x0000_8000_0000_0000);

        assert_eq!(
            ptm.map(&mut alloc, bad, pa(0x1000), PageFlags::kernel_rw()),
            Err(PagingError::MalformedAddress(bad))
        );
        assert_eq!(ptm.unmap(bad), Err(PagingError::MalformedAddress(bad)));
        assert_eq!(ptm.translate(bad), Err(PagingError::MalformedAddress(bad)));
        assert_eq!(alloc.handed_out, 1);
    }

    #[test]
    fn exhaustion_names_the_missing_level() {
        let (phys, _) = setup(4);
        let mut alloc = BumpAlloc::new(0x1000, 0x3000);
        let mut ptm = PageTableManager::create_root(&phys, &mut alloc).unwrap();

        assert_eq!(
            ptm.map(&mut alloc, va(0x1000), pa(0x1000), PageFlags::kernel_rw()),
            Err(PagingError::OutOfMemory { level: Level::L2 })
        );
        // The L3 table that did fit stays linked.
        assert_eq!(
            ptm.translate(va(0x1000)),
            Err(PagingError::NotMapped {
                va: va(0x1000),
                level: Level::L3
            })
        );
    }

    #[test]
    fn large_pages_translate_but_block_edits() {
        let (phys, mut alloc) = setup(8);
        let mut ptm = PageTableManager::create_root(&phys, &mut alloc).unwrap();

        // Hand-build L4[0] -> L3 with a 1 GiB leaf at L3[1] and an L2 with a
        // 2 MiB leaf at L3[2] / L2[3].
        let l3 = alloc.alloc_4k().unwrap();
        let l2 = alloc.alloc_4k().unwrap();
        unsafe {
            ptm.table_mut::<L3>(l3).zero();
            ptm.table_mut::<L2>(l2).zero();
            ptm.table_mut::<L4>(ptm.root())
                .set(TableIndex::new(0).unwrap(), PageTableEntry::table(l3));
            ptm.table_mut::<L3>(l3).set(
                TableIndex::new(1).unwrap(),
                PageTableEntry::new()
                    .with_present(true)
                    .with_large_page(true)
                    .with_page_ppn(0x8000_0000 >> 12),
            );
            ptm.table_mut::<L3>(l3)
                .set(TableIndex::new(2).unwrap(), PageTableEntry::table(l2));
            ptm.table_mut::<L2>(l2).set(
                TableIndex::new(3).unwrap(),
                PageTableEntry::new()
                    .with_present(true)
                    .with_large_page(true)
                    .with_page_ppn(0x60_0000 >> 12),
            );
        }

        let in_1g = va(0x4000_0000 + 0x12_3456);
        assert_eq!(ptm.translate(in_1g), Ok(pa(0x8012_3456)));
        let in_2m = va(0x8000_0000 + 3 * 0x20_0000 + 0x1_2345);
        assert_eq!(ptm.translate(in_2m), Ok(pa(0x61_2345)));

        let before = alloc.handed_out;
        assert_eq!(
            ptm.map(&mut alloc, in_1g, pa(0x1000), PageFlags::kernel_rw()),
            Err(PagingError::LargePageInPath {
                va: in_1g,
                level: Level::L3
            })
        );
        assert_eq!(
            ptm.unmap(in_2m),
            Err(PagingError::LargePageInPath {
                va: in_2m,
                level: Level::L2
            })
        );
        assert_eq!(alloc.handed_out, before);
        assert_eq!(ptm.translate(in_1g), Ok(pa(0x8012_3456)));
    }

    #[test]
    fn map_range_covers_every_touched_page() {
        let (phys, mut alloc) = setup(16);
        let mut ptm = PageTableManager::create_root(&phys, &mut alloc).unwrap();

        let mapped = ptm
            .map_range(&mut alloc, va(0x40_0800), pa(0x90_0800), 0x2000, PageFlags::mmio())
            .unwrap();
        assert_eq!(mapped, 3);
        assert_eq!(ptm.translate(va(0x40_0800)), Ok(pa(0x90_0800)));
        assert_eq!(ptm.translate(va(0x40_1000)), Ok(pa(0x90_1000)));
        assert_eq!(ptm.translate(va(0x40_2FFF)), Ok(pa(0x90_2FFF)));
        assert!(ptm.translate(va(0x40_3000)).is_err());

        assert_eq!(
            ptm.map_range(&mut alloc, va(0x50_0000), pa(0), 0, PageFlags::mmio()),
            Ok(0)
        );
    }

    #[test]
    fn identity_range_maps_onto_itself() {
        let (phys, mut alloc) = setup(16);
        let mut ptm = PageTableManager::create_root(&phys, &mut alloc).unwrap();

        ptm.identity_map_range(&mut alloc, pa(0x1000), 0x4000, PageFlags::kernel_rw())
            .unwrap();
        for addr in (0x1000..0x5000).step_by(0x1000) {
            assert_eq!(ptm.translate(va(addr + 8)), Ok(pa(addr + 8)));
        }
    }

    #[test]
    fn set_root_switches_trees() {
        let (phys, mut alloc) = setup(16);
        let mut ptm = PageTableManager::create_root(&phys, &mut alloc).unwrap();
        let first = ptm.root();
        ptm.map(&mut alloc, va(0x1000), pa(0x2000), PageFlags::kernel_rw())
            .unwrap();

        let other = PageTableManager::create_root(&phys, &mut alloc).unwrap();
        ptm.set_root(other.root());
        assert!(!ptm.is_active());
        assert!(ptm.translate(va(0x1000)).is_err());

        ptm.set_root(first);
        assert_eq!(ptm.root(), first);
        assert_eq!(ptm.translate(va(0x1000)), Ok(pa(0x2000)));
    }

    #[test]
    fn physical_address_beyond_52_bits_is_rejected() {
        let (phys, mut alloc) = setup(16);
        let mut ptm = PageTableManager::create_root(&phys, &mut alloc).unwrap();

        let too_wide = pa(PageTableEntry::PHYSICAL_ADDRESS_LIMIT);
        assert_eq!(
            ptm.map(&mut alloc, va(0x1000), too_wide, PageFlags::kernel_rw()),
            Err(PagingError::FrameOutOfRange(too_wide))
        );
        assert_eq!(alloc.handed_out, 1);
        assert!(ptm.walk(va(0x1000)).steps().all(|step| !step.entry.present()));

        // The highest frame the entry can hold still maps.
        let top = pa(PageTableEntry::PHYSICAL_ADDRESS_LIMIT - 0x1000);
        ptm.map(&mut alloc, va(0x1000), top, PageFlags::kernel_rw())
            .unwrap();
        assert_eq!(ptm.translate(va(0x1234)), Ok(pa(top.as_u64() + 0x234)));

        assert_eq!(
            ptm.map_range(&mut alloc, va(0x1000), top, 0x2000, PageFlags::kernel_rw()),
            Err(PagingError::FrameOutOfRange(too_wide))
        );
    }

    #[test]
    fn table_frames_beyond_52_bits_are_rejected() {
        struct HighFrames;
        impl FrameAlloc for HighFrames {
            fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
                Some(PhysicalPage::from_frame_number(1 << 40))
            }
        }

        let (phys, mut alloc) = setup(16);
        let mut ptm = PageTableManager::create_root(&phys, &mut alloc).unwrap();

        let err = ptm.map(&mut HighFrames, va(0x1000), pa(0x2000), PageFlags::kernel_rw());
        assert_eq!(
            err,
            Err(PagingError::FrameOutOfRange(pa(PageTableEntry::PHYSICAL_ADDRESS_LIMIT)))
        );
        assert_eq!(
            ptm.translate(va(0x1000)),
            Err(PagingError::NotMapped {
                va: va(0x1000),
                level: Level::L4
            })
        );

        assert!(matches!(
            PageTableManager::create_root(&phys, &mut HighFrames),
            Err(PagingError::FrameOutOfRange(_))
        ));
    }

    #[test]
    fn pages_spanned_counts_partial_pages() {
        assert_eq!(pages_spanned(va(0x1000), 0), Some(0));
        assert_eq!(pages_spanned(va(0x1000), 1), Some(1));
        assert_eq!(pages_spanned(va(0x1FFF), 2), Some(2));
        assert_eq!(pages_spanned(va(0x1000), 0x1000), Some(1));
        assert_eq!(pages_spanned(va(u64::MAX), 2), None);
    }
}
