//! # Free Region List
//!
//! A singly-linked list of free physical regions whose nodes live in a
//! fixed-size slot array. Links are slot indices, so the list needs no heap
//! and never stores its bookkeeping inside the memory it describes.
//!
//! ```text
//! slots:  [0: {0x5000, 251} → 2] [1: vacant] [2: {0x20_0000, 16} → ∅]
//! head = 0, tail = 2
//! ```

use core::fmt;
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K};

/// A run of free, contiguous 4 KiB frames.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct FreeRegion {
    base: PhysicalPage<Size4K>,
    pages: u64,
}

impl FreeRegion {
    #[inline]
    #[must_use]
    pub const fn new(base: PhysicalPage<Size4K>, pages: u64) -> Self {
        Self { base, pages }
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base.base()
    }

    #[inline]
    #[must_use]
    pub const fn pages(&self) -> u64 {
        self.pages
    }

    /// Exclusive end address.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.start_u64() + self.pages * Size4K::SIZE)
    }

    /// Whether the page containing `pa` is part of this region.
    #[inline]
    #[must_use]
    pub const fn contains(&self, pa: PhysicalAddress) -> bool {
        let pa = pa.as_u64();
        pa >= self.start_u64() && pa < self.end().as_u64()
    }

    /// Whether `[start, end)` shares at least one page with this region.
    #[inline]
    #[must_use]
    pub const fn overlaps(&self, start: u64, end: u64) -> bool {
        start < self.end().as_u64() && self.start_u64() < end
    }

    #[inline]
    const fn start_u64(&self) -> u64 {
        self.base.base().as_u64()
    }

    const fn from_bounds(start: u64, end: u64) -> Self {
        Self {
            base: PhysicalPage::containing_address(PhysicalAddress::new(start)),
            pages: (end - start) >> Size4K::SHIFT,
        }
    }
}

/// `printpfa` format: `0x<base> - 0x<end> [N pages]`.
impl fmt::Display for FreeRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} [{} pages]", self.base(), self.end(), self.pages)
    }
}

impl fmt::Debug for FreeRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FreeRegion({self})")
    }
}

/// Every slot of the region table is in use.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct TableFull;

#[derive(Copy, Clone)]
struct Node {
    region: FreeRegion,
    next: Option<usize>,
}

/// Index-linked list of [`FreeRegion`]s in `N` slots.
///
/// # Invariants
/// - Every reachable node holds at least one page.
/// - Regions of reachable nodes are pairwise disjoint.
/// - `len` is the number of reachable (occupied) slots.
pub(crate) struct RegionList<const N: usize> {
    slots: [Option<Node>; N],
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<const N: usize> RegionList<N> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: [None; N],
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) const fn is_full(&self) -> bool {
        self.len == N
    }

    pub(crate) const fn iter(&self) -> Regions<'_, N> {
        Regions {
            list: self,
            cursor: self.head,
        }
    }

    /// Append `region` at the tail.
    pub(crate) fn push_back(&mut self, region: FreeRegion) -> Result<(), TableFull> {
        debug_assert!(region.pages > 0);
        let idx = self.vacant_slot().ok_or(TableFull)?;
        self.slots[idx] = Some(Node { region, next: None });
        match self.tail.and_then(|t| self.slots[t].as_mut()) {
            Some(tail) => tail.next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
        self.len += 1;
        Ok(())
    }

    /// Take the first page of the head region.
    pub(crate) fn pop_front_page(&mut self) -> Option<PhysicalAddress> {
        let idx = self.head?;
        let node = self.slots[idx].as_mut()?;
        let page = node.region.base();

        if node.region.pages > 1 {
            let end = node.region.end().as_u64();
            node.region = FreeRegion::from_bounds(page.as_u64() + Size4K::SIZE, end);
        } else {
            self.unlink(None, idx);
        }
        Some(page)
    }

    /// Whether removing `[start, end)` would split some region in two.
    pub(crate) fn would_split(&self, start: u64, end: u64) -> bool {
        self.iter()
            .any(|r| r.base().as_u64() < start && r.end().as_u64() > end)
    }

    /// Remove every free page in the page-aligned range `[start, end)`.
    ///
    /// Returns the number of pages that were free. Regions straddling the
    /// range keep their outside parts; a region containing the whole range
    /// with room on both sides is split into two nodes.
    ///
    /// Fails without changing anything if a split is needed and no slot is
    /// left.
    pub(crate) fn remove_range(&mut self, start: u64, end: u64) -> Result<u64, TableFull> {
        debug_assert!(start.is_multiple_of(Size4K::SIZE) && end.is_multiple_of(Size4K::SIZE));
        if start >= end {
            return Ok(0);
        }
        if self.is_full() && self.would_split(start, end) {
            return Err(TableFull);
        }

        let mut removed = 0;
        let mut prev = None;
        let mut cursor = self.head;

        while let Some(idx) = cursor {
            let Some(node) = self.slots[idx] else { break };
            cursor = node.next;

            let region = node.region;
            if !region.overlaps(start, end) {
                prev = Some(idx);
                continue;
            }

            let (r_start, r_end) = (region.base().as_u64(), region.end().as_u64());
            let cut_start = r_start.max(start);
            let cut_end = r_end.min(end);
            removed += (cut_end - cut_start) >> Size4K::SHIFT;

            match (r_start < cut_start, cut_end < r_end) {
                (false, false) => {
                    self.unlink(prev, idx);
                    continue;
                }
                (true, false) => self.set_region(idx, FreeRegion::from_bounds(r_start, cut_start)),
                (false, true) => self.set_region(idx, FreeRegion::from_bounds(cut_end, r_end)),
                (true, true) => {
                    self.set_region(idx, FreeRegion::from_bounds(r_start, cut_start));
                    let after = FreeRegion::from_bounds(cut_end, r_end);
                    // Checked for vacancy above.
                    let new = self.insert_after(idx, after)?;
                    prev = Some(new);
                    continue;
                }
            }
            prev = Some(idx);
        }

        Ok(removed)
    }

    fn node(&self, idx: usize) -> Option<&Node> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    fn set_region(&mut self, idx: usize, region: FreeRegion) {
        if let Some(node) = self.slots[idx].as_mut() {
            node.region = region;
        }
    }

    fn vacant_slot(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    fn insert_after(&mut self, idx: usize, region: FreeRegion) -> Result<usize, TableFull> {
        let new = self.vacant_slot().ok_or(TableFull)?;
        let next = self.slots[idx].and_then(|n| n.next);
        self.slots[new] = Some(Node { region, next });
        self.set_next(idx, Some(new));
        if self.tail == Some(idx) {
            self.tail = Some(new);
        }
        self.len += 1;
        Ok(new)
    }

    /// Remove the node in slot `idx`, whose predecessor is `prev`.
    fn unlink(&mut self, prev: Option<usize>, idx: usize) {
        let next = self.slots[idx].take().and_then(|n| n.next);
        match prev {
            Some(p) => self.set_next(p, next),
            None => self.head = next,
        }
        if self.tail == Some(idx) {
            self.tail = prev;
        }
        self.len -= 1;
    }

    fn set_next(&mut self, idx: usize, next: Option<usize>) {
        if let Some(node) = self.slots[idx].as_mut() {
            node.next = next;
        }
    }
}

/// Lazy walk over the free regions, head first.
///
/// Obtain a new one to restart from the head.
#[derive(Clone)]
pub struct Regions<'a, const N: usize> {
    list: &'a RegionList<N>,
    cursor: Option<usize>,
}

impl<const N: usize> Iterator for Regions<'_, N> {
    type Item = FreeRegion;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.list.node(self.cursor?)?;
        self.cursor = node.next;
        Some(node.region)
    }
}
