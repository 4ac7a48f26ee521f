//! # Page Tables
//!
//! All four x86-64 paging levels share one table layout: 512 eight-byte
//! [`PageTableEntry`] values in one 4 KiB frame. They only differ in which
//! 9-bit slice of the virtual address selects the entry, so a single
//! [`PageTable<L>`] is parameterized by a level marker instead of having four
//! copies of the same type.
//!
//! ```text
//! | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  L4   |  L3   |  L2   |  L1   | Offset |
//! ```

use crate::PageTableEntry;
use core::fmt;
use core::marker::PhantomData;
use kernel_memory_addresses::{MemoryAddressOffset, Size4K, VirtualAddress};

/// Entries per table at every level.
pub const ENTRIES_PER_TABLE: usize = 512;

/// Runtime name of a paging level, used in errors and walk reports.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Level {
    /// Global table (PML4), the root referenced by CR3.
    L4,
    /// Upper table (PDPT); may hold 1 GiB leaves.
    L3,
    /// Mid table (PD); may hold 2 MiB leaves.
    L2,
    /// Last table (PT); holds 4 KiB leaves.
    L1,
}

impl Level {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::L4 => "L4",
            Self::L3 => "L3",
            Self::L2 => "L2",
            Self::L1 => "L1",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Compile-time description of one paging level.
pub trait TableLevel: sealed::Sealed + Copy + fmt::Debug {
    /// Shift of this level's 9-bit index inside a virtual address.
    const SHIFT: u32;
    const LEVEL: Level;
    /// Whether a present entry with `PS=1` is a leaf at this level.
    const ALLOWS_LARGE: bool;
}

/// A level whose entries point to tables of the [`Child`](Self::Child) level.
pub trait ParentLevel: TableLevel {
    type Child: TableLevel;
}

macro_rules! table_level {
    ($(#[$doc:meta])* $name:ident, $shift:literal, $large:literal) => {
        $(#[$doc])*
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl TableLevel for $name {
            const SHIFT: u32 = $shift;
            const LEVEL: Level = Level::$name;
            const ALLOWS_LARGE: bool = $large;
        }
    };
}

table_level!(
    /// Global table level (bits 47..39).
    L4, 39, false
);
table_level!(
    /// Upper table level (bits 38..30).
    L3, 30, true
);
table_level!(
    /// Mid table level (bits 29..21).
    L2, 21, true
);
table_level!(
    /// Last table level (bits 20..12).
    L1, 12, false
);

impl ParentLevel for L4 {
    type Child = L3;
}

impl ParentLevel for L3 {
    type Child = L2;
}

impl ParentLevel for L2 {
    type Child = L1;
}

/// A 9-bit index into a table of level `L`.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex<L: TableLevel> {
    raw: u16,
    _level: PhantomData<L>,
}

impl<L: TableLevel> TableIndex<L> {
    /// Extract this level's index from `va`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_address(va: VirtualAddress) -> Self {
        Self {
            raw: ((va.as_u64() >> L::SHIFT) & 0x1FF) as u16,
            _level: PhantomData,
        }
    }

    /// `None` if `raw` is not below 512.
    #[inline]
    #[must_use]
    pub const fn new(raw: u16) -> Option<Self> {
        if (raw as usize) < ENTRIES_PER_TABLE {
            Some(Self {
                raw,
                _level: PhantomData,
            })
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.raw
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.raw as usize
    }

    /// The part of a virtual address this index stands for,
    /// i.e. `index << L::SHIFT`.
    #[inline]
    #[must_use]
    pub const fn base_offset(self) -> u64 {
        (self.raw as u64) << L::SHIFT
    }
}

impl<L: TableLevel> fmt::Debug for TableIndex<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", L::LEVEL, self.raw)
    }
}

/// One 4 KiB page table of level `L`.
#[repr(C, align(4096))]
pub struct PageTable<L: TableLevel> {
    entries: [PageTableEntry; ENTRIES_PER_TABLE],
    _level: PhantomData<L>,
}

const _: () = {
    assert!(size_of::<PageTable<L4>>() == 4096);
    assert!(align_of::<PageTable<L1>>() == 4096);
};

impl<L: TableLevel> PageTable<L> {
    /// Mark every entry not present.
    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(PageTableEntry::new());
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, index: TableIndex<L>) -> PageTableEntry {
        self.entries[index.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, index: TableIndex<L>, entry: PageTableEntry) {
        self.entries[index.as_usize()] = entry;
    }
}

/// Split `va` into the four table indices and the 4 KiB page offset.
#[inline]
#[must_use]
pub const fn split_indices(
    va: VirtualAddress,
) -> (
    TableIndex<L4>,
    TableIndex<L3>,
    TableIndex<L2>,
    TableIndex<L1>,
    MemoryAddressOffset<Size4K>,
) {
    (
        TableIndex::from_address(va),
        TableIndex::from_address(va),
        TableIndex::from_address(va),
        TableIndex::from_address(va),
        va.offset::<Size4K>(),
    )
}
