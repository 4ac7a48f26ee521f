use crate::address_space::PagingError;
use crate::page_table::Level;
use crate::PageTableEntry;
use core::fmt;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};

/// One table entry visited during a walk.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WalkStep {
    pub level: Level,
    pub index: u16,
    /// Frame of the table that holds the entry.
    pub table: PhysicalPage<Size4K>,
    pub entry: PageTableEntry,
}

impl fmt::Display for WalkStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let e = self.entry;
        write!(
            f,
            "{}[{:3}]={:016x} P={} RW={} US={} NX={}",
            self.level,
            self.index,
            e.into_bits(),
            u8::from(e.present()),
            u8::from(e.writable()),
            u8::from(e.user()),
            u8::from(e.no_execute()),
        )?;
        if e.present() && e.large_page() {
            f.write_str(" PS=1")?;
        }
        Ok(())
    }
}

/// Record of a translation attempt, as printed by `getphys`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PageWalk {
    va: VirtualAddress,
    steps: [Option<WalkStep>; 4],
    len: usize,
    result: Result<PhysicalAddress, PagingError>,
}

impl PageWalk {
    pub(super) const fn new(va: VirtualAddress) -> Self {
        Self {
            va,
            steps: [None; 4],
            len: 0,
            result: Err(PagingError::NotMapped {
                va,
                level: Level::L4,
            }),
        }
    }

    pub(super) fn record(&mut self, step: WalkStep) {
        if let Some(slot) = self.steps.get_mut(self.len) {
            *slot = Some(step);
            self.len += 1;
        }
    }

    pub(super) const fn finish(mut self, result: Result<PhysicalAddress, PagingError>) -> Self {
        self.result = result;
        self
    }

    #[must_use]
    pub const fn virtual_address(&self) -> VirtualAddress {
        self.va
    }

    /// Entries visited, from L4 downwards.
    pub fn steps(&self) -> impl Iterator<Item = &WalkStep> {
        self.steps.iter().flatten()
    }

    /// The translated address, if the walk reached a present leaf.
    #[must_use]
    pub fn physical_address(&self) -> Option<PhysicalAddress> {
        self.result.ok()
    }

    /// # Errors
    /// The reason the walk stopped before reaching a leaf.
    pub const fn result(&self) -> Result<PhysicalAddress, PagingError> {
        self.result
    }
}

impl fmt::Display for PageWalk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "walk {}", self.va)?;
        for step in self.steps() {
            writeln!(f, "  {step}")?;
        }
        match self.result {
            Ok(pa) => write!(f, "  -> {pa}"),
            Err(PagingError::NotMapped { level, .. }) => write!(f, "  -- not present at {level}"),
            Err(e) => write!(f, "  -- {e}"),
        }
    }
}
