use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// One 64-bit x86-64 page-table entry, identical in shape at all four levels.
///
/// | Bits  | Field               |
/// |-------|---------------------|
/// | 0     | present             |
/// | 1     | writable            |
/// | 2     | user                |
/// | 3     | write-through (PWT) |
/// | 4     | cache disable (PCD) |
/// | 5     | accessed            |
/// | 6     | dirty (leaf only)   |
/// | 7     | page size (PS)      |
/// | 8     | global (leaf only)  |
/// | 9–11  | OS available        |
/// | 12–51 | frame number        |
/// | 52–58 | OS available        |
/// | 59–62 | protection key      |
/// | 63    | no-execute (NX)     |
///
/// If `present` is clear, nothing else in the entry is meaningful and the
/// frame number must not be followed.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageTableEntry {
    pub present: bool,
    pub writable: bool,
    pub user: bool,
    pub write_through: bool,
    pub cache_disable: bool,
    pub accessed: bool,
    pub dirty: bool,

    /// Set in an L3/L2 entry to map a 1 GiB/2 MiB page directly.
    pub large_page: bool,
    pub global: bool,

    #[bits(3)]
    pub os_available_low: u8,

    /// Physical frame number (physical address >> 12).
    #[bits(40)]
    pub page_ppn: u64,

    #[bits(7)]
    pub os_available_high: u8,

    #[bits(4)]
    pub protection_key: u8,

    pub no_execute: bool,
}

impl PageTableEntry {
    /// First physical address the 40-bit frame number can't express.
    pub const PHYSICAL_ADDRESS_LIMIT: u64 = 1 << 52;

    /// Whether `page` fits the frame-number field.
    #[inline]
    #[must_use]
    pub const fn can_reference(page: PhysicalPage<Size4K>) -> bool {
        page.base().as_u64() < Self::PHYSICAL_ADDRESS_LIMIT
    }

    /// Link to a next-level table.
    ///
    /// `next` must satisfy [`can_reference`](Self::can_reference).
    ///
    /// Intermediate entries are always present, writable and user accessible;
    /// the effective permissions are decided by the leaf.
    #[inline]
    #[must_use]
    pub const fn table(next: PhysicalPage<Size4K>) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user(true)
            .with_page_ppn(next.number())
    }

    /// A 4 KiB leaf: `{present, ppn} ∪ flags`.
    ///
    /// `page` must satisfy [`can_reference`](Self::can_reference).
    #[inline]
    #[must_use]
    pub const fn leaf(page: PhysicalPage<Size4K>, flags: PageFlags) -> Self {
        Self::from_bits(flags.into_bits() & PageFlags::MASK)
            .with_present(true)
            .with_page_ppn(page.number())
    }

    /// The frame this entry refers to.
    #[inline]
    #[must_use]
    pub const fn page(&self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_frame_number(self.page_ppn())
    }

    #[inline]
    #[must_use]
    pub const fn address(&self) -> PhysicalAddress {
        self.page().base()
    }

    /// The caller-controllable bits of this entry.
    #[inline]
    #[must_use]
    pub const fn flags(&self) -> PageFlags {
        PageFlags::from_bits(self.into_bits() & PageFlags::MASK)
    }
}

/// Mapping attributes a caller may choose for a leaf, at their hardware bit
/// positions. Present, accessed, dirty, PS and the frame number are owned by
/// the page-table manager.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageFlags {
    #[bits(1)]
    __: u8,

    pub writable: bool,
    pub user: bool,
    pub write_through: bool,
    pub cache_disable: bool,

    #[bits(3)]
    __: u8,

    pub global: bool,

    #[bits(54)]
    __: u64,

    pub no_execute: bool,
}

impl PageFlags {
    /// Bits of an entry that `PageFlags` may carry.
    pub const MASK: u64 = (1 << 1) | (1 << 2) | (1 << 3) | (1 << 4) | (1 << 8) | (1 << 63);

    /// Supervisor read/write, the default for kernel mappings.
    #[inline]
    #[must_use]
    pub const fn kernel_rw() -> Self {
        Self::new().with_writable(true)
    }

    /// Supervisor read-only.
    #[inline]
    #[must_use]
    pub const fn kernel_ro() -> Self {
        Self::new()
    }

    /// Uncached, non-executable supervisor read/write, for device registers
    /// and the framebuffer.
    #[inline]
    #[must_use]
    pub const fn mmio() -> Self {
        Self::new()
            .with_writable(true)
            .with_cache_disable(true)
            .with_no_execute(true)
    }
}
