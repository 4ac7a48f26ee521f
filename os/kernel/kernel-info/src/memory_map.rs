//! # Boot Memory Map
//!
//! The memory map is handed over once by the bootloader and never changes
//! afterwards. The layout of [`MemoryMapEntry`] matches the stivale2 memory
//! map tag entry, so a pointer to the tag's entry array can be viewed as a
//! `&[MemoryMapEntry]` directly.

use core::fmt;
use kernel_memory_addresses::PhysicalAddress;

/// Type of a memory-map region, as reported by the bootloader.
///
/// Only [`Usable`](Self::Usable) memory is ever handed out by the frame
/// allocator; everything else is left alone.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum MemoryRegionKind {
    /// Free RAM.
    Usable = 1,
    /// Firmware or hardware reserved.
    Reserved = 2,
    /// ACPI tables; reclaimable once they were parsed.
    AcpiReclaimable = 3,
    /// ACPI non-volatile storage, must be preserved.
    AcpiNvs = 4,
    /// Defective RAM.
    BadMemory = 5,
    /// Bootloader data structures (including its page tables).
    BootloaderReclaimable = 0x1000,
    /// The kernel image and loaded modules.
    KernelAndModules = 0x1001,
    /// The linear framebuffer.
    Framebuffer = 0x1002,
}

impl MemoryRegionKind {
    /// Decode a raw type value, `None` for values the protocol doesn't define.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            1 => Self::Usable,
            2 => Self::Reserved,
            3 => Self::AcpiReclaimable,
            4 => Self::AcpiNvs,
            5 => Self::BadMemory,
            0x1000 => Self::BootloaderReclaimable,
            0x1001 => Self::KernelAndModules,
            0x1002 => Self::Framebuffer,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Usable => "Usable",
            Self::Reserved => "Reserved",
            Self::AcpiReclaimable => "ACPI Reclaimable",
            Self::AcpiNvs => "ACPI NVS",
            Self::BadMemory => "Bad Memory",
            Self::BootloaderReclaimable => "Bootloader Reclaimable",
            Self::KernelAndModules => "Kernel and Modules",
            Self::Framebuffer => "Framebuffer",
        }
    }
}

impl fmt::Display for MemoryRegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One entry of the boot memory map.
///
/// Keep this `#[repr(C)]`; the type is stored as the raw `u32` so that
/// unknown values coming from the bootloader can't produce an invalid enum.
#[repr(C)]
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct MemoryMapEntry {
    /// Physical start of the region.
    pub base: u64,
    /// Length of the region in **bytes**.
    pub length: u64,
    /// Raw region type, see [`MemoryRegionKind`].
    pub kind: u32,
    pub unused: u32,
}

impl MemoryMapEntry {
    #[must_use]
    pub const fn new(base: u64, length: u64, kind: MemoryRegionKind) -> Self {
        Self {
            base,
            length,
            kind: kind as u32,
            unused: 0,
        }
    }

    /// The decoded region type, `None` if the raw value is unknown.
    #[must_use]
    pub const fn region_kind(&self) -> Option<MemoryRegionKind> {
        MemoryRegionKind::from_raw(self.kind)
    }

    #[must_use]
    pub const fn is_usable(&self) -> bool {
        matches!(self.region_kind(), Some(MemoryRegionKind::Usable))
    }

    #[must_use]
    pub const fn start(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.base)
    }

    /// Exclusive end of the region (saturating).
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.base.saturating_add(self.length))
    }
}

/// Formats like the `uefimmap` listing: `start - end type [N KB]`.
impl fmt::Display for MemoryMapEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} ", self.start(), self.end())?;
        match self.region_kind() {
            Some(kind) => write!(f, "{kind:<22}")?,
            None => write!(f, "{:<22}", "Unknown")?,
        }
        write!(f, " [{} KB]", self.length / 1024)
    }
}

impl fmt::Debug for MemoryMapEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryMapEntry")
            .field("base", &format_args!("{:#x}", self.base))
            .field("length", &format_args!("{:#x}", self.length))
            .field("kind", &self.region_kind())
            .finish()
    }
}

/// Total number of bytes in usable entries.
#[must_use]
pub fn usable_bytes(map: &[MemoryMapEntry]) -> u64 {
    map.iter()
        .filter(|e| e.is_usable())
        .fold(0, |acc, e| acc.saturating_add(e.length))
}
