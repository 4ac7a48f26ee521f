use crate::{MemoryAddressOffset, PageSize, PhysicalAddress, Size4K};
use core::fmt;
use core::marker::PhantomData;

/// Physical page base for size `S`.
///
/// The low `S::SHIFT` bits of the base are always zero.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage<S: PageSize> {
    base: u64,
    _phantom: PhantomData<S>,
}

impl<S: PageSize> PhysicalPage<S> {
    /// The page that contains `pa` (aligns down).
    #[inline]
    #[must_use]
    pub const fn containing_address(pa: PhysicalAddress) -> Self {
        Self {
            base: pa.as_u64() & !S::MASK,
            _phantom: PhantomData,
        }
    }

    /// Build from a page number (`base >> S::SHIFT`).
    #[inline]
    #[must_use]
    pub const fn from_number(number: u64) -> Self {
        Self {
            base: number << S::SHIFT,
            _phantom: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.base)
    }

    /// The page number, i.e. the base shifted right by `S::SHIFT`.
    #[inline]
    #[must_use]
    pub const fn number(self) -> u64 {
        self.base >> S::SHIFT
    }

    #[inline]
    #[must_use]
    pub const fn join(self, off: MemoryAddressOffset<S>) -> PhysicalAddress {
        PhysicalAddress::new(self.base | off.as_u64())
    }
}

impl PhysicalPage<Size4K> {
    /// Reinterpret a 4 KiB frame number as stored in a page-table entry.
    #[doc(alias = "ppn")]
    #[inline]
    #[must_use]
    pub const fn from_frame_number(ppn: u64) -> Self {
        Self::from_number(ppn)
    }
}

impl<S: PageSize> fmt::Display for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}/{}", self.base, S::as_str())
    }
}

impl<S: PageSize> fmt::Debug for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage<{}>(0x{:016X})", S::as_str(), self.base)
    }
}

impl<S: PageSize> From<PhysicalPage<S>> for PhysicalAddress {
    fn from(value: PhysicalPage<S>) -> Self {
        value.base()
    }
}
