use crate::{MemoryAddressOffset, PageSize, VirtualPage};
use core::fmt;

/// Number of implemented virtual-address bits with 4-level paging.
pub const VIRTUAL_ADDRESS_BITS: u32 = 48;

/// Virtual memory address.
///
/// Construction does not validate canonicality; the paging code checks it with
/// [`is_canonical`](Self::is_canonical) before walking any table.
///
/// ### Canonical form
/// With 4-level paging only bits `[47:0]` select a translation. Bits `[63:48]`
/// must be copies of bit 47, which splits the space into a lower half
/// (`0x0000_0000_0000_0000..=0x0000_7FFF_FFFF_FFFF`) and a higher half
/// (`0xFFFF_8000_0000_0000..=0xFFFF_FFFF_FFFF_FFFF`). Anything in between
/// faults on use.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// assert!(VirtualAddress::new(0x0000_7F00_0000_1000).is_canonical());
/// assert!(VirtualAddress::new(0xFFFF_8000_0000_0000).is_canonical());
/// assert!(!VirtualAddress::new(0x0000_8000_0000_0000).is_canonical());
///
/// let va = VirtualAddress::new(0xFFFF_FFFF_8000_1234);
/// let (vp, off) = va.split::<Size4K>();
/// assert_eq!(off.as_u64(), 0x234);
/// assert_eq!(vp.join(off), va);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(u64);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[inline]
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr.addr() as u64)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Sign-extend bit 47 into bits `[63:48]`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub const fn canonicalize(self) -> Self {
        const SHIFT: u32 = 64 - VIRTUAL_ADDRESS_BITS;
        Self((((self.0 << SHIFT) as i64) >> SHIFT) as u64)
    }

    /// Whether bits `[63:48]` are a sign extension of bit 47.
    #[inline]
    #[must_use]
    pub const fn is_canonical(self) -> bool {
        self.canonicalize().0 == self.0
    }

    #[inline]
    #[must_use]
    pub const fn page<S: PageSize>(self) -> VirtualPage<S> {
        VirtualPage::containing_address(self)
    }

    #[inline]
    #[must_use]
    pub const fn offset<S: PageSize>(self) -> MemoryAddressOffset<S> {
        MemoryAddressOffset::from_bits(self.0)
    }

    #[inline]
    #[must_use]
    pub const fn split<S: PageSize>(self) -> (VirtualPage<S>, MemoryAddressOffset<S>) {
        (self.page::<S>(), self.offset::<S>())
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u64) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:016X})", self.0)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<u64> for VirtualAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<VirtualAddress> for u64 {
    #[inline]
    fn from(v: VirtualAddress) -> Self {
        v.0
    }
}
