use crate::{MemoryAddressOffset, PageSize, VirtualAddress};
use core::fmt;
use core::marker::PhantomData;

/// Virtual page base for size `S`.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage<S: PageSize> {
    base: u64,
    _phantom: PhantomData<S>,
}

impl<S: PageSize> VirtualPage<S> {
    #[inline]
    #[must_use]
    pub const fn containing_address(va: VirtualAddress) -> Self {
        Self {
            base: va.as_u64() & !S::MASK,
            _phantom: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new(self.base)
    }

    #[inline]
    #[must_use]
    pub const fn join(self, off: MemoryAddressOffset<S>) -> VirtualAddress {
        VirtualAddress::new(self.base | off.as_u64())
    }
}

impl<S: PageSize> fmt::Debug for VirtualPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage<{}>(0x{:016X})", S::as_str(), self.base)
    }
}

impl<S: PageSize> TryFrom<VirtualAddress> for VirtualPage<S> {
    type Error = ();

    #[inline]
    fn try_from(va: VirtualAddress) -> Result<Self, ()> {
        if va.as_u64() & S::MASK == 0 {
            Ok(va.page())
        } else {
            Err(())
        }
    }
}
