use core::fmt;
use core::hash::Hash;

/// Sealed trait pattern to restrict `PageSize` impls to our markers.
mod sealed {
    pub trait Sealed {}
}

/// Marker trait for supported page sizes.
///
/// `Size4K` is the granularity of the frame allocator and of regular
/// page-table leaves. `Size2M` and `Size1G` only show up when walking tables
/// that contain large-page leaves (PS=1).
pub trait PageSize:
    sealed::Sealed + Clone + Copy + Eq + PartialEq + Ord + PartialOrd + Hash + fmt::Debug
{
    /// Page size in bytes (power of two).
    const SIZE: u64;
    /// log2(SIZE), i.e., number of low bits used for the offset.
    const SHIFT: u32;
    /// Mask selecting the in-page offset bits.
    const MASK: u64 = Self::SIZE - 1;

    fn as_str() -> &'static str;
}

macro_rules! page_size {
    ($(#[$doc:meta])* $name:ident, $shift:literal, $label:literal) => {
        $(#[$doc])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl PageSize for $name {
            const SIZE: u64 = 1 << $shift;
            const SHIFT: u32 = $shift;

            fn as_str() -> &'static str {
                $label
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(Self::as_str())
            }
        }
    };
}

page_size!(
    /// 4 KiB page (4096 bytes), the frame size.
    Size4K, 12, "4K"
);

page_size!(
    /// 2 MiB page, mapped by a page-directory entry with `PS=1`.
    Size2M, 21, "2M"
);

page_size!(
    /// 1 GiB page, mapped by a PDPT entry with `PS=1`.
    Size1G, 30, "1G"
);

const _: () = {
    assert!(Size4K::SIZE == 4096);
    assert!(Size2M::SIZE == 2 * 1024 * 1024);
    assert!(Size1G::SIZE == 1024 * 1024 * 1024);
};
