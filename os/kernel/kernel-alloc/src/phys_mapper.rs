//! # Physical Mappers
//!
//! [`PhysMapper`] implementations for the two ways the kernel can reach a
//! physical frame:
//!
//! - [`IdentityPhysMapper`]: while running on the bootloader's page tables,
//!   low physical memory is identity mapped, so `va == pa`.
//! - [`HhdmPhysMapper`]: once the higher-half direct map is in place, every
//!   physical address `pa` is visible at `HHDM_BASE + pa`.
//!
//! Both only compute addresses. Whether the result may be dereferenced is up
//! to the caller of [`PhysMapper::phys_to_mut`].

use kernel_info::memory::HHDM_BASE;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::PhysMapper;

/// Physical address == virtual address.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct IdentityPhysMapper;

impl PhysMapper for IdentityPhysMapper {
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T {
        core::ptr::with_exposed_provenance_mut(pa.as_u64() as usize)
    }
}

/// Physical memory seen through the higher-half direct map.
///
/// ```rust
/// use kernel_alloc::phys_mapper::HhdmPhysMapper;
/// use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
///
/// let va = HhdmPhysMapper.virtual_address(PhysicalAddress::new(0x1234_0000));
/// assert_eq!(va, VirtualAddress::new(0xFFFF_8000_1234_0000));
/// ```
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct HhdmPhysMapper;

impl HhdmPhysMapper {
    #[inline]
    #[must_use]
    pub const fn virtual_address(&self, pa: PhysicalAddress) -> VirtualAddress {
        VirtualAddress::new(HHDM_BASE.wrapping_add(pa.as_u64()))
    }
}

impl PhysMapper for HhdmPhysMapper {
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T {
        core::ptr::with_exposed_provenance_mut(self.virtual_address(pa).as_u64() as usize)
    }
}
