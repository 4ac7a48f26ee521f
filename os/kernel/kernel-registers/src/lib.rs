//! # Typed `x86_64` Control Registers
//!
//! Only what paging needs: [`Cr3`](cr3::Cr3), the page-map root pointer.
//! Reading and writing the hardware register is gated behind the `asm`
//! feature so the bit layout stays usable from host-side tests.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "cr3")]
pub mod cr3;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The register access is privileged and requires kernel mode (Ring 0).
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The register access is privileged and requires kernel mode (Ring 0).
    /// Writing a control register changes global CPU state; the caller must
    /// make sure the new value describes valid structures.
    unsafe fn store_unsafe(self);
}
