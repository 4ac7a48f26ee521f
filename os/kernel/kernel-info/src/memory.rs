//! # Memory Layout

use kernel_memory_addresses::{PageSize, Size1G};

/// Base of the higher-half direct map (HHDM) set up by the bootloader.
///
/// Every physical address `pa` is readable and writable at `HHDM_BASE + pa`,
/// which is how the kernel reaches page-table frames once it no longer relies
/// on the low identity map.
pub const HHDM_BASE: u64 = 0xffff_8000_0000_0000;

const _: () = assert!(HHDM_BASE.is_multiple_of(Size1G::SIZE));
