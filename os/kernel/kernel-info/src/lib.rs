//! # Kernel Boot Interface
//!
//! Data the bootloader hands to the kernel that the memory subsystem consumes,
//! and the fixed memory-layout constants shared between crates.
//!
//! ## Modules
//!
//! ### Memory Map ([`memory_map`])
//! The firmware/bootloader memory map: one [`MemoryMapEntry`](memory_map::MemoryMapEntry)
//! per physical range, typed by [`MemoryRegionKind`](memory_map::MemoryRegionKind).
//! Only `Usable` ranges seed the physical frame allocator.
//!
//! ### Memory Layout ([`memory`])
//! The HHDM base, checked at compile time to be 1 GiB aligned.
//!
//! ```text
//! Physical Memory (example):
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │  Usable (low memory)            │
//!             ├─────────────────────────────────┤
//!             │  Reserved / ACPI / Framebuffer  │  never allocated
//!             ├─────────────────────────────────┤
//!             │  Kernel and Modules             │  never allocated
//!             ├─────────────────────────────────┤
//!             │  Usable                         │  seeds the frame allocator
//!             └─────────────────────────────────┘
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod memory;
pub mod memory_map;
