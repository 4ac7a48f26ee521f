//! # Kernel Memory Allocation
//!
//! Physical memory management for the kernel and the context object that
//! ties it to the page tables.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            KernelMemory (context)            │
//! │   owns both components, built once at boot   │
//! └───────────────┬──────────────────────────────┘
//!                 │
//! ┌───────────────▼──────────────┐   frames for new tables
//! │  PageTableManager (vmem)     │◄──────────────────────┐
//! │  map / unmap / translate     │                       │
//! └───────────────┬──────────────┘                       │
//!                 │ PhysMapper                           │
//! ┌───────────────▼──────────────┐   ┌───────────────────┴────┐
//! │  Identity / HHDM mapper      │   │ PhysicalFrameAllocator │
//! └──────────────────────────────┘   │ free-region list       │
//!                                    └────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! ### Physical Frame Allocator ([`frame_alloc`])
//! Tracks free 4 KiB frames as contiguous regions seeded from the boot
//! memory map. Supports taking any page, taking a specific page, and locking
//! ranges that are already in use (kernel image, GDT, IDT, ...). The region
//! list lives in a fixed array, so it works before any heap exists.
//!
//! ### Physical Mapper ([`phys_mapper`])
//! How page-table frames are reached: through the bootloader's identity
//! map or through the higher-half direct map.
//!
//! ### Context ([`memory`])
//! [`KernelMemory`](memory::KernelMemory) bundles the allocator and the
//! page-table manager and is handed to subsystems explicitly.
//!
//! ### Debug dumps ([`debug`])
//! Log output behind the shell's `printpfa`, `getphys` and `uefimmap`.
//!
//! ## Concurrency
//!
//! Nothing here is reentrant. All calls must come from one thread of control
//! with no interrupt handler touching the same instance mid-call.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod debug;
pub mod frame_alloc;
mod free_list;
pub mod memory;
pub mod phys_mapper;
