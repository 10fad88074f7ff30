//! Virtual-memory and heap-management core of a small 32-bit teaching
//! kernel: physical frame pool, two-level page tables, per-process
//! address-space construction and a boundary-tag heap allocator.
//!
//! Everything that touches real hardware goes through the narrow seam in
//! [`arch`] and the [`memory::bus::MemoryBus`] trait, so the rest of the
//! core runs unmodified on a simulated machine under `cargo test`.
#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "strict", deny(warnings))]

pub mod arch;
pub mod constants;
pub mod logging;
pub mod memory;
pub mod processes;

#[cfg(test)]
pub mod sim;

pub mod prelude {
    pub use crate::memory::addr::{PhysAddr, VirtAddr};
    pub use crate::memory::bus::MemoryBus;
    pub use crate::memory::frame_pool::FramePool;
}
