//! The physical frame pool: every usable page frame above the kernel image,
//! tracked by a word per frame whose low bit marks it used. Frames are
//! stored highest-first so a frame's slot can be recovered from its address
//! alone.

use arrayvec::ArrayVec;

use crate::arch::interrupts::without_interrupts;
use crate::constants::memory::{KERNEL_END, MAX_POOL_FRAMES, PAGE_SIZE};

use super::addr::PhysAddr;
use super::bus::MemoryBus;
use super::multiboot::{self, BootInfo, Region};

/// Frame addresses are page aligned, so the low bit is free for bookkeeping.
const USED: u32 = 1;

pub struct FramePool {
    /// Frame addresses in descending order, low bit set while handed out.
    entries: ArrayVec<u32, MAX_POOL_FRAMES>,
    /// Address of the highest frame, the one stored at index zero.
    highest: u32,
    free: usize,
}

impl FramePool {
    /// Collect every usable whole frame above the kernel image from the
    /// loader's memory map.
    pub fn from_regions<I>(regions: I) -> FramePool
    where
        I: IntoIterator<Item = Region>,
    {
        let mut entries: ArrayVec<u32, MAX_POOL_FRAMES> = ArrayVec::new();
        'regions: for region in regions {
            if !region.usable {
                continue;
            }
            let end = region.base.saturating_add(region.length);
            if end <= KERNEL_END {
                continue;
            }
            // Clip away the kernel image, then round up to a frame boundary.
            let mut addr = if region.base < KERNEL_END {
                KERNEL_END
            } else {
                region.base.div_ceil(PAGE_SIZE) * PAGE_SIZE
            };
            while end - addr >= PAGE_SIZE {
                if entries.try_push(addr).is_err() {
                    log::warn!(
                        "frame pool full, ignoring memory above {:?}",
                        PhysAddr::new(addr)
                    );
                    break 'regions;
                }
                addr += PAGE_SIZE;
            }
        }
        entries.reverse();
        let highest = entries.first().copied().unwrap_or(0);
        let free = entries.len();
        log::info!(
            "frame pool holds {} frames, highest at {:?}",
            free,
            PhysAddr::new(highest)
        );
        FramePool {
            entries,
            highest,
            free,
        }
    }

    /// Build the pool straight from the loader handshake.
    ///
    /// # Safety
    ///
    /// `info` must point at a valid boot information structure whose memory
    /// map is readable.
    pub unsafe fn from_multiboot(signature: u32, info: &BootInfo) -> FramePool {
        multiboot::verify(signature, info);
        FramePool::from_regions(multiboot::regions(info))
    }

    pub fn total_frames(&self) -> usize {
        self.entries.len()
    }

    pub fn free_frames(&self) -> usize {
        self.free
    }

    /// Hand out one zero-filled frame. Panics when the pool is exhausted;
    /// callers that can tolerate failure must check [`free_frames`] first.
    ///
    /// [`free_frames`]: FramePool::free_frames
    pub fn acquire_frame(&mut self, bus: &mut (impl MemoryBus + ?Sized)) -> PhysAddr {
        without_interrupts(|| {
            let slot = self
                .entries
                .iter()
                .position(|&entry| entry & USED == 0)
                .unwrap_or_else(|| panic!("out of physical frames"));
            let frame = PhysAddr::new(self.entries[slot]);
            self.entries[slot] |= USED;
            self.free -= 1;
            unsafe {
                core::ptr::write_bytes(bus.window(frame), 0, PAGE_SIZE as usize);
            }
            frame
        })
    }

    /// Return a frame to the pool. Bad addresses are logged and dropped
    /// rather than corrupting the pool.
    pub fn release_frame(&mut self, addr: PhysAddr) {
        without_interrupts(|| {
            if addr.as_u32() < KERNEL_END {
                log::error!("refusing to pool kernel memory at {addr:?}");
                return;
            }
            let addr = if addr.is_page_aligned() {
                addr
            } else {
                log::warn!("releasing misaligned address {addr:?}, truncating");
                addr.align_down()
            };
            if addr.as_u32() > self.highest {
                log::error!("{addr:?} lies above the highest pooled frame");
                return;
            }
            let slot = ((self.highest - addr.as_u32()) / PAGE_SIZE) as usize;
            let Some(entry) = self.entries.get_mut(slot) else {
                log::error!("{addr:?} is not in the pool");
                return;
            };
            if *entry & !USED != addr.as_u32() {
                log::error!("{addr:?} is not in the pool");
                return;
            }
            if *entry & USED == 0 {
                log::warn!("double release of {addr:?}");
                return;
            }
            *entry &= !USED;
            self.free += 1;
        });
    }
}
