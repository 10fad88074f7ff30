//! A simulated machine for the test suite: a block of host memory standing
//! in for physical RAM, with a software page walk instead of an MMU. Lets
//! the whole memory core run under `cargo test` on any host.

use crate::constants::memory::{KERNEL_END, PAGE_SIZE};
use crate::memory::addr::{PhysAddr, VirtAddr};
use crate::memory::bus::MemoryBus;
use crate::memory::frame_pool::FramePool;
use crate::memory::multiboot::Region;
use crate::memory::page_table::Entry;

/// Page-aligned backing storage, so frames handed out as page tables
/// satisfy the alignment the real structures declare.
#[repr(align(4096))]
#[derive(Clone)]
struct PageChunk([u8; PAGE_SIZE as usize]);

/// Simulated physical memory covering `pages` frames starting at `base`,
/// with a software MMU fed by `load_page_directory`.
pub struct SimBus {
    base: u32,
    mem: Vec<PageChunk>,
    directory: Option<PhysAddr>,
    paging: bool,
}

impl SimBus {
    pub fn new(base: u32, pages: usize) -> SimBus {
        assert_eq!(base % PAGE_SIZE, 0);
        SimBus {
            base,
            mem: vec![PageChunk([0; PAGE_SIZE as usize]); pages],
            directory: None,
            paging: false,
        }
    }

    fn slot(&mut self, pa: PhysAddr) -> *mut u8 {
        let offset = pa
            .as_u32()
            .checked_sub(self.base)
            .unwrap_or_else(|| panic!("{pa:?} is below simulated memory"));
        let page = (offset / PAGE_SIZE) as usize;
        assert!(page < self.mem.len(), "{pa:?} is beyond simulated memory");
        unsafe {
            self.mem[page]
                .0
                .as_mut_ptr()
                .add((offset % PAGE_SIZE) as usize)
        }
    }

    fn read_phys_u32(&self, pa: PhysAddr) -> u32 {
        let offset = (pa.as_u32() - self.base) as usize;
        let page = offset / PAGE_SIZE as usize;
        let byte = offset % PAGE_SIZE as usize;
        u32::from_le_bytes(
            self.mem[page].0[byte..byte + 4]
                .try_into()
                .unwrap(),
        )
    }

    /// Software page walk through the loaded directory.
    pub fn try_translate(&self, va: VirtAddr) -> Option<PhysAddr> {
        let directory = self.directory.expect("no page directory loaded");
        let dir_entry = Entry::from_raw(
            self.read_phys_u32(PhysAddr::new(
                directory.as_u32() + 4 * va.dir_index() as u32,
            )),
        );
        if !dir_entry.is_present() {
            return None;
        }
        let table_entry = Entry::from_raw(self.read_phys_u32(PhysAddr::new(
            dir_entry.frame().as_u32() + 4 * va.table_index() as u32,
        )));
        if !table_entry.is_present() {
            return None;
        }
        Some(PhysAddr::new(table_entry.frame().as_u32() + va.page_offset()))
    }

    pub fn translate(&self, va: VirtAddr) -> PhysAddr {
        self.try_translate(va)
            .unwrap_or_else(|| panic!("{va:?} is unmapped"))
    }
}

impl MemoryBus for SimBus {
    fn window(&mut self, frame: PhysAddr) -> *mut u8 {
        assert!(frame.is_page_aligned());
        self.slot(frame)
    }

    fn heap_ptr(&mut self, va: VirtAddr) -> *mut u8 {
        let pa = self.translate(va);
        self.slot(pa)
    }

    fn load_page_directory(&mut self, directory: PhysAddr) {
        self.directory = Some(directory);
    }

    fn enable_paging(&mut self) {
        self.paging = true;
    }

    fn invalidate(&mut self, _va: VirtAddr) {}
}

/// A bus with no translation at all: virtual addresses equal physical
/// ones. Enough for the boundary-tag and free-list unit tests, which never
/// touch paging.
pub struct FlatBus {
    base: u32,
    mem: Vec<PageChunk>,
}

impl FlatBus {
    pub fn new(base: u32, pages: usize) -> FlatBus {
        assert_eq!(base % PAGE_SIZE, 0);
        FlatBus {
            base,
            mem: vec![PageChunk([0; PAGE_SIZE as usize]); pages],
        }
    }

    fn slot(&mut self, addr: u32) -> *mut u8 {
        let offset = addr
            .checked_sub(self.base)
            .unwrap_or_else(|| panic!("{addr:#010x} is below simulated memory"));
        let page = (offset / PAGE_SIZE) as usize;
        assert!(page < self.mem.len());
        unsafe {
            self.mem[page]
                .0
                .as_mut_ptr()
                .add((offset % PAGE_SIZE) as usize)
        }
    }
}

impl MemoryBus for FlatBus {
    fn window(&mut self, frame: PhysAddr) -> *mut u8 {
        self.slot(frame.as_u32())
    }

    fn heap_ptr(&mut self, va: VirtAddr) -> *mut u8 {
        self.slot(va.as_u32())
    }

    fn load_page_directory(&mut self, _directory: PhysAddr) {}

    fn enable_paging(&mut self) {}

    fn invalidate(&mut self, _va: VirtAddr) {}
}

/// Standard fixture: a pool of `frames` usable frames starting right above
/// the kernel image, over a matching simulated memory.
pub fn pool_with_frames(frames: u32) -> (FramePool, SimBus) {
    let bus = SimBus::new(KERNEL_END, frames as usize);
    let pool = FramePool::from_regions([Region {
        base: KERNEL_END,
        length: frames * PAGE_SIZE,
        usable: true,
    }]);
    (pool, bus)
}
