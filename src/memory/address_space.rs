//! Per-process address spaces: a page directory plus the operations that
//! populate and tear it down. Every space shares the kernel identity tables
//! through its first eight directory slots and owns everything above them.

use crate::arch::interrupts::without_interrupts;
use crate::constants::memory::{
    kernel_table, ENTRY_COUNT, KERNEL_TABLE_COUNT, STACK_DIR_SLOT, STACK_TOP,
};

use super::addr::{PhysAddr, VirtAddr};
use super::bus::{with_table, MemoryBus};
use super::frame_pool::FramePool;
use super::page_table::{Entry, EntryFlags};
use super::pages_for;

#[derive(Debug)]
pub struct AddressSpace {
    directory: PhysAddr,
}

/// What [`AddressSpace::build_stack`] produced.
pub struct StackBuild {
    /// Initial stack pointer value, the very top of the space.
    pub top: VirtAddr,
    /// Number of frames backing the stack.
    pub pages: u32,
    /// Frame backing the topmost stack page, where the first context lives.
    pub top_frame: PhysAddr,
}

impl AddressSpace {
    /// Fresh empty space with a zeroed directory from the pool.
    pub fn new(pool: &mut FramePool, bus: &mut (impl MemoryBus + ?Sized)) -> AddressSpace {
        AddressSpace {
            directory: pool.acquire_frame(bus),
        }
    }

    /// Wrap a directory that already exists, such as the boot-time one.
    pub const fn adopt(directory: PhysAddr) -> AddressSpace {
        AddressSpace { directory }
    }

    pub fn directory(&self) -> PhysAddr {
        self.directory
    }

    /// Point the low directory slots at the shared kernel identity tables.
    pub fn map_kernel_image(&self, bus: &mut (impl MemoryBus + ?Sized)) {
        without_interrupts(|| {
            let flags = EntryFlags::PRESENT | EntryFlags::WRITABLE;
            with_table(bus, self.directory, |dir| {
                for i in 0..KERNEL_TABLE_COUNT {
                    dir[i] = Entry::new(PhysAddr::new(kernel_table(i)), flags);
                }
            });
        });
    }

    /// Back a stack of at least `nbytes` ending at the top of the space.
    /// Pages fill the last page table downward from its final slot.
    pub fn build_stack(
        &self,
        nbytes: u32,
        pool: &mut FramePool,
        bus: &mut (impl MemoryBus + ?Sized),
    ) -> StackBuild {
        without_interrupts(|| {
            let flags = EntryFlags::PRESENT | EntryFlags::WRITABLE;
            let pages = pages_for(nbytes);
            debug_assert!(pages as usize <= ENTRY_COUNT);

            let table = pool.acquire_frame(bus);
            with_table(bus, self.directory, |dir| {
                dir[STACK_DIR_SLOT] = Entry::new(table, flags);
            });

            let mut top_frame = PhysAddr::new(0);
            for i in 0..pages {
                let frame = pool.acquire_frame(bus);
                if i == 0 {
                    top_frame = frame;
                }
                with_table(bus, table, |entries| {
                    entries[ENTRY_COUNT - 1 - i as usize] = Entry::new(frame, flags);
                });
            }

            StackBuild {
                top: VirtAddr::new(STACK_TOP),
                pages,
                top_frame,
            }
        })
    }

    /// Walk the paging structures for `va`.
    pub fn translate(
        &self,
        bus: &mut (impl MemoryBus + ?Sized),
        va: VirtAddr,
    ) -> Option<PhysAddr> {
        without_interrupts(|| {
            let dir_entry = with_table(bus, self.directory, |dir| dir[va.dir_index()]);
            if !dir_entry.is_present() {
                return None;
            }
            let table_entry =
                with_table(bus, dir_entry.frame(), |entries| entries[va.table_index()]);
            if !table_entry.is_present() {
                return None;
            }
            Some(PhysAddr::new(table_entry.frame().as_u32() + va.page_offset()))
        })
    }

    /// Release everything the space owns: every private data frame, every
    /// private page table, and finally the directory itself. The shared
    /// kernel tables in the low slots are left alone.
    pub fn teardown(
        self,
        pool: &mut FramePool,
        bus: &mut (impl MemoryBus + ?Sized),
    ) {
        without_interrupts(|| {
            for i in (KERNEL_TABLE_COUNT..ENTRY_COUNT).rev() {
                let dir_entry = with_table(bus, self.directory, |dir| dir[i]);
                if !dir_entry.is_present() {
                    continue;
                }
                let table = dir_entry.frame();
                for j in (0..ENTRY_COUNT).rev() {
                    let entry = with_table(bus, table, |entries| entries[j]);
                    if entry.is_present() && entry.is_writable() {
                        pool.release_frame(entry.frame());
                    }
                }
                pool.release_frame(table);
            }
            pool.release_frame(self.directory);
        });
    }

    /// Unmap and release the heap page at `va`, and the page table with it
    /// once the page was the table's first. Used only by heap shrinking,
    /// which releases pages top-down, so a cleared slot zero means the
    /// whole table is empty.
    pub(crate) fn free_heap_page(
        &self,
        va: VirtAddr,
        pool: &mut FramePool,
        bus: &mut (impl MemoryBus + ?Sized),
    ) {
        debug_assert!(va.is_page_aligned());
        let dir_entry = with_table(bus, self.directory, |dir| dir[va.dir_index()]);
        debug_assert!(dir_entry.is_present());
        let table = dir_entry.frame();
        let frame = with_table(bus, table, |entries| {
            let entry = entries[va.table_index()];
            entries[va.table_index()] = Entry::EMPTY;
            entry.frame()
        });
        bus.invalidate(va);
        pool.release_frame(frame);
        if va.table_index() == 0 {
            with_table(bus, self.directory, |dir| {
                dir[va.dir_index()] = Entry::EMPTY;
            });
            pool.release_frame(table);
        }
    }
}
