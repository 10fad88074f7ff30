//! The temporary mapping window on real hardware: one fixed virtual page
//! whose PTE is rewritten to alias an arbitrary physical frame. This is the
//! only way the kernel touches page tables and directories that are not
//! part of the running address space.

use crate::arch;
use crate::constants::memory::{WINDOW_SLOT, WINDOW_TABLE_VADDR, WINDOW_VADDR};

use super::addr::{PhysAddr, VirtAddr};
use super::bus::MemoryBus;
use super::page_table::{Entry, EntryFlags, PageTable};

/// [`MemoryBus`] implementation for the real machine.
///
/// Until paging is enabled physical memory is directly addressable and the
/// window degenerates to an identity cast; afterwards every `window` call
/// rewrites the dedicated PTE and invalidates the translation.
pub struct HardwareBus {
    paging_enabled: bool,
}

impl HardwareBus {
    pub const fn new() -> HardwareBus {
        HardwareBus {
            paging_enabled: false,
        }
    }
}

impl Default for HardwareBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus for HardwareBus {
    fn window(&mut self, frame: PhysAddr) -> *mut u8 {
        if !self.paging_enabled {
            return frame.as_u32() as *mut u8;
        }
        arch::interrupts::without_interrupts(|| {
            // The window PTE lives in the last kernel identity table, which
            // is itself permanently mapped just below the window page.
            let table = WINDOW_TABLE_VADDR as *mut PageTable;
            unsafe {
                (&mut (*table))[WINDOW_SLOT] =
                    Entry::new(frame, EntryFlags::PRESENT | EntryFlags::WRITABLE);
            }
            arch::invalidate(VirtAddr::new(WINDOW_VADDR));
        });
        WINDOW_VADDR as *mut u8
    }

    fn heap_ptr(&mut self, va: VirtAddr) -> *mut u8 {
        va.as_u32() as *mut u8
    }

    fn load_page_directory(&mut self, directory: PhysAddr) {
        unsafe { arch::load_page_directory(directory) };
    }

    fn enable_paging(&mut self) {
        unsafe { arch::enable_paging_and_rebase() };
        self.paging_enabled = true;
    }

    fn invalidate(&mut self, va: VirtAddr) {
        arch::invalidate(va);
    }
}
