//! The memory bus: the one seam between the core and whatever is actually
//! backing physical memory. On hardware this is [`super::window::HardwareBus`];
//! the test harness substitutes a simulated machine.

use super::addr::{PhysAddr, VirtAddr};
use super::page_table::PageTable;

pub trait MemoryBus {
    /// Alias `frame` at the temporary mapping window and return a pointer
    /// to its first byte. The pointer covers one page and is valid only
    /// until the next `window` call on this bus: the window is a single
    /// shared slot, so every read/write through it must complete before
    /// another frame is mapped.
    fn window(&mut self, frame: PhysAddr) -> *mut u8;

    /// A usable pointer for a virtual address of the current address space.
    fn heap_ptr(&mut self, va: VirtAddr) -> *mut u8;

    /// Point the hardware page-table base at `directory`.
    fn load_page_directory(&mut self, directory: PhysAddr);

    /// Turn the paging mode bit on.
    fn enable_paging(&mut self);

    /// Drop any cached translation for `va`.
    fn invalidate(&mut self, va: VirtAddr);
}

/// Window `frame` and hand it to `f` as a page table. Borrowing the bus for
/// the whole call keeps the single-slot discipline honest: nothing inside
/// `f` can remap the window.
pub(crate) fn with_table<B, R>(
    bus: &mut B,
    frame: PhysAddr,
    f: impl FnOnce(&mut PageTable) -> R,
) -> R
where
    B: MemoryBus + ?Sized,
{
    let table = bus.window(frame).cast::<PageTable>();
    f(unsafe { &mut *table })
}

/// One aligned 32-bit word of the current address space.
pub(crate) fn read_word<B: MemoryBus + ?Sized>(bus: &mut B, va: VirtAddr) -> u32 {
    debug_assert_eq!(va.as_u32() % 4, 0);
    unsafe { bus.heap_ptr(va).cast::<u32>().read() }
}

pub(crate) fn write_word<B: MemoryBus + ?Sized>(bus: &mut B, va: VirtAddr, value: u32) {
    debug_assert_eq!(va.as_u32() % 4, 0);
    unsafe { bus.heap_ptr(va).cast::<u32>().write(value) }
}
