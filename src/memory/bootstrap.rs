//! Boot-time paging setup. Builds the initial kernel address space out of
//! the static pages reserved below the kernel end, switches paging on, and
//! rebases the boot stack to its high alias.

use crate::constants::memory::{
    BOOT_PAGES_BASE, BOOT_STACK_DIR_SLOT, BOOT_STACK_FRAME, ENTRY_COUNT, KERNEL_TABLE_COUNT,
    PAGE_SIZE,
};

use super::addr::PhysAddr;
use super::address_space::AddressSpace;
use super::bus::{with_table, MemoryBus};
use super::page_table::{Entry, EntryFlags};

/// Build the identity-mapped kernel address space and enable paging.
///
/// The directory and its nine tables live in the fixed static pages at
/// `BOOT_PAGES_BASE`; eight tables identity-map the kernel image (the last
/// of them also carries the mapping window PTE) and the ninth aliases the
/// boot stack frame at its high address so the stack survives the switch.
pub fn init_kernel_space(bus: &mut (impl MemoryBus + ?Sized)) -> AddressSpace {
    let flags = EntryFlags::PRESENT | EntryFlags::WRITABLE;
    let directory = PhysAddr::new(BOOT_PAGES_BASE);
    with_table(bus, directory, |dir| dir.zero());

    for i in 0..KERNEL_TABLE_COUNT {
        let table = PhysAddr::new(BOOT_PAGES_BASE + (i as u32 + 1) * PAGE_SIZE);
        with_table(bus, directory, |dir| {
            dir[i] = Entry::new(table, flags);
        });
        with_table(bus, table, |entries| {
            for j in 0..ENTRY_COUNT {
                let frame = ((i * ENTRY_COUNT + j) as u32) << 12;
                entries[j] = Entry::new(PhysAddr::new(frame), flags);
            }
        });
    }

    let stack_table = PhysAddr::new(BOOT_PAGES_BASE + 9 * PAGE_SIZE);
    with_table(bus, directory, |dir| {
        dir[BOOT_STACK_DIR_SLOT] = Entry::new(stack_table, flags);
    });
    with_table(bus, stack_table, |entries| {
        entries.zero();
        entries[ENTRY_COUNT - 1] = Entry::new(PhysAddr::new(BOOT_STACK_FRAME), flags);
    });

    bus.load_page_directory(directory);
    bus.enable_paging();
    log::info!("paging enabled, kernel directory at {directory:?}");

    AddressSpace::adopt(directory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::memory::{BOOT_STACK_REBASE, KERNEL_END, WINDOW_TABLE_VADDR};
    use crate::memory::addr::VirtAddr;
    use crate::sim::SimBus;

    #[test]
    fn kernel_image_is_identity_mapped() {
        let mut bus = SimBus::new(BOOT_PAGES_BASE, 16);
        init_kernel_space(&mut bus);
        for va in [0x0000_0000u32, 0x0012_3456, WINDOW_TABLE_VADDR, KERNEL_END - 1] {
            let pa = bus.translate(VirtAddr::new(va));
            assert_eq!(pa, PhysAddr::new(va));
        }
    }

    #[test]
    fn boot_stack_alias_points_at_its_frame() {
        let mut bus = SimBus::new(BOOT_PAGES_BASE, 16);
        init_kernel_space(&mut bus);
        let pa = bus.translate(VirtAddr::new(BOOT_STACK_REBASE));
        assert_eq!(pa, PhysAddr::new(BOOT_STACK_FRAME));
    }

    #[test]
    fn addresses_beyond_the_image_are_unmapped() {
        let mut bus = SimBus::new(BOOT_PAGES_BASE, 16);
        init_kernel_space(&mut bus);
        assert!(bus.try_translate(VirtAddr::new(KERNEL_END)).is_none());
    }
}
