//! The intrusive free list. Free blocks form a circular doubly-linked ring
//! threaded through their own first two words: the successor pointer at the
//! block address and the predecessor pointer four bytes in. A block must be
//! at least sixteen bytes to hold both links and both tags.

use crate::memory::addr::VirtAddr;
use crate::memory::bus::{read_word, write_word, MemoryBus};

use super::tags;

pub(super) fn next(bus: &mut (impl MemoryBus + ?Sized), block: VirtAddr) -> VirtAddr {
    VirtAddr::new(read_word(bus, block))
}

pub(super) fn prev(bus: &mut (impl MemoryBus + ?Sized), block: VirtAddr) -> VirtAddr {
    VirtAddr::new(read_word(bus, block + 4))
}

fn set_next(bus: &mut (impl MemoryBus + ?Sized), block: VirtAddr, to: VirtAddr) {
    write_word(bus, block, to.as_u32());
}

fn set_prev(bus: &mut (impl MemoryBus + ?Sized), block: VirtAddr, to: VirtAddr) {
    write_word(bus, block + 4, to.as_u32());
}

/// Thread `block` into the ring, right after the head block.
pub(super) fn insert(
    head: &mut Option<VirtAddr>,
    bus: &mut (impl MemoryBus + ?Sized),
    block: VirtAddr,
) {
    match *head {
        None => {
            set_next(bus, block, block);
            set_prev(bus, block, block);
            *head = Some(block);
        }
        Some(first) => {
            let after = next(bus, first);
            set_prev(bus, after, block);
            set_next(bus, first, block);
            set_next(bus, block, after);
            set_prev(bus, block, first);
        }
    }
}

/// Unthread `block` from the ring.
pub(super) fn remove(
    head: &mut Option<VirtAddr>,
    bus: &mut (impl MemoryBus + ?Sized),
    block: VirtAddr,
) {
    let after = next(bus, block);
    if after == block {
        *head = None;
        return;
    }
    let before = prev(bus, block);
    set_next(bus, before, after);
    set_prev(bus, after, before);
    if *head == Some(block) {
        *head = Some(after);
    }
}

/// Replace `old` in the ring with `new`, a free block of `new_size` bytes.
/// Used when the front of a free block is carved off: the links move to the
/// residual without a remove/insert pair.
pub(super) fn reassign(
    head: &mut Option<VirtAddr>,
    bus: &mut (impl MemoryBus + ?Sized),
    old: VirtAddr,
    new: VirtAddr,
    new_size: u32,
) {
    tags::set_free(bus, new, new_size);
    let after = next(bus, old);
    if after == old {
        set_next(bus, new, new);
        set_prev(bus, new, new);
        *head = Some(new);
        return;
    }
    let before = prev(bus, old);
    set_next(bus, before, new);
    set_prev(bus, after, new);
    set_next(bus, new, after);
    set_prev(bus, new, before);
    if *head == Some(old) {
        *head = Some(new);
    }
}
