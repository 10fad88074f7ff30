//! Boundary tags. Every heap block carries its size twice: a head tag in
//! the word before the block pointer and a tail tag in the block's last
//! word. Sizes are multiples of eight, so the low bit doubles as the
//! allocated flag and either neighbor can be sized without walking the heap.

use crate::constants::memory::TAG_BYTES;
use crate::memory::addr::VirtAddr;
use crate::memory::bus::{read_word, write_word, MemoryBus};

pub(super) const ALLOCATED: u32 = 1;
pub(super) const SIZE_MASK: u32 = !0x7;

/// The tag just before `block`.
pub(super) fn head_tag(bus: &mut (impl MemoryBus + ?Sized), block: VirtAddr) -> u32 {
    read_word(bus, block - 4)
}

pub(super) fn tag_size(tag: u32) -> u32 {
    tag & SIZE_MASK
}

pub(super) fn is_allocated(tag: u32) -> bool {
    tag & ALLOCATED != 0
}

/// Stamp both tags of `block` as an allocation of `size` bytes.
pub(super) fn set_allocated(bus: &mut (impl MemoryBus + ?Sized), block: VirtAddr, size: u32) {
    write_word(bus, block - 4, size | ALLOCATED);
    write_word(bus, block + (size - TAG_BYTES), size | ALLOCATED);
}

/// Stamp both tags of `block` as a free span of `size` bytes.
pub(super) fn set_free(bus: &mut (impl MemoryBus + ?Sized), block: VirtAddr, size: u32) {
    write_word(bus, block - 4, size);
    write_word(bus, block + (size - TAG_BYTES), size);
}
