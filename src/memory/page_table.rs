//! The two-level i386 paging structures. A page directory and a page table
//! share the same shape: 1024 32-bit entries, each packing a frame address
//! in the upper 20 bits and flags in the low 12. The bit layout is read by
//! hardware and must be reproduced exactly.

use core::fmt;
use core::ops::{Index, IndexMut};

use bitflags::bitflags;

use super::addr::PhysAddr;
use crate::constants::memory::ENTRY_COUNT;

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct EntryFlags: u32 {
        const PRESENT = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER = 1 << 2;
    }
}

/// One directory or table entry.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Entry(u32);

impl Entry {
    pub const EMPTY: Entry = Entry(0);

    pub fn new(frame: PhysAddr, flags: EntryFlags) -> Entry {
        debug_assert!(frame.is_page_aligned());
        Entry(frame.as_u32() | flags.bits())
    }

    pub const fn from_raw(raw: u32) -> Entry {
        Entry(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub fn frame(self) -> PhysAddr {
        PhysAddr::new(self.0 & !0xfff)
    }

    pub fn flags(self) -> EntryFlags {
        EntryFlags::from_bits_truncate(self.0)
    }

    pub fn is_present(self) -> bool {
        self.flags().contains(EntryFlags::PRESENT)
    }

    pub fn is_writable(self) -> bool {
        self.flags().contains(EntryFlags::WRITABLE)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entry({:#010x})", self.0)
    }
}

/// A page-sized, page-aligned array of entries. Doubles as the page
/// directory, which is the same structure one level up.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [Entry; ENTRY_COUNT],
}

impl PageTable {
    pub fn zero(&mut self) {
        for entry in self.entries.iter_mut() {
            *entry = Entry::EMPTY;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }
}

impl Index<usize> for PageTable {
    type Output = Entry;

    fn index(&self, index: usize) -> &Entry {
        &self.entries[index]
    }
}

impl IndexMut<usize> for PageTable {
    fn index_mut(&mut self, index: usize) -> &mut Entry {
        &mut self.entries[index]
    }
}
