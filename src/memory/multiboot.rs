//! Multiboot boot information, as handed over by the loader. Only the
//! pieces the memory subsystem needs are modeled: the magic check and the
//! physical memory map.

use core::ptr;

use crate::constants::memory::{MMAP_TYPE_USABLE, MULTIBOOT_FLAG_MMAP, MULTIBOOT_SIGNATURE};

/// The fixed-layout information structure the bootloader leaves behind.
#[repr(C)]
pub struct BootInfo {
    pub flags: u32,
    pub mem_lower: u32,
    pub mem_upper: u32,
    pub boot_device: u32,
    pub cmdline: u32,
    pub mods_count: u32,
    pub mods_addr: u32,
    pub syms: [u32; 4],
    pub mmap_length: u32,
    pub mmap_addr: u32,
}

/// One record of the loader's memory map. Records are variable-stride:
/// `size` counts the bytes following itself. Only ever read through an
/// unaligned pointer, never constructed.
#[repr(C, packed)]
pub struct MmapRecord {
    size: u32,
    base_addr: u64,
    length: u64,
    kind: u32,
}

/// A span of physical memory reported by the loader, clipped to 32 bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub base: u32,
    pub length: u32,
    pub usable: bool,
}

pub struct RegionIter {
    cursor: *const u8,
    end: *const u8,
}

impl Iterator for RegionIter {
    type Item = Region;

    fn next(&mut self) -> Option<Region> {
        if self.cursor >= self.end {
            return None;
        }
        let rec = self.cursor.cast::<MmapRecord>();
        let (size, base, length, kind) = unsafe {
            (
                ptr::addr_of!((*rec).size).read_unaligned(),
                ptr::addr_of!((*rec).base_addr).read_unaligned(),
                ptr::addr_of!((*rec).length).read_unaligned(),
                ptr::addr_of!((*rec).kind).read_unaligned(),
            )
        };
        // `size` does not count its own four bytes.
        self.cursor = unsafe { self.cursor.add(size as usize + 4) };
        Some(Region {
            base: base as u32,
            length: length.min(u64::from(u32::MAX)) as u32,
            usable: kind == MMAP_TYPE_USABLE,
        })
    }
}

/// Check the loader handshake. Panics if the magic value is wrong or the
/// memory map is missing, since the kernel cannot start without either.
pub fn verify(signature: u32, info: &BootInfo) {
    if signature != MULTIBOOT_SIGNATURE {
        panic!("could not find multiboot signature");
    }
    if info.flags & MULTIBOOT_FLAG_MMAP == 0 {
        panic!("no mmap found in boot info");
    }
}

/// Iterate the loader's memory map.
///
/// # Safety
///
/// `info.mmap_addr` and `info.mmap_length` must describe readable memory
/// holding well-formed map records.
pub unsafe fn regions(info: &BootInfo) -> RegionIter {
    regions_at(info.mmap_addr as *const u8, info.mmap_length as usize)
}

/// Iterate map records starting at `base`. Split out from [`regions`] so
/// a map built in host memory can be walked without squeezing its pointer
/// through the 32-bit `mmap_addr` field.
///
/// # Safety
///
/// `base..base + length` must be readable and hold well-formed records.
pub unsafe fn regions_at(base: *const u8, length: usize) -> RegionIter {
    RegionIter {
        cursor: base,
        end: base.add(length),
    }
}
