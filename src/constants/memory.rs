//! Fixed addresses and page geometry. These are an architecture contract
//! shared with the boot assembly and the context switcher; none of them may
//! move without a synchronized change on the other side.

pub const PAGE_SIZE: u32 = 4096;
pub const ENTRY_COUNT: usize = 1024;

/// End of the kernel image / identity region. The first eight directory
/// entries of every address space identity-map [0, KERNEL_END).
pub const KERNEL_END: u32 = 0x0200_0000;

/// Directory entries 0..KERNEL_TABLE_COUNT are the shared kernel aliases.
pub const KERNEL_TABLE_COUNT: usize = 8;

/// Physical address of the i'th shared kernel identity table.
pub const fn kernel_table(i: usize) -> u32 {
    KERNEL_END - (9 - i as u32) * PAGE_SIZE
}

/// The temporary mapping window: one virtual page just below the kernel end
/// whose PTE is rewritten to alias an arbitrary physical frame.
pub const WINDOW_VADDR: u32 = KERNEL_END - PAGE_SIZE;

/// The page table holding the window PTE is the last kernel identity table,
/// which is itself identity-mapped here.
pub const WINDOW_TABLE_VADDR: u32 = KERNEL_END - 2 * PAGE_SIZE;
pub const WINDOW_SLOT: usize = 1023;

/// Boot-time static paging structures: directory plus eight identity tables
/// plus the boot-stack alias table, reserved just below the kernel end.
pub const BOOT_PAGES_BASE: u32 = KERNEL_END - 10 * PAGE_SIZE;

/// Directory slot and frame used to rebase the boot stack once paging is on.
pub const BOOT_STACK_DIR_SLOT: usize = 1021;
pub const BOOT_STACK_FRAME: u32 = 0x6000;

/// High alias of the boot stack; or'ed into esp/ebp when paging turns on.
pub const BOOT_STACK_REBASE: u32 = 0xFF7F_F000;

/// The heap of every process grows upward from the kernel end.
pub const HEAP_BASE: u32 = KERNEL_END;

/// Every process sees the identical virtual stack top: the last four bytes
/// of the 32-bit space. Only the physical backing differs.
pub const STACK_TOP: u32 = 0xFFFF_FFFC;
pub const STACK_DIR_SLOT: usize = 1023;

/// Capacity of the frame-pool entry array (enough for 128 MiB of frames).
pub const MAX_POOL_FRAMES: usize = 32_768;

/// Heap block alignment and the combined head+tail tag overhead.
pub const ALIGNMENT: u32 = 8;
pub const TAG_BYTES: u32 = 8;

/// Minimum block granularity; residuals below this are folded into the
/// allocation instead of becoming unusable free fragments.
pub const MIN_BLOCK: u32 = 16;

pub const MULTIBOOT_SIGNATURE: u32 = 0x2BAD_B002;
pub const MULTIBOOT_FLAG_MMAP: u32 = 1 << 6;
pub const MMAP_TYPE_USABLE: u32 = 1;
