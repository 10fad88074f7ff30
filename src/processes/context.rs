//! Initial stack image of a new process, written through the mapping
//! window before the process ever runs. The layout is exactly what the
//! context switcher pops: a call frame that "returns" into the entry point,
//! below it the register block a `pushal`/`popal` pair moves.

use crate::arch::interrupts::without_interrupts;
use crate::constants::memory::{ENTRY_COUNT, PAGE_SIZE, STACK_TOP};
use crate::constants::processes::{INITIAL_FLAGS, STACK_MAGIC};
use crate::memory::addr::{PhysAddr, VirtAddr};
use crate::memory::bus::MemoryBus;

/// `words` indexes the top stack page as 1024 32-bit slots.
unsafe fn push(words: *mut u32, idx: &mut usize, value: u32) {
    *idx -= 1;
    words.add(*idx).write(value);
}

/// Write the initial context into `top_frame`, the physical frame backing
/// the topmost stack page. Returns the virtual address the new process's
/// stack pointer must start at.
pub fn build_initial_context(
    bus: &mut (impl MemoryBus + ?Sized),
    top_frame: PhysAddr,
    entry: VirtAddr,
    exit: VirtAddr,
    args: &[u32],
) -> VirtAddr {
    // Magic word, arguments, call frame and register block all fit with
    // room to spare in one page.
    debug_assert!(args.len() + 16 < ENTRY_COUNT);
    without_interrupts(|| {
        let words = bus.window(top_frame).cast::<u32>();
        let page_va = STACK_TOP & !(PAGE_SIZE - 1);
        let mut idx = ENTRY_COUNT - 1;
        unsafe {
            words.add(idx).write(STACK_MAGIC);

            // Arguments go in declaration order from low to high address,
            // so they are pushed last-first.
            for &arg in args.iter().rev() {
                push(words, &mut idx, arg);
            }
            // Where `ret` from the entry function lands.
            push(words, &mut idx, exit.as_u32());
            // Where the context switch "returns" to on first dispatch.
            push(words, &mut idx, entry.as_u32());
            push(words, &mut idx, STACK_TOP);
            let frame_start = page_va + 4 * idx as u32;

            push(words, &mut idx, INITIAL_FLAGS);
            // pushal order: eax, ecx, edx, ebx, esp, ebp, esi, edi.
            for _ in 0..4 {
                push(words, &mut idx, 0);
            }
            push(words, &mut idx, 0);
            let esp_slot = idx;
            push(words, &mut idx, frame_start);
            push(words, &mut idx, 0);
            push(words, &mut idx, 0);

            let saved_sp = page_va + 4 * idx as u32;
            // popal reloads esp from this slot; it must already hold the
            // final stack pointer.
            words.add(esp_slot).write(saved_sp);
            VirtAddr::new(saved_sp)
        }
    })
}
