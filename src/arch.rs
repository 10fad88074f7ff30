//! The only code that touches real hardware: interrupt masking, control
//! registers and translation-cache invalidation. Off-target every routine
//! is a no-op, which is what lets the rest of the core run under a
//! simulated machine in the test harness.

use crate::constants::memory::BOOT_STACK_REBASE;
use crate::memory::addr::{PhysAddr, VirtAddr};

pub mod interrupts {
    /// Save EFLAGS and clear the interrupt flag. The returned value is the
    /// prior mask, to be handed back to [`restore`].
    #[cfg(target_arch = "x86")]
    #[inline]
    pub fn save_and_disable() -> u32 {
        let flags: u32;
        unsafe {
            core::arch::asm!("pushfd", "pop {}", "cli", out(reg) flags);
        }
        flags
    }

    #[cfg(not(target_arch = "x86"))]
    #[inline]
    pub fn save_and_disable() -> u32 {
        0
    }

    /// Restore a mask previously returned by [`save_and_disable`].
    #[cfg(target_arch = "x86")]
    #[inline]
    pub fn restore(flags: u32) {
        // Only re-enable if interrupts were on before.
        if flags & 0x200 != 0 {
            unsafe { core::arch::asm!("sti") };
        }
    }

    #[cfg(not(target_arch = "x86"))]
    #[inline]
    pub fn restore(_flags: u32) {}

    /// Run `f` with interrupts disabled, restoring the prior mask on exit.
    /// Nesting is fine; the inner call restores to the disabled state.
    pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
        let saved = save_and_disable();
        let result = f();
        restore(saved);
        result
    }
}

/// Invalidate the cached translation for a single virtual address.
#[inline]
pub fn invalidate(va: VirtAddr) {
    #[cfg(target_arch = "x86")]
    unsafe {
        core::arch::asm!("invlpg [{}]", in(reg) va.as_u32(), options(nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "x86"))]
    let _ = va;
}

/// Point the page-table base register at a page directory.
///
/// # Safety
///
/// `directory` must be the physical address of a directory whose kernel
/// entries cover all code and data currently executing.
#[inline]
pub unsafe fn load_page_directory(directory: PhysAddr) {
    #[cfg(target_arch = "x86")]
    core::arch::asm!("mov cr3, {}", in(reg) directory.as_u32(), options(nostack, preserves_flags));
    #[cfg(not(target_arch = "x86"))]
    let _ = directory;
}

/// Set the paging-enable bit, rebasing the boot stack and frame pointers
/// into their high alias in the same breath so the next push still lands
/// on mapped memory.
///
/// # Safety
///
/// The boot page directory must already be loaded and must identity-map
/// the executing code plus alias the boot stack at [`BOOT_STACK_REBASE`].
#[inline]
pub unsafe fn enable_paging_and_rebase() {
    #[cfg(target_arch = "x86")]
    core::arch::asm!(
        "or esp, {rebase}",
        "or ebp, {rebase}",
        "mov eax, cr0",
        "or eax, 0x80000000",
        "mov cr0, eax",
        rebase = in(reg) BOOT_STACK_REBASE,
        out("eax") _,
    );
    #[cfg(not(target_arch = "x86"))]
    let _ = BOOT_STACK_REBASE;
}
