//! Per-process memory descriptors: everything the memory core owns on
//! behalf of one process, created in one step and torn down in one step.

pub mod context;

use crate::constants::memory::PAGE_SIZE;
use crate::constants::processes::MIN_STACK;
use crate::memory::addr::VirtAddr;
use crate::memory::address_space::AddressSpace;
use crate::memory::bus::MemoryBus;
use crate::memory::frame_pool::FramePool;
use crate::memory::heap::ProcessHeap;
use crate::memory::pages_for;

/// The memory side of a process control block.
#[derive(Debug)]
pub struct ProcessMemory {
    pub space: AddressSpace,
    /// Highest stack address; the stack grows downward from here.
    pub stack_base: VirtAddr,
    /// Bytes of physical backing behind the stack.
    pub stack_len: u32,
    /// Stack pointer the first dispatch of this process starts from.
    pub initial_stack_pointer: VirtAddr,
    pub heap: ProcessHeap,
}

impl ProcessMemory {
    /// Build the full memory image of a new process: a fresh address space
    /// with the kernel aliases, a zeroed stack with the initial context in
    /// its top frame, and an empty heap.
    pub fn create(
        entry: VirtAddr,
        exit: VirtAddr,
        args: &[u32],
        stack_bytes: u32,
        pool: &mut FramePool,
        bus: &mut (impl MemoryBus + ?Sized),
    ) -> ProcessMemory {
        let stack_len = pages_for(stack_bytes.max(MIN_STACK)) * PAGE_SIZE;
        let space = AddressSpace::new(pool, bus);
        space.map_kernel_image(bus);
        let stack = space.build_stack(stack_len, pool, bus);
        let initial_stack_pointer =
            context::build_initial_context(bus, stack.top_frame, entry, exit, args);
        log::debug!(
            "new process image: entry {entry:?}, {stack_len} stack bytes, sp {initial_stack_pointer:?}"
        );
        ProcessMemory {
            space,
            stack_base: stack.top,
            stack_len,
            initial_stack_pointer,
            heap: ProcessHeap::new(),
        }
    }

    /// Return every frame the process owns to the pool.
    pub fn destroy(self, pool: &mut FramePool, bus: &mut (impl MemoryBus + ?Sized)) {
        self.space.teardown(pool, bus);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::memory::{HEAP_BASE, STACK_TOP};
    use crate::sim::pool_with_frames;

    #[test]
    fn create_and_destroy_balance_the_pool() {
        let (mut pool, mut bus) = pool_with_frames(16);
        let before = pool.free_frames();

        let mut image = ProcessMemory::create(
            VirtAddr::new(0x0040_1000),
            VirtAddr::new(0x0040_2000),
            &[1, 2],
            2 * PAGE_SIZE,
            &mut pool,
            &mut bus,
        );
        assert_eq!(image.stack_base, VirtAddr::new(STACK_TOP));
        assert_eq!(image.stack_len, 2 * PAGE_SIZE);
        // Directory, stack table, two stack frames.
        assert_eq!(pool.free_frames(), before - 4);

        // Give the process some heap so teardown has tables to find.
        bus.load_page_directory(image.space.directory());
        image.heap.allocate(&image.space, &mut pool, &mut bus, 6000);

        image.destroy(&mut pool, &mut bus);
        assert_eq!(pool.free_frames(), before);
    }

    #[test]
    fn tiny_stack_requests_round_up_to_the_minimum() {
        let (mut pool, mut bus) = pool_with_frames(8);
        let image = ProcessMemory::create(
            VirtAddr::new(0x0040_1000),
            VirtAddr::new(0x0040_2000),
            &[],
            100,
            &mut pool,
            &mut bus,
        );
        assert_eq!(image.stack_len, MIN_STACK);
        assert!(image.heap.limit() == VirtAddr::new(HEAP_BASE));
        image.destroy(&mut pool, &mut bus);
    }
}
