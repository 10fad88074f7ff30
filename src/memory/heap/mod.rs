//! The per-process heap: a best-fit boundary-tag allocator over a region
//! that grows upward from the kernel end, one page-table-backed page at a
//! time, and shrinks back page by page when the topmost blocks are freed.

mod free_list;
mod tags;

use thiserror::Error;

use crate::arch::interrupts::without_interrupts;
use crate::constants::memory::{
    ALIGNMENT, ENTRY_COUNT, HEAP_BASE, KERNEL_END, MIN_BLOCK, PAGE_SIZE, TAG_BYTES,
};

use super::addr::VirtAddr;
use super::address_space::AddressSpace;
use super::bus::{read_word, with_table, MemoryBus};
use super::frame_pool::FramePool;
use super::page_table::{Entry, EntryFlags};
use super::pages_for;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeapError {
    #[error("{0:?} lies inside the protected kernel region")]
    KernelAddress(VirtAddr),
}

/// Heap state of one process. The backing pages live in the process
/// address space; only the limit and the free-list anchor live here.
#[derive(Debug)]
pub struct ProcessHeap {
    /// First unmapped address above the heap, always page aligned.
    limit: VirtAddr,
    /// Anchor of the circular free list, `None` while the list is empty.
    free_head: Option<VirtAddr>,
}

const fn align8(n: u32) -> u32 {
    (n + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

impl ProcessHeap {
    pub const fn new() -> ProcessHeap {
        ProcessHeap {
            limit: VirtAddr::new(HEAP_BASE),
            free_head: None,
        }
    }

    pub fn limit(&self) -> VirtAddr {
        self.limit
    }

    /// Number of blocks on the free list.
    pub fn free_blocks(&self, bus: &mut (impl MemoryBus + ?Sized)) -> usize {
        let Some(first) = self.free_head else {
            return 0;
        };
        let mut count = 1;
        let mut current = free_list::next(bus, first);
        while current != first {
            count += 1;
            current = free_list::next(bus, current);
        }
        count
    }

    /// Extend the mapped heap by at least `nbytes`, in whole pages, and
    /// return the old limit. A fresh page table is installed whenever the
    /// limit crosses into a new directory slot.
    pub fn grow(
        &mut self,
        space: &AddressSpace,
        pool: &mut FramePool,
        bus: &mut (impl MemoryBus + ?Sized),
        nbytes: u32,
    ) -> VirtAddr {
        without_interrupts(|| {
            let flags = EntryFlags::PRESENT | EntryFlags::WRITABLE;
            let pages = pages_for(nbytes);
            let old = self.limit;
            let mut dir_idx = old.dir_index();
            let mut tbl_idx = old.table_index();
            for _ in 0..pages {
                let frame = pool.acquire_frame(bus);
                let table = if tbl_idx == 0 {
                    let table = pool.acquire_frame(bus);
                    with_table(bus, space.directory(), |dir| {
                        dir[dir_idx] = Entry::new(table, flags);
                    });
                    table
                } else {
                    with_table(bus, space.directory(), |dir| dir[dir_idx]).frame()
                };
                with_table(bus, table, |entries| {
                    entries[tbl_idx] = Entry::new(frame, flags);
                });
                tbl_idx += 1;
                if tbl_idx == ENTRY_COUNT {
                    tbl_idx = 0;
                    dir_idx += 1;
                }
            }
            self.limit = old + pages * PAGE_SIZE;
            let recomputed = ((dir_idx as u32) << 22) | ((tbl_idx as u32) << 12);
            if recomputed != self.limit.as_u32() {
                log::warn!(
                    "heap limit {:?} disagrees with page walk {recomputed:#010x}",
                    self.limit
                );
            }
            old
        })
    }

    /// Allocate `nbytes` of heap memory. Returns the first usable byte; the
    /// word before it holds the block's boundary tag.
    pub fn allocate(
        &mut self,
        space: &AddressSpace,
        pool: &mut FramePool,
        bus: &mut (impl MemoryBus + ?Sized),
        nbytes: u32,
    ) -> VirtAddr {
        without_interrupts(|| {
            if self.limit.as_u32() == HEAP_BASE {
                // First call: map one page and seed the free list with it.
                let base = self.grow(space, pool, bus, PAGE_SIZE);
                let block = base + 4;
                tags::set_free(bus, block, PAGE_SIZE);
                free_list::insert(&mut self.free_head, bus, block);
            }
            // A block below the minimum granularity cannot hold its own
            // tags and list links once freed, so tiny requests are padded.
            let needed = align8(nbytes + TAG_BYTES).max(MIN_BLOCK);

            if let Some(block) = self.scan(bus, needed) {
                return block;
            }

            // The scan found nothing, so if the topmost block is free it is
            // too small. Grow by only the missing pages and merge.
            let last_tag = read_word(bus, self.limit - 4);
            if !tags::is_allocated(last_tag) {
                let free_size = tags::tag_size(last_tag);
                let block = self.limit - free_size + 4;
                let missing = needed - free_size;
                let total = pages_for(missing) * PAGE_SIZE;
                self.grow(space, pool, bus, total);
                let merged = free_size + total;
                let leftover = merged - needed;
                if leftover < MIN_BLOCK {
                    free_list::remove(&mut self.free_head, bus, block);
                    tags::set_allocated(bus, block, merged);
                } else {
                    free_list::reassign(
                        &mut self.free_head,
                        bus,
                        block,
                        block + needed,
                        leftover,
                    );
                    tags::set_allocated(bus, block, needed);
                }
                return block;
            }

            // Topmost block allocated: extend with a brand-new block.
            let total = pages_for(needed) * PAGE_SIZE;
            let leftover = total - needed;
            let base = self.grow(space, pool, bus, total);
            let block = base + 4;
            if leftover < MIN_BLOCK {
                tags::set_allocated(bus, block, total);
            } else {
                tags::set_allocated(bus, block, needed);
                let residual = block + needed;
                tags::set_free(bus, residual, leftover);
                free_list::insert(&mut self.free_head, bus, residual);
            }
            block
        })
    }

    /// One circular walk of the free list. An exact-class block (fits, and
    /// splitting it would leave less than the minimum granularity) is taken
    /// on sight; otherwise the block with the smallest residual wins and
    /// the residual stays free under the same list node.
    fn scan(&mut self, bus: &mut (impl MemoryBus + ?Sized), needed: u32) -> Option<VirtAddr> {
        let first = self.free_head?;
        let start = free_list::next(bus, first);
        let mut current = start;
        let mut best: Option<(VirtAddr, u32)> = None;
        loop {
            let size = tags::tag_size(tags::head_tag(bus, current));
            if needed <= size && needed + MIN_BLOCK > size {
                free_list::remove(&mut self.free_head, bus, current);
                tags::set_allocated(bus, current, size);
                return Some(current);
            }
            if needed + MIN_BLOCK <= size {
                let residual = size - needed;
                if best.map_or(true, |(_, smallest)| residual < smallest) {
                    best = Some((current, residual));
                }
            }
            current = free_list::next(bus, current);
            if current == start {
                break;
            }
        }
        let (block, residual) = best?;
        free_list::reassign(&mut self.free_head, bus, block, block + needed, residual);
        tags::set_allocated(bus, block, needed);
        Some(block)
    }

    /// Free the block at `addr`, coalescing with free neighbors and giving
    /// whole trailing pages back to the frame pool when the merged block
    /// ends exactly at the heap limit.
    pub fn deallocate(
        &mut self,
        space: &AddressSpace,
        pool: &mut FramePool,
        bus: &mut (impl MemoryBus + ?Sized),
        addr: VirtAddr,
    ) -> Result<(), HeapError> {
        without_interrupts(|| {
            if addr.as_u32() < KERNEL_END {
                log::error!("refusing to free {addr:?} inside the kernel region");
                return Err(HeapError::KernelAddress(addr));
            }
            let mut block = addr;
            let mut size = tags::tag_size(tags::head_tag(bus, block));

            // Backward merge keeps the predecessor's list node alive, so no
            // insertion is needed afterwards.
            let mut merged_backward = false;
            if block.as_u32() - TAG_BYTES >= HEAP_BASE {
                let prev_tail = read_word(bus, block - TAG_BYTES);
                if !tags::is_allocated(prev_tail) {
                    let prev_size = tags::tag_size(prev_tail);
                    block = block - prev_size;
                    size += prev_size;
                    merged_backward = true;
                }
            }

            let next_head_va = block + size - 4;
            if next_head_va.as_u32() < self.limit.as_u32() {
                let next_head = read_word(bus, next_head_va);
                if !tags::is_allocated(next_head) {
                    free_list::remove(&mut self.free_head, bus, block + size);
                    size += tags::tag_size(next_head);
                }
            }

            if !merged_backward {
                free_list::insert(&mut self.free_head, bus, block);
            }

            if block.as_u32() - 4 + size == self.limit.as_u32() {
                let remaining = size % PAGE_SIZE;
                if remaining == 0 {
                    // The whole block is about to be unmapped; unlink it
                    // while its link words are still backed by frames.
                    free_list::remove(&mut self.free_head, bus, block);
                }
                while size >= PAGE_SIZE {
                    self.limit = self.limit - PAGE_SIZE;
                    space.free_heap_page(self.limit, pool, bus);
                    size -= PAGE_SIZE;
                }
                if remaining != 0 {
                    tags::set_free(bus, block, remaining);
                }
            } else {
                tags::set_free(bus, block, size);
            }
            Ok(())
        })
    }
}

impl Default for ProcessHeap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{pool_with_frames, SimBus};

    fn fixture(frames: u32) -> (AddressSpace, ProcessHeap, FramePool, SimBus) {
        let (mut pool, mut bus) = pool_with_frames(frames);
        let space = AddressSpace::new(&mut pool, &mut bus);
        bus.load_page_directory(space.directory());
        (space, ProcessHeap::new(), pool, bus)
    }

    #[test]
    fn live_allocations_never_overlap() {
        let (space, mut heap, mut pool, mut bus) = fixture(24);
        let sizes = [1u32, 100, 8, 4090, 23, 800];
        let mut spans: Vec<(u32, u32)> = Vec::new();
        for &nbytes in &sizes {
            let addr = heap.allocate(&space, &mut pool, &mut bus, nbytes);
            let size = tags::tag_size(tags::head_tag(&mut bus, addr));
            spans.push((addr.as_u32() - 4, addr.as_u32() - 4 + size));
        }
        for (i, &(lo_a, hi_a)) in spans.iter().enumerate() {
            for &(lo_b, hi_b) in &spans[i + 1..] {
                assert!(hi_a <= lo_b || hi_b <= lo_a);
            }
        }
    }

    #[test]
    fn freed_block_is_reused_exactly() {
        let (space, mut heap, mut pool, mut bus) = fixture(24);
        let a = heap.allocate(&space, &mut pool, &mut bus, 100);
        let _b = heap.allocate(&space, &mut pool, &mut bus, 200);
        heap.deallocate(&space, &mut pool, &mut bus, a).unwrap();
        let again = heap.allocate(&space, &mut pool, &mut bus, 100);
        assert_eq!(again, a);
    }

    #[test]
    fn adjacent_free_blocks_coalesce_in_either_order() {
        for free_first_then_second in [true, false] {
            let (space, mut heap, mut pool, mut bus) = fixture(24);
            let a = heap.allocate(&space, &mut pool, &mut bus, 100);
            let b = heap.allocate(&space, &mut pool, &mut bus, 100);
            let _pin = heap.allocate(&space, &mut pool, &mut bus, 100);
            let (first, second) = if free_first_then_second { (a, b) } else { (b, a) };
            heap.deallocate(&space, &mut pool, &mut bus, first).unwrap();
            heap.deallocate(&space, &mut pool, &mut bus, second).unwrap();

            // The two 112-byte blocks merge into one 224-byte block; the
            // tail residual of the first page is the second free block.
            assert_eq!(heap.free_blocks(&mut bus), 2);
            assert_eq!(tags::head_tag(&mut bus, a), 224);
        }
    }

    #[test]
    fn limit_stays_page_aligned_and_monotonic_under_allocation() {
        let (space, mut heap, mut pool, mut bus) = fixture(24);
        let mut previous = heap.limit();
        for nbytes in [1u32, 4090, 50, 9000, 4096] {
            heap.allocate(&space, &mut pool, &mut bus, nbytes);
            let limit = heap.limit();
            assert!(limit.is_page_aligned());
            assert!(limit >= previous);
            previous = limit;
        }
    }

    #[test]
    fn zero_byte_allocations_are_distinct_blocks() {
        let (space, mut heap, mut pool, mut bus) = fixture(8);
        let a = heap.allocate(&space, &mut pool, &mut bus, 0);
        let b = heap.allocate(&space, &mut pool, &mut bus, 0);
        assert_ne!(a, b);
        // Even empty blocks carry the minimum granularity, so a later free
        // can re-tag and relink them in place.
        assert_eq!(tags::tag_size(tags::head_tag(&mut bus, a)), MIN_BLOCK);
        heap.deallocate(&space, &mut pool, &mut bus, b).unwrap();
        heap.deallocate(&space, &mut pool, &mut bus, a).unwrap();
        assert_eq!(heap.limit(), VirtAddr::new(HEAP_BASE));
        assert_eq!(heap.free_blocks(&mut bus), 0);
    }

    #[test]
    fn tiny_block_free_leaves_allocated_neighbors_intact() {
        let (space, mut heap, mut pool, mut bus) = fixture(8);
        let a = heap.allocate(&space, &mut pool, &mut bus, 0);
        let b = heap.allocate(&space, &mut pool, &mut bus, 4064);
        let _pin = heap.allocate(&space, &mut pool, &mut bus, 8);
        let b_tag = tags::head_tag(&mut bus, b);

        // Both neighbors stay allocated, so the freed block is inserted
        // standalone; its links and tail tag must fit inside it.
        heap.deallocate(&space, &mut pool, &mut bus, a).unwrap();
        assert_eq!(tags::head_tag(&mut bus, b), b_tag);
        assert_eq!(heap.free_blocks(&mut bus), 2);

        let again = heap.allocate(&space, &mut pool, &mut bus, 0);
        assert_eq!(again, a);
    }

    #[test]
    fn kernel_addresses_are_rejected() {
        let (space, mut heap, mut pool, mut bus) = fixture(8);
        let bad = VirtAddr::new(0x0010_0000);
        assert_eq!(
            heap.deallocate(&space, &mut pool, &mut bus, bad),
            Err(HeapError::KernelAddress(bad))
        );
    }

    #[test]
    fn oversized_request_grows_only_what_it_needs() {
        let (space, mut heap, mut pool, mut bus) = fixture(24);
        // Fill the heap to an exact page boundary so the next allocation
        // starts from a clean limit with no trailing free block.
        let _a = heap.allocate(&space, &mut pool, &mut bus, 4088);
        let b = heap.allocate(&space, &mut pool, &mut bus, 4088);
        heap.deallocate(&space, &mut pool, &mut bus, b).unwrap();
        assert_eq!(heap.free_blocks(&mut bus), 0);

        let before = heap.limit();
        heap.allocate(&space, &mut pool, &mut bus, 20000);
        // needed = 20008 bytes, exactly five pages.
        assert_eq!(heap.limit() - before, 5 * PAGE_SIZE);
        assert_eq!(heap.free_blocks(&mut bus), 1);
    }

    #[test]
    fn mixed_workload_returns_every_page() {
        let (space, mut heap, mut pool, mut bus) = fixture(24);
        let idle = pool.free_frames();

        let a = heap.allocate(&space, &mut pool, &mut bus, 4090);
        let b = heap.allocate(&space, &mut pool, &mut bus, 8190);
        let c = heap.allocate(&space, &mut pool, &mut bus, 40000);
        // 13 data pages behind one page table.
        assert_eq!(heap.limit() - VirtAddr::new(HEAP_BASE), 13 * PAGE_SIZE);
        assert_eq!(pool.free_frames(), idle - 14);

        heap.deallocate(&space, &mut pool, &mut bus, b).unwrap();
        heap.deallocate(&space, &mut pool, &mut bus, a).unwrap();
        heap.deallocate(&space, &mut pool, &mut bus, c).unwrap();

        assert_eq!(heap.limit(), VirtAddr::new(HEAP_BASE));
        assert_eq!(heap.free_blocks(&mut bus), 0);
        assert_eq!(pool.free_frames(), idle);
    }
}
