pub mod addr;
pub mod address_space;
pub mod bootstrap;
pub mod bus;
pub mod frame_pool;
pub mod heap;
pub mod multiboot;
pub mod page_table;
pub mod window;

use crate::constants::memory::PAGE_SIZE;

/// Number of whole pages needed to hold `nbytes`.
pub fn pages_for(nbytes: u32) -> u32 {
    nbytes.div_ceil(PAGE_SIZE)
}
