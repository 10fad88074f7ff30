/// Smallest stack a process may be created with; requests below this are
/// rounded up.
pub const MIN_STACK: u32 = 4096;

/// Marker written at the very base of every process stack.
pub const STACK_MAGIC: u32 = 0x0A0A_AAA9;

/// Initial EFLAGS for a new process: interrupts enabled, nothing else.
pub const INITIAL_FLAGS: u32 = 0x0000_0200;
