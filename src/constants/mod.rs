pub mod memory;
pub mod processes;
