//! The five stage functions. Each reads the state committed at the end of
//! the previous cycle and returns its output latch plus the side effects it
//! wants; the engine decides what is committed.

mod decode;
mod execute;
mod fetch;
mod memory;
mod write_back;

pub use decode::decode;
pub use execute::{execute, ExecuteOutput};
pub use fetch::{fetch, select_pc, FetchOutput};
pub use memory::{memory, MemoryOutput};
pub use write_back::{write_back, WriteBackOutput};
