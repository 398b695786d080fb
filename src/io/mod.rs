//! The fixed-size I/O control block, its pool, and typed result storage
//! (§4.2 / C3).

mod block;
mod pool;
mod result;

pub use block::{Io, TypeTag, IO_DATA_SIZE, IO_SIZE};
pub use pool::{IoBlock, IoHandle, IoPool};

pub(crate) use block::queue_hook;
