//! Bulk storage and allocation for [`Io`] blocks (§4.2.2 / C3).
//!
//! A pool never frees memory it has allocated; blocks are appended to a
//! deque and live until the pool itself is dropped. `alloc` is serialized
//! by a single mutex (so only one allocation or growth happens at a time,
//! matching the free list's single-consumer requirement); releasing a
//! block back to the free list is lock-free and safe to do concurrently
//! from any number of threads. Grounded on
//! `sal/net/async/__bits/async.hpp`'s `service_t::alloc_io()`, including
//! its doubling growth factor.

use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use crate::queue::{Mpsc, Queue};

use super::block::{free_hook, Io};

/// Entries in the first block a pool ever allocates. Each subsequent block
/// doubles this count, matching the original's `512 * sizeof(io_t) * (1 <<
/// n)` byte formula reduced to an entry count.
const FIRST_BLOCK_ENTRIES: usize = 512;

/// One contiguous, heap-allocated run of [`Io`] blocks.
///
/// Kept behind a stable `Box` so the addresses of its entries, once handed
/// to the free list or to a caller, never move.
pub struct IoBlock {
    entries: Box<[Io]>,
}

impl IoBlock {
    fn with_capacity(capacity: usize) -> Box<Self> {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, Io::empty);
        Box::new(Self {
            entries: entries.into_boxed_slice(),
        })
    }
}

struct IoPoolState {
    blocks: Vec<Box<IoBlock>>,
}

/// Owns every [`Io`] block it has ever allocated and hands them out through
/// [`IoPool::alloc`].
pub struct IoPool {
    state: Mutex<IoPoolState>,
    free_list: Mpsc<Io>,
    // Dedicated sentinel for `free_list`; never handed out.
    _sentry: Box<Io>,
}

// Safety: `free_list` is a true MPSC queue; `state` is mutex-protected;
// `_sentry` is touched only through `free_list`'s internal bookkeeping.
unsafe impl Send for IoPool {}
unsafe impl Sync for IoPool {}

impl IoPool {
    /// An empty pool. The first call to `alloc` triggers the first growth.
    pub fn new() -> Arc<Self> {
        let mut sentry = Box::new(Io::empty());
        let free_list = unsafe { Mpsc::new(free_hook, NonNull::from(sentry.as_mut())) };
        Arc::new(Self {
            state: Mutex::new(IoPoolState { blocks: Vec::new() }),
            free_list,
            _sentry: sentry,
        })
    }

    /// Hand out one block, growing the pool first if it is currently empty.
    pub fn alloc(self: &Arc<Self>) -> IoHandle {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(ptr) = unsafe { self.free_list.try_pop() } {
                let io = unsafe { ptr.as_ref() };
                io.header.owner.set(Arc::as_ptr(self) as *const ());
                io.reset();
                return IoHandle {
                    io: ptr,
                    pool: Arc::clone(self),
                };
            }
            self.grow(&mut state);
        }
    }

    /// Number of blocks allocated so far. Exposed for tests and metrics.
    pub fn block_count(&self) -> usize {
        self.state.lock().unwrap().blocks.len()
    }

    fn grow(&self, state: &mut IoPoolState) {
        let capacity = FIRST_BLOCK_ENTRIES << state.blocks.len();
        let block = IoBlock::with_capacity(capacity);
        for io in block.entries.iter() {
            unsafe { self.free_list.push(NonNull::from(io)) };
        }
        state.blocks.push(block);
    }
}

/// An [`Io`] on loan from an [`IoPool`]; returns itself to the pool's free
/// list when dropped.
pub struct IoHandle {
    io: NonNull<Io>,
    pool: Arc<IoPool>,
}

// Safety: the pointee is pool-owned storage that outlives every handle; the
// handle carries its own `Arc<IoPool>` keep-alive.
unsafe impl Send for IoHandle {}

impl Deref for IoHandle {
    type Target = Io;
    fn deref(&self) -> &Io {
        unsafe { self.io.as_ref() }
    }
}

impl DerefMut for IoHandle {
    fn deref_mut(&mut self) -> &mut Io {
        unsafe { self.io.as_mut() }
    }
}

impl Drop for IoHandle {
    fn drop(&mut self) {
        unsafe { self.pool.free_list.push(self.io) };
    }
}

impl IoHandle {
    /// Release ownership without returning the block to its pool. Pair
    /// with [`IoHandle::from_raw`] to move a block through a raw,
    /// hook-based queue (pending-retry, completion, error) that cannot
    /// carry an `Arc<IoPool>` alongside it.
    pub(crate) fn into_raw(self) -> NonNull<Io> {
        let io = self.io;
        std::mem::forget(self);
        io
    }

    /// Reconstruct ownership of a block previously released with
    /// [`IoHandle::into_raw`].
    ///
    /// # Safety
    ///
    /// `io` must have come from `into_raw` on a handle borrowed from
    /// `pool`, and must not still be reachable from any queue.
    pub(crate) unsafe fn from_raw(io: NonNull<Io>, pool: Arc<IoPool>) -> Self {
        Self { io, pool }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_alloc_grows_by_first_block_size() {
        let pool = IoPool::new();
        assert_eq!(pool.block_count(), 0);
        let _io = pool.alloc();
        assert_eq!(pool.block_count(), 1);
    }

    #[test]
    fn released_block_is_reused_without_growing() {
        let pool = IoPool::new();
        let io = pool.alloc();
        assert_eq!(pool.block_count(), 1);
        drop(io);

        let _io2 = pool.alloc();
        assert_eq!(pool.block_count(), 1, "reused the freed block instead of growing");
    }

    #[test]
    fn growth_doubles_block_capacity() {
        let pool = IoPool::new();
        let mut handles = Vec::new();
        for _ in 0..FIRST_BLOCK_ENTRIES {
            handles.push(pool.alloc());
        }
        assert_eq!(pool.block_count(), 1);
        handles.push(pool.alloc());
        assert_eq!(pool.block_count(), 2);
    }
}
