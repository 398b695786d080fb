//! The completion service (§4.4 / C4): owns the pool, the platform
//! completion port, and the queues a [`Worker`](crate::worker::Worker)
//! drains. Grounded on `sal/net/__bits/io_service.hpp`'s `io_service_t`
//! (both its Windows/IOCP and Darwin/kqueue branches) and on mio's
//! `Poll`/`Registry` split — `Service` plays both roles here since this
//! crate's completion model, unlike mio's readiness model, has no separate
//! notion of "interest list" to register.

use std::io;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::io::{queue_hook, Io, IoHandle, IoPool};
use crate::queue::{Mpmc, Queue};
use crate::sys::Selector;
#[cfg(unix)]
use crate::sys::RawSelector as _;

/// Owns a pool of [`Io`] blocks, the process-wide completion and error
/// queues, and the platform completion port. Cheap to clone via `Arc`;
/// every [`Worker`](crate::worker::Worker) and
/// [`AsyncSocket`](crate::net::AsyncSocket) holds a reference to the same
/// one.
pub struct Service {
    pool: Arc<IoPool>,
    completed: Mpmc<Io>,
    errors: Mpmc<Io>,
    pub(crate) selector: Selector,
}

// Safety: `completed`/`errors` are genuine MPMC queues; `selector` is a
// platform object documented safe for concurrent use from multiple
// threads (epoll/kqueue fd, or a Windows IOCP handle).
unsafe impl Send for Service {}
unsafe impl Sync for Service {}

impl Service {
    /// Create a service with its own pool and platform completion port.
    pub fn new() -> io::Result<Arc<Self>> {
        Ok(Arc::new(Self {
            pool: IoPool::new(),
            completed: Mpmc::new(queue_hook),
            errors: Mpmc::new(queue_hook),
            selector: Selector::new()?,
        }))
    }

    /// Allocate an [`Io`] block from this service's pool.
    pub fn make_io(&self) -> IoHandle {
        self.pool.alloc()
    }

    pub(crate) fn pool(&self) -> &Arc<IoPool> {
        &self.pool
    }

    /// Push a completed operation onto the service-wide completion queue.
    pub(crate) fn enqueue_completed(&self, io: NonNull<Io>) {
        unsafe { self.completed.push(io) };
    }

    /// Pop one completed operation; `None` if none is ready right now.
    pub(crate) fn try_dequeue_completed(&self) -> Option<NonNull<Io>> {
        unsafe { self.completed.try_pop() }
    }

    /// Push a failed operation onto the service-wide error queue.
    pub(crate) fn enqueue_error(&self, io: NonNull<Io>) {
        unsafe { self.errors.push(io) };
    }

    /// Pop one failed operation; `None` if none is queued right now.
    pub fn dequeue_error(&self) -> Option<NonNull<Io>> {
        unsafe { self.errors.try_pop() }
    }
}

#[cfg(all(test, feature = "os-poll"))]
mod tests {
    use super::*;

    #[test]
    fn new_service_has_empty_queues() {
        let service = Service::new().expect("service");
        assert!(service.dequeue_error().is_none());
        assert!(service.try_dequeue_completed().is_none());
    }
}
