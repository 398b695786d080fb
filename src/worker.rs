//! The per-thread completion drain loop (§4.5 / C5).
//!
//! Grounded on `sal/net/__bits/io_service.hpp`'s `io_context_t` (`completed`
//! array, `first_completed`/`last_completed` iterators, `try_get`/
//! `get(timeout,&error)`) and `sal/net/async/__bits/async.hpp`'s
//! `worker_t`. A `Worker` is not `Sync`: it is meant to be created once per
//! thread and driven from that thread only, matching the source library's
//! "per-thread, non-movable-after-use" contract for the native completion
//! array.

use std::io;
use std::ptr::NonNull;
use std::sync::Arc;
use std::time::Duration;

use crate::io::{Io, IoHandle};
use crate::service::Service;

#[cfg(unix)]
use crate::sys::{Event, RawSelector as _};

/// Default and minimum results a single `poll` call will return if more
/// than one is available without waiting again.
const MIN_RESULTS_PER_POLL: usize = 1;

/// A per-thread drain loop over a [`Service`]'s completions.
pub struct Worker {
    service: Arc<Service>,
    capacity: usize,
    max_results_per_poll: usize,
    local: Vec<NonNull<Io>>,
    #[cfg(unix)]
    events: Vec<Event>,
}

// `Worker` is deliberately !Sync: `local`/`events` are scratch buffers
// meant for exactly one thread to drive at a time. It is `Send` so it can
// be built on one thread and handed to the thread that will own it.
unsafe impl Send for Worker {}

impl Worker {
    /// Build a worker over `service`. `capacity` bounds how many
    /// completions a single native wait can return; `max_results_per_poll`
    /// is clamped to `[1, capacity]`.
    pub fn new(service: Arc<Service>, capacity: usize, max_results_per_poll: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            service,
            capacity,
            max_results_per_poll: max_results_per_poll.clamp(MIN_RESULTS_PER_POLL, capacity),
            local: Vec::with_capacity(capacity),
            #[cfg(unix)]
            events: Vec::with_capacity(capacity),
        }
    }

    /// Pop one already-drained completion without touching the OS, or (§4.4)
    /// a submission failure sitting on the service's error queue.
    pub fn try_get(&mut self) -> Option<IoHandle> {
        let io = self
            .local
            .pop()
            .or_else(|| self.service.try_dequeue_completed())
            .or_else(|| self.service.dequeue_error())?;
        Some(unsafe { IoHandle::from_raw(io, self.service.pool().clone()) })
    }

    /// Block up to `timeout` (or forever if `None`) for at least one
    /// completion, then drain as many more as are immediately available
    /// (up to `max_results_per_poll`). Returns the first completion and
    /// leaves any rest in the local buffer for subsequent `try_get` calls.
    ///
    /// Checks the service's error queue before falling into the native
    /// wait (§7: submission failures are "pushed onto the service error
    /// queue so a worker picks them up"), so a back-pressure or
    /// synchronous-submission-failure entry is never stranded behind a
    /// native wait that has nothing of its own to deliver.
    pub fn wait_for(&mut self, timeout: Option<Duration>) -> io::Result<Option<IoHandle>> {
        let buffered = self
            .service
            .try_dequeue_completed()
            .or_else(|| self.service.dequeue_error());
        if let Some(io) = buffered {
            self.local.push(io);
        } else {
            self.wait_native(timeout)?;
        }
        self.drain_more();
        Ok(self.try_get())
    }

    /// Non-blocking equivalent of [`Worker::wait_for`]: drains whatever is
    /// immediately available without ever calling into the OS wait.
    pub fn poll(&mut self) -> Option<IoHandle> {
        self.drain_more();
        self.try_get()
    }

    fn drain_more(&mut self) -> usize {
        let mut drained = self.local.len();
        while drained < self.max_results_per_poll {
            match self.service.try_dequeue_completed() {
                Some(io) => {
                    self.local.push(io);
                    drained += 1;
                }
                None => break,
            }
        }
        drained
    }

    #[cfg(unix)]
    fn wait_native(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.events.clear();
        self.service.selector.select(&mut self.events, timeout)?;
        // Every unix socket type registers its token through
        // `net::registration::Registration::token_for`, which erases the
        // concrete socket type behind a pair of function pointers; the
        // socket itself outlives its own registration (§4.5), so firing
        // these never touches freed memory.
        #[cfg(feature = "net")]
        for event in &self.events {
            use crate::net::registration::Registration;
            if event.readable || event.error {
                unsafe { Registration::fire_readable(event.token) };
            }
            if event.writable || event.error {
                unsafe { Registration::fire_writable(event.token) };
            }
        }
        Ok(())
    }

    #[cfg(windows)]
    fn wait_native(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        for overlapped in self.service.selector.get_many(timeout)? {
            let io = overlapped as *mut Io;
            if let Some(io) = NonNull::new(io) {
                self.service.enqueue_completed(io);
            }
        }
        Ok(())
    }

    /// Capacity this worker was built with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// §4.4/§7: a service error-queue entry (a back-pressure or
    /// synchronous-submission-failure completion) must be observable
    /// through `Worker::try_get` without the caller ever touching
    /// `Service::dequeue_error` directly.
    #[test]
    fn try_get_surfaces_error_queue_entries() {
        let service = Service::new().expect("service");
        let handle = service.make_io();
        handle.set_status(42);
        service.enqueue_error(handle.into_raw());

        let mut worker = Worker::new(Arc::clone(&service), 4, 4);
        let io = worker.try_get().expect("error-queue entry surfaced");
        assert_eq!(io.status(), 42);
    }
}
