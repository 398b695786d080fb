//! Type-erased readiness dispatch for the unix selector backends.
//!
//! The selector (epoll/kqueue) only ever hands a worker a `u64` token per
//! readiness event (§4.3); originally this crate cast that token straight
//! to `Arc<AsyncUdpSocket>`, which only works while exactly one socket type
//! is ever registered. Adding [`super::async_tcp`] alongside
//! [`super::async_socket`] means a token now needs to carry "which socket
//! type is this" as well as "which socket" — a `Box<dyn Trait>` does that,
//! but does not fit in a single `u64` (it is a fat pointer). This stores a
//! thin `Box<Registration>` instead, with a pair of function pointers
//! monomorphized per concrete socket type standing in for the vtable.
//!
//! A registration is intentionally never deregistered: this crate, like
//! its `os-poll`-only UDP wrapper before it, has no socket-close teardown
//! path (see `DESIGN.md`), so the leaked `Box` lives for the process's
//! lifetime exactly as long as the token would have anyway.

use std::sync::Arc;

/// Implemented by every socket type registered with a unix selector so its
/// readiness events can be dispatched without knowing its concrete type.
pub(crate) trait AsyncIoSource: Send + Sync + Sized + 'static {
    fn retry_readable(self: &Arc<Self>);
    fn retry_writable(self: &Arc<Self>);
}

pub(crate) struct Registration {
    data: *const (),
    readable: unsafe fn(*const ()),
    writable: unsafe fn(*const ()),
}

// Safety: `data` is only ever reinterpreted, inside `readable`/`writable`,
// as the `Arc<T>` it was built from in `Registration::new`.
unsafe impl Send for Registration {}
unsafe impl Sync for Registration {}

impl Registration {
    /// Build a registration for `arc` and leak it, returning the token a
    /// selector should be given. The socket itself must be kept alive by
    /// its owner for as long as it stays registered (§4.5's "socket
    /// outlives every `io` it submitted" invariant extends naturally to
    /// "socket outlives its own registration").
    pub(crate) fn token_for<T: AsyncIoSource>(arc: &Arc<T>) -> u64 {
        unsafe fn readable_thunk<T: AsyncIoSource>(ptr: *const ()) {
            let arc = Arc::from_raw(ptr as *const T);
            arc.retry_readable();
            std::mem::forget(arc);
        }
        unsafe fn writable_thunk<T: AsyncIoSource>(ptr: *const ()) {
            let arc = Arc::from_raw(ptr as *const T);
            arc.retry_writable();
            std::mem::forget(arc);
        }

        let registration = Box::new(Registration {
            data: Arc::as_ptr(arc) as *const (),
            readable: readable_thunk::<T>,
            writable: writable_thunk::<T>,
        });
        Box::leak(registration) as *const Registration as u64
    }

    /// Dispatch a readable readiness event for the registration `token`
    /// points at.
    ///
    /// # Safety
    ///
    /// `token` must have come from [`Registration::token_for`] and the
    /// socket it was built from must still be alive.
    pub(crate) unsafe fn fire_readable(token: u64) {
        let registration = &*(token as *const Registration);
        (registration.readable)(registration.data);
    }

    /// Dispatch a writable readiness event, see [`Registration::fire_readable`].
    ///
    /// # Safety
    ///
    /// Same contract as [`Registration::fire_readable`].
    pub(crate) unsafe fn fire_writable(token: u64) {
        let registration = &*(token as *const Registration);
        (registration.writable)(registration.data);
    }
}
