//! Async socket wrapper (§4.6 / C6): submits UDP operations against an
//! [`Io`] block and a [`Service`], instead of blocking the caller.
//!
//! Grounded on `sal/net/async/basic_socket.hpp` (`associate`, typed
//! `context`) and `sal/net/async/basic_datagram_socket.hpp`
//! (`start_receive_from`/`receive_from_result`,
//! `start_send_to`/`send_to_result`). Scoped to UDP: the bench this crate's
//! relay (C8) is grounded on only ever drives `async_datagram_socket_t`. The
//! async TCP counterpart following the identical `start_*`/`*_result` shape
//! over `BasicTcpStream` lives alongside it in `net::async_tcp`.
//!
//! A submitted operation that cannot complete immediately (`WouldBlock`) is
//! not rejected synchronously: the block is parked on a pending queue and
//! retried by [`Worker`](crate::worker::Worker) when the socket's readiness
//! fires, exactly like a completion that simply took longer. Both the
//! pending queues and the service's completion/error queues reuse the same
//! hook field on `Io` (never more than one of the four holds a given block
//! at once).

use std::cell::Cell;
use std::io;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::io::{queue_hook, Io, IoHandle, TypeTag};
use crate::queue::{Mpmc, Queue};
use crate::service::Service;

#[cfg(unix)]
use std::os::unix::io::AsRawFd;
#[cfg(unix)]
use crate::sys::{Interest, RawSelector as _};

#[cfg(windows)]
use std::os::windows::io::AsRawSocket;

use super::endpoint::Endpoint;
use super::udp::BasicUdpSocket;

/// Result of a completed `receive_from` operation.
#[derive(Clone, Copy, Debug)]
pub struct ReceiveFromResult {
    pub transferred: usize,
    pub remote: Endpoint,
}

/// Result of a completed `send_to` operation.
#[derive(Clone, Copy, Debug)]
pub struct SendToResult {
    pub transferred: usize,
}

/// An async-capable UDP socket associated with a [`Service`].
pub struct AsyncUdpSocket {
    socket: BasicUdpSocket,
    service: Arc<Service>,

    context_ptr: Cell<*mut ()>,
    context_tag: Cell<Option<TypeTag>>,

    outstanding_recv: AtomicUsize,
    outstanding_send: AtomicUsize,
    max_outstanding_recv: usize,
    max_outstanding_send: usize,

    pending_receive: Mpmc<Io>,
    pending_send: Mpmc<Io>,
}

// Safety: `context_ptr`/`context_tag` are written only before the socket is
// shared across threads (via `context_mut`, taken by `&mut Arc` access
// patterns at the call site) or are otherwise the caller's responsibility,
// matching `basic_socket_t::context`'s own lack of internal locking.
unsafe impl Send for AsyncUdpSocket {}
unsafe impl Sync for AsyncUdpSocket {}

impl AsyncUdpSocket {
    /// Associate `socket` with `service`, registering it with the
    /// platform completion port. The socket is switched to non-blocking
    /// mode as part of association.
    ///
    /// `max_outstanding_receives`/`max_outstanding_sends` are the
    /// back-pressure caps (§4.5): a submit that would push the matching
    /// counter past its cap is routed to the service error queue with a
    /// `WouldBlock` status instead of being attempted synchronously.
    pub fn open(
        service: Arc<Service>,
        socket: BasicUdpSocket,
        max_outstanding_receives: usize,
        max_outstanding_sends: usize,
    ) -> io::Result<Arc<Self>> {
        socket.set_nonblocking(true)?;
        let this = Arc::new(Self {
            socket,
            service,
            context_ptr: Cell::new(std::ptr::null_mut()),
            context_tag: Cell::new(None),
            outstanding_recv: AtomicUsize::new(0),
            outstanding_send: AtomicUsize::new(0),
            max_outstanding_recv: max_outstanding_receives.max(1),
            max_outstanding_send: max_outstanding_sends.max(1),
            pending_receive: Mpmc::new(queue_hook),
            pending_send: Mpmc::new(queue_hook),
        });

        #[cfg(unix)]
        {
            let token = super::registration::Registration::token_for(&this);
            this.service
                .selector
                .register(this.socket.inner().as_raw_fd(), token, Interest::both())?;
        }
        #[cfg(windows)]
        {
            let token = Arc::as_ptr(&this) as usize;
            this.service
                .selector
                .associate(this.socket.inner().as_raw_socket() as _, token)?;
        }

        Ok(this)
    }

    /// Set a typed, opaque context on this socket (distinct from any
    /// per-operation context on an individual `Io`).
    pub fn set_context<T: 'static>(&self, context: *mut T) {
        self.context_ptr.set(context as *mut ());
        self.context_tag.set(Some(TypeTag::of::<T>()));
    }

    /// Retrieve the context set by [`AsyncUdpSocket::set_context`], if its
    /// type still matches `T`.
    pub fn context<T: 'static>(&self) -> Option<*mut T> {
        match self.context_tag.get() {
            Some(tag) if tag == TypeTag::of::<T>() => Some(self.context_ptr.get() as *mut T),
            _ => None,
        }
    }

    pub fn local_endpoint(&self) -> io::Result<Endpoint> {
        self.socket.local_endpoint()
    }

    /// Outstanding (submitted, not yet completed) receive count.
    pub fn outstanding_receive(&self) -> usize {
        self.outstanding_recv.load(Ordering::Relaxed)
    }

    /// Outstanding (submitted, not yet completed) send count.
    pub fn outstanding_send(&self) -> usize {
        self.outstanding_send.load(Ordering::Relaxed)
    }

    /// Submit a receive. `io`'s buffer window is used as the destination;
    /// on completion the block carries a [`ReceiveFromResult`] retrievable
    /// with `Io::result_of`.
    ///
    /// If this would exceed `max_outstanding_receives` (set at
    /// [`AsyncUdpSocket::open`]), the block is delivered straight to the
    /// service error queue with a `WouldBlock` status rather than attempted
    /// (§4.5 back-pressure).
    pub fn start_receive_from(self: &Arc<Self>, io: IoHandle) {
        let raw = io.into_raw();
        if self.reserve_outstanding(&self.outstanding_recv, self.max_outstanding_recv) {
            self.attempt_receive(raw);
        } else {
            self.reject_would_block(raw);
        }
    }

    /// Submit a send of `io`'s current `[begin, end)` window to `remote`.
    ///
    /// Subject to the same `max_outstanding_sends` back-pressure cap as
    /// [`AsyncUdpSocket::start_receive_from`].
    pub fn start_send_to(self: &Arc<Self>, io: IoHandle, remote: Endpoint) {
        let raw = io.into_raw();
        if self.reserve_outstanding(&self.outstanding_send, self.max_outstanding_send) {
            self.attempt_send(raw, remote);
        } else {
            self.reject_would_block(raw);
        }
    }

    /// Atomically increment `counter` if doing so would not exceed `cap`.
    fn reserve_outstanding(&self, counter: &AtomicUsize, cap: usize) -> bool {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current < cap {
                    Some(current + 1)
                } else {
                    None
                }
            })
            .is_ok()
    }

    /// Deliver `io` to the service error queue with a `WouldBlock` status,
    /// without ever touching the OS. Used when a submit would exceed this
    /// socket's outstanding-operation cap.
    fn reject_would_block(self: &Arc<Self>, io: NonNull<Io>) {
        let io_ref = unsafe { io.as_ref() };
        io_ref.set_status(libc_would_block());
        self.service.enqueue_error(io);
    }

    fn attempt_receive(self: &Arc<Self>, io: NonNull<Io>) {
        let io_ref = unsafe { io.as_ref() };
        match self.socket.recv_from(io_ref.buffer_mut()) {
            Ok((transferred, remote)) => {
                self.outstanding_recv.fetch_sub(1, Ordering::Relaxed);
                unsafe {
                    io_ref
                        .result_storage::<ReceiveFromResult>()
                        .write(ReceiveFromResult { transferred, remote });
                }
                self.service.enqueue_completed(io);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => unsafe {
                self.pending_receive.push(io);
            },
            Err(e) => {
                self.outstanding_recv.fetch_sub(1, Ordering::Relaxed);
                io_ref.set_status(e.raw_os_error().unwrap_or(-1));
                self.service.enqueue_error(io);
            }
        }
    }

    fn attempt_send(self: &Arc<Self>, io: NonNull<Io>, remote: Endpoint) {
        let io_ref = unsafe { io.as_ref() };
        match self.socket.send_to(io_ref.buffer(), remote) {
            Ok(transferred) => {
                self.outstanding_send.fetch_sub(1, Ordering::Relaxed);
                unsafe {
                    io_ref
                        .result_storage::<SendToResult>()
                        .write(SendToResult { transferred });
                }
                self.service.enqueue_completed(io);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                io_ref.set_pending_send_target(remote.to_socket_addr());
                unsafe {
                    self.pending_send.push(io);
                }
            }
            Err(e) => {
                self.outstanding_send.fetch_sub(1, Ordering::Relaxed);
                io_ref.set_status(e.raw_os_error().unwrap_or(-1));
                self.service.enqueue_error(io);
            }
        }
    }

    /// Retry every pending receive; called when this socket's registration
    /// reports readable.
    fn retry_receive(self: &Arc<Self>) {
        while let Some(io) = unsafe { self.pending_receive.try_pop() } {
            self.attempt_receive(io);
        }
    }

    /// Retry every pending send; called when this socket's registration
    /// reports writable.
    fn retry_send(self: &Arc<Self>) {
        while let Some(io) = unsafe { self.pending_send.try_pop() } {
            let io_ref = unsafe { io.as_ref() };
            let remote = Endpoint::udp(
                io_ref
                    .take_pending_send_target()
                    .expect("pending send always carries its remote endpoint"),
            );
            self.attempt_send(io, remote);
        }
    }
}

#[cfg(unix)]
impl super::registration::AsyncIoSource for AsyncUdpSocket {
    fn retry_readable(self: &Arc<Self>) {
        self.retry_receive();
    }

    fn retry_writable(self: &Arc<Self>) {
        self.retry_send();
    }
}

/// The OS error code for "would block", matching what a real submit would
/// have carried had it been attempted and failed the same way.
#[cfg(unix)]
fn libc_would_block() -> i32 {
    libc::EWOULDBLOCK
}

#[cfg(windows)]
fn libc_would_block() -> i32 {
    windows_sys::Win32::Networking::WinSock::WSAEWOULDBLOCK
}

