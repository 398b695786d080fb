//! Async TCP wrapper (§4.5 / C6 supplement): `start_accept`/`start_connect`
//! and stream `start_receive`/`start_send`, mirroring
//! [`async_socket`](super::async_socket)'s UDP wrapper over the same
//! `Io`/`Service` plumbing.
//!
//! Grounded on `sal/net/async/basic_socket.hpp`'s `start_connect`/
//! `start_accept` and `accept_t::accepted_socket` (§4.5, §8 scenarios 3–4);
//! the unix `connect` path — a raw non-blocking socket plus `EINPROGRESS`,
//! completed when the registration reports writable — is grounded on mio's
//! `src/sys/unix/tcp/stream.rs` `TcpStream::connect`.

use std::cell::Cell;
use std::io;
#[cfg(unix)]
use std::net::SocketAddr;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::io::{queue_hook, Io, IoHandle, TypeTag};
use crate::queue::{Mpmc, Queue};
use crate::service::Service;

#[cfg(unix)]
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd};
#[cfg(unix)]
use crate::sys::{Interest, RawSelector as _};

#[cfg(windows)]
use std::os::windows::io::{AsRawSocket, FromRawSocket, IntoRawSocket};

use super::endpoint::Endpoint;
use super::tcp::{BasicTcpListener, BasicTcpStream};

/// Result of a completed `connect` operation.
#[derive(Clone, Copy, Debug)]
pub struct ConnectResult {
    pub remote: Endpoint,
}

/// Result of a completed `accept` operation.
///
/// The accepted socket is deliberately not carried inline — `Io`'s result
/// storage requires `Copy`, trivially-destructible types, and an owned
/// socket is neither. Call [`AcceptResult::accepted_socket`] to take it;
/// per §4.5 this may only succeed once per `Io`.
#[derive(Clone, Copy, Debug)]
pub struct AcceptResult {
    pub remote: Endpoint,
}

impl AcceptResult {
    /// Take the socket this accept produced. Fails with a
    /// `bad_file_descriptor`-equivalent error if called again on the same
    /// `io` (§8 scenario 3).
    pub fn accepted_socket(&self, io: &Io) -> io::Result<BasicTcpStream> {
        match io.take_accepted_raw() {
            #[cfg(unix)]
            Some(raw) => Ok(BasicTcpStream::from_std(unsafe {
                std::net::TcpStream::from_raw_fd(raw)
            })),
            #[cfg(windows)]
            Some(raw) => Ok(BasicTcpStream::from_std(unsafe {
                std::net::TcpStream::from_raw_socket(raw)
            })),
            None => Err(bad_file_descriptor()),
        }
    }
}

#[cfg(unix)]
fn bad_file_descriptor() -> io::Error {
    io::Error::from_raw_os_error(libc::EBADF)
}

#[cfg(windows)]
fn bad_file_descriptor() -> io::Error {
    io::Error::from_raw_os_error(windows_sys::Win32::Foundation::ERROR_INVALID_HANDLE as i32)
}

/// An async-capable TCP listener associated with a [`Service`].
pub struct AsyncTcpListener {
    inner: BasicTcpListener,
    service: Arc<Service>,
    pending_accept: Mpmc<Io>,
}

unsafe impl Send for AsyncTcpListener {}
unsafe impl Sync for AsyncTcpListener {}

impl AsyncTcpListener {
    /// Associate `inner` with `service`, switching it to non-blocking mode
    /// and registering it with the platform completion port.
    pub fn open(service: Arc<Service>, inner: BasicTcpListener) -> io::Result<Arc<Self>> {
        inner.set_nonblocking(true)?;
        let this = Arc::new(Self {
            inner,
            service,
            pending_accept: Mpmc::new(queue_hook),
        });

        #[cfg(unix)]
        {
            let token = super::registration::Registration::token_for(&this);
            this.service
                .selector
                .register(this.inner.inner().as_raw_fd(), token, Interest::READABLE)?;
        }
        #[cfg(windows)]
        {
            let token = Arc::as_ptr(&this) as usize;
            this.service
                .selector
                .associate(this.inner.inner().as_raw_socket() as _, token)?;
        }

        Ok(this)
    }

    pub fn local_endpoint(&self) -> io::Result<Endpoint> {
        self.inner.local_endpoint()
    }

    /// Submit an accept. On completion the block carries an
    /// [`AcceptResult`] retrievable with `Io::result_of`.
    pub fn start_accept(self: &Arc<Self>, io: IoHandle) {
        let raw = io.into_raw();
        self.attempt_accept(raw);
    }

    fn attempt_accept(self: &Arc<Self>, io: NonNull<Io>) {
        let io_ref = unsafe { io.as_ref() };
        match self.inner.accept() {
            Ok((stream, remote)) => {
                #[cfg(unix)]
                io_ref.set_accepted_raw(stream.into_raw_fd());
                #[cfg(windows)]
                io_ref.set_accepted_raw(stream.into_raw_socket());
                unsafe {
                    io_ref.result_storage::<AcceptResult>().write(AcceptResult { remote });
                }
                self.service.enqueue_completed(io);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => unsafe {
                self.pending_accept.push(io);
            },
            Err(e) => {
                io_ref.set_status(e.raw_os_error().unwrap_or(-1));
                self.service.enqueue_error(io);
            }
        }
    }

    fn retry_accept(self: &Arc<Self>) {
        while let Some(io) = unsafe { self.pending_accept.try_pop() } {
            self.attempt_accept(io);
        }
    }
}

#[cfg(unix)]
impl super::registration::AsyncIoSource for AsyncTcpListener {
    fn retry_readable(self: &Arc<Self>) {
        self.retry_accept();
    }

    fn retry_writable(self: &Arc<Self>) {}
}

/// An async-capable, connected (or connecting) TCP stream associated with a
/// [`Service`].
pub struct AsyncTcpStream {
    inner: BasicTcpStream,
    service: Arc<Service>,

    context_ptr: Cell<*mut ()>,
    context_tag: Cell<Option<TypeTag>>,

    outstanding_recv: AtomicUsize,
    outstanding_send: AtomicUsize,
    max_outstanding_recv: usize,
    max_outstanding_send: usize,

    pending_connect: Mpmc<Io>,
    pending_receive: Mpmc<Io>,
    pending_send: Mpmc<Io>,
}

unsafe impl Send for AsyncTcpStream {}
unsafe impl Sync for AsyncTcpStream {}

impl AsyncTcpStream {
    /// Wrap an already-connected `inner` (e.g. from
    /// [`AcceptResult::accepted_socket`]) and register it with `service`.
    pub fn open(
        service: Arc<Service>,
        inner: BasicTcpStream,
        max_outstanding_receives: usize,
        max_outstanding_sends: usize,
    ) -> io::Result<Arc<Self>> {
        inner.set_nonblocking(true)?;
        let this = Arc::new(Self {
            inner,
            service,
            context_ptr: Cell::new(std::ptr::null_mut()),
            context_tag: Cell::new(None),
            outstanding_recv: AtomicUsize::new(0),
            outstanding_send: AtomicUsize::new(0),
            max_outstanding_recv: max_outstanding_receives.max(1),
            max_outstanding_send: max_outstanding_sends.max(1),
            pending_connect: Mpmc::new(queue_hook),
            pending_receive: Mpmc::new(queue_hook),
            pending_send: Mpmc::new(queue_hook),
        });
        this.register()?;
        Ok(this)
    }

    /// Create an unconnected, non-blocking socket, start a connect towards
    /// `remote`, and register it with `service`. The returned stream is
    /// not yet connected; submit `io` through
    /// [`AsyncTcpStream::start_connect`] to drive the handshake.
    ///
    /// Unix only: a genuinely async connect needs the raw non-blocking
    /// `socket()`/`connect()`/`EINPROGRESS` dance this crate implements
    /// with `libc`; on Windows it needs `ConnectEx`, discovered through a
    /// `WSAIoctl` function-pointer lookup this crate does not otherwise
    /// need anywhere else, so it is left unbuilt there rather than built
    /// speculatively (see `DESIGN.md`).
    #[cfg(unix)]
    pub fn unconnected(service: Arc<Service>, remote: &Endpoint) -> io::Result<Arc<Self>> {
        let inner = new_nonblocking_stream_socket(remote.to_socket_addr())?;
        let this = Arc::new(Self {
            inner,
            service,
            context_ptr: Cell::new(std::ptr::null_mut()),
            context_tag: Cell::new(None),
            outstanding_recv: AtomicUsize::new(0),
            outstanding_send: AtomicUsize::new(0),
            max_outstanding_recv: usize::MAX,
            max_outstanding_send: usize::MAX,
            pending_connect: Mpmc::new(queue_hook),
            pending_receive: Mpmc::new(queue_hook),
            pending_send: Mpmc::new(queue_hook),
        });
        this.register()?;
        Ok(this)
    }

    fn register(self: &Arc<Self>) -> io::Result<()> {
        #[cfg(unix)]
        {
            let token = super::registration::Registration::token_for(self);
            self.service
                .selector
                .register(self.inner.inner().as_raw_fd(), token, Interest::both())?;
        }
        #[cfg(windows)]
        {
            let token = Arc::as_ptr(self) as usize;
            self.service
                .selector
                .associate(self.inner.inner().as_raw_socket() as _, token)?;
        }
        Ok(())
    }

    pub fn set_context<T: 'static>(&self, context: *mut T) {
        self.context_ptr.set(context as *mut ());
        self.context_tag.set(Some(TypeTag::of::<T>()));
    }

    pub fn context<T: 'static>(&self) -> Option<*mut T> {
        match self.context_tag.get() {
            Some(tag) if tag == TypeTag::of::<T>() => Some(self.context_ptr.get() as *mut T),
            _ => None,
        }
    }

    pub fn local_endpoint(&self) -> io::Result<Endpoint> {
        self.inner.local_endpoint()
    }

    pub fn peer_endpoint(&self) -> io::Result<Endpoint> {
        self.inner.peer_endpoint()
    }

    pub fn outstanding_receive(&self) -> usize {
        self.outstanding_recv.load(Ordering::Relaxed)
    }

    pub fn outstanding_send(&self) -> usize {
        self.outstanding_send.load(Ordering::Relaxed)
    }

    /// Submit a connect towards `remote`. `io` completes once the
    /// connection either succeeds or fails; on success the block carries a
    /// [`ConnectResult`].
    pub fn start_connect(self: &Arc<Self>, io: IoHandle, remote: Endpoint) {
        let raw = io.into_raw();
        self.check_connect(raw, remote);
    }

    fn check_connect(self: &Arc<Self>, io: NonNull<Io>, remote: Endpoint) {
        let io_ref = unsafe { io.as_ref() };
        match self.inner.peer_endpoint() {
            Ok(_) => {
                unsafe {
                    io_ref.result_storage::<ConnectResult>().write(ConnectResult { remote });
                }
                self.service.enqueue_completed(io);
            }
            Err(_) => match socket_pending_error(&self.inner) {
                Ok(None) => unsafe { self.pending_connect.push(io) },
                Ok(Some(err)) | Err(err) => {
                    io_ref.set_status(err.raw_os_error().unwrap_or(-1));
                    self.service.enqueue_error(io);
                }
            },
        }
    }

    fn retry_connect(self: &Arc<Self>) {
        while let Some(io) = unsafe { self.pending_connect.try_pop() } {
            let io_ref = unsafe { io.as_ref() };
            match self.inner.peer_endpoint() {
                Ok(remote) => unsafe {
                    io_ref.result_storage::<ConnectResult>().write(ConnectResult { remote });
                    self.service.enqueue_completed(io);
                },
                Err(_) => match socket_pending_error(&self.inner) {
                    Ok(None) => unsafe { self.pending_connect.push(io) },
                    Ok(Some(err)) | Err(err) => {
                        io_ref.set_status(err.raw_os_error().unwrap_or(-1));
                        self.service.enqueue_error(io);
                    }
                },
            }
        }
    }

    /// Submit a receive into `io`'s buffer window.
    pub fn start_receive(self: &Arc<Self>, io: IoHandle) {
        let raw = io.into_raw();
        if self.reserve_outstanding(&self.outstanding_recv, self.max_outstanding_recv) {
            self.attempt_receive(raw);
        } else {
            self.reject_would_block(raw, &self.outstanding_recv);
        }
    }

    /// Submit a send of `io`'s current `[begin, end)` window.
    pub fn start_send(self: &Arc<Self>, io: IoHandle) {
        let raw = io.into_raw();
        if self.reserve_outstanding(&self.outstanding_send, self.max_outstanding_send) {
            self.attempt_send(raw);
        } else {
            self.reject_would_block(raw, &self.outstanding_send);
        }
    }

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

    fn reject_would_block(self: &Arc<Self>, io: NonNull<Io>, _counter: &AtomicUsize) {
        let io_ref = unsafe { io.as_ref() };
        io_ref.set_status(would_block_error_code());
        self.service.enqueue_error(io);
    }

    fn attempt_receive(self: &Arc<Self>, io: NonNull<Io>) {
        let io_ref = unsafe { io.as_ref() };
        match self.inner.read_shared(io_ref.buffer_mut()) {
            Ok(transferred) => {
                self.outstanding_recv.fetch_sub(1, Ordering::Relaxed);
                unsafe {
                    io_ref.result_storage::<usize>().write(transferred);
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

    fn attempt_send(self: &Arc<Self>, io: NonNull<Io>) {
        let io_ref = unsafe { io.as_ref() };
        match self.inner.write_shared(io_ref.buffer()) {
            Ok(transferred) => {
                self.outstanding_send.fetch_sub(1, Ordering::Relaxed);
                unsafe {
                    io_ref.result_storage::<usize>().write(transferred);
                }
                self.service.enqueue_completed(io);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => unsafe {
                self.pending_send.push(io);
            },
            Err(e) => {
                self.outstanding_send.fetch_sub(1, Ordering::Relaxed);
                io_ref.set_status(e.raw_os_error().unwrap_or(-1));
                self.service.enqueue_error(io);
            }
        }
    }

    fn retry_receive(self: &Arc<Self>) {
        while let Some(io) = unsafe { self.pending_receive.try_pop() } {
            self.attempt_receive(io);
        }
    }

    fn retry_send(self: &Arc<Self>) {
        while let Some(io) = unsafe { self.pending_send.try_pop() } {
            self.attempt_send(io);
        }
    }
}

#[cfg(unix)]
impl super::registration::AsyncIoSource for AsyncTcpStream {
    fn retry_readable(self: &Arc<Self>) {
        self.retry_connect();
        self.retry_receive();
    }

    fn retry_writable(self: &Arc<Self>) {
        self.retry_connect();
        self.retry_send();
    }
}

#[cfg(unix)]
fn would_block_error_code() -> i32 {
    libc::EWOULDBLOCK
}

#[cfg(windows)]
fn would_block_error_code() -> i32 {
    windows_sys::Win32::Networking::WinSock::WSAEWOULDBLOCK
}

/// `getsockopt(SO_ERROR)`: `Ok(None)` means the connect is still in
/// flight, `Ok(Some(e))`/`Err(e)` means it has failed with `e`.
#[cfg(unix)]
fn socket_pending_error(stream: &BasicTcpStream) -> io::Result<Option<io::Error>> {
    let fd = stream.inner().as_raw_fd();
    let mut err: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    syscall!(getsockopt(
        fd,
        libc::SOL_SOCKET,
        libc::SO_ERROR,
        &mut err as *mut _ as *mut libc::c_void,
        &mut len
    ))?;
    Ok(match err {
        0 => None,
        _ => Some(io::Error::from_raw_os_error(err)),
    })
}

#[cfg(windows)]
fn socket_pending_error(stream: &BasicTcpStream) -> io::Result<Option<io::Error>> {
    use windows_sys::Win32::Networking::WinSock::{getsockopt, SOL_SOCKET, SO_ERROR};
    let socket = stream.inner().as_raw_socket();
    let mut err: i32 = 0;
    let mut len = std::mem::size_of::<i32>() as i32;
    let ret = unsafe {
        getsockopt(
            socket as _,
            SOL_SOCKET as i32,
            SO_ERROR as i32,
            &mut err as *mut _ as *mut u8,
            &mut len,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(match err {
        0 => None,
        _ => Some(io::Error::from_raw_os_error(err)),
    })
}

/// Create a non-blocking, connecting TCP socket towards `addr` (unix only;
/// windows streams are currently built from an already-connected
/// `BasicTcpStream`, see `AsyncTcpStream::open`).
#[cfg(unix)]
fn new_nonblocking_stream_socket(addr: SocketAddr) -> io::Result<BasicTcpStream> {
    let domain = match addr {
        SocketAddr::V4(_) => libc::AF_INET,
        SocketAddr::V6(_) => libc::AF_INET6,
    };
    let fd = syscall!(socket(domain, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0))?;
    let stream = unsafe { std::net::TcpStream::from_raw_fd(fd) };
    stream.set_nonblocking(true)?;

    let (raw_addr, raw_addr_len) = socket_addr_storage(&addr);
    let connect_result = syscall!(connect(fd, raw_addr.as_ptr() as *const libc::sockaddr, raw_addr_len));
    match connect_result {
        Ok(_) => {}
        Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {}
        Err(e) => return Err(e),
    }
    Ok(BasicTcpStream::from_std(stream))
}

/// Build a `sockaddr_in`/`sockaddr_in6` for `addr`, returned as a generic
/// byte buffer plus its true length, since the two variants differ in size.
#[cfg(unix)]
fn socket_addr_storage(addr: &SocketAddr) -> ([u8; std::mem::size_of::<libc::sockaddr_in6>()], libc::socklen_t) {
    let mut storage = [0u8; std::mem::size_of::<libc::sockaddr_in6>()];
    match addr {
        SocketAddr::V4(v4) => {
            let sockaddr = libc::sockaddr_in {
                sin_family: libc::AF_INET as libc::sa_family_t,
                sin_port: v4.port().to_be(),
                sin_addr: libc::in_addr {
                    s_addr: u32::from_ne_bytes(v4.ip().octets()),
                },
                sin_zero: [0; 8],
                #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd", target_os = "netbsd", target_os = "openbsd", target_os = "dragonfly"))]
                sin_len: std::mem::size_of::<libc::sockaddr_in>() as u8,
            };
            let bytes = unsafe {
                std::slice::from_raw_parts(
                    &sockaddr as *const _ as *const u8,
                    std::mem::size_of::<libc::sockaddr_in>(),
                )
            };
            storage[..bytes.len()].copy_from_slice(bytes);
            (storage, std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t)
        }
        SocketAddr::V6(v6) => {
            let sockaddr = libc::sockaddr_in6 {
                sin6_family: libc::AF_INET6 as libc::sa_family_t,
                sin6_port: v6.port().to_be(),
                sin6_flowinfo: v6.flowinfo(),
                sin6_addr: libc::in6_addr {
                    s6_addr: v6.ip().octets(),
                },
                sin6_scope_id: v6.scope_id(),
                #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd", target_os = "netbsd", target_os = "openbsd", target_os = "dragonfly"))]
                sin6_len: std::mem::size_of::<libc::sockaddr_in6>() as u8,
            };
            let bytes = unsafe {
                std::slice::from_raw_parts(
                    &sockaddr as *const _ as *const u8,
                    std::mem::size_of::<libc::sockaddr_in6>(),
                )
            };
            storage[..bytes.len()].copy_from_slice(bytes);
            (storage, std::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{BasicTcpListener, Protocol};
    use crate::service::Service;

    #[test]
    fn accept_then_close_peer_yields_no_further_data() {
        let service = Service::new().expect("service");
        let listener_socket = BasicTcpListener::bind(Endpoint::new(
            "127.0.0.1".parse().unwrap(),
            0,
            Protocol::Tcp,
        ))
        .expect("bind");
        let local = listener_socket.local_endpoint().expect("local endpoint");
        let listener = AsyncTcpListener::open(Arc::clone(&service), listener_socket).expect("open listener");

        let client = std::net::TcpStream::connect(local.to_socket_addr()).expect("connect");
        drop(client);

        // Give the kernel a moment to finish the handshake before accepting;
        // loopback accept is effectively synchronous in practice.
        std::thread::sleep(std::time::Duration::from_millis(20));

        let io = service.make_io();
        listener.start_accept(io);
        let completed = service.try_dequeue_completed().expect("accept completed synchronously");
        let io = unsafe { IoHandle::from_raw(completed, service.pool().clone()) };
        let accept_result = io.result_of::<AcceptResult>().expect("accept result");
        let stream = accept_result.accepted_socket(&io).expect("accepted socket");

        let second_attempt = accept_result.accepted_socket(&io);
        assert!(second_attempt.is_err(), "accepted_socket must be idempotent-failing on reuse");

        // A peer that closed right after connecting, without sending
        // anything, surfaces as either an immediate EOF (`Ok(0)`) or a
        // reset/broken-pipe style error depending on OS/timing (§8
        // scenario 4); either way no payload bytes ever arrive.
        let mut buf = [0u8; 16];
        use std::io::Read;
        let mut stream = stream;
        match stream.read(&mut buf) {
            Ok(n) => assert_eq!(n, 0, "closed peer must not yield any payload bytes"),
            Err(_) => {}
        }
    }
}
