//! The fixed-size I/O control block (§4.2 / C3).
//!
//! `Io` is sized to exactly 2048 bytes: a header carrying everything the
//! service, the worker, and the async socket wrapper need to route and
//! complete an operation, followed by an inline payload buffer that fills
//! out the rest of the block. Nothing here ever allocates — the payload
//! is the buffer an operation reads into or writes out of, and the result
//! is stored inline in the header rather than boxed.

use std::any::TypeId;
use std::cell::{Cell, UnsafeCell};
use std::mem;
use std::net::SocketAddr;
use std::ptr;
use std::sync::atomic::AtomicUsize;

#[cfg(unix)]
use std::os::unix::io::RawFd;
#[cfg(windows)]
use std::os::windows::io::RawSocket;

use crate::queue::{MpmcHook, MpscHook};

/// Runtime type identity used where the header needs to remember "what type
/// is stored here" without a generic parameter on `Io` itself. Stands in
/// for the `reinterpret_cast<uintptr_t>(&fn)` trick the C original uses for
/// the same purpose.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TypeTag(TypeId);

impl TypeTag {
    /// The tag for `T`.
    pub fn of<T: 'static>() -> Self {
        TypeTag(TypeId::of::<T>())
    }
}

/// Inline storage for a completed operation's result, large enough for any
/// of the result types this crate defines (§4.2.3). Trivially-destructible
/// result types only: the storage is never dropped in place, only
/// overwritten or reinterpreted.
pub(crate) const RESULT_CAPACITY: usize = 160;

/// Total size of an [`Io`] block, header and payload combined.
pub const IO_SIZE: usize = 2048;

/// The fixed header occupying the front of every [`Io`] block.
pub struct IoHeader {
    // On Windows this must be the first field: the completion port hands
    // back a pointer to the `OVERLAPPED` it was given, which is this field
    // reinterpreted, so `&Io` and `&Io::header::overlapped` must agree.
    #[cfg(windows)]
    pub(crate) overlapped: UnsafeCell<windows_sys::Win32::System::IO::OVERLAPPED>,

    // Owning pool, for returning this entry to its free list on drop.
    pub(crate) owner: Cell<*const ()>,
    // Opaque `Service`/`AsyncSocket` pointers; typed accessors live in
    // `service.rs`/`net::async_socket` where the concrete types are known.
    pub(crate) service: Cell<*const ()>,
    pub(crate) socket: Cell<*const ()>,

    // User context associated with the owning socket: an opaque pointer
    // plus the type it actually points to, checked on retrieval.
    context_ptr: Cell<*mut ()>,
    context_tag: Cell<Option<TypeTag>>,

    // Typed result storage, written by `result_storage`/read by `result_of`.
    result_tag: Cell<Option<TypeTag>>,
    result_data: UnsafeCell<[u8; RESULT_CAPACITY]>,

    // 0 on success; an OS error code otherwise (mirrors `std::error_code`).
    pub(crate) status: Cell<i32>,

    // `[begin, end)` window into the payload buffer actually in use.
    begin: Cell<*mut u8>,
    end: Cell<*mut u8>,

    // Points at the issuing socket's outstanding-operation counter so
    // completion can decrement it without looking the socket back up.
    pub(crate) outstanding: Cell<*const AtomicUsize>,

    // A send target stashed by `net::async_socket` while an operation sits
    // on a pending-retry queue; not the same slot as the public `context`.
    pub(crate) pending_send_target: Cell<Option<SocketAddr>>,

    // The raw handle of a socket accepted by `start_accept`, stashed here
    // rather than in the generic inline result buffer because
    // `AcceptResult::accepted_socket` must hand it out at most once
    // (§4.5): the `take()` on this cell is what enforces that, not
    // anything in the `Copy` result type itself.
    #[cfg(unix)]
    pub(crate) accepted_fd: Cell<Option<RawFd>>,
    #[cfg(windows)]
    pub(crate) accepted_socket: Cell<Option<RawSocket>>,

    // One hook for the pool's free list, one for a service's completion or
    // error queue; only one is linked at a time, matching the header's own
    // reused-storage intent even though Rust keeps them as distinct fields.
    pub(crate) free_hook: MpscHook<Io>,
    pub(crate) queue_hook: MpmcHook<Io>,
}

impl IoHeader {
    fn empty() -> Self {
        Self {
            #[cfg(windows)]
            overlapped: UnsafeCell::new(unsafe { mem::zeroed() }),
            owner: Cell::new(ptr::null()),
            service: Cell::new(ptr::null()),
            socket: Cell::new(ptr::null()),
            context_ptr: Cell::new(ptr::null_mut()),
            context_tag: Cell::new(None),
            result_tag: Cell::new(None),
            result_data: UnsafeCell::new([0u8; RESULT_CAPACITY]),
            status: Cell::new(0),
            begin: Cell::new(ptr::null_mut()),
            end: Cell::new(ptr::null_mut()),
            outstanding: Cell::new(ptr::null()),
            pending_send_target: Cell::new(None),
            #[cfg(unix)]
            accepted_fd: Cell::new(None),
            #[cfg(windows)]
            accepted_socket: Cell::new(None),
            free_hook: MpscHook::new(),
            queue_hook: MpmcHook::new(),
        }
    }
}

/// Payload capacity remaining after the header, computed so that
/// `size_of::<Io>() == IO_SIZE` always holds.
pub const IO_DATA_SIZE: usize = IO_SIZE - mem::size_of::<IoHeader>();

/// A single, fixed-size I/O control block.
///
/// `Io` is never constructed loose: it always lives inside an
/// [`IoBlock`](super::pool::IoBlock) and is handed out (and returned) through
/// an [`IoPool`](super::pool::IoPool).
pub struct Io {
    pub(crate) header: IoHeader,
    data: UnsafeCell<[u8; IO_DATA_SIZE]>,
}

// Safety: every field is either a plain `Cell`/`UnsafeCell` whose aliasing
// is arbitrated by the queue an `Io` is linked into at any given time (at
// most one of "on the free list" / "owned by in-flight operation" / "on a
// completion queue" holds), or an atomic pointer meant to be shared.
unsafe impl Send for Io {}
unsafe impl Sync for Io {}

impl Io {
    pub(crate) fn empty() -> Self {
        Self {
            header: IoHeader::empty(),
            data: UnsafeCell::new([0u8; IO_DATA_SIZE]),
        }
    }

    /// Pointer to the start of the payload buffer.
    pub fn data_ptr(&self) -> *mut u8 {
        self.data.get() as *mut u8
    }

    /// Capacity of the payload buffer in bytes.
    pub const fn data_capacity(&self) -> usize {
        IO_DATA_SIZE
    }

    /// Reset the `[begin, end)` window to the full payload buffer.
    pub fn reset_buffer(&self) {
        let start = self.data_ptr();
        self.begin.set(start);
        self.end.set(unsafe { start.add(IO_DATA_SIZE) });
    }

    /// Return this block to the state `make_io` promises: full buffer
    /// window, no socket, no result, no status, no stashed accept/send
    /// handoff state. Called by the pool when a block is handed out, so a
    /// reused block never leaks a previous operation's leftovers into the
    /// next one.
    pub(crate) fn reset(&self) {
        self.reset_buffer();
        self.header.socket.set(ptr::null());
        self.header.context_ptr.set(ptr::null_mut());
        self.header.context_tag.set(None);
        self.header.result_tag.set(None);
        self.header.status.set(0);
        self.header.outstanding.set(ptr::null());
        self.header.pending_send_target.set(None);
        #[cfg(unix)]
        self.header.accepted_fd.set(None);
        #[cfg(windows)]
        self.header.accepted_socket.set(None);
    }

    /// Narrow the `[begin, end)` window. Panics if the window would fall
    /// outside the payload buffer.
    pub fn set_buffer_window(&self, begin: usize, end: usize) {
        assert!(begin <= end && end <= IO_DATA_SIZE, "buffer window out of range");
        let start = self.data_ptr();
        unsafe {
            self.begin.set(start.add(begin));
            self.end.set(start.add(end));
        }
    }

    /// The current `[begin, end)` window as a byte slice.
    pub fn buffer(&self) -> &[u8] {
        let begin = self.begin.get();
        let end = self.end.get();
        if begin.is_null() || end.is_null() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(begin, end.offset_from(begin) as usize) }
    }

    /// The current `[begin, end)` window as a mutable byte slice.
    pub fn buffer_mut(&self) -> &mut [u8] {
        let begin = self.begin.get();
        let end = self.end.get();
        if begin.is_null() || end.is_null() {
            return &mut [];
        }
        unsafe { std::slice::from_raw_parts_mut(begin, end.offset_from(begin) as usize) }
    }

    /// `0` on success, an OS error code otherwise.
    pub fn status(&self) -> i32 {
        self.header.status.get()
    }

    pub fn set_status(&self, status: i32) {
        self.header.status.set(status);
    }

    /// Associate an opaque, typed context pointer with this block (distinct
    /// from a socket's own context — this one follows the operation).
    pub fn set_context<T: 'static>(&self, context: *mut T) {
        self.header.context_ptr.set(context as *mut ());
        self.header.context_tag.set(Some(TypeTag::of::<T>()));
    }

    /// Retrieve the context pointer set by [`Io::set_context`], if its type
    /// still matches `T`.
    pub fn context<T: 'static>(&self) -> Option<*mut T> {
        match self.header.context_tag.get() {
            Some(tag) if tag == TypeTag::of::<T>() => Some(self.header.context_ptr.get() as *mut T),
            _ => None,
        }
    }

    pub(crate) fn result_tag(&self) -> Option<TypeTag> {
        self.header.result_tag.get()
    }

    pub(crate) fn set_result_tag(&self, tag: TypeTag) {
        self.header.result_tag.set(Some(tag));
    }

    pub(crate) fn result_data_ptr(&self) -> *mut u8 {
        self.header.result_data.get() as *mut u8
    }

    pub(crate) fn set_pending_send_target(&self, target: SocketAddr) {
        self.header.pending_send_target.set(Some(target));
    }

    pub(crate) fn take_pending_send_target(&self) -> Option<SocketAddr> {
        self.header.pending_send_target.take()
    }

    /// Stash the raw handle of a socket accepted by `start_accept`. Only
    /// ever called once, by the accept completion path.
    #[cfg(unix)]
    pub(crate) fn set_accepted_raw(&self, fd: RawFd) {
        self.header.accepted_fd.set(Some(fd));
    }

    #[cfg(windows)]
    pub(crate) fn set_accepted_raw(&self, socket: RawSocket) {
        self.header.accepted_socket.set(Some(socket));
    }

    /// Take the raw handle stashed by `set_accepted_raw`, if it has not
    /// already been taken. This is what makes
    /// `AcceptResult::accepted_socket` callable at most once per `Io`.
    #[cfg(unix)]
    pub(crate) fn take_accepted_raw(&self) -> Option<RawFd> {
        self.header.accepted_fd.take()
    }

    #[cfg(windows)]
    pub(crate) fn take_accepted_raw(&self) -> Option<RawSocket> {
        self.header.accepted_socket.take()
    }
}

/// Accessor for the free-list hook, supplied to the pool's MPSC free list.
pub(crate) fn free_hook(io: &Io) -> &MpscHook<Io> {
    &io.header.free_hook
}

/// Accessor for the completion/error queue hook, supplied to a service's
/// completion and error queues.
pub(crate) fn queue_hook(io: &Io) -> &MpmcHook<Io> {
    &io.header.queue_hook
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_is_exactly_2048_bytes() {
        assert_eq!(mem::size_of::<Io>(), IO_SIZE);
    }

    #[test]
    fn buffer_window_defaults_to_full_payload() {
        let io = Io::empty();
        io.reset_buffer();
        assert_eq!(io.buffer().len(), IO_DATA_SIZE);
    }

    #[test]
    fn context_round_trips_by_type() {
        let io = Io::empty();
        let mut value = 7u32;
        io.set_context(&mut value as *mut u32);
        assert_eq!(io.context::<u32>(), Some(&mut value as *mut u32));
        assert_eq!(io.context::<u64>(), None);
    }
}
