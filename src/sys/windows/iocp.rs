//! I/O completion port backend.
//!
//! Unlike the Unix backends this one is genuinely completion-based: the
//! port hands back the exact `OVERLAPPED` pointer an operation was
//! submitted with, which this crate arranges to be the address of an
//! [`Io`](crate::io::Io)'s own header (see `io::block`'s `overlapped`
//! field). Grounded on `sal/net/__bits/io_service.hpp`'s Windows branch
//! (`io_service_t{iocp, associate()}`) and on mio's older
//! `src/sys/windows/selector.rs`, which wraps the same
//! `CreateIoCompletionPort`/`GetQueuedCompletionStatusEx` pair.

use std::io;
use std::os::windows::io::RawHandle;
use std::ptr;
use std::time::Duration;

use windows_sys::Win32::Foundation::HANDLE;
use windows_sys::Win32::System::IO::{
    CreateIoCompletionPort, GetQueuedCompletionStatusEx, PostQueuedCompletionStatus,
    OVERLAPPED, OVERLAPPED_ENTRY,
};

/// Maximum completions drained in a single `GetQueuedCompletionStatusEx`
/// call, matching `sal::net::__bits::io_service_t::max_events_per_wait`.
const MAX_EVENTS_PER_WAIT: usize = 1024;

pub(crate) struct CompletionPort {
    handle: HANDLE,
}

// Safety: `HANDLE` to an I/O completion port is explicitly documented by
// Win32 as safe to share and use concurrently from multiple threads.
unsafe impl Send for CompletionPort {}
unsafe impl Sync for CompletionPort {}

impl CompletionPort {
    pub fn new() -> io::Result<Self> {
        let handle = unsafe { CreateIoCompletionPort(HANDLE::default(), HANDLE::default(), 0, 0) };
        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { handle })
    }

    /// Associate a raw handle with this port; `token` becomes the
    /// completion key returned alongside every completion for it.
    pub fn associate(&self, handle: RawHandle, token: usize) -> io::Result<()> {
        let result = unsafe { CreateIoCompletionPort(handle as HANDLE, self.handle, token, 0) };
        if result.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Wake `get_many` without a real completion, used to interrupt a
    /// worker blocked in `wait_for`.
    pub fn wake(&self) -> io::Result<()> {
        let ok = unsafe { PostQueuedCompletionStatus(self.handle, 0, 0, ptr::null_mut()) };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Drain up to `MAX_EVENTS_PER_WAIT` completions, returning the raw
    /// `OVERLAPPED` pointers (reinterpretable as `*mut Io`).
    pub fn get_many(&self, timeout: Option<Duration>) -> io::Result<Vec<*mut OVERLAPPED>> {
        let mut entries: [OVERLAPPED_ENTRY; MAX_EVENTS_PER_WAIT] = unsafe { std::mem::zeroed() };
        let mut removed: u32 = 0;
        let timeout_ms = timeout.map_or(0xFFFFFFFF, |d| d.as_millis().min(0xFFFFFFFE) as u32);

        let ok = unsafe {
            GetQueuedCompletionStatusEx(
                self.handle,
                entries.as_mut_ptr(),
                entries.len() as u32,
                &mut removed,
                timeout_ms,
                0,
            )
        };
        if ok == 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(258) {
                // WAIT_TIMEOUT
                return Ok(Vec::new());
            }
            return Err(err);
        }

        Ok(entries[..removed as usize]
            .iter()
            .map(|e| e.lpOverlapped)
            .filter(|p| !p.is_null())
            .collect())
    }
}
