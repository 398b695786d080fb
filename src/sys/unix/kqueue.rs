//! BSD/macOS readiness backend built on kqueue.
//!
//! Grounded on mio's `src/sys/unix/selector/kqueue.rs` and on the Darwin
//! branch of `sal/net/__bits/io_service.hpp`: one `EVFILT_READ`/
//! `EVFILT_WRITE` pair registered per socket, tokens carried in `kevent`'s
//! `udata`.

use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use super::{Event, Interest, RawSelector};

pub(crate) struct Selector {
    kq: OwnedFd,
}

fn kevent(
    ident: RawFd,
    filter: i16,
    flags: u16,
    udata: u64,
) -> libc::kevent {
    libc::kevent {
        ident: ident as _,
        filter,
        flags,
        fflags: 0,
        data: 0,
        udata: udata as *mut libc::c_void,
    }
}

impl RawSelector for Selector {
    fn new() -> std::io::Result<Self> {
        let fd = syscall!(kqueue())?;
        Ok(Self {
            kq: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    fn register(&self, fd: RawFd, token: u64, interests: Interest) -> std::io::Result<()> {
        self.apply(fd, token, interests, libc::EV_ADD | libc::EV_CLEAR)
    }

    fn reregister(&self, fd: RawFd, token: u64, interests: Interest) -> std::io::Result<()> {
        self.apply(fd, token, interests, libc::EV_ADD | libc::EV_CLEAR)
    }

    fn deregister(&self, fd: RawFd) -> std::io::Result<()> {
        let changes = [
            kevent(fd, libc::EVFILT_READ, libc::EV_DELETE, 0),
            kevent(fd, libc::EVFILT_WRITE, libc::EV_DELETE, 0),
        ];
        unsafe {
            libc::kevent(
                self.kq.as_raw_fd(),
                changes.as_ptr(),
                changes.len() as i32,
                std::ptr::null_mut(),
                0,
                std::ptr::null(),
            );
        }
        Ok(())
    }

    fn select(&self, events: &mut Vec<Event>, timeout: Option<Duration>) -> std::io::Result<()> {
        events.clear();
        let ts = timeout.map(|d| libc::timespec {
            tv_sec: d.as_secs() as libc::time_t,
            tv_nsec: d.subsec_nanos() as _,
        });
        let ts_ptr = ts.as_ref().map_or(std::ptr::null(), |t| t as *const _);

        let mut raw: [libc::kevent; 1024] = unsafe { std::mem::zeroed() };
        let n = syscall!(kevent(
            self.kq.as_raw_fd(),
            std::ptr::null(),
            0,
            raw.as_mut_ptr(),
            raw.len() as i32,
            ts_ptr
        ))?;

        for raw_event in &raw[..n as usize] {
            let token = raw_event.udata as u64;
            let mut merged = events.iter_mut().find(|e: &&mut Event| e.token == token);
            let readable = raw_event.filter == libc::EVFILT_READ;
            let writable = raw_event.filter == libc::EVFILT_WRITE;
            let error = raw_event.flags & libc::EV_ERROR != 0;
            if let Some(existing) = merged.take() {
                existing.readable |= readable;
                existing.writable |= writable;
                existing.error |= error;
            } else {
                events.push(Event {
                    token,
                    readable,
                    writable,
                    error,
                });
            }
        }
        Ok(())
    }
}

impl Selector {
    fn apply(&self, fd: RawFd, token: u64, interests: Interest, base_flags: u16) -> std::io::Result<()> {
        let mut changes = Vec::with_capacity(2);
        if interests.readable {
            changes.push(kevent(fd, libc::EVFILT_READ, base_flags, token));
        } else {
            changes.push(kevent(fd, libc::EVFILT_READ, libc::EV_DELETE, token));
        }
        if interests.writable {
            changes.push(kevent(fd, libc::EVFILT_WRITE, base_flags, token));
        } else {
            changes.push(kevent(fd, libc::EVFILT_WRITE, libc::EV_DELETE, token));
        }
        unsafe {
            libc::kevent(
                self.kq.as_raw_fd(),
                changes.as_ptr(),
                changes.len() as i32,
                std::ptr::null_mut(),
                0,
                std::ptr::null(),
            );
        }
        Ok(())
    }
}
