//! Linux readiness backend built on epoll.
//!
//! Grounded on mio's `src/sys/unix/selector/epoll.rs`: an owned epoll
//! instance, `epoll_ctl`/`epoll_wait` via the `syscall!` macro, tokens
//! carried in `epoll_event::u64`.

use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use super::{Event, Interest, RawSelector};

fn interests_to_events(interests: Interest) -> u32 {
    let mut events = libc::EPOLLET as u32;
    if interests.readable {
        events |= libc::EPOLLIN as u32 | libc::EPOLLRDHUP as u32;
    }
    if interests.writable {
        events |= libc::EPOLLOUT as u32;
    }
    events
}

pub(crate) struct Selector {
    epoll: OwnedFd,
}

impl RawSelector for Selector {
    fn new() -> std::io::Result<Self> {
        let fd = syscall!(epoll_create1(libc::EPOLL_CLOEXEC))?;
        Ok(Self {
            epoll: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    fn register(&self, fd: RawFd, token: u64, interests: Interest) -> std::io::Result<()> {
        let mut event = libc::epoll_event {
            events: interests_to_events(interests),
            u64: token,
        };
        syscall!(epoll_ctl(
            self.epoll.as_raw_fd(),
            libc::EPOLL_CTL_ADD,
            fd,
            &mut event
        ))?;
        Ok(())
    }

    fn reregister(&self, fd: RawFd, token: u64, interests: Interest) -> std::io::Result<()> {
        let mut event = libc::epoll_event {
            events: interests_to_events(interests),
            u64: token,
        };
        syscall!(epoll_ctl(
            self.epoll.as_raw_fd(),
            libc::EPOLL_CTL_MOD,
            fd,
            &mut event
        ))?;
        Ok(())
    }

    fn deregister(&self, fd: RawFd) -> std::io::Result<()> {
        syscall!(epoll_ctl(
            self.epoll.as_raw_fd(),
            libc::EPOLL_CTL_DEL,
            fd,
            std::ptr::null_mut()
        ))?;
        Ok(())
    }

    fn select(&self, events: &mut Vec<Event>, timeout: Option<Duration>) -> std::io::Result<()> {
        events.clear();
        let timeout_ms = timeout.map_or(-1, |d| d.as_millis().min(i32::MAX as u128) as i32);
        let mut raw: [libc::epoll_event; 1024] = unsafe { std::mem::zeroed() };
        let n = syscall!(epoll_wait(
            self.epoll.as_raw_fd(),
            raw.as_mut_ptr(),
            raw.len() as i32,
            timeout_ms
        ))?;
        for raw_event in &raw[..n as usize] {
            events.push(Event {
                token: raw_event.u64,
                readable: raw_event.events & (libc::EPOLLIN as u32 | libc::EPOLLRDHUP as u32) != 0,
                writable: raw_event.events & libc::EPOLLOUT as u32 != 0,
                error: raw_event.events & (libc::EPOLLERR as u32 | libc::EPOLLHUP as u32) != 0,
            });
        }
        Ok(())
    }
}
