//! Platform completion-port bindings (§4.3, internal to C4).
//!
//! Three backends, selected at compile time: IOCP on Windows (genuinely
//! completion-based — the port hands back the exact `Io` pointer an
//! operation was submitted with), and epoll/kqueue on Unix (readiness-based
//! — the worker retries the actual syscall when a socket becomes ready and
//! only then produces a completion). epoll is not named by this crate's
//! specification but is included for the same reason mio carries both: a
//! kqueue-only Unix story leaves Linux unsupported, which no real
//! networking crate in this ecosystem ships with.

cfg_os_poll! {
    #[cfg(unix)]
    mod unix;
    #[cfg(unix)]
    pub(crate) use unix::{Event, Interest, RawSelector, Selector};

    #[cfg(windows)]
    mod windows;
    #[cfg(windows)]
    pub(crate) use windows::CompletionPort as Selector;
}
