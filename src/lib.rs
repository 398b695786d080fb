#![crate_name = "ferrite"]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rust_2018_idioms)]

//! Intrusive lock-free queues, a fixed-size I/O completion block with its
//! pool, a completion service + worker pair, an async socket wrapper, and a
//! small UDP relay built from all of the above.
//!
//! # Layout
//!
//! - [`policy`] and [`queue`]: the producer/consumer policy tags and the
//!   intrusive queue family (SPSC, MPSC, SPMC, MPMC) and stack selected by
//!   them. No allocation, no locking on the SPSC/MPSC hot paths.
//! - [`io`]: the fixed 2048 byte `Io` control block and the pool that hands
//!   them out.
//! - [`service`] and [`worker`] (behind `os-poll`): the process-wide
//!   completion façade and the per-thread drain loop built on top of it.
//! - [`net`] (behind `net`): blocking basic sockets, address/endpoint value
//!   types, name resolution, and (behind `os-poll` as well) the async socket
//!   wrapper that submits operations through [`service`].
//! - [`relay`] (behind `relay`): the UDP relay scaffolding that exercises all
//!   of the above end to end.
//!
//! See each module's documentation for the contracts and invariants it
//! upholds; `DESIGN.md` in the repository root records what each part of
//! this crate is grounded on.

#[macro_use]
mod macros;

pub mod policy;
pub mod queue;

pub mod io;

#[cfg(feature = "os-poll")]
#[cfg_attr(docsrs, doc(cfg(feature = "os-poll")))]
pub mod service;

#[cfg(feature = "os-poll")]
#[cfg_attr(docsrs, doc(cfg(feature = "os-poll")))]
pub mod worker;

#[cfg(feature = "net")]
#[cfg_attr(docsrs, doc(cfg(feature = "net")))]
pub mod net;

#[cfg(feature = "relay")]
#[cfg_attr(docsrs, doc(cfg(feature = "relay")))]
pub mod relay;

mod sys;

pub use io::{Io, IoPool};
pub use policy::{Mpmc, Mpsc, Spmc, Spsc};

#[cfg(feature = "os-poll")]
pub use service::Service;
#[cfg(feature = "os-poll")]
pub use worker::Worker;
