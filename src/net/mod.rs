//! Network value types and socket wrappers (§4.6 / C6, C7).
//!
//! [`address`]/[`endpoint`]/[`resolver`] provide the value types every
//! socket type here is addressed through; [`tcp`]/[`udp`] are blocking
//! wrappers over `std::net`; [`async_socket`]/[`async_tcp`] (behind
//! `os-poll`, since they submit operations through a
//! [`Service`](crate::service::Service)) are the non-blocking UDP and TCP
//! wrappers built on top of them.

mod address;
mod endpoint;
mod resolver;
mod tcp;
mod udp;

#[cfg(feature = "os-poll")]
#[cfg_attr(docsrs, doc(cfg(feature = "os-poll")))]
mod async_socket;

#[cfg(feature = "os-poll")]
#[cfg_attr(docsrs, doc(cfg(feature = "os-poll")))]
mod async_tcp;

#[cfg(all(feature = "os-poll", unix))]
pub(crate) mod registration;

pub use address::Address;
pub use endpoint::{Endpoint, Protocol};
pub use resolver::{resolve, resolve_host};
pub use tcp::{BasicTcpListener, BasicTcpStream};
pub use udp::BasicUdpSocket;

#[cfg(feature = "os-poll")]
pub use async_socket::{AsyncUdpSocket, ReceiveFromResult, SendToResult};

#[cfg(feature = "os-poll")]
pub use async_tcp::{AcceptResult, AsyncTcpListener, AsyncTcpStream, ConnectResult};
