//! Basic (blocking) UDP socket wrapper (§4.6 / C7).

use std::io;
use std::net::UdpSocket;

use super::endpoint::Endpoint;

/// A blocking UDP socket, addressed through [`Endpoint`].
pub struct BasicUdpSocket {
    inner: UdpSocket,
}

impl BasicUdpSocket {
    pub fn bind(endpoint: Endpoint) -> io::Result<Self> {
        Ok(Self {
            inner: UdpSocket::bind(endpoint.to_socket_addr())?,
        })
    }

    pub fn connect(&self, endpoint: Endpoint) -> io::Result<()> {
        self.inner.connect(endpoint.to_socket_addr())
    }

    pub fn local_endpoint(&self) -> io::Result<Endpoint> {
        Ok(Endpoint::udp(self.inner.local_addr()?))
    }

    pub fn send_to(&self, buf: &[u8], endpoint: Endpoint) -> io::Result<usize> {
        self.inner.send_to(buf, endpoint.to_socket_addr())
    }

    pub fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, Endpoint)> {
        let (n, addr) = self.inner.recv_from(buf)?;
        Ok((n, Endpoint::udp(addr)))
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.inner.set_nonblocking(nonblocking)
    }

    pub(crate) fn inner(&self) -> &UdpSocket {
        &self.inner
    }
}
