//! Basic (blocking) TCP socket wrapper (§4.6 / C7).

use std::io;
use std::net::{TcpListener, TcpStream};

use super::endpoint::Endpoint;

/// A blocking TCP listener, addressed through [`Endpoint`] rather than
/// `std::net::SocketAddr` directly so callers stay in this crate's value
/// types end to end.
pub struct BasicTcpListener {
    inner: TcpListener,
}

impl BasicTcpListener {
    pub fn bind(endpoint: Endpoint) -> io::Result<Self> {
        Ok(Self {
            inner: TcpListener::bind(endpoint.to_socket_addr())?,
        })
    }

    pub fn local_endpoint(&self) -> io::Result<Endpoint> {
        Ok(Endpoint::tcp(self.inner.local_addr()?))
    }

    pub fn accept(&self) -> io::Result<(BasicTcpStream, Endpoint)> {
        let (stream, addr) = self.inner.accept()?;
        Ok((BasicTcpStream { inner: stream }, Endpoint::tcp(addr)))
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.inner.set_nonblocking(nonblocking)
    }

    pub(crate) fn inner(&self) -> &TcpListener {
        &self.inner
    }
}

/// A blocking TCP stream.
pub struct BasicTcpStream {
    inner: TcpStream,
}

impl BasicTcpStream {
    pub fn connect(endpoint: Endpoint) -> io::Result<Self> {
        Ok(Self {
            inner: TcpStream::connect(endpoint.to_socket_addr())?,
        })
    }

    pub(crate) fn from_std(inner: TcpStream) -> Self {
        Self { inner }
    }

    pub fn local_endpoint(&self) -> io::Result<Endpoint> {
        Ok(Endpoint::tcp(self.inner.local_addr()?))
    }

    pub fn peer_endpoint(&self) -> io::Result<Endpoint> {
        Ok(Endpoint::tcp(self.inner.peer_addr()?))
    }

    pub fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        self.inner.set_nodelay(nodelay)
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.inner.set_nonblocking(nonblocking)
    }

    pub(crate) fn inner(&self) -> &TcpStream {
        &self.inner
    }

    /// Read through a shared reference, as `&TcpStream` allows (sockets
    /// tolerate concurrent read/write from the same handle). Used by the
    /// async wrapper, which only ever holds `&self` behind an `Arc`.
    pub(crate) fn read_shared(&self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut &self.inner, buf)
    }

    /// Write through a shared reference, see [`BasicTcpStream::read_shared`].
    pub(crate) fn write_shared(&self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut &self.inner, buf)
    }
}

impl io::Read for BasicTcpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut self.inner, buf)
    }
}

impl io::Write for BasicTcpStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut self.inner, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut self.inner)
    }
}
