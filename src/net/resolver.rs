//! Blocking name resolution (§4.6 / C7), supplementing the distilled
//! specification over `std::net::ToSocketAddrs` rather than hand-rolling a
//! resolver — the C original's blocking `getaddrinfo` wrapper has no
//! idiomatic Rust equivalent worth reimplementing when the standard
//! library already resolves `"host:port"` strings the same way.

use std::io;
use std::net::ToSocketAddrs;

use super::endpoint::{Endpoint, Protocol};

/// Resolve `host_port` (e.g. `"example.com:443"`) to every endpoint it maps
/// to, tagged with `protocol`. Blocks the calling thread.
pub fn resolve(host_port: &str, protocol: Protocol) -> io::Result<Vec<Endpoint>> {
    let addrs = host_port.to_socket_addrs()?;
    Ok(addrs
        .map(|addr| Endpoint::new(addr.ip().into(), addr.port(), protocol))
        .collect())
}

/// Resolve `host` against `port`, tagged with `protocol`.
pub fn resolve_host(host: &str, port: u16, protocol: Protocol) -> io::Result<Vec<Endpoint>> {
    resolve(&format!("{host}:{port}"), protocol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_numeric_address_without_touching_dns() {
        let endpoints = resolve("127.0.0.1:9", Protocol::Tcp).unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].port(), 9);
        assert!(endpoints[0].address().is_loopback());
    }
}
