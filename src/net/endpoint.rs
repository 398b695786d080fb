//! Endpoint value type (§4.6 / C7): an address, a port, and which
//! protocol family it belongs to.

use std::cmp::Ordering;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use super::address::Address;

/// Which protocol an [`Endpoint`] is meaningful for.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// An `(address, port)` pair tagged with the protocol it is used with,
/// matching `sal::net::ip::basic_endpoint_t<Protocol>`.
///
/// `Ord`/`PartialOrd` (and [`Endpoint::compare`]) order by family, then
/// address bytes, then port, per §4.6 — the derive's field order
/// (`address`, `port`, `protocol`) matches that, with `protocol` only
/// breaking ties the spec doesn't otherwise mention, which `Ord` still
/// needs to stay consistent with `Eq` over all fields.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Endpoint {
    address: Address,
    port: u16,
    protocol: Protocol,
}

impl Endpoint {
    pub const fn new(address: Address, port: u16, protocol: Protocol) -> Self {
        Self {
            address,
            port,
            protocol,
        }
    }

    pub const fn address(&self) -> Address {
        self.address
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn to_socket_addr(self) -> SocketAddr {
        SocketAddr::new(self.address.into(), self.port)
    }

    pub fn tcp(addr: SocketAddr) -> Self {
        Self::new(addr.ip().into(), addr.port(), Protocol::Tcp)
    }

    pub fn udp(addr: SocketAddr) -> Self {
        Self::new(addr.ip().into(), addr.port(), Protocol::Udp)
    }

    /// Orders by family, then address bytes, then port (§4.6).
    pub fn compare(&self, other: &Self) -> Ordering {
        self.address
            .cmp(&other.address)
            .then_with(|| self.port.cmp(&other.port))
            .then_with(|| self.protocol.cmp(&other.protocol))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.is_v6() {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = std::net::AddrParseError;

    /// Parses `"host:port"` as UDP; use [`Endpoint::tcp`] to retag a
    /// parsed endpoint for TCP use.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SocketAddr::from_str(s).map(Self::udp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_display_has_no_brackets() {
        let ep: Endpoint = "127.0.0.1:8080".parse().unwrap();
        assert_eq!(ep.to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn v6_display_has_brackets() {
        let ep: Endpoint = "[::1]:8080".parse().unwrap();
        assert_eq!(ep.to_string(), "[::1]:8080");
    }

    #[test]
    fn compare_orders_family_then_bytes_then_port() {
        let v4_low_port: Endpoint = "10.0.0.1:80".parse().unwrap();
        let v4_high_port: Endpoint = "10.0.0.1:443".parse().unwrap();
        let v4_high_addr: Endpoint = "10.0.0.2:80".parse().unwrap();
        let v6: Endpoint = "[::1]:80".parse().unwrap();

        assert_eq!(v4_low_port.compare(&v4_high_port), std::cmp::Ordering::Less);
        assert_eq!(v4_low_port.compare(&v4_high_addr), std::cmp::Ordering::Less);
        assert_eq!(v4_high_addr.compare(&v6), std::cmp::Ordering::Less);
        assert!(v4_low_port < v4_high_port);
        assert!(v4_high_addr < v6);
    }
}
