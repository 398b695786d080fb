//! Address value type (§4.6 / C7).
//!
//! A small tagged union over IPv4/IPv6, matching `sal::net::ip::address_t`.
//! Built directly on `std::net::IpAddr` rather than hand-rolling octet
//! storage — nothing about this crate's concurrency story touches address
//! representation, so there is no reason to diverge from the standard
//! library type here. `Display`/`FromStr` are supplemented beyond the
//! distilled specification since every other value type in this module
//! round-trips through text form (an endpoint, a socket's local address
//! printed in a log line, ...).

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An IPv4 or IPv6 address.
///
/// Ordered by family first (`V4` before `V6`, matching the derive's
/// declaration order) then by address bytes (§4.6), via `Ipv4Addr`'s/
/// `Ipv6Addr`'s own `Ord`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Address {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
}

impl Address {
    pub const fn is_v4(&self) -> bool {
        matches!(self, Address::V4(_))
    }

    pub const fn is_v6(&self) -> bool {
        matches!(self, Address::V6(_))
    }

    pub fn is_loopback(&self) -> bool {
        match self {
            Address::V4(a) => a.is_loopback(),
            Address::V6(a) => a.is_loopback(),
        }
    }

    pub fn is_unspecified(&self) -> bool {
        match self {
            Address::V4(a) => a.is_unspecified(),
            Address::V6(a) => a.is_unspecified(),
        }
    }
}

impl From<IpAddr> for Address {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(a) => Address::V4(a),
            IpAddr::V6(a) => Address::V6(a),
        }
    }
}

impl From<Address> for IpAddr {
    fn from(addr: Address) -> Self {
        match addr {
            Address::V4(a) => IpAddr::V4(a),
            Address::V6(a) => IpAddr::V6(a),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::V4(a) => write!(f, "{a}"),
            Address::V6(a) => write!(f, "{a}"),
        }
    }
}

impl FromStr for Address {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IpAddr::from_str(s).map(Address::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trips_through_from_str() {
        for text in ["127.0.0.1", "::1", "10.0.0.5", "fe80::1"] {
            let addr: Address = text.parse().unwrap();
            assert_eq!(addr.to_string().parse::<Address>().unwrap(), addr);
        }
    }

    #[test]
    fn loopback_detection() {
        assert!("127.0.0.1".parse::<Address>().unwrap().is_loopback());
        assert!("::1".parse::<Address>().unwrap().is_loopback());
        assert!(!"8.8.8.8".parse::<Address>().unwrap().is_loopback());
    }

    #[test]
    fn orders_by_family_then_bytes() {
        let v4_lo: Address = "1.0.0.0".parse().unwrap();
        let v4_hi: Address = "2.0.0.0".parse().unwrap();
        let v6: Address = "::1".parse().unwrap();
        assert!(v4_lo < v4_hi);
        assert!(v4_hi < v6, "every v4 address must sort before every v6 address");
    }
}
