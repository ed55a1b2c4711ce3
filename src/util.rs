/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use socket2::Domain;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    /// Byte size of a raw address of this family.
    pub const fn addr_len(&self) -> usize {
        match self {
            AddressFamily::Ipv4 => 4,
            AddressFamily::Ipv6 => 16,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "Ipv4"),
            AddressFamily::Ipv6 => write!(f, "Ipv6"),
        }
    }
}

impl From<AddressFamily> for Domain {
    fn from(v: AddressFamily) -> Self {
        match v {
            AddressFamily::Ipv4 => Domain::IPV4,
            AddressFamily::Ipv6 => Domain::IPV6,
        }
    }
}

impl From<&IpAddr> for AddressFamily {
    fn from(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }
}

impl From<&SocketAddr> for AddressFamily {
    fn from(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(_) => AddressFamily::Ipv4,
            SocketAddr::V6(_) => AddressFamily::Ipv6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn family_of_addr() {
        let v4 = SocketAddr::from_str("192.0.2.1:53").unwrap();
        assert_eq!(AddressFamily::from(&v4), AddressFamily::Ipv4);
        assert_eq!(AddressFamily::from(&v4).addr_len(), 4);

        let v6 = SocketAddr::from_str("[2001:db8::1]:53").unwrap();
        assert_eq!(AddressFamily::from(&v6), AddressFamily::Ipv6);
        assert_eq!(AddressFamily::from(&v6).addr_len(), 16);
    }
}
