/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::IpAddr;

use crate::util::AddressFamily;

const DEFAULT_PORTS_PER_FAMILY: usize = 16;
const DEFAULT_BATCH_COMMAND_COUNT: usize = 10;

/// Default size for the UDP receive buffer as recommended by
/// [RFC6891](https://datatracker.ietf.org/doc/html/rfc6891#section-6.2.5).
const DEFAULT_RECV_BUFFER_SIZE: usize = 4_096;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DispatcherConfig {
    /// Local addresses to open egress ports on. Empty means a wildcard
    /// bind per enabled family.
    pub bind_addrs: Vec<IpAddr>,
    /// Number of ports to open per bind address of each family.
    pub ports_per_family: usize,
    pub ipv4_enabled: bool,
    pub ipv6_enabled: bool,
    /// First port of each range. None lets the OS pick ephemeral ports.
    pub base_port: Option<u16>,
    /// Size of the receive buffer shared by all pool sockets.
    pub recv_buffer_size: usize,
    /// Commands handled per event loop pass before sockets and timers are
    /// polled again.
    pub batch_command_count: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            bind_addrs: Vec::new(),
            ports_per_family: DEFAULT_PORTS_PER_FAMILY,
            ipv4_enabled: true,
            ipv6_enabled: true,
            base_port: None,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            batch_command_count: DEFAULT_BATCH_COMMAND_COUNT,
        }
    }
}

impl DispatcherConfig {
    /// Bind addresses of one family, with None standing in for the
    /// family's wildcard when no addresses are configured at all.
    pub(crate) fn family_bind_addrs(&self, family: AddressFamily) -> Vec<Option<IpAddr>> {
        if self.bind_addrs.is_empty() {
            return vec![None];
        }
        self.bind_addrs
            .iter()
            .filter(|ip| AddressFamily::from(*ip) == family)
            .map(|ip| Some(*ip))
            .collect()
    }

    pub(crate) fn expected_ports(&self, family: AddressFamily) -> usize {
        self.family_bind_addrs(family).len() * self.ports_per_family
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn bind_addr_partition() {
        let config = DispatcherConfig::default();
        assert_eq!(config.family_bind_addrs(AddressFamily::Ipv4), vec![None]);
        assert_eq!(config.family_bind_addrs(AddressFamily::Ipv6), vec![None]);

        let config = DispatcherConfig {
            bind_addrs: vec![
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(Ipv6Addr::LOCALHOST),
                IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)),
            ],
            ..Default::default()
        };
        assert_eq!(config.family_bind_addrs(AddressFamily::Ipv4).len(), 2);
        assert_eq!(config.family_bind_addrs(AddressFamily::Ipv6).len(), 1);
        assert_eq!(
            config.expected_ports(AddressFamily::Ipv4),
            2 * config.ports_per_family
        );
    }

    #[test]
    fn single_family_bind_list() {
        let config = DispatcherConfig {
            bind_addrs: vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
            ..Default::default()
        };
        assert!(config.family_bind_addrs(AddressFamily::Ipv6).is_empty());
        assert_eq!(config.expected_ports(AddressFamily::Ipv6), 0);
    }
}
