/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::task::{Context, Poll};

use log::{debug, warn};
use socket2::{SockAddr, Socket, Type};
use tokio::io::ReadBuf;
use tokio::net::UdpSocket;

use crate::config::DispatcherConfig;
use crate::error::CreateError;
use crate::util::AddressFamily;

/// Identity of one bound socket in the egress pool. Indexing is stable
/// for the pool's lifetime.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct SocketSlot {
    pub(crate) family: AddressFamily,
    pub(crate) index: usize,
}

struct PoolSocket {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

/// Per-family arrays of bound UDP sockets that outgoing queries pick a
/// random emitter from.
pub(crate) struct SocketPool {
    udp4: Vec<PoolSocket>,
    udp6: Vec<PoolSocket>,
    /// Start offset of the next readiness scan.
    poll_next: usize,
}

impl SocketPool {
    /// Open the configured number of ports per family. Must be called
    /// within a tokio runtime. Any per-family shortfall drops the partial
    /// pool and fails the build.
    pub(crate) fn new(config: &DispatcherConfig) -> Result<Self, CreateError> {
        if !config.ipv4_enabled && !config.ipv6_enabled {
            return Err(CreateError::NoFamilyEnabled);
        }
        if config.ports_per_family == 0 {
            return Err(CreateError::NoPortsRequested);
        }

        let mut udp6 = Vec::new();
        let mut udp4 = Vec::new();
        // v6 ranges first, in case the second family fails
        if config.ipv6_enabled {
            for bind in config.family_bind_addrs(AddressFamily::Ipv6) {
                open_port_range(
                    &mut udp6,
                    AddressFamily::Ipv6,
                    bind,
                    config.ports_per_family,
                    config.base_port,
                );
            }
            let requested = config.expected_ports(AddressFamily::Ipv6);
            if udp6.len() != requested {
                return Err(CreateError::PortShortfall {
                    family: AddressFamily::Ipv6,
                    bound: udp6.len(),
                    requested,
                });
            }
        }
        if config.ipv4_enabled {
            for bind in config.family_bind_addrs(AddressFamily::Ipv4) {
                open_port_range(
                    &mut udp4,
                    AddressFamily::Ipv4,
                    bind,
                    config.ports_per_family,
                    config.base_port,
                );
            }
            let requested = config.expected_ports(AddressFamily::Ipv4);
            if udp4.len() != requested {
                return Err(CreateError::PortShortfall {
                    family: AddressFamily::Ipv4,
                    bound: udp4.len(),
                    requested,
                });
            }
        }

        Ok(SocketPool {
            udp4,
            udp6,
            poll_next: 0,
        })
    }

    fn slots(&self, family: AddressFamily) -> &[PoolSocket] {
        match family {
            AddressFamily::Ipv4 => &self.udp4,
            AddressFamily::Ipv6 => &self.udp6,
        }
    }

    /// Pick a uniformly random egress socket of the given family. None if
    /// the family has no open ports.
    pub(crate) fn select(&self, family: AddressFamily) -> Option<SocketSlot> {
        let n = self.slots(family).len();
        if n == 0 {
            return None;
        }
        Some(SocketSlot {
            family,
            index: fastrand::usize(..n),
        })
    }

    pub(crate) fn socket(&self, slot: SocketSlot) -> &UdpSocket {
        &self.slots(slot.family)[slot.index].socket
    }

    pub(crate) fn local_addrs(&self, family: AddressFamily) -> Vec<SocketAddr> {
        self.slots(family).iter().map(|s| s.local_addr).collect()
    }

    fn slot_at(&self, i: usize) -> (SocketSlot, &PoolSocket) {
        if i < self.udp4.len() {
            (
                SocketSlot {
                    family: AddressFamily::Ipv4,
                    index: i,
                },
                &self.udp4[i],
            )
        } else {
            let index = i - self.udp4.len();
            (
                SocketSlot {
                    family: AddressFamily::Ipv6,
                    index,
                },
                &self.udp6[index],
            )
        }
    }

    /// Poll every pool socket for an inbound datagram, receiving into
    /// `buf`, the receive buffer shared across the pool. The scan starts
    /// one past the slot served last so a busy socket cannot starve the
    /// others.
    pub(crate) fn poll_recv_from(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<(SocketSlot, SocketAddr, usize)> {
        let total = self.udp4.len() + self.udp6.len();
        if total == 0 {
            return Poll::Pending;
        }
        for offset in 0..total {
            let i = (self.poll_next + offset) % total;
            let (slot, ps) = self.slot_at(i);
            let mut rb = ReadBuf::new(buf);
            match ps.socket.poll_recv_from(cx, &mut rb) {
                Poll::Pending => {}
                Poll::Ready(Ok(peer)) => {
                    self.poll_next = (i + 1) % total;
                    return Poll::Ready((slot, peer, rb.filled().len()));
                }
                Poll::Ready(Err(e)) => {
                    debug!("udp recv error on {}: {e}", ps.local_addr);
                }
            }
        }
        Poll::Pending
    }
}

/// Try to open `num_ports` sockets on one bind address, appending the
/// successes. Bind failures are skipped; with a base port the port number
/// keeps incrementing between attempts.
fn open_port_range(
    slots: &mut Vec<PoolSocket>,
    family: AddressFamily,
    bind: Option<IpAddr>,
    num_ports: usize,
    base_port: Option<u16>,
) {
    let bind_ip = bind.unwrap_or(match family {
        AddressFamily::Ipv4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        AddressFamily::Ipv6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    });
    let mut port_hint = base_port;
    for _ in 0..num_ports {
        let port = match port_hint {
            Some(p) => {
                port_hint = Some(p.wrapping_add(1));
                p
            }
            None => 0,
        };
        match open_udp_port(family, SocketAddr::new(bind_ip, port)) {
            Ok(s) => slots.push(s),
            Err(e) => {
                warn!("failed to bind udp egress socket on {bind_ip} port {port}: {e}");
            }
        }
    }
}

fn open_udp_port(family: AddressFamily, bind_addr: SocketAddr) -> io::Result<PoolSocket> {
    let socket = new_nonblocking_udp_socket(family)?;
    socket.bind(&SockAddr::from(bind_addr))?;
    let socket = UdpSocket::from_std(std::net::UdpSocket::from(socket))?;
    let local_addr = socket.local_addr()?;
    Ok(PoolSocket { socket, local_addr })
}

#[cfg(any(windows, target_os = "macos"))]
fn new_nonblocking_udp_socket(family: AddressFamily) -> io::Result<Socket> {
    let socket = Socket::new(family.into(), Type::DGRAM, None)?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

#[cfg(not(any(windows, target_os = "macos")))]
fn new_nonblocking_udp_socket(family: AddressFamily) -> io::Result<Socket> {
    Socket::new(family.into(), Type::DGRAM.nonblocking(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::runtime::Builder;

    fn v4_loopback_config(ports: usize) -> DispatcherConfig {
        DispatcherConfig {
            bind_addrs: vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
            ports_per_family: ports,
            ipv4_enabled: true,
            ipv6_enabled: false,
            ..Default::default()
        }
    }

    #[test]
    fn bind_loopback_range() {
        let rt = Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let pool = SocketPool::new(&v4_loopback_config(4)).unwrap();
            assert_eq!(pool.local_addrs(AddressFamily::Ipv4).len(), 4);
            assert!(pool.local_addrs(AddressFamily::Ipv6).is_empty());
            for addr in pool.local_addrs(AddressFamily::Ipv4) {
                assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
                assert_ne!(addr.port(), 0);
            }
        });
    }

    #[test]
    fn select_follows_family() {
        let rt = Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let pool = SocketPool::new(&v4_loopback_config(4)).unwrap();
            for _ in 0..64 {
                let slot = pool.select(AddressFamily::Ipv4).unwrap();
                assert_eq!(slot.family, AddressFamily::Ipv4);
                assert!(slot.index < 4);
            }
            assert!(pool.select(AddressFamily::Ipv6).is_none());
        });
    }

    #[test]
    fn rejects_empty_config() {
        let rt = Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let config = DispatcherConfig {
                ipv4_enabled: false,
                ipv6_enabled: false,
                ..Default::default()
            };
            assert!(matches!(
                SocketPool::new(&config),
                Err(CreateError::NoFamilyEnabled)
            ));

            let config = DispatcherConfig {
                ports_per_family: 0,
                ipv6_enabled: false,
                ..Default::default()
            };
            assert!(matches!(
                SocketPool::new(&config),
                Err(CreateError::NoPortsRequested)
            ));
        });
    }

    #[test]
    fn shortfall_on_taken_port() {
        let rt = Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let blocker = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
            let mut config = v4_loopback_config(4);
            config.base_port = Some(blocker.local_addr().unwrap().port());
            match SocketPool::new(&config) {
                Err(CreateError::PortShortfall {
                    family,
                    bound,
                    requested,
                }) => {
                    assert_eq!(family, AddressFamily::Ipv4);
                    assert_eq!(requested, 4);
                    assert!(bound < 4);
                }
                Err(e) => panic!("unexpected error: {e}"),
                Ok(_) => panic!("pool build should fail"),
            }
        });
    }
}
