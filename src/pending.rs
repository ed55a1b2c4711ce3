/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::cmp::Ordering;
use std::collections::{btree_map, BTreeMap};
use std::net::{IpAddr, SocketAddr};

use tokio::sync::oneshot;
use tokio_util::time::delay_queue;

use crate::pool::SocketSlot;
use crate::query::QueryOutcome;
use crate::util::AddressFamily;

/// Handle to one in-flight query. Ids are allocated once per submit and
/// never reused, so a stale timer or cancel reference cannot alias a
/// later query.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub(crate) struct PendingId(u64);

impl PendingId {
    pub(crate) fn new(v: u64) -> Self {
        PendingId(v)
    }
}

/// Lookup key of one in-flight query.
///
/// Keys order by id, then address byte length, then family, then port,
/// then raw address octets. Flow label and scope id of IPv6 peers are not
/// part of the identity.
#[derive(Clone, Copy, Debug)]
pub(crate) struct QueryKey {
    pub(crate) id: u16,
    pub(crate) peer: SocketAddr,
}

impl QueryKey {
    pub(crate) fn new(id: u16, peer: SocketAddr) -> Self {
        QueryKey { id, peer }
    }

    fn octets_cmp(a: &SocketAddr, b: &SocketAddr) -> Ordering {
        match (a.ip(), b.ip()) {
            (IpAddr::V4(a), IpAddr::V4(b)) => a.octets().cmp(&b.octets()),
            (IpAddr::V6(a), IpAddr::V6(b)) => a.octets().cmp(&b.octets()),
            // mixed families already order by length and family
            _ => Ordering::Equal,
        }
    }
}

impl Ord for QueryKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let f1 = AddressFamily::from(&self.peer);
        let f2 = AddressFamily::from(&other.peer);
        self.id
            .cmp(&other.id)
            .then_with(|| f1.addr_len().cmp(&f2.addr_len()))
            .then_with(|| f1.cmp(&f2))
            .then_with(|| self.peer.port().cmp(&other.peer.port()))
            .then_with(|| Self::octets_cmp(&self.peer, &other.peer))
    }
}

impl PartialOrd for QueryKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueryKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueryKey {}

/// One in-flight query awaiting its reply or timeout.
pub(crate) struct Pending {
    pub(crate) key: QueryKey,
    /// The egress socket the query left on. Replies arriving on any other
    /// socket are not accepted for this query.
    pub(crate) slot: SocketSlot,
    pub(crate) timer: delay_queue::Key,
    pub(crate) notifier: oneshot::Sender<QueryOutcome>,
}

/// Ordered index of in-flight queries. Keys are unique: a colliding
/// insert leaves the index unchanged.
#[derive(Default)]
pub(crate) struct PendingIndex {
    tree: BTreeMap<QueryKey, PendingId>,
}

impl PendingIndex {
    pub(crate) fn insert(&mut self, key: QueryKey, pid: PendingId) -> bool {
        match self.tree.entry(key) {
            btree_map::Entry::Occupied(_) => false,
            btree_map::Entry::Vacant(v) => {
                v.insert(pid);
                true
            }
        }
    }

    pub(crate) fn get(&self, key: &QueryKey) -> Option<PendingId> {
        self.tree.get(key).copied()
    }

    pub(crate) fn remove(&mut self, key: &QueryKey) -> Option<PendingId> {
        self.tree.remove(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.tree.len()
    }

    pub(crate) fn clear(&mut self) {
        self.tree.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv6Addr, SocketAddrV6};
    use std::str::FromStr;

    fn key(id: u16, addr: &str) -> QueryKey {
        QueryKey::new(id, SocketAddr::from_str(addr).unwrap())
    }

    #[test]
    fn key_order_id_first() {
        assert!(key(1, "203.0.113.9:53") < key(2, "192.0.2.1:53"));
        assert!(key(2, "192.0.2.1:53") > key(1, "203.0.113.9:53"));
    }

    #[test]
    fn key_order_v4_before_v6() {
        assert!(key(7, "255.255.255.255:65535") < key(7, "[::]:0"));
    }

    #[test]
    fn key_order_port_then_addr() {
        assert!(key(7, "192.0.2.1:53") < key(7, "192.0.2.1:5353"));
        assert!(key(7, "192.0.2.1:53") < key(7, "192.0.2.2:53"));
        assert!(key(7, "[2001:db8::1]:53") < key(7, "[2001:db8::2]:53"));
    }

    #[test]
    fn key_ignores_scope_id() {
        let ip = Ipv6Addr::from_str("fe80::1").unwrap();
        let a = QueryKey::new(7, SocketAddr::V6(SocketAddrV6::new(ip, 53, 0, 1)));
        let b = QueryKey::new(7, SocketAddr::V6(SocketAddrV6::new(ip, 53, 0, 2)));
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn index_rejects_duplicate_keys() {
        let mut index = PendingIndex::default();
        let k = key(7, "192.0.2.1:53");
        assert!(index.insert(k, PendingId::new(1)));
        assert!(!index.insert(k, PendingId::new(2)));
        assert_eq!(index.get(&k), Some(PendingId::new(1)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn index_remove() {
        let mut index = PendingIndex::default();
        let k1 = key(7, "192.0.2.1:53");
        let k2 = key(7, "192.0.2.1:54");
        assert!(index.insert(k1, PendingId::new(1)));
        assert!(index.insert(k2, PendingId::new(2)));
        assert_eq!(index.remove(&k1), Some(PendingId::new(1)));
        assert_eq!(index.get(&k1), None);
        assert_eq!(index.get(&k2), Some(PendingId::new(2)));
        assert_eq!(index.remove(&k1), None);
    }

    #[test]
    fn index_clear() {
        let mut index = PendingIndex::default();
        let mut addr = SocketAddr::from_str("192.0.2.1:0").unwrap();
        for port in 0..16u16 {
            addr.set_port(port);
            assert!(index.insert(QueryKey::new(7, addr), PendingId::new(port as u64)));
        }
        assert_eq!(index.len(), 16);
        index.clear();
        assert_eq!(index.len(), 0);
    }
}
