/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use ahash::AHashMap;
use log::{debug, warn};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::time::DelayQueue;

use crate::config::DispatcherConfig;
use crate::id::IdSource;
use crate::message::{DispatchCommand, QueryRequest};
use crate::pending::{Pending, PendingId, PendingIndex, QueryKey};
use crate::pool::{SocketPool, SocketSlot};
use crate::query::{QueryOutcome, QueryReply};
use crate::stats::DispatcherStats;
use crate::util::AddressFamily;

/// Attempts at a unique transaction id before the query is dropped.
const MAX_ID_RETRY: usize = 1000;

/// The dispatch task. Owns all dispatcher state; submit, reply and
/// timeout transitions all run serially on this one future.
pub(crate) struct DispatcherRuntime {
    batch_command_count: usize,
    pool: SocketPool,
    index: PendingIndex,
    pending: AHashMap<PendingId, Pending>,
    timers: DelayQueue<PendingId>,
    recv_buf: Box<[u8]>,
    id_source: Box<dyn IdSource + Send>,
    cmd_receiver: mpsc::UnboundedReceiver<DispatchCommand>,
    stats: Arc<DispatcherStats>,
}

impl DispatcherRuntime {
    pub(crate) fn new(
        config: &DispatcherConfig,
        pool: SocketPool,
        id_source: Box<dyn IdSource + Send>,
        cmd_receiver: mpsc::UnboundedReceiver<DispatchCommand>,
        stats: Arc<DispatcherStats>,
    ) -> Self {
        DispatcherRuntime {
            batch_command_count: config.batch_command_count,
            pool,
            index: PendingIndex::default(),
            pending: AHashMap::new(),
            timers: DelayQueue::new(),
            recv_buf: vec![0u8; config.recv_buffer_size].into_boxed_slice(),
            id_source,
            cmd_receiver,
            stats,
        }
    }

    fn handle_query(&mut self, req: Box<QueryRequest>) {
        let QueryRequest {
            pid,
            mut packet,
            peer,
            timeout,
            notifier,
        } = *req;

        self.stats.add_query_total();
        if packet.len() < 2 {
            debug!("query packet for {peer} too short for a transaction id");
            self.stats.add_query_closed();
            let _ = notifier.send(QueryOutcome::Closed);
            return;
        }

        // unique transaction id, patched into the wire packet
        let mut id = self.id_source.next_id();
        packet[..2].copy_from_slice(&id.to_be_bytes());
        let mut key = QueryKey::new(id, peer);
        let mut id_tries = 0;
        while !self.index.insert(key, pid) {
            id = self.id_source.next_id();
            packet[..2].copy_from_slice(&id.to_be_bytes());
            key = QueryKey::new(id, peer);
            self.stats.add_id_collision();
            id_tries += 1;
            if id_tries == MAX_ID_RETRY {
                warn!("failed to generate unique query id for {peer}, drop query");
                self.stats.add_query_closed();
                let _ = notifier.send(QueryOutcome::Closed);
                return;
            }
        }
        debug!("registered query id {id:#06x} for {peer}, {} in flight", self.index.len());

        let family = AddressFamily::from(&peer);
        let Some(slot) = self.pool.select(family) else {
            warn!("no {family} egress socket available for {peer}");
            self.index.remove(&key);
            self.stats.add_no_egress();
            self.stats.add_query_closed();
            let _ = notifier.send(QueryOutcome::Closed);
            return;
        };

        if let Err(e) = send_udp(self.pool.socket(slot), &packet, peer) {
            debug!("udp send to {peer} failed: {e}");
            self.index.remove(&key);
            self.stats.add_send_failed();
            self.stats.add_query_closed();
            let _ = notifier.send(QueryOutcome::Closed);
            return;
        }

        // the timer is armed after the send, so scheduling delay on the
        // send path does not stretch the measured round trip
        let timer = self.timers.insert(pid, timeout);
        self.pending.insert(
            pid,
            Pending {
                key,
                slot,
                timer,
                notifier,
            },
        );
    }

    fn handle_datagram(&mut self, slot: SocketSlot, peer: SocketAddr, len: usize) {
        if len < 2 {
            debug!("short datagram from {peer}, dropped");
            self.stats.add_reply_short();
            return;
        }
        let id = u16::from_be_bytes([self.recv_buf[0], self.recv_buf[1]]);
        let key = QueryKey::new(id, peer);

        let Some(pid) = self.index.get(&key) else {
            debug!("received unsolicited udp reply from {peer}, dropped");
            self.stats.add_reply_unsolicited();
            return;
        };
        match self.pending.get(&pid) {
            Some(p) => {
                if p.slot != slot {
                    debug!("reply id {id:#06x} from {peer} arrived on the wrong socket, dropped");
                    self.stats.add_reply_wrong_socket();
                    return;
                }
            }
            None => {
                self.index.remove(&key);
                return;
            }
        }

        self.index.remove(&key);
        if let Some(p) = self.pending.remove(&pid) {
            let _ = self.timers.try_remove(&p.timer);
            let payload = self.recv_buf[..len].to_vec();
            self.stats.add_query_answered();
            let _ = p.notifier.send(QueryOutcome::Answer(QueryReply { peer, payload }));
        }
    }

    fn handle_timeout(&mut self, pid: PendingId) {
        let Some(p) = self.pending.remove(&pid) else {
            return;
        };
        self.index.remove(&p.key);
        debug!("query id {:#06x} for {} timed out", p.key.id, p.key.peer);
        self.stats.add_query_timed_out();
        let _ = p.notifier.send(QueryOutcome::TimedOut);
    }

    fn handle_cancel(&mut self, pid: PendingId) {
        let Some(p) = self.pending.remove(&pid) else {
            return;
        };
        self.index.remove(&p.key);
        let _ = self.timers.try_remove(&p.timer);
        self.stats.add_query_canceled();
        // dropping the notifier ends the job without an outcome
    }

    /// Returns true on a quit command.
    fn handle_command(&mut self, cmd: DispatchCommand) -> bool {
        match cmd {
            DispatchCommand::Query(req) => {
                self.handle_query(req);
                false
            }
            DispatchCommand::Cancel(pid) => {
                self.handle_cancel(pid);
                false
            }
            DispatchCommand::Quit => true,
        }
    }

    /// Abandon every outstanding query. Notifiers are dropped unsent; the
    /// pool sockets close when the runtime itself is dropped.
    fn shutdown(&mut self) {
        self.timers.clear();
        self.index.clear();
        self.pending.clear();
    }

    fn poll_loop(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        loop {
            // commands, bounded per pass so inbound replies stay serviced
            let mut cmd_blocked = false;
            for _ in 0..self.batch_command_count {
                match self.cmd_receiver.poll_recv(cx) {
                    Poll::Pending => {
                        cmd_blocked = true;
                        break;
                    }
                    Poll::Ready(None) => {
                        self.shutdown();
                        return Poll::Ready(());
                    }
                    Poll::Ready(Some(cmd)) => {
                        if self.handle_command(cmd) {
                            self.shutdown();
                            return Poll::Ready(());
                        }
                    }
                }
            }

            // expired query timers
            while let Poll::Ready(Some(expired)) = self.timers.poll_expired(cx) {
                self.handle_timeout(expired.into_inner());
            }

            // inbound datagrams, received into the shared buffer
            loop {
                match self.pool.poll_recv_from(cx, &mut self.recv_buf) {
                    Poll::Pending => break,
                    Poll::Ready((slot, peer, len)) => self.handle_datagram(slot, peer, len),
                }
            }

            if cmd_blocked {
                return Poll::Pending;
            }
        }
    }
}

impl Future for DispatcherRuntime {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        (*self).poll_loop(cx)
    }
}

fn send_udp(socket: &UdpSocket, packet: &[u8], peer: SocketAddr) -> io::Result<()> {
    let n = socket.try_send_to(packet, peer)?;
    if n != packet.len() {
        return Err(io::Error::other(format!(
            "sent {n} of {} bytes",
            packet.len()
        )));
    }
    Ok(())
}
