/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::error::DispatchError;
use crate::message::{DispatchCommand, QueryRequest};
use crate::pending::PendingId;
use crate::query::QueryOutcome;
use crate::stats::DispatcherStats;

/// Cloneable submit surface of one dispatcher.
#[derive(Clone)]
pub struct DispatcherHandle {
    cmd_sender: mpsc::UnboundedSender<DispatchCommand>,
    id_seq: Arc<AtomicU64>,
    stats: Arc<DispatcherStats>,
}

impl DispatcherHandle {
    pub(crate) fn new(
        cmd_sender: mpsc::UnboundedSender<DispatchCommand>,
        stats: Arc<DispatcherStats>,
    ) -> Self {
        DispatcherHandle {
            cmd_sender,
            id_seq: Arc::new(AtomicU64::new(0)),
            stats,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cmd_sender.is_closed()
    }

    pub fn stats(&self) -> &Arc<DispatcherStats> {
        &self.stats
    }

    /// Queue one query for transmission. The packet buffer is owned by
    /// the dispatcher from here on; its transaction id field at bytes 0-1
    /// is rewritten before the datagram leaves.
    pub fn send_query(
        &self,
        packet: Vec<u8>,
        peer: SocketAddr,
        timeout: Duration,
    ) -> Result<QueryJob, DispatchError> {
        let pid = PendingId::new(self.id_seq.fetch_add(1, Ordering::Relaxed));
        let (rsp_sender, rsp_receiver) = oneshot::channel();
        let req = QueryRequest {
            pid,
            packet,
            peer,
            timeout,
            notifier: rsp_sender,
        };
        self.cmd_sender
            .send(DispatchCommand::Query(Box::new(req)))
            .map_err(|_| DispatchError::NotRunning)?;
        Ok(QueryJob {
            pid,
            rsp_receiver,
            cmd_sender: self.cmd_sender.clone(),
        })
    }

    pub(crate) fn quit(&self) {
        let _ = self.cmd_sender.send(DispatchCommand::Quit);
    }
}

/// One submitted query. Await [`recv`](QueryJob::recv) for the outcome,
/// or [`cancel`](QueryJob::cancel) to abandon it.
pub struct QueryJob {
    pid: PendingId,
    rsp_receiver: oneshot::Receiver<QueryOutcome>,
    cmd_sender: mpsc::UnboundedSender<DispatchCommand>,
}

impl QueryJob {
    /// Wait for the completion of this query. `Dropped` means the
    /// dispatcher abandoned the query on cancel or shutdown.
    pub async fn recv(self) -> Result<QueryOutcome, DispatchError> {
        self.rsp_receiver.await.map_err(|_| DispatchError::Dropped)
    }

    /// Abandon the query. No outcome is delivered.
    pub fn cancel(self) {
        let _ = self.cmd_sender.send(DispatchCommand::Cancel(self.pid));
    }
}
