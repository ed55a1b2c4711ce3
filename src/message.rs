/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::pending::PendingId;
use crate::query::QueryOutcome;

pub(crate) struct QueryRequest {
    pub(crate) pid: PendingId,
    /// Prepared DNS packet. The transaction id field at bytes 0-1 is
    /// rewritten before the datagram is sent.
    pub(crate) packet: Vec<u8>,
    pub(crate) peer: SocketAddr,
    pub(crate) timeout: Duration,
    pub(crate) notifier: oneshot::Sender<QueryOutcome>,
}

pub(crate) enum DispatchCommand {
    Query(Box<QueryRequest>),
    Cancel(PendingId),
    Quit,
}
