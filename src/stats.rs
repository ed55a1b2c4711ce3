/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters of one dispatcher. Shared between the dispatch task
/// and every handle.
#[derive(Default)]
pub struct DispatcherStats {
    query_total: AtomicU64,
    query_answered: AtomicU64,
    query_timed_out: AtomicU64,
    query_closed: AtomicU64,
    query_canceled: AtomicU64,
    id_collision: AtomicU64,
    no_egress: AtomicU64,
    send_failed: AtomicU64,
    reply_unsolicited: AtomicU64,
    reply_wrong_socket: AtomicU64,
    reply_short: AtomicU64,
}

impl DispatcherStats {
    pub(crate) fn add_query_total(&self) {
        self.query_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_query_answered(&self) {
        self.query_answered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_query_timed_out(&self) {
        self.query_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_query_closed(&self) {
        self.query_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_query_canceled(&self) {
        self.query_canceled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_id_collision(&self) {
        self.id_collision.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_no_egress(&self) {
        self.no_egress.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_send_failed(&self) {
        self.send_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_reply_unsolicited(&self) {
        self.reply_unsolicited.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_reply_wrong_socket(&self) {
        self.reply_wrong_socket.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_reply_short(&self) {
        self.reply_short.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatcherSnapshot {
        DispatcherSnapshot {
            query_total: self.query_total.load(Ordering::Relaxed),
            query_answered: self.query_answered.load(Ordering::Relaxed),
            query_timed_out: self.query_timed_out.load(Ordering::Relaxed),
            query_closed: self.query_closed.load(Ordering::Relaxed),
            query_canceled: self.query_canceled.load(Ordering::Relaxed),
            id_collision: self.id_collision.load(Ordering::Relaxed),
            no_egress: self.no_egress.load(Ordering::Relaxed),
            send_failed: self.send_failed.load(Ordering::Relaxed),
            reply_unsolicited: self.reply_unsolicited.load(Ordering::Relaxed),
            reply_wrong_socket: self.reply_wrong_socket.load(Ordering::Relaxed),
            reply_short: self.reply_short.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DispatcherSnapshot {
    pub query_total: u64,
    pub query_answered: u64,
    pub query_timed_out: u64,
    pub query_closed: u64,
    pub query_canceled: u64,
    pub id_collision: u64,
    pub no_egress: u64,
    pub send_failed: u64,
    pub reply_unsolicited: u64,
    pub reply_wrong_socket: u64,
    pub reply_short: u64,
}
