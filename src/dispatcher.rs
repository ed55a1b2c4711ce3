/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::DispatcherConfig;
use crate::error::CreateError;
use crate::handle::DispatcherHandle;
use crate::id::{IdSource, SecureIdSource};
use crate::pool::SocketPool;
use crate::runtime::DispatcherRuntime;
use crate::stats::DispatcherStats;
use crate::util::AddressFamily;

pub struct DispatcherBuilder {
    config: DispatcherConfig,
    id_source: Option<Box<dyn IdSource + Send>>,
}

impl DispatcherBuilder {
    pub fn new(config: DispatcherConfig) -> Self {
        DispatcherBuilder {
            config,
            id_source: None,
        }
    }

    /// Replace the default entropy backed transaction id source.
    pub fn with_id_source(mut self, source: Box<dyn IdSource + Send>) -> Self {
        self.id_source = Some(source);
        self
    }

    /// Open the egress socket pool and spawn the dispatch task onto the
    /// current tokio runtime.
    pub fn build(self) -> Result<Dispatcher, CreateError> {
        let pool = SocketPool::new(&self.config)?;
        let udp4_addrs = pool.local_addrs(AddressFamily::Ipv4);
        let udp6_addrs = pool.local_addrs(AddressFamily::Ipv6);

        let stats = Arc::new(DispatcherStats::default());
        let id_source = self
            .id_source
            .unwrap_or_else(|| Box::new(SecureIdSource::new()));
        let (cmd_sender, cmd_receiver) = mpsc::unbounded_channel();
        let runtime = DispatcherRuntime::new(
            &self.config,
            pool,
            id_source,
            cmd_receiver,
            Arc::clone(&stats),
        );
        let runtime_handle = tokio::spawn(runtime);
        let handle = DispatcherHandle::new(cmd_sender, Arc::clone(&stats));

        Ok(Dispatcher {
            handle,
            udp4_addrs,
            udp6_addrs,
            stats,
            runtime_handle,
        })
    }
}

/// One outbound query dispatcher: a pool of randomly picked egress
/// sockets plus the registry correlating replies back to in-flight
/// queries. Instantiate one per worker; handles stay local to it.
pub struct Dispatcher {
    handle: DispatcherHandle,
    udp4_addrs: Vec<SocketAddr>,
    udp6_addrs: Vec<SocketAddr>,
    stats: Arc<DispatcherStats>,
    runtime_handle: JoinHandle<()>,
}

impl Dispatcher {
    pub fn get_handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }

    /// Local addresses of the bound IPv4 egress ports.
    pub fn udp4_addrs(&self) -> &[SocketAddr] {
        &self.udp4_addrs
    }

    /// Local addresses of the bound IPv6 egress ports.
    pub fn udp6_addrs(&self) -> &[SocketAddr] {
        &self.udp6_addrs
    }

    pub fn stats(&self) -> &Arc<DispatcherStats> {
        &self.stats
    }

    /// Stop the dispatch task and close every pool socket. Outstanding
    /// queries are abandoned without an outcome.
    pub async fn shutdown(self) {
        self.handle.quit();
        let _ = self.runtime_handle.await;
    }
}
