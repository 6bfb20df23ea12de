use std::{net::SocketAddr, sync::Arc, time::Duration};

use dashmap::{mapref::entry::Entry, DashMap};
use tokio::time::Instant;
use tracing::{debug, info, trace};

use super::ConnectionGuard;

/// Start times of open connections, keyed by remote address.
///
/// One recorder is built per process and shared by every listener and
/// request hook that needs to attribute a lifetime to a connection. The map
/// is sharded, so connections from unrelated peers never contend on a single
/// lock.
#[derive(Debug, Default)]
pub struct Recorder {
    records: DashMap<SocketAddr, Instant>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the current time for `addr` unless a record already exists.
    ///
    /// Returns `true` when a new record was created. An existing record keeps
    /// its original timestamp.
    pub fn record_start(&self, addr: SocketAddr) -> bool {
        match self.records.entry(addr) {
            Entry::Occupied(_) => {
                trace!("Connection from {} already recorded", addr);
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(Instant::now());
                trace!("Recorded connection start for {}", addr);
                true
            }
        }
    }

    /// Start record with an RAII guard that finishes it on close
    pub fn track(self: &Arc<Self>, addr: SocketAddr) -> ConnectionGuard {
        self.record_start(addr);
        ConnectionGuard::new(Arc::clone(self), addr)
    }

    pub fn started_at(&self, addr: &SocketAddr) -> Option<Instant> {
        self.records.get(addr).map(|entry| *entry.value())
    }

    pub fn elapsed(&self, addr: &SocketAddr) -> Option<Duration> {
        self.started_at(addr).map(|start| start.elapsed())
    }

    /// Remove the record for `addr` and report how long it was open.
    ///
    /// A missing record is not an error: the connection was never recorded
    /// or has already been finished.
    pub fn finish(&self, addr: SocketAddr) -> Option<Duration> {
        match self.records.remove(&addr) {
            Some((_, start)) => {
                let duration = start.elapsed();
                info!("Connection from {} closed after {:?}", addr, duration);
                Some(duration)
            }
            None => {
                debug!("No open connection record for {}", addr);
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Open connections with their current age, oldest first
    pub fn snapshot(&self) -> Vec<(SocketAddr, Duration)> {
        let mut open: Vec<_> = self
            .records
            .iter()
            .map(|entry| (*entry.key(), entry.value().elapsed()))
            .collect();
        open.sort_by(|a, b| b.1.cmp(&a.1));
        open
    }
}
