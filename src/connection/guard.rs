use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::debug;

use super::ConnectionRecorder;

/// RAII guard for the connection record
#[derive(Debug)]
pub struct ConnectionGuard {
    recorder: Arc<ConnectionRecorder>,
    addr: SocketAddr,
    closed: bool,
}

impl ConnectionGuard {
    pub(super) fn new(recorder: Arc<ConnectionRecorder>, addr: SocketAddr) -> Self {
        Self {
            recorder,
            addr,
            closed: false,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Finish the record now instead of waiting for the drop
    pub fn close(&mut self) -> Option<Duration> {
        if self.closed {
            return None;
        }
        self.closed = true;

        debug!("Closing connection from {}", self.addr);
        self.recorder.finish(self.addr)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.close();
    }
}
