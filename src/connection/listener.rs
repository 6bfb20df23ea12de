use std::{fmt, io, net::SocketAddr, sync::Arc, time::Duration};

use axum::{extract::connect_info::Connected, serve::IncomingStream};
use tokio::{
    net::{TcpListener, ToSocketAddrs},
    time::sleep,
};
use tracing::{error, info};

use crate::{
    errors::{IoOperation, TransportError},
    AppError,
};

use super::{ConnectionRecorder, TimedStream};

/// Pause after a failed accept so a persistent error does not spin the loop
const ACCEPT_ERROR_DELAY: Duration = Duration::from_millis(100);

/// Remote address of a connection accepted by a [`TimedListener`].
///
/// Extract it with `ConnectInfo<PeerAddr>` in handlers served over the
/// timed listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddr(pub SocketAddr);

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Connected<IncomingStream<'_, TimedListener>> for PeerAddr {
    fn connect_info(stream: IncomingStream<'_, TimedListener>) -> Self {
        PeerAddr(*stream.remote_addr())
    }
}

/// TCP listener that records a start time for every accepted connection
#[derive(Debug)]
pub struct TimedListener {
    inner: TcpListener,
    recorder: Arc<ConnectionRecorder>,
}

impl TimedListener {
    pub fn new(inner: TcpListener, recorder: Arc<ConnectionRecorder>) -> Self {
        Self { inner, recorder }
    }

    pub async fn bind<A>(addr: A, recorder: Arc<ConnectionRecorder>) -> Result<Self, AppError>
    where
        A: ToSocketAddrs + std::fmt::Display,
    {
        let inner = TcpListener::bind(&addr).await.map_err(|e| {
            TransportError::io(
                IoOperation::Listen,
                format!("Failed to bind to address {}", addr),
                e,
            )
        })?;

        Ok(Self::new(inner, recorder))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn recorder(&self) -> &Arc<ConnectionRecorder> {
        &self.recorder
    }

    /// Wait for the next connection.
    ///
    /// Accept errors are logged and the listener keeps waiting, so this only
    /// ever yields an established connection.
    pub async fn accept(&mut self) -> (TimedStream, SocketAddr) {
        loop {
            match self.inner.accept().await {
                Ok((socket, peer)) => {
                    let guard = self.recorder.track(peer);
                    info!("New connection from {}", peer);
                    return (TimedStream::new(socket, guard), peer);
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                    sleep(ACCEPT_ERROR_DELAY).await;
                }
            }
        }
    }
}

impl axum::serve::Listener for TimedListener {
    type Io = TimedStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        TimedListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        TimedListener::local_addr(self)
    }
}
