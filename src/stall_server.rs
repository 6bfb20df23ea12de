use std::{fmt, net::SocketAddr, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::broadcast,
    time::sleep,
};
use tracing::{debug, error, info, Instrument};

use crate::{
    config::StallConfig,
    connection::{ConnectionRecorder, TimedListener, TimedStream},
    errors::{ConnectionError, IoOperation, TransportError},
    generate_connection_id, AppError,
};

/// Start of a response that is never completed
pub const PARTIAL_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\n";

/// Protocol phase at which a stall listener stops making progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StallMode {
    /// Connection is held without reading or writing anything
    Connect,
    /// Request is read, a partial response is written, then nothing
    Receive,
    /// Request is read and never answered
    Send,
}

impl StallMode {
    pub const ALL: [StallMode; 3] = [StallMode::Connect, StallMode::Receive, StallMode::Send];
}

impl fmt::Display for StallMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Receive => write!(f, "receive"),
            Self::Send => write!(f, "send"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct StallSettings {
    stall_duration: Duration,
    read_buffer_size: usize,
}

/// Listener that holds connections open without ever completing a response
#[derive(Debug)]
pub struct StallServer {
    mode: StallMode,
    listener: TimedListener,
    settings: StallSettings,
}

impl StallServer {
    /// Bind the listener for `mode` on `addr`
    pub async fn bind(
        mode: StallMode,
        addr: &str,
        config: &StallConfig,
        recorder: Arc<ConnectionRecorder>,
    ) -> Result<Self, AppError> {
        let listener = match mode {
            StallMode::Connect => {
                let inner = bind_with_backlog(addr, config.connect_backlog).await?;
                TimedListener::new(inner, recorder)
            }
            StallMode::Receive | StallMode::Send => TimedListener::bind(addr, recorder).await?,
        };

        let server = Self {
            mode,
            listener,
            settings: StallSettings {
                stall_duration: config.stall_duration,
                read_buffer_size: config.read_buffer_size,
            },
        };

        info!(
            "TCP server simulating {} timeout listening on {}",
            mode,
            server.local_addr()?
        );

        Ok(server)
    }

    pub fn mode(&self) -> StallMode {
        self.mode
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        self.listener.local_addr().map_err(|e| {
            AppError::Transport(TransportError::io(
                IoOperation::Control,
                "Failed to get local address",
                e,
            ))
        })
    }

    /// Serve until a shutdown signal arrives.
    ///
    /// Every accepted connection is handled on its own task. A failing
    /// connection only ends its own task.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), AppError> {
        let mode = self.mode;
        let settings = self.settings;
        let mut listener = self.listener;

        loop {
            tokio::select! {
                (stream, peer) = listener.accept() => {
                    let shutdown_rx = shutdown_rx.resubscribe();
                    let span = tracing::info_span!(
                        "stall_connection",
                        %peer,
                        connection_id = %generate_connection_id(),
                        mode = %mode
                    );

                    tokio::spawn(
                        async move {
                            match handle_stall(mode, stream, settings, shutdown_rx).await {
                                Ok(()) => {}
                                Err(AppError::Connection(ConnectionError::Disconnected)) => {
                                    info!("Client {} disconnected before sending data", peer);
                                }
                                Err(e) => error!("Connection error: {}", e),
                            }
                        }
                        .instrument(span),
                    );
                }
                _ = shutdown_rx.recv() => {
                    debug!("{} stall listener received shutdown signal", mode);
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn bind_with_backlog(addr: &str, backlog: i32) -> Result<TcpListener, AppError> {
    let bind_error = |e: std::io::Error| {
        AppError::Transport(TransportError::io(
            IoOperation::Listen,
            format!("Failed to bind to address {}", addr),
            e,
        ))
    };

    let socket_addr = tokio::net::lookup_host(addr)
        .await
        .map_err(bind_error)?
        .next()
        .ok_or_else(|| {
            bind_error(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "address resolved to nothing",
            ))
        })?;

    let socket = Socket::new(
        Domain::for_address(socket_addr),
        Type::STREAM,
        Some(Protocol::TCP),
    )
    .map_err(bind_error)?;
    socket.set_reuse_address(true).map_err(bind_error)?;
    socket.bind(&socket_addr.into()).map_err(bind_error)?;
    socket.listen(backlog).map_err(bind_error)?;
    socket.set_nonblocking(true).map_err(bind_error)?;

    TcpListener::from_std(socket.into()).map_err(bind_error)
}

async fn handle_stall(
    mode: StallMode,
    mut stream: TimedStream,
    settings: StallSettings,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), AppError> {
    let peer = stream.peer_addr();
    info!("Connection established, simulating {} timeout...", mode);

    // A connect stall never looks at the request
    if mode != StallMode::Connect {
        let mut buf = vec![0u8; settings.read_buffer_size];
        let n = stream.read(&mut buf).await.map_err(|e| {
            TransportError::io(
                IoOperation::Read,
                format!("Error reading from connection {}", peer),
                e,
            )
        })?;

        if n == 0 {
            return Err(ConnectionError::Disconnected.into());
        }
        debug!("Received {} bytes from {}", n, peer);
    }

    if mode == StallMode::Receive {
        stream.write_all(PARTIAL_RESPONSE).await.map_err(|e| {
            TransportError::io(
                IoOperation::Write,
                format!("Error writing partial response to {}", peer),
                e,
            )
        })?;
    }

    tokio::select! {
        _ = sleep(settings.stall_duration) => {
            debug!("Stall of {:?} elapsed for {}", settings.stall_duration, peer);
        }
        _ = shutdown_rx.recv() => {
            debug!("Stall for {} interrupted by shutdown", peer);
        }
    }

    stream.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{
        net::TcpStream,
        time::{timeout, Instant},
    };

    fn test_config(stall_duration: Duration) -> StallConfig {
        StallConfig {
            stall_duration,
            ..Default::default()
        }
    }

    async fn start(
        mode: StallMode,
        stall_duration: Duration,
    ) -> (
        SocketAddr,
        Arc<ConnectionRecorder>,
        broadcast::Sender<()>,
        tokio::task::JoinHandle<Result<(), AppError>>,
    ) {
        let recorder = Arc::new(ConnectionRecorder::new());
        let server = StallServer::bind(
            mode,
            "127.0.0.1:0",
            &test_config(stall_duration),
            Arc::clone(&recorder),
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(server.run(shutdown_rx));
        (addr, recorder, shutdown_tx, handle)
    }

    #[tokio::test]
    async fn test_send_stall_holds_connection() {
        let stall = Duration::from_millis(300);
        let (addr, recorder, shutdown_tx, handle) = start(StallMode::Send, stall).await;

        let start = Instant::now();
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();

        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();

        assert!(start.elapsed() >= stall, "Closed after {:?}", start.elapsed());
        assert!(buf.is_empty(), "Send stall must not answer");

        sleep(Duration::from_millis(50)).await;
        assert!(recorder.is_empty());

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_receive_stall_sends_partial_response() {
        let stall = Duration::from_millis(300);
        let (addr, _recorder, shutdown_tx, handle) = start(StallMode::Receive, stall).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();

        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, PARTIAL_RESPONSE);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_record_open_while_stalled() {
        let (addr, recorder, shutdown_tx, handle) =
            start(StallMode::Send, Duration::from_secs(60)).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        let client_addr = client.local_addr().unwrap();
        client.write_all(b"hello").await.unwrap();

        sleep(Duration::from_millis(100)).await;
        assert!(recorder.started_at(&client_addr).is_some());

        // Shutdown cuts the stall short and closes the connection
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();

        let mut buf = Vec::new();
        timeout(Duration::from_secs(2), client.read_to_end(&mut buf))
            .await
            .expect("Connection should close on shutdown")
            .unwrap();

        sleep(Duration::from_millis(50)).await;
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_early_disconnect_finishes_record() {
        let (addr, recorder, shutdown_tx, handle) =
            start(StallMode::Send, Duration::from_secs(60)).await;

        let client = TcpStream::connect(addr).await.unwrap();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(recorder.len(), 1);

        drop(client);
        sleep(Duration::from_millis(100)).await;
        assert!(recorder.is_empty());

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_connect_stall_holds_then_closes() {
        let stall = Duration::from_millis(200);
        let (addr, recorder, shutdown_tx, handle) = start(StallMode::Connect, stall).await;

        let start = Instant::now();
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();

        let mut buf = [0u8; 16];
        let early = timeout(Duration::from_millis(100), client.read(&mut buf)).await;
        assert!(early.is_err(), "Connect stall must not answer");
        assert_eq!(recorder.len(), 1);

        // The unread request may turn the close into a reset
        let mut rest = Vec::new();
        let _ = timeout(Duration::from_secs(2), client.read_to_end(&mut rest))
            .await
            .expect("Connect stall should close after the stall duration");
        assert!(start.elapsed() >= stall, "Closed after {:?}", start.elapsed());
        assert!(rest.is_empty());

        sleep(Duration::from_millis(50)).await;
        assert!(recorder.is_empty());

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[test]
    fn test_mode_display() {
        let names: Vec<_> = StallMode::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(names, ["connect", "receive", "send"]);
    }
}
