use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::{
    connection::{ConnectionRecorder, PeerAddr, TimedListener},
    errors::{IoOperation, TransportError},
    AppError,
};

pub const GREETING: &str = "Hello, World!\n";

type HookState = Arc<ConnectionRecorder>;

async fn greeting_handler() -> impl IntoResponse {
    // Ending the connection after the reply lets a raw client read to EOF
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CONNECTION, "close"),
        ],
        GREETING,
    )
}

/// Logs how long the connection carrying a request has been open.
///
/// Only reads the record. The listener owns its lifetime, so a record created
/// here would never be finished.
async fn connection_hook(
    State(recorder): State<HookState>,
    ConnectInfo(PeerAddr(addr)): ConnectInfo<PeerAddr>,
    request: Request,
    next: Next,
) -> Response {
    match recorder.elapsed(&addr) {
        Some(duration) => {
            info!("Request from {}, connection duration: {:?}", addr, duration)
        }
        None => debug!("Request from {} without a connection record", addr),
    }

    next.run(request).await
}

pub fn router(recorder: HookState) -> Router {
    Router::new().route("/", get(greeting_handler)).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn_with_state(recorder, connection_hook)),
    )
}

pub async fn start_http_server(
    listener: TimedListener,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), AppError> {
    let addr = listener.local_addr()?;
    let app = router(Arc::clone(listener.recorder()));

    info!("HTTP server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<PeerAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown_rx.recv().await;
        info!("HTTP server shutting down");
    })
    .await
    .map_err(|e| {
        TransportError::io(
            IoOperation::Accept,
            format!("HTTP server on {} failed", addr),
            e,
        )
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::connect_info::MockConnectInfo};
    use std::{net::SocketAddr, time::Duration};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpStream,
        time::{sleep, timeout},
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_greeting_route() {
        let recorder = Arc::new(ConnectionRecorder::new());
        let addr: SocketAddr = "127.0.0.1:4321".parse().unwrap();
        let app = router(Arc::clone(&recorder)).layer(MockConnectInfo(PeerAddr(addr)));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONNECTION], "close");

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], GREETING.as_bytes());

        // The hook never creates records it cannot finish
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_hook_keeps_listener_timestamp() {
        let recorder = Arc::new(ConnectionRecorder::new());
        let addr: SocketAddr = "127.0.0.1:4321".parse().unwrap();
        let guard = recorder.track(addr);
        let first = recorder.started_at(&addr).unwrap();

        sleep(Duration::from_millis(10)).await;

        let app = router(Arc::clone(&recorder)).layer(MockConnectInfo(PeerAddr(addr)));
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        assert_eq!(recorder.started_at(&addr), Some(first));
        assert_eq!(recorder.len(), 1);

        drop(guard);
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let recorder = Arc::new(ConnectionRecorder::new());
        let addr: SocketAddr = "127.0.0.1:4321".parse().unwrap();
        let app = router(recorder).layer(MockConnectInfo(PeerAddr(addr)));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_http_server_over_timed_listener() {
        let recorder = Arc::new(ConnectionRecorder::new());
        let listener = TimedListener::bind("127.0.0.1:0", Arc::clone(&recorder))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let server = tokio::spawn(start_http_server(listener, shutdown_rx));

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        let mut response = Vec::new();
        timeout(Duration::from_secs(2), client.read_to_end(&mut response))
            .await
            .expect("Server should close the connection after replying")
            .unwrap();

        let response = String::from_utf8_lossy(&response);
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{}", response);
        assert!(response.ends_with(GREETING), "{}", response);

        sleep(Duration::from_millis(50)).await;
        assert!(recorder.is_empty(), "Leaked: {:?}", recorder.snapshot());

        shutdown_tx.send(()).unwrap();
        timeout(Duration::from_secs(2), server)
            .await
            .expect("HTTP server should stop on shutdown")
            .unwrap()
            .unwrap();
    }
}
