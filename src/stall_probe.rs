use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, error, info, warn};

use crate::{
    config::AppConfig,
    connection::{ConnectionRecorder, TimedListener},
    errors::ConnectionError,
    http_server::start_http_server,
    AppError, StallMode, StallServer,
};

/// How often the number of open connection records is logged
const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Upper bound for tasks to finish after a shutdown signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Greeting server plus stall simulators sharing one connection recorder
pub struct StallProbe {
    config: AppConfig,
    recorder: Arc<ConnectionRecorder>,
    shutdown: broadcast::Sender<()>,
    main_shutdown: watch::Sender<bool>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    bound: Mutex<Vec<(String, SocketAddr)>>,
}

impl StallProbe {
    pub fn new(config: AppConfig) -> Result<Self, AppError> {
        // Validate the config first
        AppConfig::validate(&config)?;

        let (main_shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            recorder: Arc::new(ConnectionRecorder::new()),
            shutdown: broadcast::channel(1).0,
            main_shutdown,
            tasks: Arc::new(Mutex::new(Vec::new())),
            bound: Mutex::new(Vec::new()),
        })
    }

    pub fn recorder(&self) -> &Arc<ConnectionRecorder> {
        &self.recorder
    }

    /// Local addresses of the listeners started so far, by name
    pub async fn bound_addrs(&self) -> Vec<(String, SocketAddr)> {
        self.bound.lock().await.clone()
    }

    async fn spawn_task<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(future);
        debug!("Spawned {} task: {:?}", name, task.id());

        self.tasks.lock().await.push(task);
    }

    async fn spawn_listener<F>(&self, name: String, addr: SocketAddr, future: F)
    where
        F: Future<Output = Result<(), AppError>> + Send + 'static,
    {
        self.bound.lock().await.push((name.clone(), addr));

        let main_shutdown = self.main_shutdown.clone();
        let task_name = name.clone();
        self.spawn_task(&task_name, async move {
            if let Err(e) = future.await {
                error!("{} listener failed: {}", name, e);
                let _ = main_shutdown.send(true);
            }
        })
        .await;
    }

    /// Bind every enabled listener and serve until shutdown.
    ///
    /// Bind failures are returned before anything is served. A listener that
    /// fails later stops the whole service.
    pub async fn run(self: Arc<Self>) -> Result<(), AppError> {
        // Subscribe before anything can signal
        let mut shutdown_rx = self.main_shutdown.subscribe();

        if self.config.http.enabled {
            let addr = self.config.http.address();
            let listener = TimedListener::bind(addr.as_str(), Arc::clone(&self.recorder)).await?;
            let local = listener.local_addr()?;
            let http_shutdown = self.shutdown.subscribe();

            self.spawn_listener("http".to_string(), local, async move {
                start_http_server(listener, http_shutdown).await
            })
            .await;
        }

        if self.config.stall.enabled {
            for mode in StallMode::ALL {
                let addr = self.config.stall.address(mode);
                let server = StallServer::bind(
                    mode,
                    &addr,
                    &self.config.stall,
                    Arc::clone(&self.recorder),
                )
                .await?;
                let local = server.local_addr()?;
                let stall_shutdown = self.shutdown.subscribe();

                let name = format!("{}-stall", server.mode());
                self.spawn_listener(name, local, server.run(stall_shutdown))
                    .await;
            }
        }

        // Periodically log open connections
        let recorder = Arc::clone(&self.recorder);
        let mut stats_shutdown = self.shutdown.subscribe();

        self.spawn_task("stats", async move {
            loop {
                tokio::select! {
                    _ = sleep(STATS_INTERVAL) => {
                        let open = recorder.snapshot();
                        match open.first() {
                            Some((addr, age)) => info!(
                                "{} open connections, oldest {} open for {:?}",
                                open.len(), addr, age
                            ),
                            None => debug!("No open connections"),
                        }
                    }
                    _ = stats_shutdown.recv() => {
                        debug!("Stats task received shutdown signal");
                        break;
                    }
                }
            }
        })
        .await;

        if !*shutdown_rx.borrow_and_update() {
            let _ = shutdown_rx.changed().await;
        }
        info!("Main loop received shutdown signal");

        Ok(())
    }

    /// Graceful shutdown
    pub async fn shutdown(&self) -> Result<(), AppError> {
        info!("Initiating graceful shutdown");

        let _ = self.main_shutdown.send(true);

        // 1. Log initial state
        info!("Current state: {} open connections", self.recorder.len());

        // 2. Sending shutdown signal to all tasks
        info!("Sending shutdown signal to tasks");
        if self.shutdown.receiver_count() > 0 {
            self.shutdown.send(()).map_err(|e| {
                AppError::Connection(ConnectionError::invalid_state(format!(
                    "Failed to send shutdown signal: {}",
                    e
                )))
            })?;
        }

        // 3. Waiting for all tasks to complete
        info!("Waiting for tasks to complete");
        let tasks = {
            let mut tasks_guard = self.tasks.lock().await;
            tasks_guard.drain(..).collect::<Vec<_>>()
        };

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, futures::future::join_all(tasks)).await {
            Ok(results) => {
                let mut failed = 0;
                for (i, result) in results.into_iter().enumerate() {
                    if let Err(e) = result {
                        error!("Task {} failed during shutdown: {}", i, e);
                        failed += 1;
                    }
                }
                if failed > 0 {
                    error!("{} tasks failed during shutdown", failed);
                } else {
                    info!("All tasks completed successfully");
                }
            }
            Err(_) => {
                error!(
                    "Timeout waiting for tasks to complete after {:?}",
                    SHUTDOWN_TIMEOUT
                );
            }
        }

        // 4. Connections still held by stall tasks
        for (addr, age) in self.recorder.snapshot() {
            warn!("Connection from {} still open after {:?}", addr, age);
        }

        info!("Shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{HttpConfig, ProbeConfig, ProbeTarget, StallConfig},
        probe::{run_probes, Termination},
    };

    fn ephemeral_config() -> AppConfig {
        AppConfig {
            http: HttpConfig {
                bind_addr: "127.0.0.1".to_string(),
                bind_port: 0,
                ..Default::default()
            },
            stall: StallConfig {
                bind_addr: "127.0.0.1".to_string(),
                connect_port: 0,
                receive_port: 0,
                send_port: 0,
                stall_duration: Duration::from_millis(300),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    async fn wait_for_listeners(probe: &StallProbe, count: usize) -> Vec<(String, SocketAddr)> {
        for _ in 0..100 {
            let bound = probe.bound_addrs().await;
            if bound.len() == count {
                return bound;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("Listeners did not start");
    }

    #[tokio::test]
    async fn test_stall_probe_shutdown() {
        let probe = StallProbe::new(AppConfig::default()).unwrap();

        assert!(probe.shutdown().await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = AppConfig::default();
        config.stall.read_buffer_size = 0;

        assert!(matches!(StallProbe::new(config), Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_serve_and_probe() {
        let server = Arc::new(StallProbe::new(ephemeral_config()).unwrap());
        let runner = tokio::spawn(Arc::clone(&server).run());

        let bound = wait_for_listeners(&server, 4).await;
        let addr_of = |name: &str| {
            bound
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, addr)| addr.to_string())
                .unwrap()
        };

        let config = ProbeConfig {
            read_timeout: Some(Duration::from_secs(2)),
            targets: vec![
                ProbeTarget::new("greeting", addr_of("http")),
                ProbeTarget::new("send timeout", addr_of("send-stall")),
                ProbeTarget::new("receive timeout", addr_of("receive-stall")),
            ],
            ..Default::default()
        };

        let reports = run_probes(&config).await.unwrap();
        assert_eq!(reports.len(), 3);
        assert!(reports[0].elapsed < Duration::from_secs(1));
        assert!(reports[1].elapsed >= Duration::from_millis(300));
        assert!(reports[2].elapsed >= Duration::from_millis(300));
        assert!(reports
            .iter()
            .all(|report| report.termination == Termination::Eof));

        sleep(Duration::from_millis(50)).await;
        assert!(server.recorder().is_empty());

        server.shutdown().await.unwrap();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_fails_run() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = ephemeral_config();
        config.http.bind_port = taken.local_addr().unwrap().port();

        let server = Arc::new(StallProbe::new(config).unwrap());
        assert!(server.run().await.is_err());
    }
}
