use std::{fmt, time::Duration};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::{timeout, Instant},
};
use tracing::{debug, info};

use crate::{
    config::{ProbeConfig, ProbeTarget},
    ProbeError,
};

/// How the read phase of a probe ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Peer closed the connection
    Eof,
    /// Read failed, e.g. the peer reset the connection
    Error(String),
    /// The configured read budget ran out first
    TimedOut,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eof => write!(f, "closed by peer"),
            Self::Error(e) => write!(f, "read error: {}", e),
            Self::TimedOut => write!(f, "read timeout"),
        }
    }
}

/// Outcome of measuring one target
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub target: ProbeTarget,
    /// Wall-clock time from dial start to the end of the read phase
    pub elapsed: Duration,
    pub bytes_read: usize,
    pub termination: Termination,
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Connection to {} closed after {:?}",
            self.target.address, self.elapsed
        )
    }
}

pub fn build_request(host: &str) -> String {
    format!("GET / HTTP/1.1\r\nHost: {}\r\n\r\n", host)
}

/// Measure how long a connection to `target` stays open.
///
/// Dial and write failures are errors. The read phase always ends with a
/// report, whatever stopped it.
pub async fn probe(target: &ProbeTarget, config: &ProbeConfig) -> Result<ProbeReport, ProbeError> {
    let start = Instant::now();

    let mut stream = match timeout(
        config.connect_timeout,
        TcpStream::connect(target.address.as_str()),
    )
    .await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            return Err(ProbeError::Connect {
                target: target.address.clone(),
                source: e,
            })
        }
        Err(_) => {
            return Err(ProbeError::ConnectTimeout {
                target: target.address.clone(),
                limit: config.connect_timeout,
            })
        }
    };
    debug!("Connected to {} after {:?}", target.address, start.elapsed());

    let request = build_request(&config.host);
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| ProbeError::Write {
            target: target.address.clone(),
            source: e,
        })?;

    let (termination, bytes_read) =
        drain(&mut stream, config.read_buffer_size, config.read_timeout).await;

    let report = ProbeReport {
        target: target.clone(),
        elapsed: start.elapsed(),
        bytes_read,
        termination,
    };
    debug!(
        "Probe of {} finished: {}, {} bytes",
        target.address, report.termination, report.bytes_read
    );

    Ok(report)
}

/// Read and discard until the connection ends or the budget runs out
async fn drain(
    stream: &mut TcpStream,
    buffer_size: usize,
    budget: Option<Duration>,
) -> (Termination, usize) {
    let mut buf = vec![0u8; buffer_size];
    let mut total = 0usize;

    let read_all = async {
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => return Termination::Eof,
                Ok(n) => total += n,
                Err(e) => return Termination::Error(e.to_string()),
            }
        }
    };

    let termination = match budget {
        Some(limit) => timeout(limit, read_all)
            .await
            .unwrap_or(Termination::TimedOut),
        None => read_all.await,
    };

    (termination, total)
}

/// Probe every configured target in order.
///
/// The first dial or write failure aborts the run and no reports are
/// returned.
pub async fn run_probes(config: &ProbeConfig) -> Result<Vec<ProbeReport>, ProbeError> {
    if config.targets.is_empty() {
        return Err(ProbeError::NoTargets);
    }

    let mut reports = Vec::with_capacity(config.targets.len());

    for target in &config.targets {
        println!("Testing {} server...", target.name);
        info!("Probing {} at {}", target.name, target.address);

        let report = probe(target, config).await?;
        println!("{}", report);
        reports.push(report);
    }

    Ok(reports)
}
