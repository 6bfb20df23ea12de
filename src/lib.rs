pub mod config;
pub mod connection;
pub mod errors;
pub mod http_server;
pub mod logging;
pub mod probe;
pub mod stall_probe;
pub mod stall_server;
mod utils;

pub use config::{AppConfig, HttpConfig, LoggingConfig, ProbeConfig, ProbeTarget, StallConfig};
pub use connection::{ConnectionGuard, ConnectionRecorder, PeerAddr, TimedListener, TimedStream};
pub use errors::{
    AppError, ConfigValidationError, ConnectionError, InitializationError, IoOperation,
    ProbeError, TransportError,
};
pub use logging::setup_logging;
pub use probe::{probe, run_probes, ProbeReport, Termination};
pub use stall_probe::StallProbe;
pub use stall_server::{StallMode, StallServer};
pub use utils::generate_connection_id;
