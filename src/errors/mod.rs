mod app;
mod config;
mod connection;
mod init;
mod io_operation;
mod probe;
mod transport;

pub use app::AppError;
pub use config::ConfigValidationError;
pub use connection::ConnectionError;
pub use init::InitializationError;
pub use io_operation::IoOperation;
pub use probe::ProbeError;
pub use transport::TransportError;
