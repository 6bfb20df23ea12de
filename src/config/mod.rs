mod app;
mod http;
mod logging;
mod probe;
mod stall;

pub use app::Config as AppConfig;
pub use http::Config as HttpConfig;
pub use logging::Config as LoggingConfig;
pub use logging::LogFormat;
pub use probe::Config as ProbeConfig;
pub use probe::Target as ProbeTarget;
pub use stall::Config as StallConfig;
