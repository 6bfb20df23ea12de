use std::time::Duration;

use thiserror::Error;

/// Failures that end a probe run. Read errors are not listed here: a failed
/// read is how a probed connection normally ends.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connecting to {target} timed out after {limit:?}")]
    ConnectTimeout { target: String, limit: Duration },

    #[error("Failed to send request to {target}: {source}")]
    Write {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No probe targets configured")]
    NoTargets,
}

impl ProbeError {
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Connect { target, .. }
            | Self::ConnectTimeout { target, .. }
            | Self::Write { target, .. } => Some(target),
            Self::NoTargets => None,
        }
    }
}
