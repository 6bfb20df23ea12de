use thiserror::Error;

use super::IoOperation;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {operation} failed on {details}")]
    Io {
        operation: IoOperation,
        details: String,
        #[source]
        source: std::io::Error,
    },
}

impl TransportError {
    pub fn io(
        operation: IoOperation,
        details: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        TransportError::Io {
            operation,
            details: details.into(),
            source,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io {
            operation: match err.kind() {
                std::io::ErrorKind::TimedOut => IoOperation::Read,
                std::io::ErrorKind::WouldBlock => IoOperation::Read,
                std::io::ErrorKind::UnexpectedEof => IoOperation::Read,
                std::io::ErrorKind::WriteZero => IoOperation::Write,
                std::io::ErrorKind::BrokenPipe => IoOperation::Write,
                std::io::ErrorKind::AddrInUse => IoOperation::Listen,
                std::io::ErrorKind::AddrNotAvailable => IoOperation::Listen,
                _ => IoOperation::Control,
            },
            details: err.to_string(),
            source: err,
        }
    }
}
