use thiserror::Error;

use super::{
    ConfigValidationError, ConnectionError, InitializationError, ProbeError, TransportError,
};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigValidationError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("Initialization error: {0}")]
    Init(#[from] InitializationError),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(ConfigValidationError::config(err.to_string()))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(TransportError::from(err))
    }
}
