use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigValidationError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP configuration error: {0}")]
    Http(String),

    #[error("Stall configuration error: {0}")]
    Stall(String),

    #[error("Probe configuration error: {0}")]
    Probe(String),
}

impl ConfigValidationError {
    pub fn config(details: impl Into<String>) -> Self {
        Self::Config(details.into())
    }

    pub fn http(details: impl Into<String>) -> Self {
        Self::Http(details.into())
    }

    pub fn stall(details: impl Into<String>) -> Self {
        Self::Stall(details.into())
    }

    pub fn probe(details: impl Into<String>) -> Self {
        Self::Probe(details.into())
    }
}
