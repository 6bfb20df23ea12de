use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Invalid connection state: {0}")]
    InvalidState(String),

    #[error("Connection disconnected")]
    Disconnected,
}

impl ConnectionError {
    pub fn invalid_state(details: impl Into<String>) -> Self {
        ConnectionError::InvalidState(details.into())
    }
}
