use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigValidationError;

/// A single server the probe client measures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Target {
    /// Label printed before the measurement
    pub name: String,
    /// `host:port` to dial
    pub address: String,
}

impl Target {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// Configuration of the timing client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Value of the Host header in the request
    pub host: String,
    /// Timeout for establishing a connection
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Upper bound for the read phase, unbounded when unset
    #[serde(with = "humantime_serde")]
    pub read_timeout: Option<Duration>,
    /// Size of the buffer responses are drained into
    pub read_buffer_size: usize,
    /// Servers measured, in order
    pub targets: Vec<Target>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            connect_timeout: Duration::from_secs(5),
            read_timeout: None,
            read_buffer_size: 1024,
            targets: vec![
                Target::new("connect timeout", "localhost:8081"),
                Target::new("receive timeout", "localhost:8082"),
                Target::new("send timeout", "localhost:8083"),
            ],
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.host.is_empty() {
            return Err(ConfigValidationError::probe("host must not be empty"));
        }

        if self.connect_timeout.is_zero() {
            return Err(ConfigValidationError::probe(
                "connect_timeout cannot be 0",
            ));
        }

        if self.read_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigValidationError::probe("read_timeout cannot be 0"));
        }

        if self.read_buffer_size == 0 {
            return Err(ConfigValidationError::probe(
                "read_buffer_size cannot be 0",
            ));
        }

        if let Some(target) = self.targets.iter().find(|t| t.address.is_empty()) {
            return Err(ConfigValidationError::probe(format!(
                "target '{}' has an empty address",
                target.name
            )));
        }

        Ok(())
    }
}
