use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigValidationError, StallMode};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Start the stall simulators
    pub enabled: bool,
    /// Address every stall listener binds to
    pub bind_addr: String,
    /// Port of the listener that never accepts
    pub connect_port: u16,
    /// Port of the listener that answers with a partial response
    pub receive_port: u16,
    /// Port of the listener that never answers
    pub send_port: u16,
    /// How long a stalled connection is held open
    #[serde(with = "humantime_serde")]
    pub stall_duration: Duration,
    /// Size of the single read performed before stalling
    pub read_buffer_size: usize,
    /// Listen backlog of the never-accepting listener
    pub connect_backlog: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: "0.0.0.0".to_string(),
            connect_port: 8081,
            receive_port: 8082,
            send_port: 8083,
            stall_duration: Duration::from_secs(30 * 60),
            read_buffer_size: 1024,
            connect_backlog: 16,
        }
    }
}

impl Config {
    pub fn port(&self, mode: StallMode) -> u16 {
        match mode {
            StallMode::Connect => self.connect_port,
            StallMode::Receive => self.receive_port,
            StallMode::Send => self.send_port,
        }
    }

    pub fn address(&self, mode: StallMode) -> String {
        format!("{}:{}", self.bind_addr, self.port(mode))
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !self.enabled {
            return Ok(());
        }

        if self.bind_addr.is_empty() {
            return Err(ConfigValidationError::stall("bind_addr must not be empty"));
        }

        if self.stall_duration.is_zero() {
            return Err(ConfigValidationError::stall("stall_duration cannot be 0"));
        }

        if self.read_buffer_size == 0 {
            return Err(ConfigValidationError::stall("read_buffer_size cannot be 0"));
        }

        if self.connect_backlog <= 0 {
            return Err(ConfigValidationError::stall(format!(
                "connect_backlog must be positive, got {}",
                self.connect_backlog
            )));
        }

        let ports = [self.connect_port, self.receive_port, self.send_port];
        for (i, port) in ports.iter().enumerate() {
            if *port != 0 && ports[i + 1..].contains(port) {
                return Err(ConfigValidationError::stall(format!(
                    "port {} is assigned to more than one stall mode",
                    port
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_ports_rejected() {
        let config = Config {
            receive_port: 9000,
            send_port: 9000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ephemeral_ports_allowed() {
        let config = Config {
            connect_port: 0,
            receive_port: 0,
            send_port: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_address_per_mode() {
        let config = Config::default();
        assert_eq!(config.address(StallMode::Connect), "0.0.0.0:8081");
        assert_eq!(config.address(StallMode::Receive), "0.0.0.0:8082");
        assert_eq!(config.address(StallMode::Send), "0.0.0.0:8083");
    }
}
