use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use config::{
    builder::DefaultState, Config as ConfigBuilder, ConfigError, Environment, File, FileFormat,
};

use super::{HttpConfig, LoggingConfig, ProbeConfig, StallConfig};

/// Main application configuration
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Greeting HTTP server configuration
    #[serde(default)]
    pub http: HttpConfig,

    /// Stall simulator configuration
    #[serde(default)]
    pub stall: StallConfig,

    /// Timing client configuration
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Default configuration directory
    pub const CONFIG_DIR: &'static str = "config";

    /// Environment variable prefix
    const ENV_PREFIX: &'static str = "STALL_PROBE";

    /// Build configuration using the following priority (highest to lowest):
    /// 1. Environment variables (STALL_PROBE_<SECTION>__<KEY>)
    /// 2. Local configuration file (config/local.yaml)
    /// 3. Environment specific file (config/{env}.yaml)
    /// 4. Default configuration (config/default.yaml)
    /// 5. Built-in defaults
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_dir(Self::CONFIG_DIR)
    }

    /// Same layering as [`Config::new`], rooted at `dir`
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let environment = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Self::builder_with_defaults()?
            // Load default config file
            .add_source(
                File::new(&dir.join("default").to_string_lossy(), FileFormat::Yaml)
                    .required(false),
            )
            // Load environment specific config
            .add_source(
                File::new(&dir.join(&environment).to_string_lossy(), FileFormat::Yaml)
                    .required(false),
            )
            // Load local overrides
            .add_source(
                File::new(&dir.join("local").to_string_lossy(), FileFormat::Yaml)
                    .required(false),
            )
            .add_source(Self::environment())
            .build()?;

        // Deserialize and validate
        let config = config.try_deserialize()?;
        Self::validate(&config)?;

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn from_file(path: PathBuf) -> Result<Self, ConfigError> {
        let config = Self::builder_with_defaults()?
            // Load the specified config file
            .add_source(File::from(path))
            // Add env vars as overrides
            .add_source(Self::environment())
            .build()?;

        let config = config.try_deserialize()?;
        Self::validate(&config)?;

        Ok(config)
    }

    fn builder_with_defaults() -> Result<config::builder::ConfigBuilder<DefaultState>, ConfigError> {
        let defaults = Config::default();

        // Set defaults for each field manually
        let builder = ConfigBuilder::builder()
            // HTTP configuration
            .set_default("http.enabled", defaults.http.enabled)?
            .set_default("http.bind_addr", defaults.http.bind_addr)?
            .set_default("http.bind_port", i64::from(defaults.http.bind_port))?
            // Stall configuration
            .set_default("stall.enabled", defaults.stall.enabled)?
            .set_default("stall.bind_addr", defaults.stall.bind_addr)?
            .set_default("stall.connect_port", i64::from(defaults.stall.connect_port))?
            .set_default("stall.receive_port", i64::from(defaults.stall.receive_port))?
            .set_default("stall.send_port", i64::from(defaults.stall.send_port))?
            .set_default(
                "stall.stall_duration",
                format!("{}s", defaults.stall.stall_duration.as_secs()),
            )?
            .set_default(
                "stall.read_buffer_size",
                defaults.stall.read_buffer_size as i64,
            )?
            .set_default(
                "stall.connect_backlog",
                i64::from(defaults.stall.connect_backlog),
            )?
            // Probe configuration
            .set_default("probe.host", defaults.probe.host)?
            .set_default(
                "probe.connect_timeout",
                format!("{}s", defaults.probe.connect_timeout.as_secs()),
            )?
            .set_default(
                "probe.read_buffer_size",
                defaults.probe.read_buffer_size as i64,
            )?
            // Logging configuration
            .set_default("logging.trace_connections", defaults.logging.trace_connections)?
            .set_default("logging.level", defaults.logging.level)?
            .set_default("logging.format", defaults.logging.format.to_string())?
            .set_default(
                "logging.include_location",
                defaults.logging.include_location,
            )?
            .set_default("logging.thread_ids", defaults.logging.thread_ids)?
            .set_default("logging.thread_names", defaults.logging.thread_names)?;

        Ok(builder)
    }

    fn environment() -> Environment {
        Environment::with_prefix(Self::ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    /// Validate configuration
    pub fn validate(config: &Self) -> Result<(), ConfigError> {
        // Helper to convert validation errors
        fn validation_error(err: impl std::fmt::Display) -> ConfigError {
            ConfigError::Message(err.to_string())
        }

        config.http.validate().map_err(validation_error)?;
        config.stall.validate().map_err(validation_error)?;
        config.probe.validate().map_err(validation_error)?;
        config.logging.validate().map_err(validation_error)?;

        if config.http.enabled && config.stall.enabled && config.http.bind_port != 0 {
            let port = config.http.bind_port;
            if [
                config.stall.connect_port,
                config.stall.receive_port,
                config.stall.send_port,
            ]
            .contains(&port)
            {
                return Err(validation_error(format!(
                    "HTTP port {} collides with a stall listener port",
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
    use serial_test::serial;
    use std::{fs, time::Duration};
    use tempfile::tempdir;

    #[test]
    #[serial]
    fn test_default_config() {
        let dir = tempdir().unwrap();
        let config = Config::from_dir(dir.path()).unwrap();
        assert_eq!(config.http.bind_port, 8080);
        assert_eq!(config.stall.receive_port, 8082);
        assert_eq!(config.stall.send_port, 8083);
        assert_eq!(config.stall.stall_duration, Duration::from_secs(30 * 60));
        assert_eq!(config.probe.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.probe.read_timeout, None);
        assert_eq!(config.probe.targets.len(), 3);
    }

    #[test]
    #[serial]
    fn test_env_override() {
        let dir = tempdir().unwrap();
        std::env::set_var("STALL_PROBE_HTTP__BIND_PORT", "9090");
        let config = Config::from_dir(dir.path());
        std::env::remove_var("STALL_PROBE_HTTP__BIND_PORT");
        assert_eq!(config.unwrap().http.bind_port, 9090);
    }

    #[test]
    #[serial]
    fn test_file_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");

        fs::write(
            &config_path,
            r#"
stall:
  send_port: 9003
  stall_duration: 2m
probe:
  read_timeout: 10s
  targets:
    - name: local
      address: "127.0.0.1:9003"
"#,
        )
        .unwrap();

        let config = Config::from_file(config_path).unwrap();
        assert_eq!(config.stall.send_port, 9003);
        assert_eq!(config.stall.stall_duration, Duration::from_secs(120));
        assert_eq!(config.stall.receive_port, 8082);
        assert_eq!(config.probe.read_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.probe.targets.len(), 1);
        assert_eq!(config.probe.targets[0].address, "127.0.0.1:9003");
    }

    #[test]
    #[serial]
    fn test_layered_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("default.yaml"), "http:\n  bind_port: 7000\n").unwrap();
        fs::write(dir.path().join("local.yaml"), "http:\n  bind_port: 7001\n").unwrap();

        let config = Config::from_dir(dir.path()).unwrap();
        assert_eq!(config.http.bind_port, 7001);
    }

    #[test]
    #[serial]
    fn test_validation() {
        let dir = tempdir().unwrap();
        std::env::set_var("STALL_PROBE_HTTP__BIND_PORT", "8082");
        let result = Config::from_dir(dir.path());
        std::env::remove_var("STALL_PROBE_HTTP__BIND_PORT");
        assert!(result.is_err());
    }
}
