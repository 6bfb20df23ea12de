use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::InitializationError;

/// Output format of console logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Compact => write!(f, "compact"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory for rolling log files, console only when unset
    pub log_dir: Option<String>,

    /// Enable trace-level logging for connection bookkeeping
    pub trace_connections: bool,

    /// Minimum log level for console output
    pub level: String,

    /// Log format (pretty, compact or json)
    pub format: LogFormat,

    /// Whether to include source code location in logs
    pub include_location: bool,

    /// Whether to include thread IDs in logs
    pub thread_ids: bool,

    /// Whether to include thread names in logs
    pub thread_names: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_dir: None,
            trace_connections: false,
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_location: false,
            thread_ids: false,
            thread_names: false,
        }
    }
}

impl Config {
    const LEVELS: [&'static str; 5] = ["error", "warn", "info", "debug", "trace"];

    pub fn validate(&self) -> Result<(), InitializationError> {
        let level = self.level.to_lowercase();
        if !Self::LEVELS.contains(&level.as_str()) {
            return Err(InitializationError::logging(format!(
                "Invalid log level '{}', expected one of: {}",
                self.level,
                Self::LEVELS.join(", ")
            )));
        }

        if self.log_dir.as_deref().is_some_and(str::is_empty) {
            return Err(InitializationError::logging("log_dir must not be empty"));
        }

        Ok(())
    }

    pub fn get_level_filter(&self) -> LevelFilter {
        match self.level.to_lowercase().as_str() {
            "error" => LevelFilter::ERROR,
            "warn" => LevelFilter::WARN,
            "info" => LevelFilter::INFO,
            "debug" => LevelFilter::DEBUG,
            "trace" => LevelFilter::TRACE,
            _ => LevelFilter::INFO, // Fallback to INFO if invalid
        }
    }
}
