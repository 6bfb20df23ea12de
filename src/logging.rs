use time::UtcOffset;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::{Directive, ParseError},
    fmt::time::OffsetTime,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::{
    config::{LogFormat, LoggingConfig},
    errors::InitializationError,
    AppError,
};

/// File name prefix of the rolling log files
const LOG_FILE_PREFIX: &str = "stall-probe.log";

/// Install the global subscriber.
///
/// The returned guard flushes the file writer and must be held until exit.
pub fn setup_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, AppError> {
    // Validate logging config before proceeding
    config.validate().map_err(AppError::Init)?;

    let timer = OffsetTime::new(
        UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
        time::format_description::well_known::Rfc3339,
    );

    let env_filter = build_env_filter(config)?;

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(config.thread_ids)
        .with_thread_names(config.thread_names)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_level(true)
        .with_timer(timer.clone());

    let console = match config.format {
        LogFormat::Pretty => console.pretty().boxed(),
        LogFormat::Compact => console.compact().boxed(),
        LogFormat::Json => console.json().boxed(),
    };

    let (file, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(config.thread_ids)
                .with_timer(timer)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    Registry::default()
        .with(env_filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| {
            AppError::Init(InitializationError::logging(format!(
                "Failed to initialize logging: {}",
                e
            )))
        })?;

    Ok(guard)
}

/// `RUST_LOG` wins over the configured level when it is set
fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter, AppError> {
    let mut env_filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives)
            .map_err(|e| AppError::Init(InitializationError::logging(e.to_string())))?,
        _ => EnvFilter::default().add_directive(config.get_level_filter().into()),
    };

    // Connection bookkeeping is chatty, only enable it on request
    if config.trace_connections {
        let directive: Directive = "stall_probe::connection=trace"
            .parse()
            .map_err(|e: ParseError| AppError::Init(InitializationError::logging(e.to_string())))?;
        env_filter = env_filter.add_directive(directive);
    }

    Ok(env_filter)
}
