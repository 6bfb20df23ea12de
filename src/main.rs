use clap::{Args, Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info};

use stall_probe::{
    run_probes, setup_logging, AppConfig, AppError, InitializationError, ProbeTarget, StallProbe,
};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args)]
struct CommonArgs {
    /// Path to the config file, layered config/ files are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Dump default config and exit
    #[arg(long = "dump-default-config")]
    dump_default: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Start the greeting server and the stall simulators (default)
    Serve,
    /// Measure how long connections to each target stay open
    Probe {
        /// host:port targets, replacing the configured ones
        targets: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line args
    let cli = Cli::parse();

    if cli.common.dump_default {
        let config = AppConfig::default();
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    // Load config
    let mut config = match &cli.common.config {
        Some(path) => AppConfig::from_file(path.clone())?,
        None => AppConfig::new()?,
    };

    // Initialize logging
    let _log_guard = setup_logging(&config.logging)?;

    if let Some(path) = &cli.common.config {
        info!("Loaded config from {}", path.display());
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await?,
        Command::Probe { targets } => {
            if !targets.is_empty() {
                config.probe.targets = targets
                    .into_iter()
                    .map(|address| ProbeTarget::new(address.clone(), address))
                    .collect();
            }

            if let Err(e) = run_probes(&config.probe).await {
                error!("Probe run aborted: {}", e);
                return Err(e.into());
            }
        }
    }

    Ok(())
}

async fn serve(config: AppConfig) -> Result<(), AppError> {
    let server = Arc::new(StallProbe::new(config)?);
    let mut runner = tokio::spawn(Arc::clone(&server).run());

    tokio::select! {
        result = &mut runner => {
            match result {
                Ok(Ok(())) => info!("Listeners stopped"),
                Ok(Err(e)) => {
                    error!("Failed to start listeners: {}", e);
                    server.shutdown().await?;
                    return Err(e);
                }
                Err(e) => error!("Server task panicked: {}", e),
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|e| InitializationError::signal(e.to_string()))?;
            info!("Received Ctrl-C");
        }
    }

    server.shutdown().await?;
    Ok(())
}
